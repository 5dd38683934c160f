use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Generate,
    Img2Img,
    Upscale,
    RemoveBg,
    ReplaceBg,
    Vectorize,
}

/// Structural inputs an operation needs regardless of provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRequirements {
    pub requires_prompt: bool,
    pub requires_reference: bool,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Generate,
        Operation::Img2Img,
        Operation::Upscale,
        Operation::RemoveBg,
        Operation::ReplaceBg,
        Operation::Vectorize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Generate => "generate",
            Operation::Img2Img => "img2img",
            Operation::Upscale => "upscale",
            Operation::RemoveBg => "remove-bg",
            Operation::ReplaceBg => "replace-bg",
            Operation::Vectorize => "vectorize",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|operation| operation.as_str() == normalized)
    }

    pub fn requirements(&self) -> OperationRequirements {
        let (requires_prompt, requires_reference) = match self {
            Operation::Generate => (true, false),
            Operation::Img2Img => (true, true),
            Operation::Upscale => (false, true),
            Operation::RemoveBg => (false, true),
            Operation::ReplaceBg => (true, true),
            Operation::Vectorize => (false, true),
        };
        OperationRequirements {
            requires_prompt,
            requires_reference,
        }
    }

    pub fn names() -> Vec<String> {
        Self::ALL
            .iter()
            .map(|operation| operation.as_str().to_string())
            .collect()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::Operation;

    #[test]
    fn parse_accepts_every_canonical_name() {
        for operation in Operation::ALL {
            assert_eq!(Operation::parse(operation.as_str()), Some(operation));
        }
        assert_eq!(Operation::parse(" Remove-BG "), Some(Operation::RemoveBg));
        assert_eq!(Operation::parse("inpaint"), None);
    }

    #[test]
    fn requirement_table_matches_operation_semantics() {
        let generate = Operation::Generate.requirements();
        assert!(generate.requires_prompt && !generate.requires_reference);

        let img2img = Operation::Img2Img.requirements();
        assert!(img2img.requires_prompt && img2img.requires_reference);

        for operation in [
            Operation::Upscale,
            Operation::RemoveBg,
            Operation::Vectorize,
        ] {
            let requirements = operation.requirements();
            assert!(!requirements.requires_prompt);
            assert!(requirements.requires_reference);
        }

        let replace = Operation::ReplaceBg.requirements();
        assert!(replace.requires_prompt && replace.requires_reference);
    }
}

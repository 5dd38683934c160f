use thiserror::Error;

const DETAIL_MAX_CHARS: usize = 240;

/// Closed classification every fatal error falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    Authentication,
    Network,
    Timeout,
    Api,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Api => "api",
            ErrorKind::Unknown => "unknown",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "Invalid image tag",
            ErrorKind::Authentication => "API key required",
            ErrorKind::Network => "Network error",
            ErrorKind::Timeout => "Generation timed out",
            ErrorKind::Api => "Provider error",
            ErrorKind::Unknown => "Something went wrong",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Unknown provider \"{provider}\" (available: {})", .available.join(", "))]
    UnknownProvider {
        provider: String,
        available: Vec<String>,
    },
    #[error("Unknown operation \"{operation}\" (valid operations: {})", .available.join(", "))]
    UnknownOperation {
        operation: String,
        available: Vec<String>,
    },
    #[error("Provider \"{provider}\" does not support \"{operation}\" (supported: {})", .supported.join(", "))]
    UnsupportedOperation {
        provider: String,
        operation: String,
        supported: Vec<String>,
    },
    #[error("Operation \"{operation}\" requires a prompt")]
    MissingPrompt { operation: String },
    #[error("Operation \"{operation}\" requires a reference image")]
    MissingReference { operation: String },
    #[error("Missing \"{attribute}\" attribute")]
    MissingAttribute { attribute: String },
    #[error("Invalid {attribute} \"{value}\": {reason}")]
    InvalidAttribute {
        attribute: String,
        value: String,
        reason: String,
    },
    #[error("Malformed raw parameters: {reason}")]
    MalformedRawParams { reason: String },
    #[error("No API key configured for \"{provider}\"")]
    MissingCredential { provider: String },
    #[error("Network request failed: {message}")]
    Network { message: String },
    #[error("Failed to fetch reference image {url}: {message}")]
    ReferenceFetch { url: String, message: String },
    #[error("Request timed out after {timeout_ms} ms")]
    RequestTimeout { timeout_ms: u64 },
    #[error("{provider} did not finish after {attempts} polls")]
    PollingTimeout { provider: String, attempts: u32 },
    #[error("Reference \"{reference}\" never produced an image ({attempts} checks)")]
    ReferenceUnresolved { reference: String, attempts: u32 },
    #[error("{provider} request failed ({status}): {body}")]
    Api {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: String },
    #[error("{provider} returned a malformed response: {reason}")]
    MalformedResponse { provider: String, reason: String },
    #[error("{provider} response contained no image")]
    MissingImage { provider: String },
    #[error("{provider} generation failed: {message}")]
    GenerationFailed { provider: String, message: String },
    #[error("Image {url} failed to load after {attempts} regenerations")]
    ImageUnrecoverable { url: String, attempts: u32 },
    #[error("Execution cancelled")]
    Cancelled,
    #[error("{message}")]
    Other { message: String },
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::UnknownProvider { .. }
            | GenerationError::UnknownOperation { .. }
            | GenerationError::UnsupportedOperation { .. }
            | GenerationError::MissingPrompt { .. }
            | GenerationError::MissingReference { .. }
            | GenerationError::MissingAttribute { .. }
            | GenerationError::InvalidAttribute { .. }
            | GenerationError::MalformedRawParams { .. } => ErrorKind::Configuration,
            GenerationError::MissingCredential { .. } => ErrorKind::Authentication,
            GenerationError::Network { .. }
            | GenerationError::ReferenceFetch { .. }
            | GenerationError::ImageUnrecoverable { .. } => ErrorKind::Network,
            GenerationError::RequestTimeout { .. }
            | GenerationError::PollingTimeout { .. }
            | GenerationError::ReferenceUnresolved { .. } => ErrorKind::Timeout,
            GenerationError::Api { .. }
            | GenerationError::EmptyResponse { .. }
            | GenerationError::MalformedResponse { .. }
            | GenerationError::MissingImage { .. }
            | GenerationError::GenerationFailed { .. } => ErrorKind::Api,
            GenerationError::Cancelled | GenerationError::Other { .. } => ErrorKind::Unknown,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, GenerationError::Cancelled)
    }

    pub fn needs_credentials(&self) -> bool {
        matches!(self, GenerationError::MissingCredential { .. })
    }

    pub fn other(message: impl Into<String>) -> Self {
        GenerationError::Other {
            message: message.into(),
        }
    }

    pub fn display(&self) -> ErrorDisplay {
        ErrorDisplay {
            kind: self.kind(),
            title: self.kind().title().to_string(),
            detail: truncate_text(&self.to_string(), DETAIL_MAX_CHARS),
            hint: self.hint(),
        }
    }

    fn hint(&self) -> String {
        match self {
            GenerationError::UnknownProvider { available, .. } => {
                format!("Set provider=\"...\" to one of: {}", available.join(", "))
            }
            GenerationError::UnknownOperation { available, .. } => {
                format!("Set operation=\"...\" to one of: {}", available.join(", "))
            }
            GenerationError::UnsupportedOperation {
                provider,
                supported,
                ..
            } => format!(
                "Pick another provider, or use one of {provider}'s operations: {}",
                supported.join(", ")
            ),
            GenerationError::MissingPrompt { .. } => {
                "Add a prompt=\"...\" attribute describing the image".to_string()
            }
            GenerationError::MissingReference { .. } => {
                "Add img-ref=\"https://...\" or img-ref=\"#element-id\"".to_string()
            }
            GenerationError::MissingAttribute { attribute } => {
                format!("Add a {attribute}=\"...\" attribute")
            }
            GenerationError::InvalidAttribute { attribute, .. } => {
                format!("Fix the {attribute} attribute")
            }
            GenerationError::MalformedRawParams { .. } => {
                "params must be a JSON object, e.g. params='{\"model\": \"...\"}'".to_string()
            }
            GenerationError::MissingCredential { provider } => {
                format!("Save a key with KeyStore::save_key(\"{provider}\", \"<api key>\") or pass --api-key {provider}=<api key>; the image retries automatically")
            }
            GenerationError::Network { .. } => {
                "Check the connection, or configure a relay for this provider".to_string()
            }
            GenerationError::ReferenceFetch { url, .. } => {
                format!("Make sure {url} is reachable and allows cross-origin reads")
            }
            GenerationError::RequestTimeout { .. } => {
                "Raise request_timeout_ms in the engine configuration".to_string()
            }
            GenerationError::PollingTimeout { .. } => {
                "The provider is slow right now; reload to try again".to_string()
            }
            GenerationError::ReferenceUnresolved { reference, .. } => {
                format!("Check that {reference} exists and renders successfully")
            }
            GenerationError::Api { status, .. } if *status == 401 || *status == 403 => {
                "The provider rejected the API key; save a new one".to_string()
            }
            GenerationError::Api { status, .. } if *status == 429 => {
                "Rate limited by the provider; wait and reload".to_string()
            }
            GenerationError::Api { .. }
            | GenerationError::EmptyResponse { .. }
            | GenerationError::MalformedResponse { .. }
            | GenerationError::MissingImage { .. }
            | GenerationError::GenerationFailed { .. } => {
                "Adjust the prompt or parameters and try again".to_string()
            }
            GenerationError::ImageUnrecoverable { .. } => {
                "Invalidate the cache entry or change an attribute to regenerate".to_string()
            }
            GenerationError::Cancelled | GenerationError::Other { .. } => {
                "Enable verbose logging for more detail".to_string()
            }
        }
    }
}

/// What a presentation layer shows for a failed tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDisplay {
    pub kind: ErrorKind,
    pub title: String,
    pub detail: String,
    pub hint: String,
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

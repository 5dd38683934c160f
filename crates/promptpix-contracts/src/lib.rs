pub mod attributes;
pub mod cache_key;
pub mod errors;
pub mod hash;
pub mod operations;
pub mod params;
pub mod styles;

pub use attributes::{ReferenceAttr, TagAttributes};
pub use cache_key::{derive_cache_key, AnchorIdentity};
pub use errors::{ErrorDisplay, ErrorKind, GenerationError};
pub use operations::{Operation, OperationRequirements};
pub use params::{AspectRatio, OutputFormat, Quality, UniversalParams};
pub use styles::{StyleFamily, StyleSpec, StyleVocabulary};

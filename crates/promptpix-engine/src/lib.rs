//! Runtime for declarative AI image tags: provider adapters, the layered
//! cache, the execution core and the per-tag component state machine.

pub mod adapters;
pub mod cache;
pub mod component;
pub mod config;
pub mod credentials;
pub mod executor;
pub mod http;
pub mod polling;
pub mod reference;

#[cfg(test)]
mod test_support;

pub use adapters::{AdapterRegistry, CorsMode, ProviderAdapter};
pub use cache::{CacheResult, FileLayer, LayeredCache, LocalLayer, MemoryLayer};
pub use component::{
    AnchorSnapshot, Component, ComponentDirectory, ComponentState, ComponentStatus, ThemeScope,
};
pub use config::{EngineConfig, SharedConfig};
pub use credentials::{EnvKeyResolver, KeyResolver, KeyStore};
pub use executor::{ExecuteOptions, ExecutionCore, ExecutionCoreBuilder};
pub use http::{HttpTransport, ReqwestTransport};

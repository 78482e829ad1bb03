pub mod provider;
pub mod writer;

pub use provider::{RegistryConfig, RegistryProvider, REGISTRY_SOURCE};
pub use writer::{normalize_status, upsert_registry_entry, RegistryEntry};

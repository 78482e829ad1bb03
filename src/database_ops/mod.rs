pub mod companies;
pub mod http;
pub mod local;
pub mod matches;
pub mod ozon;
pub mod parsed;
pub mod provider;
pub mod regions;
pub mod registry;
pub mod retail;
pub mod two_gis;
pub mod wildberries;

pub use provider::{Provider, ProviderError, RawRecord, RetailSource};

/// Result of an idempotent write keyed by a natural key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Row exists and nothing new was supplied.
    Unchanged,
    /// Input lacked its natural key; nothing written.
    Skipped,
}

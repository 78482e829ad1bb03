pub mod provider;

pub use provider::{WildberriesConfig, WildberriesProvider, WILDBERRIES_SOURCE};

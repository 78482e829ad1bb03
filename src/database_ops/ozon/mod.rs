pub mod provider;

pub use provider::{OzonConfig, OzonProvider, OZON_SOURCE};

pub mod provider;

pub use provider::{TwoGisConfig, TwoGisProvider, TWO_GIS_SOURCE};

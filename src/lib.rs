pub mod analytics;
pub mod cli;
pub mod config;
pub mod database_ops;
pub mod filters;
pub mod matching;
pub mod normalization;
pub mod parsing;
pub mod pipeline;
pub mod snapshot;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
}

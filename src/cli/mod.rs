//! Operator commands behind the `mi` binary. Each module exposes a
//! `XConfig` plus `run(cfg)`; the binary only maps flags onto the config.

pub mod build_snapshot;
pub mod db_counts;
pub mod discover_companies;
pub mod enrich_registry;
pub mod export;
pub mod import_regions;
pub mod ingest_offers;
pub mod match_brands;
pub mod parse_products;
pub mod run_all;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::PipelineConfig;
use crate::util::db::Db;

const MAX_CONNECTIONS: u32 = 5;

/// Load config from env, apply the `--db-url` override and open a migrated
/// pool.
pub(crate) async fn open(database_url: Option<String>) -> Result<(PipelineConfig, Db)> {
    let mut cfg = PipelineConfig::from_env()?;
    if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
        cfg.db_url = url;
    }
    let db = Db::connect(&cfg.db_url, MAX_CONNECTIONS)
        .await
        .context("opening market database")?;
    info!(export_dir = %cfg.export_dir.display(), "database ready");
    Ok((cfg, db))
}

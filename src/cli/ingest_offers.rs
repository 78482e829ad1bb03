use anyhow::Result;
use std::path::PathBuf;

use crate::database_ops::provider::RetailSource;
use crate::pipeline::{ingest_offers, load_queries, resolve_queries, RetailSettings};

#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub database_url: Option<String>,
    pub sources: Vec<RetailSource>,
    pub queries: Vec<String>,
    /// Query file; overrides `RETAIL_QUERIES_JSON`.
    pub queries_file: Option<PathBuf>,
    /// Region stamped on offers that carry none.
    pub region: Option<String>,
    /// Take only the first N queries.
    pub max_queries: Option<usize>,
}

pub async fn run(cfg: IngestConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let mut queries = match &cfg.queries_file {
        Some(path) if cfg.queries.is_empty() => load_queries(path)?,
        _ => resolve_queries(&cfg.queries, &pipeline)?,
    };
    if let Some(n) = cfg.max_queries {
        queries.truncate(n);
    }
    let sources = if cfg.sources.is_empty() {
        vec![RetailSource::Wildberries, RetailSource::Ozon]
    } else {
        cfg.sources
    };
    let mut settings = RetailSettings::from_config(&pipeline);
    if cfg.region.is_some() {
        settings.default_region = cfg.region;
    }

    let s = ingest_offers(&db, &sources, &queries, &settings).await?;
    println!(
        "Retail ingest: fetched={} inserted={} duplicates={} invalid={} failed={}",
        s.fetched,
        s.inserted,
        s.duplicates,
        s.skipped_invalid,
        s.failed_queries.len()
    );
    for failed in &s.failed_queries {
        println!("  failed: {failed}");
    }
    Ok(())
}

use anyhow::Result;

use crate::database_ops::provider::RetailSource;
use crate::pipeline::{run_all, RunAllOptions};

#[derive(Debug, Clone, Default)]
pub struct RunAllConfig {
    pub database_url: Option<String>,
    pub sources: Vec<RetailSource>,
    pub queries: Vec<String>,
    pub skip_discovery: bool,
    pub enrich_registry: bool,
}

pub async fn run(cfg: RunAllConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let mut opts = RunAllOptions {
        queries: cfg.queries,
        skip_discovery: cfg.skip_discovery,
        enrich_registry: cfg.enrich_registry,
        ..RunAllOptions::default()
    };
    if !cfg.sources.is_empty() {
        opts.sources = cfg.sources;
    }

    let report = run_all(&db, &pipeline, &opts).await?;
    if let Some(r) = &report.regions {
        println!("Regions: inserted={} updated={} unchanged={}", r.inserted, r.updated, r.unchanged);
    }
    if let Some(d) = &report.discovery {
        println!(
            "Discovery: inserted={} updated={} failed_regions={}",
            d.inserted,
            d.updated,
            d.errors.len()
        );
    }
    println!(
        "Retail: inserted={} duplicates={} failed_queries={}",
        report.ingest.inserted,
        report.ingest.duplicates,
        report.ingest.failed_queries.len()
    );
    println!("Parsed: inserted={}", report.parse.inserted);
    println!("Matches: inserted={}", report.matching.inserted);
    if let Some(e) = &report.enrich {
        println!("Registry: found={} not_found={}", e.found, e.not_found);
    }
    super::build_snapshot::print_summary(&report.snapshot);
    if let Some(x) = &report.export {
        println!("Exported: {} and {}", x.csv_path.display(), x.payload_path.display());
    }
    Ok(())
}

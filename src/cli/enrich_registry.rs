use anyhow::Result;

use crate::pipeline::{enrich_registry, RegistrySettings};

#[derive(Debug, Clone, Default)]
pub struct EnrichConfig {
    pub database_url: Option<String>,
    pub limit: Option<usize>,
}

pub async fn run(cfg: EnrichConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let settings = RegistrySettings {
        limit: cfg.limit,
        ..RegistrySettings::from_config(&pipeline)
    };
    let s = enrich_registry(&db, &settings).await?;
    println!(
        "Registry enrichment: companies={} found={} inserted={} updated={} not_found={} errors={}",
        s.companies,
        s.found,
        s.inserted,
        s.updated,
        s.not_found,
        s.errors.len()
    );
    for err in &s.errors {
        println!("  {err}");
    }
    Ok(())
}

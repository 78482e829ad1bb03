use anyhow::{anyhow, Result};
use std::path::PathBuf;

use crate::database_ops::regions::{import_regions, load_regions_csv};

#[derive(Debug, Clone, Default)]
pub struct ImportRegionsConfig {
    pub database_url: Option<String>,
    /// Regions CSV; defaults to `REGIONS_CSV`.
    pub csv: Option<PathBuf>,
}

pub async fn run(cfg: ImportRegionsConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let path = cfg
        .csv
        .or(pipeline.regions_csv)
        .ok_or_else(|| anyhow!("no regions csv: pass --csv or set REGIONS_CSV"))?;
    let rows = load_regions_csv(&path)?;
    let s = import_regions(&db, &rows).await?;
    println!(
        "Regions import: processed={} inserted={} updated={} unchanged={} skipped={}",
        s.processed, s.inserted, s.updated, s.unchanged, s.skipped
    );
    Ok(())
}

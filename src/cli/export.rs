use anyhow::Result;
use std::path::PathBuf;

use crate::config::{PAYLOAD_JSON_NAME, SNAPSHOT_CSV_NAME};
use crate::pipeline::export_outputs;

#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    pub database_url: Option<String>,
    /// Overrides `EXPORT_DIR`.
    pub out_dir: Option<PathBuf>,
}

pub async fn run(cfg: ExportConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let dir = cfg.out_dir.unwrap_or(pipeline.export_dir);
    let s = export_outputs(&db, &dir.join(SNAPSHOT_CSV_NAME), &dir.join(PAYLOAD_JSON_NAME)).await?;
    println!("Snapshot CSV: {} ({} rows)", s.csv_path.display(), s.csv_rows);
    println!(
        "Analytics payload: {} ({} priced products)",
        s.payload_path.display(),
        s.priced_products
    );
    Ok(())
}

use anyhow::Result;

use crate::pipeline::parse_pending_offers;

#[derive(Debug, Clone, Default)]
pub struct ParseConfig {
    pub database_url: Option<String>,
}

pub async fn run(cfg: ParseConfig) -> Result<()> {
    let (_, db) = super::open(cfg.database_url).await?;
    let s = parse_pending_offers(&db).await?;
    println!(
        "Product parsing: processed={} inserted={} skipped={}",
        s.processed, s.inserted, s.skipped
    );
    Ok(())
}

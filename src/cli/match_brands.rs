use anyhow::Result;

use crate::matching::run_matching;

#[derive(Debug, Clone, Default)]
pub struct MatchConfig {
    pub database_url: Option<String>,
}

pub async fn run(cfg: MatchConfig) -> Result<()> {
    let (_, db) = super::open(cfg.database_url).await?;
    let s = run_matching(&db).await?;
    println!(
        "Brand matching: brands={} companies={} inserted={} already_recorded={}",
        s.brands, s.companies, s.inserted, s.skipped_existing
    );
    for (method, n) in &s.by_method {
        println!("  {method}: {n}");
    }
    Ok(())
}

use anyhow::Result;

use crate::pipeline::discover_companies;

#[derive(Debug, Clone, Default)]
pub struct DiscoverConfig {
    pub database_url: Option<String>,
    /// Only this region (by name).
    pub region: Option<String>,
    /// Overrides `TWO_GIS_QUERY`.
    pub query: Option<String>,
    pub max_results: Option<usize>,
}

pub async fn run(cfg: DiscoverConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let mut two_gis = pipeline.two_gis.clone();
    if let Some(q) = cfg.query {
        two_gis.query = q;
    }
    if let Some(n) = cfg.max_results {
        two_gis.max_results = n;
    }

    let s = discover_companies(&db, &two_gis, &pipeline.throttle, cfg.region.as_deref()).await?;
    println!(
        "Discovery: regions={} without_coords={} fetched={} inserted={} updated={} unchanged={} skipped={} dairy_like={}",
        s.regions_total,
        s.regions_without_coords,
        s.fetched,
        s.inserted,
        s.updated,
        s.unchanged,
        s.skipped,
        s.dairy_like
    );
    for err in &s.errors {
        println!("  {err}");
    }
    Ok(())
}

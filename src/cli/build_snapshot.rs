use anyhow::Result;
use std::path::PathBuf;

use crate::normalization::RegionCodeMap;
use crate::snapshot::{build_snapshot, SnapshotSummary};

#[derive(Debug, Clone, Default)]
pub struct SnapshotConfig {
    pub database_url: Option<String>,
    /// `code,name` CSV; overrides `REGION_CODES_CSV`.
    pub region_codes: Option<PathBuf>,
}

pub(crate) fn print_summary(s: &SnapshotSummary) {
    println!(
        "Market snapshot: rows={} unresolved_regions={}",
        s.rows, s.unresolved_regions
    );
    if s.degraded_mapping {
        println!("  WARNING: region code map unavailable; numeric codes were recorded as UNKNOWN");
    }
    for (region, n) in &s.top_regions {
        println!("  {region}: {n}");
    }
}

pub async fn run(cfg: SnapshotConfig) -> Result<()> {
    let (pipeline, db) = super::open(cfg.database_url).await?;
    let codes = cfg.region_codes.or(pipeline.region_codes_csv);
    let map = RegionCodeMap::load_or_degraded(codes.as_deref());
    let s = build_snapshot(&db, &map).await?;
    print_summary(&s);
    Ok(())
}

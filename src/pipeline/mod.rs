//! Stage drivers. Each stage takes explicit config, works sequentially and
//! returns a summary value; `run_all` chains them in pipeline order.

pub mod discovery;
pub mod enrich;
pub mod ingest;
pub mod parse;

use anyhow::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use crate::analytics::{build_market_payload, write_payload_json};
use crate::config::PipelineConfig;
use crate::database_ops::provider::RetailSource;
use crate::database_ops::regions::{import_regions, load_regions_csv, RegionImportSummary};
use crate::matching::{run_matching, MatchSummary};
use crate::normalization::RegionCodeMap;
use crate::snapshot::{build_snapshot, export_snapshot_csv, load_snapshot, SnapshotSummary};
use crate::util::db::Db;

pub use discovery::{discover_companies, DiscoverySummary};
pub use enrich::{enrich_registry, EnrichSummary, RegistrySettings};
pub use ingest::{ingest_offers, load_queries, IngestSummary, RetailSettings, DEFAULT_QUERIES};
pub use parse::{parse_pending_offers, ParseSummary};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportSummary {
    pub csv_path: PathBuf,
    pub csv_rows: usize,
    pub payload_path: PathBuf,
    pub priced_products: usize,
}

/// Write the snapshot CSV and the analytics payload derived from it.
pub async fn export_outputs(db: &Db, csv_path: &Path, payload_path: &Path) -> Result<ExportSummary> {
    let csv_rows = export_snapshot_csv(db, csv_path).await?;
    let rows = {
        let mut conn = db.pool.acquire().await?;
        load_snapshot(&mut conn).await?
    };
    let payload = build_market_payload(&rows);
    write_payload_json(&payload, payload_path)?;
    Ok(ExportSummary {
        csv_path: csv_path.to_path_buf(),
        csv_rows,
        payload_path: payload_path.to_path_buf(),
        priced_products: payload.overview_metrics.total_products,
    })
}

#[derive(Debug, Clone)]
pub struct RunAllOptions {
    pub sources: Vec<RetailSource>,
    /// Empty means: the configured query file, else [`DEFAULT_QUERIES`].
    pub queries: Vec<String>,
    pub skip_discovery: bool,
    pub enrich_registry: bool,
}

impl Default for RunAllOptions {
    fn default() -> Self {
        Self {
            sources: vec![RetailSource::Wildberries, RetailSource::Ozon],
            queries: Vec::new(),
            skip_discovery: false,
            enrich_registry: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub regions: Option<RegionImportSummary>,
    pub discovery: Option<DiscoverySummary>,
    pub ingest: IngestSummary,
    pub parse: ParseSummary,
    pub matching: MatchSummary,
    pub enrich: Option<EnrichSummary>,
    pub snapshot: SnapshotSummary,
    pub export: Option<ExportSummary>,
}

/// Queries for a run: explicit list, else the query file, else the defaults.
pub fn resolve_queries(explicit: &[String], cfg: &PipelineConfig) -> Result<Vec<String>> {
    if !explicit.is_empty() {
        return Ok(explicit.to_vec());
    }
    match &cfg.retail_queries_json {
        Some(path) => load_queries(path),
        None => Ok(DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()),
    }
}

/// Regions → discovery → ingest → parse → match → (registry) → snapshot →
/// export.
///
/// Discovery is skipped with a warning when no 2GIS key is configured; every
/// other stage error aborts the run.
#[instrument(skip_all)]
pub async fn run_all(db: &Db, cfg: &PipelineConfig, opts: &RunAllOptions) -> Result<PipelineReport> {
    let mut report = PipelineReport::default();

    if let Some(path) = &cfg.regions_csv {
        let rows = load_regions_csv(path)?;
        report.regions = Some(import_regions(db, &rows).await?);
    }

    if opts.skip_discovery {
        info!("company discovery skipped by request");
    } else if cfg.two_gis.api_key.is_none() {
        warn!("TWO_GIS_API_KEY not set; company discovery skipped");
    } else {
        report.discovery = Some(discover_companies(db, &cfg.two_gis, &cfg.throttle, None).await?);
    }

    let queries = resolve_queries(&opts.queries, cfg)?;
    report.ingest = ingest_offers(db, &opts.sources, &queries, &RetailSettings::from_config(cfg)).await?;
    report.parse = parse_pending_offers(db).await?;
    report.matching = run_matching(db).await?;

    if opts.enrich_registry {
        report.enrich = Some(enrich_registry(db, &RegistrySettings::from_config(cfg)).await?);
    }

    let map = RegionCodeMap::load_or_degraded(cfg.region_codes_csv.as_deref());
    report.snapshot = build_snapshot(db, &map).await?;
    report.export = Some(export_outputs(db, &cfg.snapshot_csv_path(), &cfg.payload_json_path()).await?);

    info!(
        offers = report.ingest.inserted,
        parsed = report.parse.inserted,
        matches = report.matching.inserted,
        snapshot_rows = report.snapshot.rows,
        "pipeline finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::http::{RetryPolicy, ThrottleConfig};
    use crate::database_ops::two_gis::TwoGisConfig;
    use std::io::Write;
    use std::time::Duration;

    fn offline_config(dir: &Path) -> PipelineConfig {
        PipelineConfig {
            db_url: "sqlite::memory:".into(),
            regions_csv: None,
            region_codes_csv: None,
            retail_queries_json: None,
            export_dir: dir.join("out"),
            default_region: Some("Москва".into()),
            http_timeout: Duration::from_secs(5),
            retry: RetryPolicy::immediate(),
            throttle: ThrottleConfig::none(),
            two_gis: TwoGisConfig::default(),
        }
    }

    #[tokio::test]
    async fn offline_run_produces_snapshot_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let mut regions = std::fs::File::create(dir.path().join("regions.csv")).unwrap();
        writeln!(regions, "name,country,federal_district,center_lat,center_lon").unwrap();
        writeln!(regions, "Москва,RU,Центральный,55.75,37.62").unwrap();
        let mut codes = std::fs::File::create(dir.path().join("codes.csv")).unwrap();
        writeln!(codes, "code,name").unwrap();
        writeln!(codes, "213,Москва").unwrap();

        let mut cfg = offline_config(dir.path());
        cfg.regions_csv = Some(dir.path().join("regions.csv"));
        cfg.region_codes_csv = Some(dir.path().join("codes.csv"));
        let opts = RunAllOptions {
            sources: vec![RetailSource::Local],
            queries: vec!["молоко".into()],
            ..RunAllOptions::default()
        };

        let db = Db::in_memory().await.unwrap();
        let report = run_all(&db, &cfg, &opts).await.unwrap();
        assert_eq!(report.regions.map(|r| r.inserted), Some(1));
        assert!(report.discovery.is_none());
        assert_eq!(report.ingest.inserted, 3);
        assert_eq!(report.parse.inserted, 3);
        assert_eq!(report.snapshot.rows, 3);
        assert!(!report.snapshot.degraded_mapping);
        assert_eq!(report.snapshot.top_regions, vec![("Москва".to_string(), 3)]);

        let export = report.export.unwrap();
        assert_eq!(export.csv_rows, 3);
        assert_eq!(export.priced_products, 3);
        let payload: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&export.payload_path).unwrap()).unwrap();
        assert_eq!(payload["overview_metrics"]["total_products"], 3);

        // Rerun: nothing new is stored and the snapshot is rebuilt identically.
        let again = run_all(&db, &cfg, &opts).await.unwrap();
        assert_eq!(again.ingest.inserted, 0);
        assert_eq!(again.snapshot.rows, 3);
    }

    #[test]
    fn explicit_queries_win_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = offline_config(dir.path());
        assert_eq!(resolve_queries(&["сыр".into()], &cfg).unwrap(), vec!["сыр"]);
        assert_eq!(resolve_queries(&[], &cfg).unwrap().len(), DEFAULT_QUERIES.len());
    }
}

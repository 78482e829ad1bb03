use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::database_ops::companies::upsert_discovered_company;
use crate::database_ops::http::ThrottleConfig;
use crate::database_ops::provider::{Provider, ProviderError};
use crate::database_ops::regions::list_regions;
use crate::database_ops::two_gis::{TwoGisConfig, TwoGisProvider, TWO_GIS_SOURCE};
use crate::database_ops::UpsertOutcome;
use crate::filters::{is_dairy_b2b, DEFAULT_THRESHOLD};
use crate::util::db::Db;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionDiscovery {
    pub region: String,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Fetched names that score as dairy producers.
    pub dairy_like: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiscoverySummary {
    pub regions_total: usize,
    pub regions_without_coords: usize,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub dairy_like: usize,
    pub per_region: Vec<RegionDiscovery>,
    pub errors: Vec<String>,
}

impl DiscoverySummary {
    fn record(&mut self, r: RegionDiscovery) {
        self.fetched += r.fetched;
        self.inserted += r.inserted;
        self.updated += r.updated;
        self.unchanged += r.unchanged;
        self.skipped += r.skipped;
        self.dairy_like += r.dairy_like;
        self.per_region.push(r);
    }
}

/// Fetch one region from `provider` and upsert the results in a single
/// transaction.
pub async fn discover_region(db: &Db, region: &str, provider: &dyn Provider) -> Result<RegionDiscovery> {
    let records = provider.fetch().await?;
    let mut out = RegionDiscovery {
        region: region.to_string(),
        fetched: records.len(),
        ..RegionDiscovery::default()
    };
    let mut tx = db.pool.begin().await?;
    for rec in &records {
        if is_dairy_b2b(&rec.name, DEFAULT_THRESHOLD) {
            out.dairy_like += 1;
        }
        match upsert_discovered_company(&mut tx, rec).await? {
            UpsertOutcome::Inserted => out.inserted += 1,
            UpsertOutcome::Updated => out.updated += 1,
            UpsertOutcome::Unchanged => out.unchanged += 1,
            UpsertOutcome::Skipped => out.skipped += 1,
        }
    }
    tx.commit().await?;
    Ok(out)
}

/// Run 2GIS discovery for every stored region with coordinates, in DB order.
/// `only` restricts the run to one region name. A failing region is logged
/// and recorded; the loop moves on.
#[instrument(skip(db, base, throttle))]
pub async fn discover_companies(
    db: &Db,
    base: &TwoGisConfig,
    throttle: &ThrottleConfig,
    only: Option<&str>,
) -> Result<DiscoverySummary> {
    if base.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
        return Err(ProviderError::MissingConfig {
            provider: TWO_GIS_SOURCE,
            key: "TWO_GIS_API_KEY",
        }
        .into());
    }

    let regions = {
        let mut conn = db.pool.acquire().await?;
        list_regions(&mut conn).await?
    };
    let mut summary = DiscoverySummary::default();

    let only = only.map(|o| o.trim().to_lowercase());
    for region in regions
        .iter()
        .filter(|r| only.as_deref().map_or(true, |o| r.name.to_lowercase() == o))
    {
        summary.regions_total += 1;
        let Some((lat, lon)) = region.center() else {
            info!(region = %region.name, "skipping region without coordinates");
            summary.regions_without_coords += 1;
            continue;
        };
        throttle.pause().await;

        let result = match TwoGisProvider::new(base.for_region(&region.name, lat, lon)) {
            Ok(provider) => discover_region(db, &region.name, &provider).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(r) => {
                println!(
                    "Region: {} | fetched: {} | inserted: {} | updated: {} | unchanged: {} | skipped: {}",
                    r.region, r.fetched, r.inserted, r.updated, r.unchanged, r.skipped
                );
                summary.record(r);
            }
            Err(err) => {
                let transient = err
                    .downcast_ref::<ProviderError>()
                    .is_some_and(ProviderError::is_transient);
                warn!(region = %region.name, transient, error = %err, "region discovery failed");
                summary.errors.push(format!("Region: {} failed: {err:#}", region.name));
            }
        }
    }

    info!(
        regions = summary.regions_total,
        inserted = summary.inserted,
        updated = summary.updated,
        errors = summary.errors.len(),
        "company discovery finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::companies::list_companies;
    use crate::database_ops::http::RetryPolicy;
    use crate::database_ops::local::LocalProvider;
    use crate::database_ops::regions::{import_regions, RegionRow};
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn local_provider_region_is_idempotent() {
        let db = Db::in_memory().await.unwrap();
        let provider = LocalProvider::demo_companies();
        let first = discover_region(&db, "Москва", &provider).await.unwrap();
        let second = discover_region(&db, "Москва", &provider).await.unwrap();
        assert_eq!(first.inserted, 1);
        assert_eq!(second.unchanged, 1);
        assert_eq!(first.dairy_like, 0);
    }

    #[tokio::test]
    async fn failing_region_does_not_stop_the_loop() {
        let server = MockServer::start().await;
        // Moscow point → results; Tver point → server error.
        Mock::given(method("GET"))
            .and(query_param("point", "37.62,55.75"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "result": {"items": [{"id": "10", "name": "Молочный комбинат"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("point", "37.62,55.75"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"meta": {"code": 404}})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("point", "35.9,56.86"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let db = Db::in_memory().await.unwrap();
        let rows = vec![
            RegionRow {
                name: "Тверская область".into(),
                center_lat: Some(56.86),
                center_lon: Some(35.9),
                ..RegionRow::default()
            },
            RegionRow {
                name: "Без координат".into(),
                ..RegionRow::default()
            },
            RegionRow {
                name: "Москва".into(),
                center_lat: Some(55.75),
                center_lon: Some(37.62),
                ..RegionRow::default()
            },
        ];
        import_regions(&db, &rows).await.unwrap();

        let base = TwoGisConfig {
            base_url: server.uri(),
            api_key: Some("k".into()),
            retry: RetryPolicy::immediate(),
            ..TwoGisConfig::default()
        };
        let summary = discover_companies(&db, &base, &ThrottleConfig::none(), None).await.unwrap();
        assert_eq!(summary.regions_total, 3);
        assert_eq!(summary.regions_without_coords, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("Тверская область"));
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.dairy_like, 1);

        let mut conn = db.pool.acquire().await.unwrap();
        let companies = list_companies(&mut conn).await.unwrap();
        assert_eq!(companies[0].region.as_deref(), Some("Москва"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_region() {
        let db = Db::in_memory().await.unwrap();
        let err = discover_companies(&db, &TwoGisConfig::default(), &ThrottleConfig::none(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("TWO_GIS_API_KEY"));
    }
}

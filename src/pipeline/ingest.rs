use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::database_ops::http::{RetryPolicy, ThrottleConfig};
use crate::database_ops::local::LocalProvider;
use crate::database_ops::ozon::{OzonConfig, OzonProvider};
use crate::database_ops::provider::{Provider, ProviderError, RetailSource};
use crate::database_ops::retail::{insert_offer_if_new, NewOffer};
use crate::database_ops::wildberries::{WildberriesConfig, WildberriesProvider};
use crate::util::db::Db;

/// Queries used when no query file is configured.
pub const DEFAULT_QUERIES: [&str; 3] = ["молоко", "кефир", "йогурт"];

/// Per-run retail settings shared by every source.
#[derive(Debug, Clone)]
pub struct RetailSettings {
    /// Override for the Wildberries search endpoint.
    pub wildberries_url: Option<String>,
    pub ozon_url: Option<String>,
    pub default_region: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
}

impl Default for RetailSettings {
    fn default() -> Self {
        Self {
            wildberries_url: None,
            ozon_url: None,
            default_region: None,
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            throttle: ThrottleConfig::none(),
        }
    }
}

impl RetailSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            wildberries_url: None,
            ozon_url: None,
            default_region: cfg.default_region.clone(),
            timeout: cfg.http_timeout,
            retry: cfg.retry,
            throttle: cfg.throttle,
        }
    }
}

/// Pick the concrete provider for `source`. Dispatch happens here, on the
/// enum, and nowhere else.
pub fn build_retail_provider(
    source: RetailSource,
    query: &str,
    settings: &RetailSettings,
) -> Result<Box<dyn Provider>, ProviderError> {
    let region = settings.default_region.clone();
    Ok(match source {
        RetailSource::Wildberries => {
            let mut cfg = WildberriesConfig::new(query);
            if let Some(url) = &settings.wildberries_url {
                cfg.base_url = url.clone();
            }
            cfg.region = region;
            cfg.timeout = settings.timeout;
            cfg.retry = settings.retry;
            Box::new(WildberriesProvider::new(cfg)?)
        }
        RetailSource::Ozon => {
            let mut cfg = OzonConfig::new(query);
            if let Some(url) = &settings.ozon_url {
                cfg.base_url = url.clone();
            }
            cfg.region = region;
            cfg.timeout = settings.timeout;
            cfg.retry = settings.retry;
            Box::new(OzonProvider::new(cfg)?)
        }
        RetailSource::Local => Box::new(LocalProvider::demo_offers(query, region.as_deref())),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryFile {
    Wrapped { queries: Vec<String> },
    List(Vec<String>),
}

/// Load search queries from `{"queries": [...]}` or a plain JSON list.
/// Blank entries are dropped; order is kept.
pub fn load_queries(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading retail queries {}", path.display()))?;
    let parsed: QueryFile = serde_json::from_str(&raw)
        .with_context(|| format!("parsing retail queries {}", path.display()))?;
    let queries = match parsed {
        QueryFile::Wrapped { queries } | QueryFile::List(queries) => queries,
    };
    Ok(queries
        .into_iter()
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    /// Records without a name or a usable price.
    pub skipped_invalid: usize,
    pub failed_queries: Vec<String>,
}

/// Fetch every `(source, query)` pair in order and append new offers.
/// A failing pair is logged, recorded and skipped.
#[instrument(skip(db, queries, settings), fields(queries = queries.len()))]
pub async fn ingest_offers(
    db: &Db,
    sources: &[RetailSource],
    queries: &[String],
    settings: &RetailSettings,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let mut first = true;

    for &source in sources {
        for query in queries {
            if !first {
                settings.throttle.pause().await;
            }
            first = false;

            let fetched = match build_retail_provider(source, query, settings) {
                Ok(provider) => provider.fetch().await,
                Err(err) => Err(err),
            };
            let records = match fetched {
                Ok(records) => records,
                Err(err) => {
                    warn!(%source, query = %query, transient = err.is_transient(), error = %err, "retail query failed");
                    summary.failed_queries.push(format!("{source}:{query}: {err}"));
                    continue;
                }
            };

            let collected_at = Utc::now();
            let (mut inserted, mut duplicates, mut invalid) = (0usize, 0usize, 0usize);
            let mut tx = db.pool.begin().await?;
            for rec in &records {
                let Some(offer) = NewOffer::from_record(rec, settings.default_region.as_deref(), collected_at) else {
                    invalid += 1;
                    continue;
                };
                if insert_offer_if_new(&mut tx, &offer).await? {
                    inserted += 1;
                } else {
                    duplicates += 1;
                }
            }
            tx.commit().await?;

            println!(
                "Source: {source} | query: {query} | fetched: {} | inserted: {inserted} | duplicates: {duplicates} | invalid: {invalid}",
                records.len()
            );
            summary.fetched += records.len();
            summary.inserted += inserted;
            summary.duplicates += duplicates;
            summary.skipped_invalid += invalid;
        }
    }

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        failed = summary.failed_queries.len(),
        "retail ingest finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn queries_load_from_object_or_list() {
        let mut wrapped = tempfile::NamedTempFile::new().unwrap();
        write!(wrapped, r#"{{"queries": ["молоко", " ", "сыр"]}}"#).unwrap();
        assert_eq!(load_queries(wrapped.path()).unwrap(), vec!["молоко", "сыр"]);

        let mut list = tempfile::NamedTempFile::new().unwrap();
        write!(list, r#"["кефир"]"#).unwrap();
        assert_eq!(load_queries(list.path()).unwrap(), vec!["кефир"]);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, r#"{{"q": 1}}"#).unwrap();
        assert!(load_queries(bad.path()).is_err());
    }

    #[tokio::test]
    async fn local_offers_are_not_duplicated_on_rerun() {
        let db = Db::in_memory().await.unwrap();
        let settings = RetailSettings {
            default_region: Some("Москва".into()),
            ..RetailSettings::default()
        };
        let queries = vec!["молоко".to_string()];
        let first = ingest_offers(&db, &[RetailSource::Local], &queries, &settings).await.unwrap();
        let second = ingest_offers(&db, &[RetailSource::Local], &queries, &settings).await.unwrap();
        assert_eq!(first.inserted, 3);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(db.count_rows("retail_offers").await.unwrap(), 3);

        let currency: String = sqlx::query_scalar("SELECT DISTINCT price_currency FROM retail_offers")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(currency, "RUB");
    }

    #[tokio::test]
    async fn failing_query_is_recorded_and_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "молоко"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"products": [
                    {"id": 1, "name": "Молоко 3.2% 1л", "brand": "Домик", "salePriceU": 8990},
                    {"id": 2, "name": "Без цены"}
                ]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("query", "сыр"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let db = Db::in_memory().await.unwrap();
        let settings = RetailSettings {
            wildberries_url: Some(server.uri()),
            retry: RetryPolicy::immediate(),
            ..RetailSettings::default()
        };
        let queries = vec!["сыр".to_string(), "молоко".to_string()];
        let summary = ingest_offers(&db, &[RetailSource::Wildberries], &queries, &settings)
            .await
            .unwrap();
        assert_eq!(summary.failed_queries.len(), 1);
        assert!(summary.failed_queries[0].starts_with("wildberries:сыр"));
        // The priceless product never leaves the provider.
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.skipped_invalid, 0);
    }
}

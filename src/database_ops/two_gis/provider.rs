use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::database_ops::http::{build_client, send_with_retry, Fetched, RetryPolicy, ThrottleConfig};
use crate::database_ops::provider::{Provider, ProviderError, RawRecord};

pub const TWO_GIS_SOURCE: &str = "2gis";
pub const DEFAULT_BASE_URL: &str = "https://catalog.api.2gis.com/3.0/items";
/// The places API rejects larger pages.
pub const MAX_PAGE_SIZE: u32 = 10;

/// Everything one 2GIS places search needs. Built from env once, then
/// specialised per region with [`TwoGisConfig::for_region`].
#[derive(Debug, Clone)]
pub struct TwoGisConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub query: String,
    /// `"lon,lat"` as the API expects it.
    pub point: Option<String>,
    pub radius: u32,
    pub page_size: u32,
    pub max_results: usize,
    pub country: String,
    pub region: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub page_throttle: ThrottleConfig,
}

impl Default for TwoGisConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            query: "завод".to_string(),
            point: None,
            radius: 40_000,
            page_size: MAX_PAGE_SIZE,
            max_results: 50,
            country: "RU".to_string(),
            region: None,
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            page_throttle: ThrottleConfig::none(),
        }
    }
}

impl TwoGisConfig {
    /// Copy of this config centred on a region.
    pub fn for_region(&self, region_name: &str, lat: f64, lon: f64) -> Self {
        Self {
            point: Some(format!("{lon},{lat}")),
            region: Some(region_name.to_string()),
            ..self.clone()
        }
    }

    pub fn effective_page_size(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

#[derive(Debug, Clone)]
pub struct TwoGisProvider {
    cfg: TwoGisConfig,
    api_key: String,
    point: String,
    http: Client,
}

impl TwoGisProvider {
    /// Fails before any network call when the key or the search point is missing.
    pub fn new(cfg: TwoGisConfig) -> Result<Self, ProviderError> {
        let api_key = cfg
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ProviderError::MissingConfig {
                provider: TWO_GIS_SOURCE,
                key: "TWO_GIS_API_KEY",
            })?
            .to_string();
        let point = cfg
            .point
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(ProviderError::MissingConfig {
                provider: TWO_GIS_SOURCE,
                key: "point (lon,lat)",
            })?
            .to_string();
        let http = build_client(TWO_GIS_SOURCE, cfg.timeout, "market-intel/1.0")?;
        Ok(Self {
            cfg,
            api_key,
            point,
            http,
        })
    }

    fn page_request(&self, page: u32) -> reqwest::RequestBuilder {
        self.http.get(&self.cfg.base_url).query(&[
            ("key", self.api_key.clone()),
            ("q", self.cfg.query.clone()),
            ("point", self.point.clone()),
            ("radius", self.cfg.radius.to_string()),
            ("page", page.to_string()),
            ("page_size", self.cfg.effective_page_size().to_string()),
            ("type", "branch".to_string()),
        ])
    }

    fn map_item(&self, item: &Value) -> Option<RawRecord> {
        let name = item.get("name").and_then(Value::as_str)?.trim();
        if name.is_empty() {
            return None;
        }
        let mut rec = RawRecord::new(TWO_GIS_SOURCE, name);
        rec.external_id = item.get("id").and_then(value_as_string);
        rec.country = Some(self.cfg.country.clone());
        rec.region = self.cfg.region.clone();
        rec.address = item
            .get("address_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(point) = item.get("point") {
            rec.lat = point.get("lat").and_then(Value::as_f64);
            rec.lon = point.get("lon").and_then(Value::as_f64);
        }
        rec.website = first_contact(item, "website");
        rec.phone = first_contact(item, "phone");
        rec.query = Some(self.cfg.query.clone());
        Some(rec)
    }
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First contact value of `kind` across all contact groups.
fn first_contact(item: &Value, kind: &str) -> Option<String> {
    let groups = item.get("contact_groups")?.as_array()?;
    groups
        .iter()
        .filter_map(|g| g.get("contacts").and_then(Value::as_array))
        .flatten()
        .filter(|c| {
            c.get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.eq_ignore_ascii_case(kind))
        })
        .find_map(|c| match c.get("value") {
            Some(Value::Array(values)) => values.first().and_then(value_as_string),
            Some(other) => value_as_string(other),
            None => None,
        })
}

#[async_trait]
impl Provider for TwoGisProvider {
    fn name(&self) -> &'static str {
        TWO_GIS_SOURCE
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let mut out: Vec<RawRecord> = Vec::new();
        let mut page: u32 = 1;

        while out.len() < self.cfg.max_results {
            if page > 1 {
                self.cfg.page_throttle.pause().await;
            }
            let body = match send_with_retry(TWO_GIS_SOURCE, &self.cfg.retry, || {
                self.page_request(page)
            })
            .await?
            {
                Fetched::Body(body) => body,
                Fetched::NotFound => break,
                Fetched::RateLimited => {
                    warn!(page, kept = out.len(), "2gis rate limited; stopping pagination");
                    break;
                }
            };

            let data: Value = match serde_json::from_str(&body) {
                Ok(v) => v,
                Err(err) => {
                    warn!(page, error = %err, "2gis returned malformed JSON; stopping");
                    break;
                }
            };

            let meta = data.get("meta");
            let code = meta.and_then(|m| m.get("code")).and_then(Value::as_i64);
            if code == Some(404) {
                debug!(page, "2gis reports no more results");
                break;
            }
            if let Some(error) = meta.and_then(|m| m.get("error")).filter(|e| !e.is_null()) {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown 2GIS error")
                    .to_string();
                return Err(ProviderError::Api {
                    provider: TWO_GIS_SOURCE,
                    code: code.map(|c| c.to_string()).unwrap_or_else(|| "?".to_string()),
                    message,
                });
            }

            let items = data
                .get("result")
                .and_then(|r| r.get("items"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }

            for item in &items {
                if let Some(rec) = self.map_item(item) {
                    out.push(rec);
                    if out.len() >= self.cfg.max_results {
                        break;
                    }
                }
            }
            page += 1;
        }

        info!(
            region = self.cfg.region.as_deref().unwrap_or("-"),
            query = %self.cfg.query,
            fetched = out.len(),
            pages = page,
            "2gis search finished"
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(server: &MockServer) -> TwoGisConfig {
        TwoGisConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            point: Some("37.6,55.7".to_string()),
            retry: RetryPolicy::immediate(),
            ..TwoGisConfig::default()
        }
    }

    fn item(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "address_name": "ул. Ленина, 1",
            "point": {"lat": 55.7, "lon": 37.6},
            "contact_groups": [{"contacts": [
                {"type": "phone", "value": "+7 495 000-00-00"},
                {"type": "website", "value": ["https://milk.example"]}
            ]}]
        })
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let mut c = cfg(&server);
        c.api_key = Some("  ".to_string());
        let err = TwoGisProvider::new(c).unwrap_err();
        assert!(matches!(
            err,
            ProviderError::MissingConfig { key: "TWO_GIS_API_KEY", .. }
        ));
    }

    #[tokio::test]
    async fn paginates_until_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "1"))
            .and(query_param("page_size", "10"))
            .and(query_param("type", "branch"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "result": {"items": [item("1", "Молочный завод №1"), item("2", "Сырзавод")]}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "result": {"items": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = TwoGisProvider::new(cfg(&server).for_region("Москва", 55.7, 37.6)).unwrap();
        let recs = p.fetch().await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].external_id.as_deref(), Some("1"));
        assert_eq!(recs[0].region.as_deref(), Some("Москва"));
        assert_eq!(recs[0].website.as_deref(), Some("https://milk.example"));
        assert_eq!(recs[0].phone.as_deref(), Some("+7 495 000-00-00"));
        assert_eq!(recs[0].lat, Some(55.7));
    }

    #[tokio::test]
    async fn meta_not_found_stops_and_budget_caps_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 200},
                "result": {"items": [item("1", "A"), item("2", "B"), item("3", "C")]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 404, "error": {"message": "Results not found"}}
            })))
            .mount(&server)
            .await;

        let mut c = cfg(&server);
        c.max_results = 2;
        let recs = TwoGisProvider::new(c).unwrap().fetch().await.unwrap();
        assert_eq!(recs.len(), 2);

        let all = TwoGisProvider::new(cfg(&server)).unwrap().fetch().await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn api_error_is_a_hard_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "meta": {"code": 403, "error": {"message": "Invalid key"}}
            })))
            .mount(&server)
            .await;
        let err = TwoGisProvider::new(cfg(&server)).unwrap().fetch().await.unwrap_err();
        match err {
            ProviderError::Api { code, message, .. } => {
                assert_eq!(code, "403");
                assert_eq!(message, "Invalid key");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn two_consecutive_429_return_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;
        let recs = TwoGisProvider::new(cfg(&server)).unwrap().fetch().await.unwrap();
        assert!(recs.is_empty());
    }

    #[tokio::test]
    async fn malformed_body_yields_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;
        let recs = TwoGisProvider::new(cfg(&server)).unwrap().fetch().await.unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn page_size_is_capped() {
        let c = TwoGisConfig {
            page_size: 50,
            ..TwoGisConfig::default()
        };
        assert_eq!(c.effective_page_size(), 10);
    }
}

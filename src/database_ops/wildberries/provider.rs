use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::database_ops::http::{build_client, send_with_retry, Fetched, RetryPolicy};
use crate::database_ops::provider::{Provider, ProviderError, RawRecord};

pub const WILDBERRIES_SOURCE: &str = "wildberries";
pub const DEFAULT_SEARCH_URL: &str = "https://search.wb.ru/exactmatch/ru/common/v4/search";
/// Moscow delivery destination.
const DEFAULT_DEST: &str = "-1257786";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct WildberriesConfig {
    pub base_url: String,
    pub query: String,
    pub region: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl WildberriesConfig {
    pub fn new(query: &str) -> Self {
        Self {
            base_url: DEFAULT_SEARCH_URL.to_string(),
            query: query.to_string(),
            region: None,
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Option<SearchData>,
}

/// Products stay raw so one odd item cannot fail the whole page.
#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    products: Vec<Value>,
}

#[derive(Debug, Clone)]
pub struct WildberriesProvider {
    cfg: WildberriesConfig,
    http: Client,
}

impl WildberriesProvider {
    pub fn new(cfg: WildberriesConfig) -> Result<Self, ProviderError> {
        let http = build_client(WILDBERRIES_SOURCE, cfg.timeout, BROWSER_UA)?;
        Ok(Self { cfg, http })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        self.http
            .get(&self.cfg.base_url)
            .header(header::ACCEPT, "application/json")
            .header(header::ACCEPT_LANGUAGE, "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")
            .header(header::ORIGIN, "https://www.wildberries.ru")
            .query(&[
                ("query", self.cfg.query.as_str()),
                ("page", "1"),
                ("appType", "1"),
                ("curr", "rub"),
                ("dest", DEFAULT_DEST),
                ("sort", "popular"),
                ("resultset", "catalog"),
                ("spp", "0"),
                ("locale", "ru"),
            ])
    }
}

fn product_id(v: &Value) -> Option<String> {
    match v {
        Value::Number(n) => n.as_u64().map(|id| id.to_string()),
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())).then(|| s.to_string())
        }
        _ => None,
    }
}

/// Kopecks as integer, float or numeric string; only positive values count.
fn kopecks(v: Option<&Value>) -> Option<f64> {
    let k = match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (k.is_finite() && k > 0.0).then_some(k)
}

fn map_product(item: &Value, cfg: &WildberriesConfig) -> Option<RawRecord> {
    let id = product_id(item.get("id")?)?;
    let name = item.get("name").and_then(Value::as_str).map(str::trim).filter(|n| !n.is_empty())?;
    let kopecks = kopecks(item.get("salePriceU")).or_else(|| kopecks(item.get("priceU")))?;
    let mut rec = RawRecord::new(WILDBERRIES_SOURCE, name);
    rec.external_id = Some(id);
    rec.price_value = Some(kopecks / 100.0);
    rec.price_currency = Some("RUB".to_string());
    rec.region = cfg.region.clone();
    rec.query = Some(cfg.query.clone());
    if let Some(brand) = item.get("brand").and_then(Value::as_str).map(str::trim).filter(|b| !b.is_empty()) {
        rec.attributes.insert("brand".to_string(), brand.to_string());
    }
    Some(rec)
}

/// Map the search payload item by item. Products without id, name or a
/// positive price are dropped on their own. Prices arrive in kopecks.
fn parse_products(body: &str, cfg: &WildberriesConfig) -> Vec<RawRecord> {
    let parsed: SearchResponse = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(err) => {
            warn!(query = %cfg.query, error = %err, "wildberries returned malformed JSON");
            return Vec::new();
        }
    };
    let products = parsed.data.map(|d| d.products).unwrap_or_default();
    let total = products.len();
    let out: Vec<RawRecord> = products.iter().filter_map(|p| map_product(p, cfg)).collect();
    if out.len() < total {
        debug!(query = %cfg.query, dropped = total - out.len(), "wildberries items without id, name or price");
    }
    out
}

#[async_trait]
impl Provider for WildberriesProvider {
    fn name(&self) -> &'static str {
        WILDBERRIES_SOURCE
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let body = match send_with_retry(WILDBERRIES_SOURCE, &self.cfg.retry, || self.request()).await? {
            Fetched::Body(body) => body,
            Fetched::RateLimited | Fetched::NotFound => return Ok(Vec::new()),
        };
        let out = parse_products(&body, &self.cfg);
        info!(query = %self.cfg.query, offers = out.len(), "wildberries search finished");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn cfg(server: &MockServer) -> WildberriesConfig {
        WildberriesConfig {
            base_url: server.uri(),
            region: Some("Москва".to_string()),
            retry: RetryPolicy::immediate(),
            ..WildberriesConfig::new("молоко")
        }
    }

    #[tokio::test]
    async fn maps_products_and_converts_kopecks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "молоко"))
            .and(query_param("curr", "rub"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"products": [
                    {"id": 101, "name": "Молоко 3.2% 1л", "salePriceU": 8990, "priceU": 9990},
                    {"id": 102, "name": "Кефир 1%", "priceU": 7450, "brand": "Простоквашино"},
                    {"id": 103, "name": "", "priceU": 100},
                    {"id": 104, "name": "Без цены"}
                ]}
            })))
            .mount(&server)
            .await;

        let recs = WildberriesProvider::new(cfg(&server)).unwrap().fetch().await.unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].price_value, Some(89.9));
        assert_eq!(recs[0].external_id.as_deref(), Some("101"));
        assert_eq!(recs[1].price_value, Some(74.5));
        assert_eq!(recs[1].attribute("brand"), Some("Простоквашино"));
        assert_eq!(recs[1].region.as_deref(), Some("Москва"));
    }

    #[tokio::test]
    async fn two_429_in_a_row_return_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;
        let recs = WildberriesProvider::new(cfg(&server)).unwrap().fetch().await.unwrap();
        assert!(recs.is_empty());
    }

    #[test]
    fn odd_items_are_dropped_one_by_one() {
        let c = WildberriesConfig::new("молоко");
        let body = json!({"data": {"products": [
            {"id": 101, "name": "Молоко 3.2% 1л", "salePriceU": 8990},
            {"id": "102x", "name": "Кефир 1%", "priceU": 7450},
            {"id": 103, "name": "Сыр", "priceU": 7450.0},
            {"id": "104", "name": "Творог", "salePriceU": "19900"},
            {"id": 105, "name": {"ru": "Сметана"}, "priceU": 100}
        ]}})
        .to_string();
        let recs = parse_products(&body, &c);
        let ids: Vec<_> = recs.iter().filter_map(|r| r.external_id.as_deref()).collect();
        assert_eq!(ids, vec!["101", "103", "104"]);
        assert_eq!(recs[1].price_value, Some(74.5));
        assert_eq!(recs[2].price_value, Some(199.0));
    }

    #[test]
    fn unexpected_shape_is_empty() {
        let c = WildberriesConfig::new("сыр");
        assert!(parse_products(r#"{"data": null}"#, &c).is_empty());
        assert!(parse_products("not json", &c).is_empty());
    }
}

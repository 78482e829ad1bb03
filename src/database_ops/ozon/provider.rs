use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use crate::database_ops::http::{build_client, send_with_retry, Fetched, RetryPolicy};
use crate::database_ops::provider::{Provider, ProviderError, RawRecord};

pub const OZON_SOURCE: &str = "ozon";
pub const DEFAULT_SEARCH_URL: &str = "https://www.ozon.ru/api/composer-api.bx/page/json/v2";
const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct OzonConfig {
    pub base_url: String,
    pub query: String,
    pub region: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl OzonConfig {
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

#[derive(Debug, Clone)]
pub struct OzonProvider {
    cfg: OzonConfig,
    http: Client,
}

impl OzonProvider {
    pub fn new(cfg: OzonConfig) -> Result<Self, ProviderError> {
        let http = build_client(OZON_SOURCE, cfg.timeout, BROWSER_UA)?;
        Ok(Self { cfg, http })
    }

    fn request(&self) -> reqwest::RequestBuilder {
        let page_url = format!("/search?text={}", self.cfg.query);
        self.http
            .get(&self.cfg.base_url)
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header(header::ACCEPT_LANGUAGE, "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7")
            .header(header::ORIGIN, "https://www.ozon.ru")
            .header("X-O3-App-Name", "dweb_browser")
            .query(&[("url", page_url)])
    }
}

/// Numbers, numeric strings, and display strings such as `"1 299 ₽"`.
fn number_from(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
                .collect();
            cleaned.replace(',', ".").parse::<f64>().ok()
        }
        _ => None,
    }
}

fn non_null<'a>(item: &'a Value, key: &str) -> Option<&'a Value> {
    item.get(key).filter(|v| !v.is_null())
}

fn extract_price(item: &Value) -> Option<f64> {
    let block = non_null(item, "price")
        .or_else(|| non_null(item, "finalPrice"))
        .or_else(|| non_null(item, "priceValue"));
    let from_block = match block {
        Some(obj @ Value::Object(_)) => ["price", "currentPrice", "value", "priceValue"]
            .iter()
            .find_map(|k| non_null(obj, k))
            .and_then(number_from),
        Some(other) => number_from(other),
        None => None,
    };
    from_block.or_else(|| {
        let tracking = item.get("cellTrackingInfo")?;
        non_null(tracking, "price")
            .or_else(|| non_null(tracking, "finalPrice"))
            .and_then(number_from)
    })
}

fn extract_name(item: &Value) -> Option<String> {
    let tracking = item.get("cellTrackingInfo");
    [
        item.get("name"),
        item.get("title"),
        tracking.and_then(|t| t.get("product_title")),
        tracking.and_then(|t| t.get("title")),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .map(str::trim)
    .find(|s| !s.is_empty())
    .map(str::to_string)
}

/// `widgetStates` values are JSON documents encoded as strings; any of them
/// may carry a product list under `items`, `itemsV2` or `products`.
fn parse_offers(body: &str, cfg: &OzonConfig) -> Vec<RawRecord> {
    let Ok(payload) = serde_json::from_str::<Value>(body) else {
        debug!(query = %cfg.query, "ozon returned malformed JSON");
        return Vec::new();
    };
    let Some(states) = payload.get("widgetStates").and_then(Value::as_object) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for raw in states.values() {
        let Some(text) = raw.as_str().map(str::trim).filter(|s| s.starts_with('{')) else {
            continue;
        };
        let Ok(widget) = serde_json::from_str::<Value>(text) else {
            continue;
        };
        let candidates = ["items", "itemsV2", "products"]
            .iter()
            .find_map(|k| widget.get(k).and_then(Value::as_array));
        for item in candidates.into_iter().flatten() {
            let (Some(price), Some(name)) = (extract_price(item), extract_name(item)) else {
                continue;
            };
            let mut rec = RawRecord::new(OZON_SOURCE, name);
            rec.price_value = Some(price);
            rec.price_currency = Some("RUB".to_string());
            rec.region = cfg.region.clone();
            rec.query = Some(cfg.query.clone());
            rec.external_id = item
                .get("sku")
                .or_else(|| item.get("id"))
                .and_then(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                });
            out.push(rec);
        }
    }
    out
}

#[async_trait]
impl Provider for OzonProvider {
    fn name(&self) -> &'static str {
        OZON_SOURCE
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let body = match send_with_retry(OZON_SOURCE, &self.cfg.retry, || self.request()).await? {
            Fetched::Body(body) => body,
            Fetched::RateLimited | Fetched::NotFound => return Ok(Vec::new()),
        };
        let out = parse_offers(&body, &self.cfg);
        info!(query = %self.cfg.query, offers = out.len(), "ozon search finished");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn widget_payload() -> Value {
        let search = json!({"items": [
            {"name": "Сыр «Ламбер» 50% 230 г", "price": {"price": "229 ₽"}, "sku": 555},
            {"title": "Молоко 2.5% 900 мл", "finalPrice": 79.0},
            {"cellTrackingInfo": {"product_title": "Кефир 3.2%", "price": 65}},
            {"name": "Без цены"}
        ]});
        json!({
            "widgetStates": {
                "searchResultsV2-1": search.to_string(),
                "header-2": "not json",
                "banner-3": json!({"text": "promo"}).to_string()
            }
        })
    }

    #[test]
    fn parses_widget_states() {
        let cfg = OzonConfig::new("сыр");
        let recs = parse_offers(&widget_payload().to_string(), &cfg);
        assert_eq!(recs.len(), 3);
        assert_eq!(recs[0].name, "Сыр «Ламбер» 50% 230 г");
        assert_eq!(recs[0].price_value, Some(229.0));
        assert_eq!(recs[0].external_id.as_deref(), Some("555"));
        assert_eq!(recs[1].price_value, Some(79.0));
        assert_eq!(recs[2].name, "Кефир 3.2%");
        assert_eq!(recs[2].price_value, Some(65.0));
    }

    #[test]
    fn missing_widget_states_is_empty() {
        let cfg = OzonConfig::new("сыр");
        assert!(parse_offers(r#"{"layout": []}"#, &cfg).is_empty());
        assert!(parse_offers("", &cfg).is_empty());
    }

    #[tokio::test]
    async fn sends_search_path_as_url_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("url", "/search?text=сыр"))
            .respond_with(ResponseTemplate::new(200).set_body_json(widget_payload()))
            .expect(1)
            .mount(&server)
            .await;
        let cfg = OzonConfig {
            base_url: server.uri(),
            retry: RetryPolicy::immediate(),
            ..OzonConfig::new("сыр")
        };
        let recs = OzonProvider::new(cfg).unwrap().fetch().await.unwrap();
        assert_eq!(recs.len(), 3);
    }

    #[tokio::test]
    async fn second_429_returns_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(2)
            .mount(&server)
            .await;
        let cfg = OzonConfig {
            base_url: server.uri(),
            retry: RetryPolicy::immediate(),
            ..OzonConfig::new("сыр")
        };
        assert!(OzonProvider::new(cfg).unwrap().fetch().await.unwrap().is_empty());
    }
}

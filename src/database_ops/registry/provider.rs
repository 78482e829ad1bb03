use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::database_ops::http::{build_client, send_with_retry, Fetched, RetryPolicy};
use crate::database_ops::provider::{Provider, ProviderError, RawRecord};

pub const REGISTRY_SOURCE: &str = "rusprofile";
pub const DEFAULT_BASE_URL: &str = "https://www.rusprofile.ru";

/// Long legal-form names and their abbreviations, longest first.
const LEGAL_FORMS: [(&str, &str); 8] = [
    ("общество с ограниченной ответственностью", "ООО"),
    ("публичное акционерное общество", "ПАО"),
    ("открытое акционерное общество", "ОАО"),
    ("закрытое акционерное общество", "ЗАО"),
    ("непубличное акционерное общество", "АО"),
    ("акционерное общество", "АО"),
    ("индивидуальный предприниматель", "ИП"),
    ("сельскохозяйственный производственный кооператив", "СПК"),
];

const SHORT_FORMS: [&str; 6] = ["ООО", "ПАО", "ОАО", "ЗАО", "АО", "ИП"];

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub base_url: String,
    pub company_name: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl RegistryConfig {
    pub fn new(company_name: &str) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            company_name: company_name.to_string(),
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

/// Best-effort registry lookup: one search page, scraped for the first
/// company card. Results are advisory; nothing here is verified.
#[derive(Debug, Clone)]
pub struct RegistryProvider {
    cfg: RegistryConfig,
    http: Client,
}

impl RegistryProvider {
    pub fn new(cfg: RegistryConfig) -> Result<Self, ProviderError> {
        let http = build_client(REGISTRY_SOURCE, cfg.timeout, "Mozilla/5.0 (market-intel)")?;
        Ok(Self { cfg, http })
    }

    fn search_url(&self) -> String {
        format!("{}/search", self.cfg.base_url.trim_end_matches('/'))
    }
}

struct Selectors {
    legal_name: Selector,
    tax_id: Selector,
    address: Selector,
    status: Selector,
    heading: Selector,
    body: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let s = |css: &str| Selector::parse(css).expect("valid selector literal");
        Selectors {
            legal_name: s(r#"[itemprop="legalName"], [itemprop="name"]"#),
            tax_id: s(r#"[itemprop="taxID"]"#),
            address: s(r#"[itemprop="address"]"#),
            status: s(".company-header__status, .company-status, .warning-text"),
            heading: s("h1"),
            body: s("body"),
        }
    })
}

fn ogrn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ОГРН(?:ИП)?\s*:?\s*(\d{13,15})").expect("valid regex literal"))
}

fn inn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"ИНН\s*:?\s*(\d{10,12})").expect("valid regex literal"))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .map(|el| collapse(&el.text().collect::<String>()))
        .find(|t| !t.is_empty())
}

/// Abbreviated legal form from a legal name (`ООО «Ромашка»` → `ООО`).
pub fn legal_form_of(legal_name: &str) -> Option<String> {
    let lower = legal_name.to_lowercase();
    if let Some((_, short)) = LEGAL_FORMS.iter().find(|(long, _)| lower.starts_with(long)) {
        return Some(short.to_string());
    }
    let first = legal_name
        .split(|c: char| c.is_whitespace() || c == '"' || c == '«')
        .next()
        .unwrap_or("");
    SHORT_FORMS
        .iter()
        .find(|&&f| first == f)
        .map(|f| f.to_string())
}

/// Extract the first company card from a registry search/result page.
/// Search URL with the company name percent-encoded, as recorded on the card.
fn source_url_for(search_url: &str, company: &str) -> String {
    url::Url::parse_with_params(search_url, &[("query", company), ("type", "ul")])
        .map(|u| u.to_string())
        .unwrap_or_else(|_| search_url.to_string())
}

pub fn parse_registry_page(html: &str, source_url: &str) -> Option<RawRecord> {
    let doc = Html::parse_document(html);
    let sel = selectors();
    let legal_name = first_text(&doc, &sel.legal_name).or_else(|| first_text(&doc, &sel.heading))?;
    let page_text = first_text(&doc, &sel.body).unwrap_or_default();

    let inn = first_text(&doc, &sel.tax_id)
        .map(|t| t.chars().filter(char::is_ascii_digit).collect::<String>())
        .filter(|t| !t.is_empty())
        .or_else(|| inn_re().captures(&page_text).map(|c| c[1].to_string()));
    let ogrn = ogrn_re().captures(&page_text).map(|c| c[1].to_string());

    let mut rec = RawRecord::new(REGISTRY_SOURCE, legal_name.clone());
    rec.address = first_text(&doc, &sel.address);
    rec.country = Some("RU".to_string());
    rec.attributes.insert("source_url".to_string(), source_url.to_string());
    if let Some(form) = legal_form_of(&legal_name) {
        rec.attributes.insert("legal_form".to_string(), form);
    }
    if let Some(inn) = inn {
        rec.attributes.insert("inn".to_string(), inn);
    }
    if let Some(ogrn) = ogrn {
        rec.attributes.insert("ogrn".to_string(), ogrn);
    }
    if let Some(status) = first_text(&doc, &sel.status) {
        rec.attributes.insert("status".to_string(), status);
    }
    Some(rec)
}

#[async_trait]
impl Provider for RegistryProvider {
    fn name(&self) -> &'static str {
        REGISTRY_SOURCE
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, ProviderError> {
        let url = self.search_url();
        let body = match send_with_retry(REGISTRY_SOURCE, &self.cfg.retry, || {
            self.http
                .get(&url)
                .query(&[("query", self.cfg.company_name.as_str()), ("type", "ul")])
        })
        .await?
        {
            Fetched::Body(body) => body,
            Fetched::RateLimited | Fetched::NotFound => return Ok(Vec::new()),
        };
        let source_url = source_url_for(&url, &self.cfg.company_name);
        match parse_registry_page(&body, &source_url) {
            Some(mut rec) => {
                rec.query = Some(self.cfg.company_name.clone());
                info!(company = %self.cfg.company_name, legal_name = %rec.name, "registry card found");
                Ok(vec![rec])
            }
            None => {
                debug!(company = %self.cfg.company_name, "no registry card on page");
                Ok(Vec::new())
            }
        }
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Common record shape every provider maps its raw payload into.
///
/// Company sources fill the identity/location fields; retail sources fill
/// `name` + price fields. `attributes` carries advisory source-specific
/// extras (e.g. registry INN/OGRN) that downstream code may ignore.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source: String,
    pub name: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub external_id: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub price_value: Option<f64>,
    pub price_currency: Option<String>,
    pub query: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new(source: &str, name: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider}: missing configuration {key}")]
    MissingConfig { provider: &'static str, key: &'static str },
    #[error("{provider}: server error {status}: {body}")]
    Server {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider}: unexpected HTTP status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider}: API error ({code}): {message}")]
    Api {
        provider: &'static str,
        code: String,
        message: String,
    },
    #[error("{provider}: transport error: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl ProviderError {
    /// Connect/5xx failures that survived the in-client retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Transport { .. })
    }
}

/// One capability: fetch a batch of records. Everything a call needs travels
/// in the provider's constructor config.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn fetch(&self) -> Result<Vec<RawRecord>, ProviderError>;
}

/// Retail marketplaces selectable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetailSource {
    Wildberries,
    Ozon,
    Local,
}

impl RetailSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wildberries => "wildberries",
            Self::Ozon => "ozon",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for RetailSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RetailSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wildberries" | "wb" => Ok(Self::Wildberries),
            "ozon" => Ok(Self::Ozon),
            "local" => Ok(Self::Local),
            other => Err(anyhow::anyhow!("unknown retail source {other}")),
        }
    }
}

/// Trim a response body for inclusion in errors and logs.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

use anyhow::Result;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::PipelineConfig;
use crate::database_ops::companies::list_companies;
use crate::database_ops::http::{RetryPolicy, ThrottleConfig};
use crate::database_ops::provider::Provider;
use crate::database_ops::registry::{
    upsert_registry_entry, RegistryConfig, RegistryEntry, RegistryProvider, REGISTRY_SOURCE,
};
use crate::database_ops::UpsertOutcome;
use crate::util::db::Db;

#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Override for the registry site root.
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
    /// Look up at most this many companies.
    pub limit: Option<usize>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            throttle: ThrottleConfig::none(),
            limit: None,
        }
    }
}

impl RegistrySettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            timeout: cfg.http_timeout,
            retry: cfg.retry,
            throttle: cfg.throttle,
            ..Self::default()
        }
    }

    fn config_for(&self, company_name: &str) -> RegistryConfig {
        let mut cfg = RegistryConfig::new(company_name);
        if let Some(url) = &self.base_url {
            cfg.base_url = url.clone();
        }
        cfg.timeout = self.timeout;
        cfg.retry = self.retry;
        cfg
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
    pub companies: usize,
    pub found: usize,
    pub inserted: usize,
    pub updated: usize,
    pub not_found: usize,
    pub errors: Vec<String>,
}

/// Look every discovered company up in the public registry and store the
/// first card found. Advisory data; lookups that fail are logged and skipped.
#[instrument(skip(db, settings))]
pub async fn enrich_registry(db: &Db, settings: &RegistrySettings) -> Result<EnrichSummary> {
    let mut companies = {
        let mut conn = db.pool.acquire().await?;
        list_companies(&mut conn).await?
    };
    if let Some(limit) = settings.limit {
        companies.truncate(limit);
    }

    let mut summary = EnrichSummary::default();
    for (i, company) in companies.iter().enumerate() {
        summary.companies += 1;
        if i > 0 {
            settings.throttle.pause().await;
        }
        let fetched = match RegistryProvider::new(settings.config_for(&company.name)) {
            Ok(provider) => provider.fetch().await,
            Err(err) => Err(err),
        };
        let records = match fetched {
            Ok(records) => records,
            Err(err) => {
                warn!(company = %company.name, transient = err.is_transient(), error = %err, "registry lookup failed");
                summary.errors.push(format!("{}: {err}", company.name));
                continue;
            }
        };
        let Some(rec) = records.first() else {
            summary.not_found += 1;
            continue;
        };
        summary.found += 1;

        let entry = RegistryEntry::from_record(rec);
        let mut conn = db.pool.acquire().await?;
        match upsert_registry_entry(&mut conn, company.id, REGISTRY_SOURCE, &entry).await? {
            UpsertOutcome::Inserted => summary.inserted += 1,
            _ => summary.updated += 1,
        }
    }

    info!(
        companies = summary.companies,
        found = summary.found,
        not_found = summary.not_found,
        errors = summary.errors.len(),
        "registry enrichment finished"
    );
    Ok(summary)
}

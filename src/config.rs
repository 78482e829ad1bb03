//! Typed configuration assembled once from the environment and passed down
//! explicitly. Providers never read env themselves.

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::database_ops::http::{RetryPolicy, ThrottleConfig};
use crate::database_ops::two_gis::provider::{TwoGisConfig, DEFAULT_BASE_URL};
use crate::util::env::{db_url, env_opt, env_parse};

pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const SNAPSHOT_CSV_NAME: &str = "market_snapshot.csv";
pub const PAYLOAD_JSON_NAME: &str = "market_payload.json";

/// Keys echoed (redacted) by the preflight snapshot.
pub const LOGGED_KEYS: [&str; 12] = [
    "DATABASE_URL",
    "MARKET_DB_PATH",
    "REGIONS_CSV",
    "REGION_CODES_CSV",
    "RETAIL_QUERIES_JSON",
    "EXPORT_DIR",
    "TWO_GIS_API_KEY",
    "TWO_GIS_BASE_URL",
    "TWO_GIS_QUERY",
    "TWO_GIS_RADIUS",
    "TWO_GIS_MAX_RESULTS",
    "HTTP_TIMEOUT_SECS",
];

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub db_url: String,
    pub regions_csv: Option<PathBuf>,
    pub region_codes_csv: Option<PathBuf>,
    pub retail_queries_json: Option<PathBuf>,
    pub export_dir: PathBuf,
    pub default_region: Option<String>,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub throttle: ThrottleConfig,
    pub two_gis: TwoGisConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let retry = RetryPolicy {
            rate_limit_backoff: Duration::from_millis(env_parse("RETRY_RATE_LIMIT_MS", 2_000u64)),
            server_error_backoff: Duration::from_millis(env_parse("RETRY_SERVER_ERROR_MS", 3_000u64)),
            jitter: Duration::from_millis(env_parse("RETRY_JITTER_MS", 1_000u64)),
        };
        let throttle = ThrottleConfig {
            base: Duration::from_millis(env_parse("THROTTLE_MS", 800u64)),
            jitter: Duration::from_millis(env_parse("THROTTLE_JITTER_MS", 700u64)),
        };
        let http_timeout = Duration::from_secs(env_parse("HTTP_TIMEOUT_SECS", 20u64));
        let defaults = TwoGisConfig::default();
        let two_gis = TwoGisConfig {
            base_url: env_opt("TWO_GIS_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: env_opt("TWO_GIS_API_KEY"),
            query: env_opt("TWO_GIS_QUERY").unwrap_or(defaults.query),
            point: env_opt("TWO_GIS_POINT"),
            radius: env_parse("TWO_GIS_RADIUS", defaults.radius),
            page_size: env_parse("TWO_GIS_PAGE_SIZE", defaults.page_size),
            max_results: env_parse("TWO_GIS_MAX_RESULTS", defaults.max_results),
            country: env_opt("TWO_GIS_COUNTRY").unwrap_or(defaults.country),
            region: env_opt("TWO_GIS_REGION"),
            timeout: Duration::from_secs(env_parse("TWO_GIS_TIMEOUT", defaults.timeout.as_secs())),
            retry,
            page_throttle: throttle,
        };
        Ok(Self {
            db_url: db_url()?,
            regions_csv: env_opt("REGIONS_CSV").map(PathBuf::from),
            region_codes_csv: env_opt("REGION_CODES_CSV").map(PathBuf::from),
            retail_queries_json: env_opt("RETAIL_QUERIES_JSON").map(PathBuf::from),
            export_dir: env_opt("EXPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_DIR)),
            default_region: env_opt("DEFAULT_REGION"),
            http_timeout,
            retry,
            throttle,
            two_gis,
        })
    }

    pub fn snapshot_csv_path(&self) -> PathBuf {
        self.export_dir.join(SNAPSHOT_CSV_NAME)
    }

    pub fn payload_json_path(&self) -> PathBuf {
        self.export_dir.join(PAYLOAD_JSON_NAME)
    }
}

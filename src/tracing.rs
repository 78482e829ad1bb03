use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Default filter for the `mi` binary when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "market_intel=info,mi=info,sqlx=warn,reqwest=warn";

/// Install the global fmt subscriber. `RUST_LOG` overrides `default_filter`.
///
/// Logs go to stderr so stage summaries printed on stdout stay machine-readable.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}

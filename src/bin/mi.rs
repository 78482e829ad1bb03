use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use market_intel::config::LOGGED_KEYS;
use market_intel::database_ops::RetailSource;
use market_intel::tracing::{init_tracing, DEFAULT_FILTER};
use market_intel::util::env;

#[derive(Parser, Debug)]
#[command(name = "mi", version, about = "Dairy market intelligence pipeline")]
struct Cli {
    /// Override DATABASE_URL / MARKET_DB_PATH
    #[arg(long, global = true)]
    db_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Load the region reference CSV
    ImportRegions {
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Discover producers per region through 2GIS
    DiscoverCompanies {
        /// Only this region
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Collect retail offers for search queries
    IngestOffers {
        /// Retail sources (default: wildberries,ozon)
        #[arg(long, value_enum, value_delimiter = ',')]
        source: Vec<RetailSource>,
        /// Search queries (default: query file or built-ins)
        #[arg(long, value_delimiter = ',')]
        query: Vec<String>,
        #[arg(long)]
        queries_file: Option<PathBuf>,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        max_queries: Option<usize>,
    },
    /// Parse stored offer names into structured attributes
    ParseProducts,
    /// Match parsed brands to discovered companies
    MatchBrands,
    /// Look discovered companies up in the public registry
    EnrichRegistry {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Rebuild the market snapshot table
    BuildSnapshot {
        /// `code,name` region map
        #[arg(long)]
        region_codes: Option<PathBuf>,
    },
    /// Write the snapshot CSV and analytics payload
    Export {
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Run every stage in order
    RunAll {
        #[arg(long, value_enum, value_delimiter = ',')]
        source: Vec<RetailSource>,
        #[arg(long, value_delimiter = ',')]
        query: Vec<String>,
        #[arg(long, default_value_t = false)]
        skip_discovery: bool,
        #[arg(long, default_value_t = false)]
        enrich_registry: bool,
    },
    /// Print row counts for every table
    DbCounts,
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing(DEFAULT_FILTER)?;
    let cli = Cli::parse();
    env::preflight_check("mi", &[], &LOGGED_KEYS)?;
    let database_url = cli.db_url;

    match cli.command {
        Commands::ImportRegions { csv } => {
            use market_intel::cli::import_regions::{run, ImportRegionsConfig};
            run(ImportRegionsConfig { database_url, csv }).await?;
        }
        Commands::DiscoverCompanies {
            region,
            query,
            max_results,
        } => {
            use market_intel::cli::discover_companies::{run, DiscoverConfig};
            run(DiscoverConfig {
                database_url,
                region,
                query,
                max_results,
            })
            .await?;
        }
        Commands::IngestOffers {
            source,
            query,
            queries_file,
            region,
            max_queries,
        } => {
            use market_intel::cli::ingest_offers::{run, IngestConfig};
            run(IngestConfig {
                database_url,
                sources: source,
                queries: query,
                queries_file,
                region,
                max_queries,
            })
            .await?;
        }
        Commands::ParseProducts => {
            use market_intel::cli::parse_products::{run, ParseConfig};
            run(ParseConfig { database_url }).await?;
        }
        Commands::MatchBrands => {
            use market_intel::cli::match_brands::{run, MatchConfig};
            run(MatchConfig { database_url }).await?;
        }
        Commands::EnrichRegistry { limit } => {
            use market_intel::cli::enrich_registry::{run, EnrichConfig};
            run(EnrichConfig { database_url, limit }).await?;
        }
        Commands::BuildSnapshot { region_codes } => {
            use market_intel::cli::build_snapshot::{run, SnapshotConfig};
            run(SnapshotConfig {
                database_url,
                region_codes,
            })
            .await?;
        }
        Commands::Export { out_dir } => {
            use market_intel::cli::export::{run, ExportConfig};
            run(ExportConfig { database_url, out_dir }).await?;
        }
        Commands::RunAll {
            source,
            query,
            skip_discovery,
            enrich_registry,
        } => {
            use market_intel::cli::run_all::{run, RunAllConfig};
            run(RunAllConfig {
                database_url,
                sources: source,
                queries: query,
                skip_discovery,
                enrich_registry,
            })
            .await?;
        }
        Commands::DbCounts => {
            use market_intel::cli::db_counts::{run, DbCountsConfig};
            run(DbCountsConfig { database_url }).await?;
        }
    }
    Ok(())
}

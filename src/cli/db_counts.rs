use anyhow::Result;

#[derive(Debug, Clone, Default)]
pub struct DbCountsConfig {
    /// Optional override for the database URL.
    pub database_url: Option<String>,
}

const TABLES: [&str; 7] = [
    "regions",
    "companies_discovered",
    "retail_offers",
    "retail_products_parsed",
    "brand_company_matches",
    "company_registry",
    "market_snapshot",
];

pub async fn run(cfg: DbCountsConfig) -> Result<()> {
    let (_, db) = super::open(cfg.database_url).await?;
    let mut out = String::new();
    for table in TABLES {
        let n = db.count_rows(table).await?;
        out.push_str(&format!("{table:<24} {n}\n"));
    }
    print!("{out}");
    Ok(())
}

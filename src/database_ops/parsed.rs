use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use super::retail::RetailOffer;
use crate::parsing::ParsedName;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ParsedProduct {
    pub id: i64,
    pub retail_offer_id: i64,
    pub raw_name: String,
    pub brand: Option<String>,
    pub product_type: Option<String>,
    pub flavor: Option<String>,
    pub fat_percent: Option<f64>,
    pub package_type: Option<String>,
    pub weight_g: Option<i64>,
    pub volume_ml: Option<i64>,
    pub region: Option<String>,
    pub source: Option<String>,
    pub parsed_at: DateTime<Utc>,
}

/// Write the parse result for `offer` unless one already exists. Parsed rows
/// are never updated.
pub async fn insert_parsed_product(
    conn: &mut SqliteConnection,
    offer: &RetailOffer,
    parsed: &ParsedName,
) -> Result<bool> {
    let exists: Option<i64> =
        sqlx::query_scalar("SELECT id FROM retail_products_parsed WHERE retail_offer_id = ?")
            .bind(offer.id)
            .fetch_optional(&mut *conn)
            .await?;
    if exists.is_some() {
        return Ok(false);
    }
    sqlx::query(
        "INSERT INTO retail_products_parsed (retail_offer_id, raw_name, brand, product_type, flavor, fat_percent,
            package_type, weight_g, volume_ml, region, source, parsed_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(offer.id)
    .bind(&parsed.raw_name)
    .bind(&parsed.brand)
    .bind(&parsed.product_type)
    .bind(&parsed.flavor)
    .bind(parsed.fat_percent)
    .bind(&parsed.package_type)
    .bind(parsed.weight_g)
    .bind(parsed.volume_ml)
    .bind(&offer.region)
    .bind(&offer.source)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(true)
}

/// Distinct non-blank `(brand, region)` pairs, sorted for deterministic matching.
pub async fn distinct_brand_regions(conn: &mut SqliteConnection) -> Result<Vec<(String, Option<String>)>> {
    let rows = sqlx::query_as(
        "SELECT DISTINCT brand, region FROM retail_products_parsed
         WHERE brand IS NOT NULL AND TRIM(brand) <> ''
         ORDER BY brand, region",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Parsed product joined with its offer, as the snapshot builder consumes it.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ParsedOfferRow {
    pub parsed_id: i64,
    pub product_name: String,
    pub brand: Option<String>,
    pub product_type: Option<String>,
    pub price_value: f64,
    pub price_currency: String,
    pub region: Option<String>,
    pub collected_at: DateTime<Utc>,
}

pub async fn parsed_offer_rows(conn: &mut SqliteConnection) -> Result<Vec<ParsedOfferRow>> {
    let rows = sqlx::query_as(
        "SELECT p.id AS parsed_id, o.product_name, p.brand, p.product_type, o.price_value, o.price_currency,
                COALESCE(o.region, p.region) AS region, o.collected_at
         FROM retail_products_parsed p
         JOIN retail_offers o ON o.id = p.retail_offer_id
         ORDER BY p.id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

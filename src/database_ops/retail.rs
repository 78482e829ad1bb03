use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

use super::provider::RawRecord;
use crate::normalization::{normalize_currency, normalize_region, DEFAULT_CURRENCY};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RetailOffer {
    pub id: i64,
    pub company_id: Option<i64>,
    pub source: String,
    pub source_item_id: Option<String>,
    pub region: Option<String>,
    pub product_name: String,
    pub price_value: f64,
    pub price_currency: String,
    pub collected_at: DateTime<Utc>,
}

/// Offer ready to be written. Built only from records that carry both a
/// name and a price.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOffer {
    pub company_id: Option<i64>,
    pub source: String,
    pub source_item_id: Option<String>,
    pub region: Option<String>,
    pub product_name: String,
    pub price_value: f64,
    pub price_currency: String,
    pub collected_at: DateTime<Utc>,
}

impl NewOffer {
    pub fn from_record(rec: &RawRecord, default_region: Option<&str>, collected_at: DateTime<Utc>) -> Option<Self> {
        let product_name = rec.name.trim();
        if product_name.is_empty() {
            return None;
        }
        let price = rec.price_value.filter(|p| p.is_finite() && *p >= 0.0)?;
        let (_, currency) = normalize_currency(Some(price), rec.price_currency.as_deref());
        let price_currency = currency
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let region = normalize_region(rec.region.as_deref()).or_else(|| normalize_region(default_region));
        Some(Self {
            company_id: None,
            source: rec.source.clone(),
            source_item_id: rec.external_id.clone(),
            region,
            product_name: product_name.to_string(),
            price_value: price,
            price_currency,
            collected_at,
        })
    }
}

/// Append `offer` unless an offer with the same `(source, region,
/// product_name, price_value)` is already stored. Returns whether a row was
/// written.
pub async fn insert_offer_if_new(conn: &mut SqliteConnection, offer: &NewOffer) -> Result<bool> {
    let exists: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM retail_offers
         WHERE source = ? AND region IS ? AND product_name = ? AND price_value = ?
         LIMIT 1",
    )
    .bind(&offer.source)
    .bind(&offer.region)
    .bind(&offer.product_name)
    .bind(offer.price_value)
    .fetch_optional(&mut *conn)
    .await?;
    if exists.is_some() {
        return Ok(false);
    }

    sqlx::query(
        "INSERT INTO retail_offers (company_id, source, source_item_id, region, product_name, price_value,
            price_currency, collected_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(offer.company_id)
    .bind(&offer.source)
    .bind(&offer.source_item_id)
    .bind(&offer.region)
    .bind(&offer.product_name)
    .bind(offer.price_value)
    .bind(&offer.price_currency)
    .bind(offer.collected_at)
    .execute(&mut *conn)
    .await?;
    Ok(true)
}

/// Offers with no parsed product yet, oldest first.
pub async fn unparsed_offers(conn: &mut SqliteConnection) -> Result<Vec<RetailOffer>> {
    let rows = sqlx::query_as(
        "SELECT o.* FROM retail_offers o
         LEFT JOIN retail_products_parsed p ON p.retail_offer_id = o.id
         WHERE p.id IS NULL
         ORDER BY o.id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

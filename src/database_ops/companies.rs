use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::debug;

use super::provider::RawRecord;
use super::UpsertOutcome;
use crate::normalization::{canonical_company_name, normalize_region};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct DiscoveredCompany {
    pub id: i64,
    pub source: String,
    pub external_id: String,
    pub name: String,
    pub canonical_name: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub address: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub query: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

fn non_empty(v: Option<&str>) -> Option<String> {
    v.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Keep `current` unless a non-empty `incoming` differs from it.
fn merge<T: PartialEq + Clone>(incoming: Option<T>, current: &Option<T>, changed: &mut bool) -> Option<T> {
    match incoming {
        Some(v) if current.as_ref() != Some(&v) => {
            *changed = true;
            Some(v)
        }
        _ => current.clone(),
    }
}

/// Upsert by `(source, external_id)`. Non-empty incoming fields overwrite;
/// empty or missing ones never erase what is stored. Records without an
/// external id are skipped.
pub async fn upsert_discovered_company(conn: &mut SqliteConnection, rec: &RawRecord) -> Result<UpsertOutcome> {
    let Some(external_id) = non_empty(rec.external_id.as_deref()) else {
        debug!(source = %rec.source, name = %rec.name, "skipping company without external id");
        return Ok(UpsertOutcome::Skipped);
    };
    let name = non_empty(Some(&rec.name));
    let canonical = name.as_deref().map(canonical_company_name).filter(|c| !c.is_empty());
    let region = normalize_region(rec.region.as_deref());
    let now = Utc::now();

    let existing: Option<DiscoveredCompany> =
        sqlx::query_as("SELECT * FROM companies_discovered WHERE source = ? AND external_id = ?")
            .bind(&rec.source)
            .bind(&external_id)
            .fetch_optional(&mut *conn)
            .await?;

    let Some(cur) = existing else {
        let Some(name) = name else {
            debug!(source = %rec.source, external_id, "skipping new company without a name");
            return Ok(UpsertOutcome::Skipped);
        };
        sqlx::query(
            "INSERT INTO companies_discovered (source, external_id, name, canonical_name, country, region,
                address, lat, lon, website, phone, query, discovered_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&rec.source)
        .bind(&external_id)
        .bind(&name)
        .bind(&canonical)
        .bind(non_empty(rec.country.as_deref()).unwrap_or_else(|| "RU".to_string()))
        .bind(&region)
        .bind(non_empty(rec.address.as_deref()))
        .bind(rec.lat)
        .bind(rec.lon)
        .bind(non_empty(rec.website.as_deref()))
        .bind(non_empty(rec.phone.as_deref()))
        .bind(non_empty(rec.query.as_deref()))
        .bind(now)
        .execute(&mut *conn)
        .await?;
        return Ok(UpsertOutcome::Inserted);
    };

    let mut changed = false;
    let new_name = merge(name, &Some(cur.name.clone()), &mut changed).unwrap_or(cur.name.clone());
    let new_canonical = merge(canonical, &cur.canonical_name, &mut changed);
    let new_region = merge(region, &cur.region, &mut changed);
    let new_address = merge(non_empty(rec.address.as_deref()), &cur.address, &mut changed);
    let new_lat = merge(rec.lat, &cur.lat, &mut changed);
    let new_lon = merge(rec.lon, &cur.lon, &mut changed);
    let new_website = merge(non_empty(rec.website.as_deref()), &cur.website, &mut changed);
    let new_phone = merge(non_empty(rec.phone.as_deref()), &cur.phone, &mut changed);
    let new_query = merge(non_empty(rec.query.as_deref()), &cur.query, &mut changed);

    if !changed {
        return Ok(UpsertOutcome::Unchanged);
    }
    sqlx::query(
        "UPDATE companies_discovered SET name = ?, canonical_name = ?, region = ?, address = ?, lat = ?, lon = ?,
            website = ?, phone = ?, query = ?, discovered_at = ?
         WHERE id = ?",
    )
    .bind(&new_name)
    .bind(&new_canonical)
    .bind(&new_region)
    .bind(&new_address)
    .bind(new_lat)
    .bind(new_lon)
    .bind(&new_website)
    .bind(&new_phone)
    .bind(&new_query)
    .bind(now)
    .bind(cur.id)
    .execute(&mut *conn)
    .await?;
    Ok(UpsertOutcome::Updated)
}

/// All discovered companies in id order.
pub async fn list_companies(conn: &mut SqliteConnection) -> Result<Vec<DiscoveredCompany>> {
    let rows = sqlx::query_as("SELECT * FROM companies_discovered ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

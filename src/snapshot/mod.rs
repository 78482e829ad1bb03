//! Market snapshot: parsed offers joined with resolved regions and per-region
//! company counts, rebuilt from scratch on every run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::database_ops::companies::list_companies;
use crate::database_ops::parsed::parsed_offer_rows;
use crate::normalization::RegionCodeMap;
use crate::util::db::Db;

pub const TOP_REGIONS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SnapshotRow {
    pub product_name: String,
    pub brand_name: Option<String>,
    pub category: Option<String>,
    pub price_value: Option<f64>,
    pub price_currency: Option<String>,
    pub region: String,
    pub region_code: Option<String>,
    pub companies_count_region: i64,
    pub collected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub rows: usize,
    pub unresolved_regions: usize,
    /// The authoritative code map could not be loaded.
    pub degraded_mapping: bool,
    /// Up to ten `(region, product rows)` pairs, most rows first.
    pub top_regions: Vec<(String, usize)>,
}

/// Distinct discovered companies per resolved region name (lower-cased key).
async fn company_counts(conn: &mut SqliteConnection, map: &RegionCodeMap) -> Result<HashMap<String, i64>> {
    let mut ids: HashMap<String, HashSet<i64>> = HashMap::new();
    for company in list_companies(conn).await? {
        let resolved = map.resolve(company.region.as_deref());
        if resolved.resolved {
            ids.entry(resolved.name.to_lowercase()).or_default().insert(company.id);
        }
    }
    Ok(ids.into_iter().map(|(k, v)| (k, v.len() as i64)).collect())
}

fn top_regions(rows: &[SnapshotRow], unknown: &str) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for r in rows.iter().filter(|r| r.region != unknown) {
        *counts.entry(r.region.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_REGIONS);
    ranked
}

/// Delete and regenerate every snapshot row in one transaction.
///
/// Regions resolve only through `map`; with an unavailable map numeric codes
/// land as `UNKNOWN` with the code kept, and the run still completes.
#[instrument(skip(db, map), fields(map_entries = map.len()))]
pub async fn build_snapshot(db: &Db, map: &RegionCodeMap) -> Result<SnapshotSummary> {
    if !map.is_available() {
        warn!("building snapshot without an authoritative region code map");
    }
    let mut tx = db.pool.begin().await?;
    sqlx::query("DELETE FROM market_snapshot").execute(&mut *tx).await?;

    let counts = company_counts(&mut tx, map).await?;
    let source_rows = parsed_offer_rows(&mut tx).await?;

    let mut rows = Vec::with_capacity(source_rows.len());
    let mut unresolved = 0usize;
    for src in source_rows {
        let resolved = map.resolve(src.region.as_deref());
        if !resolved.resolved {
            unresolved += 1;
        }
        let count = if resolved.resolved {
            counts.get(&resolved.name.to_lowercase()).copied().unwrap_or(0)
        } else {
            0
        };
        rows.push(SnapshotRow {
            product_name: src.product_name,
            brand_name: src.brand,
            category: src.product_type,
            price_value: Some(src.price_value),
            price_currency: Some(src.price_currency),
            region: resolved.name,
            region_code: resolved.code,
            companies_count_region: count,
            collected_at: Some(src.collected_at),
        });
    }

    for r in &rows {
        sqlx::query(
            "INSERT INTO market_snapshot (product_name, brand_name, category, price_value, price_currency, region,
                region_code, companies_count_region, collected_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&r.product_name)
        .bind(&r.brand_name)
        .bind(&r.category)
        .bind(r.price_value)
        .bind(&r.price_currency)
        .bind(&r.region)
        .bind(&r.region_code)
        .bind(r.companies_count_region)
        .bind(r.collected_at)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let summary = SnapshotSummary {
        rows: rows.len(),
        unresolved_regions: unresolved,
        degraded_mapping: !map.is_available(),
        top_regions: top_regions(&rows, crate::normalization::UNKNOWN_REGION),
    };
    info!(
        rows = summary.rows,
        unresolved = summary.unresolved_regions,
        degraded = summary.degraded_mapping,
        "market snapshot rebuilt"
    );
    Ok(summary)
}

pub async fn load_snapshot(conn: &mut SqliteConnection) -> Result<Vec<SnapshotRow>> {
    let rows = sqlx::query_as(
        "SELECT product_name, brand_name, category, price_value, price_currency, region, region_code,
                companies_count_region, collected_at
         FROM market_snapshot ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

/// Write the snapshot table to `path` as CSV with a header row. Returns the
/// number of data rows written.
pub async fn export_snapshot_csv(db: &Db, path: &Path) -> Result<usize> {
    let mut conn = db.pool.acquire().await?;
    let rows = load_snapshot(&mut conn).await?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    if rows.is_empty() {
        writer.write_record([
            "product_name",
            "brand_name",
            "category",
            "price_value",
            "price_currency",
            "region",
            "region_code",
            "companies_count_region",
            "collected_at",
        ])?;
    }
    for row in &rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "snapshot exported");
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::companies::upsert_discovered_company;
    use crate::database_ops::provider::RawRecord;
    use crate::normalization::UNKNOWN_REGION;

    async fn seed(db: &Db) {
        let mut conn = db.pool.acquire().await.unwrap();
        for (ext, region) in [("1", "Москва"), ("2", "Москва"), ("3", "Тверь")] {
            let mut c = RawRecord::new("2gis", format!("Завод {ext}"));
            c.external_id = Some(ext.into());
            c.region = Some(region.into());
            upsert_discovered_company(&mut conn, &c).await.unwrap();
        }
        let offers = [
            ("Молоко 3.2% 1л", Some("213"), Some("молоко")),
            ("Кефир 1%", Some("9999"), Some("кефир")),
            ("Сыр", Some("  "), Some("сыр")),
            ("Творог", Some("Москва"), None),
        ];
        for (i, (name, region, category)) in offers.iter().enumerate() {
            sqlx::query(
                "INSERT INTO retail_offers (source, region, product_name, price_value, price_currency, collected_at)
                 VALUES ('ozon', ?, ?, 100.0, 'RUB', '2024-05-01T10:00:00Z')",
            )
            .bind(region)
            .bind(name)
            .execute(&mut *conn)
            .await
            .unwrap();
            sqlx::query(
                "INSERT INTO retail_products_parsed (retail_offer_id, raw_name, product_type, region, source, parsed_at)
                 VALUES (?, ?, ?, ?, 'ozon', '2024-05-02T10:00:00Z')",
            )
            .bind(i as i64 + 1)
            .bind(name)
            .bind(category)
            .bind(region)
            .execute(&mut *conn)
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn resolves_regions_and_counts_companies() {
        let db = Db::in_memory().await.unwrap();
        seed(&db).await;
        let map = RegionCodeMap::from_pairs([("213", "Москва")]);

        let summary = build_snapshot(&db, &map).await.unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.unresolved_regions, 2);
        assert_eq!(summary.top_regions, vec![("Москва".to_string(), 2)]);

        let mut conn = db.pool.acquire().await.unwrap();
        let rows = load_snapshot(&mut conn).await.unwrap();
        assert_eq!(rows[0].region, "Москва");
        assert_eq!(rows[0].region_code.as_deref(), Some("213"));
        assert_eq!(rows[0].companies_count_region, 2);
        assert_eq!(rows[1].region, UNKNOWN_REGION);
        assert_eq!(rows[1].region_code.as_deref(), Some("9999"));
        assert_eq!(rows[1].companies_count_region, 0);
        assert_eq!(rows[2].region, UNKNOWN_REGION);
        assert_eq!(rows[2].region_code, None);
        assert_eq!(rows[3].region_code.as_deref(), Some("213"));
        assert!(rows.iter().all(|r| r.collected_at.is_some()));
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let db = Db::in_memory().await.unwrap();
        seed(&db).await;
        let map = RegionCodeMap::from_pairs([("213", "Москва")]);

        let first = build_snapshot(&db, &map).await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let rows_a = load_snapshot(&mut conn).await.unwrap();
        drop(conn);

        let second = build_snapshot(&db, &map).await.unwrap();
        let mut conn = db.pool.acquire().await.unwrap();
        let rows_b = load_snapshot(&mut conn).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(rows_a, rows_b);
    }

    #[tokio::test]
    async fn unavailable_map_still_completes() {
        let db = Db::in_memory().await.unwrap();
        seed(&db).await;
        let summary = build_snapshot(&db, &RegionCodeMap::unavailable()).await.unwrap();
        assert!(summary.degraded_mapping);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.unresolved_regions, 3);

        let mut conn = db.pool.acquire().await.unwrap();
        let rows = load_snapshot(&mut conn).await.unwrap();
        assert_eq!(rows[0].region, UNKNOWN_REGION);
        assert_eq!(rows[0].region_code.as_deref(), Some("213"));
        assert_eq!(rows[3].region, "Москва");
        assert_eq!(rows[3].companies_count_region, 2);
    }

    #[tokio::test]
    async fn export_writes_header_and_rows() {
        let db = Db::in_memory().await.unwrap();
        seed(&db).await;
        build_snapshot(&db, &RegionCodeMap::from_pairs([("213", "Москва")])).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/market_snapshot.csv");
        let written = export_snapshot_csv(&db, &path).await.unwrap();
        assert_eq!(written, 4);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("product_name,brand_name,category,price_value,price_currency,region,region_code,companies_count_region,collected_at")
        );
        assert!(lines.next().unwrap().starts_with("Молоко 3.2% 1л,,молоко,100.0,RUB,Москва,213,2,"));
    }
}

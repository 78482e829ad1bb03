use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::path::Path;
use tracing::{info, instrument, warn};

use super::UpsertOutcome;
use crate::normalization::normalize_region;
use crate::util::db::Db;

/// One line of the region reference CSV
/// (`name,country,federal_district,center_lat,center_lon`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegionRow {
    pub name: String,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub federal_district: Option<String>,
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Region {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub federal_district: Option<String>,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
}

impl Region {
    /// `(lat, lon)` when both are known.
    pub fn center(&self) -> Option<(f64, f64)> {
        Some((self.center_lat?, self.center_lon?))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegionImportSummary {
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

pub fn load_regions_csv(path: &Path) -> Result<Vec<RegionRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening regions csv {}", path.display()))?;
    let mut rows = Vec::new();
    for (line, row) in reader.deserialize::<RegionRow>().enumerate() {
        match row {
            Ok(r) => rows.push(r),
            Err(err) => warn!(line = line + 2, error = %err, "skipping malformed region row"),
        }
    }
    Ok(rows)
}

fn opt_text(v: &Option<String>) -> Option<String> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Upsert by name. Existing rows only take provided fields that differ.
pub async fn upsert_region(conn: &mut SqliteConnection, row: &RegionRow) -> Result<UpsertOutcome> {
    let Some(name) = normalize_region(Some(&row.name)) else {
        return Ok(UpsertOutcome::Skipped);
    };
    let country = opt_text(&row.country);
    let district = opt_text(&row.federal_district);

    let existing: Option<Region> = sqlx::query_as("SELECT * FROM regions WHERE name = ?")
        .bind(&name)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(cur) = existing else {
        sqlx::query(
            "INSERT INTO regions (name, country, federal_district, center_lat, center_lon)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&name)
        .bind(country.unwrap_or_else(|| "RU".to_string()))
        .bind(&district)
        .bind(row.center_lat)
        .bind(row.center_lon)
        .execute(&mut *conn)
        .await?;
        return Ok(UpsertOutcome::Inserted);
    };

    let next_country = country.unwrap_or_else(|| cur.country.clone());
    let next_district = district.or_else(|| cur.federal_district.clone());
    let next_lat = row.center_lat.or(cur.center_lat);
    let next_lon = row.center_lon.or(cur.center_lon);
    if next_country == cur.country
        && next_district == cur.federal_district
        && next_lat == cur.center_lat
        && next_lon == cur.center_lon
    {
        return Ok(UpsertOutcome::Unchanged);
    }
    sqlx::query(
        "UPDATE regions SET country = ?, federal_district = ?, center_lat = ?, center_lon = ? WHERE id = ?",
    )
    .bind(&next_country)
    .bind(&next_district)
    .bind(next_lat)
    .bind(next_lon)
    .bind(cur.id)
    .execute(&mut *conn)
    .await?;
    Ok(UpsertOutcome::Updated)
}

/// Upsert every row in one transaction.
#[instrument(skip(db, rows), fields(rows = rows.len()))]
pub async fn import_regions(db: &Db, rows: &[RegionRow]) -> Result<RegionImportSummary> {
    let mut summary = RegionImportSummary::default();
    let mut tx = db.pool.begin().await?;
    for row in rows {
        summary.processed += 1;
        match upsert_region(&mut tx, row).await? {
            UpsertOutcome::Inserted => summary.inserted += 1,
            UpsertOutcome::Updated => summary.updated += 1,
            UpsertOutcome::Unchanged => summary.unchanged += 1,
            UpsertOutcome::Skipped => summary.skipped += 1,
        }
    }
    tx.commit().await?;
    info!(?summary, "regions imported");
    Ok(summary)
}

/// All regions in id order.
pub async fn list_regions(conn: &mut SqliteConnection) -> Result<Vec<Region>> {
    let rows = sqlx::query_as("SELECT * FROM regions ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn row(name: &str, lat: Option<f64>) -> RegionRow {
        RegionRow {
            name: name.to_string(),
            center_lat: lat,
            center_lon: lat.map(|l| l - 18.0),
            ..RegionRow::default()
        }
    }

    #[tokio::test]
    async fn import_is_idempotent_and_fills_gaps() {
        let db = Db::in_memory().await.unwrap();
        let rows = vec![row("Москва", Some(55.75)), row("Тверская область", None), row("  ", None)];

        let first = import_regions(&db, &rows).await.unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(first.skipped, 1);

        let second = import_regions(&db, &rows).await.unwrap();
        assert_eq!(second.unchanged, 2);
        assert_eq!(second.inserted, 0);

        let third = import_regions(&db, &[row("Тверская область", Some(56.86))]).await.unwrap();
        assert_eq!(third.updated, 1);

        let mut conn = db.pool.acquire().await.unwrap();
        let regions = list_regions(&mut conn).await.unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].country, "RU");
        assert_eq!(regions[1].center(), Some((56.86, 56.86 - 18.0)));
    }

    #[test]
    fn csv_with_blank_coordinates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,country,federal_district,center_lat,center_lon").unwrap();
        writeln!(file, "Москва,RU,Центральный,55.75,37.62").unwrap();
        writeln!(file, "Тверская область,,Центральный,,").unwrap();
        let rows = load_regions_csv(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].center_lon, Some(37.62));
        assert_eq!(rows[1].center_lat, None);
        assert_eq!(rows[1].country, None);
    }
}

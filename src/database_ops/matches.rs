use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BrandCompanyMatch {
    pub id: i64,
    pub brand_name: String,
    pub company_discovered_id: i64,
    pub company_name: String,
    pub brand_region: Option<String>,
    pub company_region: Option<String>,
    pub match_method: String,
    pub confidence_score: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub brand_name: String,
    pub company_discovered_id: i64,
    pub company_name: String,
    pub brand_region: Option<String>,
    pub company_region: Option<String>,
    pub match_method: &'static str,
    pub confidence_score: u8,
}

pub async fn match_exists(
    conn: &mut SqliteConnection,
    brand_name: &str,
    company_id: i64,
    method: &str,
) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM brand_company_matches
         WHERE brand_name = ? AND company_discovered_id = ? AND match_method = ?",
    )
    .bind(brand_name)
    .bind(company_id)
    .bind(method)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(found.is_some())
}

/// Insert unless the `(brand, company, method)` triple is already recorded.
pub async fn insert_match_if_new(conn: &mut SqliteConnection, m: &NewMatch) -> Result<bool> {
    if match_exists(conn, &m.brand_name, m.company_discovered_id, m.match_method).await? {
        return Ok(false);
    }
    sqlx::query(
        "INSERT INTO brand_company_matches (brand_name, company_discovered_id, company_name, brand_region,
            company_region, match_method, confidence_score, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&m.brand_name)
    .bind(m.company_discovered_id)
    .bind(&m.company_name)
    .bind(&m.brand_region)
    .bind(&m.company_region)
    .bind(m.match_method)
    .bind(i64::from(m.confidence_score))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(true)
}

pub async fn list_matches(conn: &mut SqliteConnection) -> Result<Vec<BrandCompanyMatch>> {
    let rows = sqlx::query_as("SELECT * FROM brand_company_matches ORDER BY id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

use anyhow::Result;
use chrono::Utc;
use sqlx::SqliteConnection;

use crate::database_ops::provider::RawRecord;
use crate::database_ops::UpsertOutcome;

/// Registry status text fragments and their normalized codes, checked in
/// order, case-insensitively.
const STATUS_MAP: [(&str, &str); 5] = [
    ("Действующая", "ACTIVE"),
    ("В процессе ликвидации", "LIQUIDATING"),
    ("Ликвидирована", "CLOSED"),
    ("Банкротство", "BANKRUPT"),
    ("Реорганизация", "REORG"),
];

pub fn normalize_status(status_raw: Option<&str>) -> &'static str {
    let Some(raw) = status_raw.filter(|s| !s.trim().is_empty()) else {
        return "UNKNOWN";
    };
    let raw = raw.to_lowercase();
    STATUS_MAP
        .iter()
        .find(|(needle, _)| raw.contains(&needle.to_lowercase()))
        .map(|(_, code)| *code)
        .unwrap_or("UNKNOWN")
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryEntry {
    pub source_url: Option<String>,
    pub legal_form: Option<String>,
    pub legal_name: Option<String>,
    pub ogrn: Option<String>,
    pub inn: Option<String>,
    pub status_raw: Option<String>,
    pub address_raw: Option<String>,
}

impl RegistryEntry {
    pub fn from_record(rec: &RawRecord) -> Self {
        let attr = |k: &str| rec.attribute(k).map(str::to_string);
        Self {
            source_url: attr("source_url"),
            legal_form: attr("legal_form"),
            legal_name: Some(rec.name.clone()).filter(|n| !n.trim().is_empty()),
            ogrn: attr("ogrn"),
            inn: attr("inn"),
            status_raw: attr("status"),
            address_raw: rec.address.clone(),
        }
    }
}

/// Insert or overwrite the registry row for `(company_id, source)`.
pub async fn upsert_registry_entry(
    conn: &mut SqliteConnection,
    company_id: i64,
    source: &str,
    entry: &RegistryEntry,
) -> Result<UpsertOutcome> {
    let status_norm = normalize_status(entry.status_raw.as_deref());
    let now = Utc::now();

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM company_registry WHERE company_discovered_id = ? AND source = ?",
    )
    .bind(company_id)
    .bind(source)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(id) = existing {
        sqlx::query(
            "UPDATE company_registry SET source_url = ?, legal_form = ?, legal_name = ?, ogrn = ?, inn = ?,
                status_raw = ?, status_norm = ?, address_raw = ?, fetched_at = ?
             WHERE id = ?",
        )
        .bind(&entry.source_url)
        .bind(&entry.legal_form)
        .bind(&entry.legal_name)
        .bind(&entry.ogrn)
        .bind(&entry.inn)
        .bind(&entry.status_raw)
        .bind(status_norm)
        .bind(&entry.address_raw)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?;
        return Ok(UpsertOutcome::Updated);
    }

    sqlx::query(
        "INSERT INTO company_registry (company_discovered_id, source, source_url, legal_form, legal_name,
            ogrn, inn, status_raw, status_norm, address_raw, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(company_id)
    .bind(source)
    .bind(&entry.source_url)
    .bind(&entry.legal_form)
    .bind(&entry.legal_name)
    .bind(&entry.ogrn)
    .bind(&entry.inn)
    .bind(&entry.status_raw)
    .bind(status_norm)
    .bind(&entry.address_raw)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(UpsertOutcome::Inserted)
}

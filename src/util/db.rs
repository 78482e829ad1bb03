use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Row, SqlitePool,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

/// Embedded migrations as `(version, description, sql)`, applied in order.
const MIGRATIONS: &[(i64, &str, &str)] = &[(1, "init", include_str!("../../migrations/0001_init.sql"))];

#[derive(Clone)]
pub struct Db {
    pub pool: SqlitePool,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = Self::connect_no_migrate(database_url, max_connections).await?;
        info!("running migrations (custom runner)");
        Self::run_migrations(&db.pool).await?;
        Ok(db)
    }

    // Variant that never runs migrations (read-only inspection paths).
    #[instrument(skip(database_url))]
    pub async fn connect_no_migrate(database_url: &str, max_connections: u32) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .context("parsing sqlite database url")?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self { pool })
    }

    /// Fresh migrated in-memory database. One connection so every query sees
    /// the same memory database.
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT,
                installed_at TEXT DEFAULT CURRENT_TIMESTAMP
             )",
        )
        .execute(pool)
        .await?;

        let applied_rows = sqlx::query("SELECT version FROM _migrations")
            .fetch_all(pool)
            .await?;
        let mut applied: HashSet<i64> = HashSet::new();
        for r in applied_rows {
            applied.insert(r.try_get::<i64, _>(0)?);
        }

        for &(version, desc, sql) in MIGRATIONS {
            if applied.contains(&version) {
                continue;
            }
            info!(version, desc, "applying migration");
            let mut tx = pool.begin().await?;
            sqlx::raw_sql(sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("migration {version}_{desc} failed"))?;
            sqlx::query("INSERT INTO _migrations (version, description) VALUES (?, ?)")
                .bind(version)
                .bind(desc)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
        }

        let latest: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
            .fetch_one(pool)
            .await?;
        info!(version = latest.unwrap_or(0), "migrations up-to-date");
        Ok(())
    }

    /// Row count for an application table; used by operator summaries.
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        const KNOWN: [&str; 7] = [
            "regions",
            "companies_discovered",
            "retail_offers",
            "retail_products_parsed",
            "brand_company_matches",
            "market_snapshot",
            "company_registry",
        ];
        if !KNOWN.contains(&table) {
            anyhow::bail!("unknown table {table}");
        }
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_db_is_migrated_once() {
        let db = Db::in_memory().await.unwrap();
        Db::run_migrations(&db.pool).await.unwrap();
        let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(versions, 1);
        assert_eq!(db.count_rows("market_snapshot").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn count_rows_rejects_unknown_tables() {
        let db = Db::in_memory().await.unwrap();
        assert!(db.count_rows("sqlite_master; DROP TABLE regions").await.is_err());
    }
}

use anyhow::Result;
use serde::Serialize;
use tracing::{info, instrument};

use crate::database_ops::parsed::insert_parsed_product;
use crate::database_ops::retail::unparsed_offers;
use crate::parsing::parse_product_name;
use crate::util::db::Db;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseSummary {
    /// Stored offers seen by this run.
    pub processed: usize,
    pub inserted: usize,
    /// Offers that already had a parsed row.
    pub skipped: usize,
}

/// Parse every offer that has no parsed row yet, in one transaction.
#[instrument(skip(db))]
pub async fn parse_pending_offers(db: &Db) -> Result<ParseSummary> {
    let total = db.count_rows("retail_offers").await?;
    let mut tx = db.pool.begin().await?;
    let pending = unparsed_offers(&mut tx).await?;

    let mut inserted = 0usize;
    for offer in &pending {
        let parsed = parse_product_name(&offer.product_name);
        if insert_parsed_product(&mut tx, offer, &parsed).await? {
            inserted += 1;
        }
    }
    tx.commit().await?;

    let processed = usize::try_from(total).unwrap_or(0);
    let summary = ParseSummary {
        processed,
        inserted,
        skipped: processed.saturating_sub(inserted),
    };
    info!(processed, inserted, skipped = summary.skipped, "product parsing finished");
    Ok(summary)
}

//! Aggregates handed to the reporting layer as one JSON document.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::snapshot::SnapshotRow;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverviewMetrics {
    pub total_products: usize,
    pub distinct_regions: usize,
    pub distinct_categories: usize,
    pub avg_price: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSummary {
    pub region: String,
    pub region_code: Option<String>,
    pub product_count: usize,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: Option<String>,
    pub product_count: usize,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricePoint {
    pub region: String,
    pub category: Option<String>,
    pub price_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketPayload {
    pub overview_metrics: OverviewMetrics,
    pub region_summary: Vec<RegionSummary>,
    pub category_summary: Vec<CategorySummary>,
    pub price_distribution: Vec<PricePoint>,
}

#[derive(Default)]
struct Stats {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
}

impl Stats {
    fn push(&mut self, v: f64) {
        if self.count == 0 {
            self.min = v;
            self.max = v;
        } else {
            self.min = self.min.min(v);
            self.max = self.max.max(v);
        }
        self.count += 1;
        self.sum += v;
    }

    fn avg(&self) -> f64 {
        self.sum / self.count as f64
    }
}

/// Build the payload from snapshot rows. Rows without a price are ignored
/// by every aggregate.
pub fn build_market_payload(rows: &[SnapshotRow]) -> MarketPayload {
    let priced: Vec<(&SnapshotRow, f64)> = rows
        .iter()
        .filter_map(|r| r.price_value.filter(|p| p.is_finite()).map(|p| (r, p)))
        .collect();

    let mut all = Stats::default();
    let mut regions: BTreeSet<&str> = BTreeSet::new();
    let mut categories: BTreeSet<&str> = BTreeSet::new();
    let mut by_region: BTreeMap<(&str, Option<&str>), Stats> = BTreeMap::new();
    let mut by_category: BTreeMap<Option<&str>, Stats> = BTreeMap::new();
    let mut distribution = Vec::with_capacity(priced.len());

    for (row, price) in &priced {
        all.push(*price);
        regions.insert(row.region.as_str());
        if let Some(c) = row.category.as_deref() {
            categories.insert(c);
        }
        by_region
            .entry((row.region.as_str(), row.region_code.as_deref()))
            .or_default()
            .push(*price);
        by_category
            .entry(row.category.as_deref())
            .or_default()
            .push(*price);
        distribution.push(PricePoint {
            region: row.region.clone(),
            category: row.category.clone(),
            price_value: *price,
        });
    }

    let overview_metrics = OverviewMetrics {
        total_products: all.count,
        distinct_regions: regions.len(),
        distinct_categories: categories.len(),
        avg_price: (all.count > 0).then(|| all.avg()),
        min_price: (all.count > 0).then_some(all.min),
        max_price: (all.count > 0).then_some(all.max),
    };
    let region_summary = by_region
        .into_iter()
        .map(|((region, code), s)| RegionSummary {
            region: region.to_string(),
            region_code: code.map(str::to_string),
            product_count: s.count,
            avg_price: s.avg(),
            min_price: s.min,
            max_price: s.max,
        })
        .collect();
    let category_summary = by_category
        .into_iter()
        .map(|(category, s)| CategorySummary {
            category: category.map(str::to_string),
            product_count: s.count,
            avg_price: s.avg(),
            min_price: s.min,
            max_price: s.max,
        })
        .collect();

    MarketPayload {
        overview_metrics,
        region_summary,
        category_summary,
        price_distribution: distribution,
    }
}

pub fn write_payload_json(payload: &MarketPayload, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(payload)?;
    std::fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(region: &str, code: Option<&str>, category: Option<&str>, price: Option<f64>) -> SnapshotRow {
        SnapshotRow {
            product_name: "p".into(),
            brand_name: None,
            category: category.map(str::to_string),
            price_value: price,
            price_currency: Some("RUB".into()),
            region: region.into(),
            region_code: code.map(str::to_string),
            companies_count_region: 0,
            collected_at: None,
        }
    }

    #[test]
    fn aggregates_priced_rows_only() {
        let rows = vec![
            row("Москва", Some("213"), Some("молоко"), Some(80.0)),
            row("Москва", Some("213"), Some("кефир"), Some(100.0)),
            row("UNKNOWN", None, None, Some(60.0)),
            row("Тверь", None, Some("молоко"), None),
        ];
        let payload = build_market_payload(&rows);
        let o = &payload.overview_metrics;
        assert_eq!(o.total_products, 3);
        assert_eq!(o.distinct_regions, 2);
        assert_eq!(o.distinct_categories, 2);
        assert_eq!(o.avg_price, Some(80.0));
        assert_eq!(o.min_price, Some(60.0));
        assert_eq!(o.max_price, Some(100.0));

        assert_eq!(payload.region_summary.len(), 2);
        let moscow = payload.region_summary.iter().find(|r| r.region == "Москва").unwrap();
        assert_eq!(moscow.product_count, 2);
        assert_eq!(moscow.avg_price, 90.0);

        assert_eq!(payload.category_summary.len(), 3);
        assert_eq!(payload.category_summary[0].category, None);
        assert_eq!(payload.price_distribution.len(), 3);
    }

    #[test]
    fn empty_input_has_null_prices() {
        let payload = build_market_payload(&[]);
        assert_eq!(payload.overview_metrics.total_products, 0);
        assert_eq!(payload.overview_metrics.avg_price, None);
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["overview_metrics"]["avg_price"].is_null());
        assert!(json["region_summary"].as_array().unwrap().is_empty());
    }

    #[test]
    fn payload_round_trips_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.json");
        let payload = build_market_payload(&[row("Москва", Some("213"), Some("сыр"), Some(10.0))]);
        write_payload_json(&payload, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["price_distribution"][0]["region"], "Москва");
        assert_eq!(json["category_summary"][0]["category"], "сыр");
    }
}

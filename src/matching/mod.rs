//! Brand → company entity resolution.
//!
//! A fixed rule cascade over normalized names; the first satisfied rule
//! decides the method and base score, then a same-region bonus is applied.
//! Every brand is compared with every company.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::OnceLock;
use tracing::{debug, info, instrument};

use crate::database_ops::companies::list_companies;
use crate::database_ops::matches::{insert_match_if_new, NewMatch};
use crate::database_ops::parsed::distinct_brand_regions;
use crate::normalization::normalize_region;
use crate::util::db::Db;

/// Legal-entity and generic producer words removed before comparison.
/// Multi-word entries come before their single-word suffixes.
pub const LEGAL_WORDS: [&str; 8] = [
    "ооо",
    "ао",
    "пао",
    "зао",
    "ип",
    "молочный завод",
    "молкомбинат",
    "завод",
];

pub const REGION_BONUS: u8 = 10;
pub const MAX_SCORE: u8 = 100;
/// Brands shorter than this (raw or normalized) are ignored.
pub const MIN_BRAND_CHARS: usize = 3;
const MIN_SUBSTRING_CHARS: usize = 5;
const MIN_TOKEN_CHARS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    ExactName,
    NormalizedExact,
    Substring,
    TokenOverlap,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactName => "exact_name",
            Self::NormalizedExact => "normalized_exact",
            Self::Substring => "substring",
            Self::TokenOverlap => "token_overlap",
        }
    }

    pub fn base_score(&self) -> u8 {
        match self {
            Self::ExactName => 100,
            Self::NormalizedExact => 85,
            Self::Substring => 70,
            Self::TokenOverlap => 50,
        }
    }
}

struct Patterns {
    legal_words: Vec<Regex>,
    punctuation: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        legal_words: LEGAL_WORDS
            .iter()
            .map(|w| Regex::new(&format!(r"\b{}\b", regex::escape(w))).expect("valid regex literal"))
            .collect(),
        punctuation: Regex::new(r"[.,;:()\[\]{}]").expect("valid regex literal"),
        whitespace: Regex::new(r"\s+").expect("valid regex literal"),
    })
}

/// Comparison form of a brand or company name: lower-cased, quotes and
/// legal-entity words removed, punctuation turned into spaces, whitespace
/// collapsed.
pub fn normalize_for_match(text: &str) -> String {
    let p = patterns();
    let mut s: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '«' | '»' | '"' | '\''))
        .collect();
    for re in &p.legal_words {
        s = re.replace_all(&s, " ").into_owned();
    }
    s = p.punctuation.replace_all(&s, " ").into_owned();
    p.whitespace.replace_all(&s, " ").trim().to_string()
}

fn long_tokens(s: &str) -> HashSet<&str> {
    s.split_whitespace()
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS)
        .collect()
}

/// True when the two names share a whitespace token of at least four chars.
pub fn token_overlap(a: &str, b: &str) -> bool {
    let ta = long_tokens(a);
    long_tokens(b).iter().any(|t| ta.contains(t))
}

/// Run the cascade on two already-normalized names.
///
/// The substring rule can only fire when containment fails, which never
/// happens for non-empty inputs; it is kept so the score ladder stays intact.
pub fn match_brand_to_company(brand_norm: &str, comp_norm: &str) -> Option<(MatchMethod, u8)> {
    if brand_norm.is_empty() || comp_norm.is_empty() {
        return None;
    }
    let method = if brand_norm == comp_norm {
        MatchMethod::ExactName
    } else if comp_norm.contains(brand_norm) || brand_norm.contains(comp_norm) {
        MatchMethod::NormalizedExact
    } else if (brand_norm.chars().count() >= MIN_SUBSTRING_CHARS && comp_norm.contains(brand_norm))
        || (comp_norm.chars().count() >= MIN_SUBSTRING_CHARS && brand_norm.contains(comp_norm))
    {
        MatchMethod::Substring
    } else if token_overlap(brand_norm, comp_norm) {
        MatchMethod::TokenOverlap
    } else {
        return None;
    };
    Some((method, method.base_score()))
}

/// +10 when both regions are known and equal (case- and spacing-insensitive),
/// never above 100.
pub fn apply_region_bonus(score: u8, brand_region: Option<&str>, company_region: Option<&str>) -> u8 {
    let key = |r: Option<&str>| normalize_region(r).map(|s| s.to_lowercase());
    match (key(brand_region), key(company_region)) {
        (Some(a), Some(b)) if a == b => score.saturating_add(REGION_BONUS).min(MAX_SCORE),
        _ => score.min(MAX_SCORE),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub brands: usize,
    pub companies: usize,
    pub inserted: usize,
    pub skipped_existing: usize,
    pub by_method: BTreeMap<String, usize>,
}

/// Match every distinct `(brand, region)` against every discovered company
/// and persist new triples. Safe to rerun: recorded triples are skipped.
#[instrument(skip(db))]
pub async fn run_matching(db: &Db) -> Result<MatchSummary> {
    let mut tx = db.pool.begin().await?;

    let brands: BTreeSet<(String, Option<String>)> = distinct_brand_regions(&mut tx)
        .await?
        .into_iter()
        .map(|(b, r)| (b.trim().to_string(), r))
        .filter(|(b, _)| b.chars().count() >= MIN_BRAND_CHARS)
        .collect();
    let companies: Vec<_> = list_companies(&mut tx)
        .await?
        .into_iter()
        .map(|c| {
            let norm = normalize_for_match(&c.name);
            (c, norm)
        })
        .filter(|(_, norm)| !norm.is_empty())
        .collect();

    let mut summary = MatchSummary {
        brands: brands.len(),
        companies: companies.len(),
        ..MatchSummary::default()
    };

    for (brand_raw, brand_region) in &brands {
        let brand_norm = normalize_for_match(brand_raw);
        if brand_norm.chars().count() < MIN_BRAND_CHARS {
            debug!(brand = %brand_raw, "brand too short after normalization");
            continue;
        }
        for (company, comp_norm) in &companies {
            let Some((method, base)) = match_brand_to_company(&brand_norm, comp_norm) else {
                continue;
            };
            let score = apply_region_bonus(base, brand_region.as_deref(), company.region.as_deref());
            let candidate = NewMatch {
                brand_name: brand_raw.clone(),
                company_discovered_id: company.id,
                company_name: company.name.clone(),
                brand_region: brand_region.clone(),
                company_region: company.region.clone(),
                match_method: method.as_str(),
                confidence_score: score,
            };
            if insert_match_if_new(&mut tx, &candidate).await? {
                summary.inserted += 1;
                *summary.by_method.entry(method.as_str().to_string()).or_default() += 1;
            } else {
                summary.skipped_existing += 1;
            }
        }
    }

    tx.commit().await?;
    info!(
        brands = summary.brands,
        inserted = summary.inserted,
        skipped = summary.skipped_existing,
        "brand matching finished"
    );
    Ok(summary)
}

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Region name recorded when a raw value cannot be resolved.
pub const UNKNOWN_REGION: &str = "UNKNOWN";

fn whitespace() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex literal"))
}

/// Trim and collapse whitespace; an empty result becomes `None`.
pub fn normalize_region(value: Option<&str>) -> Option<String> {
    let raw = value?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(whitespace().replace_all(raw, " ").into_owned())
}

/// Outcome of resolving a raw region value against the code map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRegion {
    /// Canonical region name, or [`UNKNOWN_REGION`].
    pub name: String,
    /// Numeric code when one is known or was supplied.
    pub code: Option<String>,
    /// False when the name is the `UNKNOWN` sentinel.
    pub resolved: bool,
}

impl ResolvedRegion {
    fn unknown(code: Option<String>) -> Self {
        Self {
            name: UNKNOWN_REGION.to_string(),
            code,
            resolved: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CodeRow {
    code: String,
    name: String,
}

/// Bidirectional `code ⇄ name` map built only from the authoritative source.
///
/// Nothing is ever inferred: a numeric code missing from the source resolves
/// to `UNKNOWN` with the code kept for audit.
#[derive(Debug, Clone, Default)]
pub struct RegionCodeMap {
    code_to_name: BTreeMap<String, String>,
    name_to_code: HashMap<String, String>,
    available: bool,
}

impl RegionCodeMap {
    /// Build from `(code, name)` pairs. Blank codes or names are dropped; a
    /// map left with no entries counts as unavailable.
    pub fn from_pairs<I, C, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, N)>,
        C: AsRef<str>,
        N: AsRef<str>,
    {
        let mut map = Self::default();
        for (code, name) in pairs {
            let code = code.as_ref().trim();
            let Some(name) = normalize_region(Some(name.as_ref())) else {
                continue;
            };
            if code.is_empty() {
                continue;
            }
            map.name_to_code
                .insert(name.to_lowercase(), code.to_string());
            map.code_to_name.insert(code.to_string(), name);
        }
        map.available = !map.code_to_name.is_empty();
        map
    }

    /// Placeholder used when the authoritative source cannot be read.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Load a `code,name` CSV. Rejected rows are counted and reported; a
    /// source with no usable row is an error.
    pub fn load_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("opening region code map {}", path.display()))?;
        let mut pairs = Vec::new();
        let mut rejected = 0usize;
        for row in reader.deserialize::<CodeRow>() {
            match row {
                Ok(r) => pairs.push((r.code, r.name)),
                Err(err) => {
                    rejected += 1;
                    debug!(error = %err, "skipping malformed region code row");
                }
            }
        }
        if rejected > 0 {
            warn!(path = %path.display(), rejected, accepted = pairs.len(), "region code map has malformed rows");
        }
        let map = Self::from_pairs(pairs);
        if !map.is_available() {
            bail!(
                "region code map {} has no usable code,name rows ({rejected} rejected)",
                path.display()
            );
        }
        Ok(map)
    }

    /// Load the map, degrading to an empty map (with a warning) when the
    /// source is missing or unreadable.
    pub fn load_or_degraded(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            warn!("no authoritative region code map configured; numeric codes resolve to UNKNOWN");
            return Self::unavailable();
        };
        match Self::load_csv(path) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "region code map unavailable; numeric codes resolve to UNKNOWN");
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn len(&self) -> usize {
        self.code_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code_to_name.is_empty()
    }

    pub fn name_for(&self, code: &str) -> Option<&str> {
        self.code_to_name.get(code.trim()).map(String::as_str)
    }

    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.name_to_code
            .get(&name.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Resolve a raw region value (numeric code or free-text name).
    ///
    /// - blank → `UNKNOWN`, no code
    /// - numeric and mapped → mapped name + code
    /// - numeric and unmapped → `UNKNOWN` + the numeric code
    /// - text → normalized text, code looked up by name when known
    pub fn resolve(&self, raw: Option<&str>) -> ResolvedRegion {
        let Some(norm) = normalize_region(raw) else {
            return ResolvedRegion::unknown(None);
        };
        if norm.chars().all(|c| c.is_ascii_digit()) {
            return match self.name_for(&norm) {
                Some(name) => ResolvedRegion {
                    name: name.to_string(),
                    code: Some(norm),
                    resolved: true,
                },
                None => ResolvedRegion::unknown(Some(norm)),
            };
        }
        let code = self.code_for(&norm).map(str::to_string);
        ResolvedRegion {
            name: norm,
            code,
            resolved: true,
        }
    }
}

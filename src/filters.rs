//! Keyword scoring that flags discovered companies which look like dairy
//! producers rather than shops or unrelated food businesses.

use std::collections::BTreeMap;

pub const POSITIVE_KEYWORDS: [(&str, i32); 9] = [
    ("молок", 3),
    ("молоч", 3),
    ("сыр", 2),
    ("творог", 2),
    ("йогурт", 2),
    ("слив", 2),
    ("комбинат", 2),
    ("завод", 2),
    ("фабрика", 2),
];

pub const NEGATIVE_KEYWORDS: [(&str, i32); 9] = [
    ("магазин", -3),
    ("маркет", -3),
    ("лавка", -3),
    ("рынок", -3),
    ("ярмарка", -3),
    ("мясо", -2),
    ("рыба", -2),
    ("кондитер", -2),
    ("№", -2),
];

pub const KNOWN_PRODUCERS: [&str; 5] = ["wimm-bill-dann", "danone", "pepsico", "савушкин", "экомилк"];
pub const KNOWN_PRODUCER_BONUS: i32 = 3;
pub const DEFAULT_THRESHOLD: i32 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyScore {
    pub score: i32,
    /// Matched keyword → contribution.
    pub reasons: BTreeMap<String, i32>,
}

pub fn score_company(name: &str) -> CompanyScore {
    let lower = name.to_lowercase();
    let mut out = CompanyScore::default();
    for (kw, weight) in POSITIVE_KEYWORDS.iter().chain(NEGATIVE_KEYWORDS.iter()) {
        if lower.contains(kw) {
            out.score += weight;
            out.reasons.insert(kw.to_string(), *weight);
        }
    }
    for producer in KNOWN_PRODUCERS {
        if lower.contains(producer) {
            out.score += KNOWN_PRODUCER_BONUS;
            out.reasons.insert(format!("known:{producer}"), KNOWN_PRODUCER_BONUS);
        }
    }
    out
}

pub fn is_dairy_b2b(name: &str, threshold: i32) -> bool {
    score_company(name).score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producers_score_above_threshold() {
        let s = score_company("Молочный комбинат Савушкин");
        assert_eq!(s.score, 3 + 2 + 3);
        assert!(s.reasons.contains_key("known:савушкин"));
        assert!(is_dairy_b2b("Сырзавод", DEFAULT_THRESHOLD));
    }

    #[test]
    fn shops_are_penalised() {
        assert!(!is_dairy_b2b("Молочный магазин №5", DEFAULT_THRESHOLD));
        assert_eq!(score_company("Мясо и рыба").score, -4);
        assert_eq!(score_company("").score, 0);
    }
}

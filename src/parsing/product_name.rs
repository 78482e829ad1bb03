use regex::{Captures, Regex};
use serde::Serialize;
use std::sync::OnceLock;

/// Product-type keywords (stem, canonical label). Order is priority: the
/// first stem found in the name wins.
pub const PRODUCT_TYPES: [(&str, &str); 14] = [
    ("йогурт", "йогурт"),
    ("кефир", "кефир"),
    ("ряженка", "ряженка"),
    ("простокваш", "простокваша"),
    ("сметан", "сметана"),
    ("творог", "творог"),
    ("сыр", "сыр"),
    ("масло", "масло"),
    ("сливк", "сливки"),
    ("молоко", "молоко"),
    ("десерт", "десерт"),
    ("напиток", "напиток"),
    ("питьев", "питьевое"),
    ("детск", "детское"),
];

pub const PACKAGE_TYPES: [(&str, &str); 9] = [
    ("бутыл", "бутылка"),
    ("пакет", "пакет"),
    ("пачк", "пачка"),
    ("стакан", "стакан"),
    ("короб", "коробка"),
    ("ведро", "ведро"),
    ("банка", "банка"),
    ("пленк", "пленка"),
    ("тетра", "тетрапак"),
];

pub const FLAVORS: [&str; 15] = [
    "персик",
    "клубник",
    "ванил",
    "шоколад",
    "банан",
    "вишн",
    "манго",
    "малина",
    "черник",
    "яблок",
    "карамел",
    "груш",
    "мед",
    "орех",
    "черносмород",
];

const MAX_PREFIX_BRAND_CHARS: usize = 40;

/// Structured attributes pulled out of a free-text offer name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedName {
    pub raw_name: String,
    pub brand: Option<String>,
    pub product_type: Option<String>,
    pub flavor: Option<String>,
    pub fat_percent: Option<f64>,
    pub package_type: Option<String>,
    pub weight_g: Option<i64>,
    pub volume_ml: Option<i64>,
}

struct Patterns {
    quoted_brand: Regex,
    trailing_punct: Regex,
    fat: Regex,
    kilograms: Regex,
    grams: Regex,
    liters: Regex,
    milliliters: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |p: &str| Regex::new(p).expect("valid regex literal");
        Patterns {
            quoted_brand: re(r#"[«"]([^»"]+)[»"]"#),
            trailing_punct: re(r"[-,:]+$"),
            fat: re(r"(\d{1,2}(?:[.,]\d)?)\s*%"),
            kilograms: re(r"(\d+(?:[.,]\d+)?)\s*кг"),
            grams: re(r"(\d+(?:[.,]\d+)?)\s*г"),
            liters: re(r"(\d+(?:[.,]\d+)?)\s*л"),
            milliliters: re(r"(\d+(?:[.,]\d+)?)\s*мл"),
        }
    })
}

fn parse_decimal(raw: &str) -> Option<f64> {
    raw.replace(',', ".").parse::<f64>().ok()
}

fn is_cyrillic_lower(c: char) -> bool {
    ('а'..='я').contains(&c)
}

/// First numeric capture of `re` in `text`. With `standalone_unit`, matches
/// whose unit letter runs straight into another Cyrillic letter ("5 года")
/// are rejected.
fn first_quantity(re: &Regex, text: &str, standalone_unit: bool) -> Option<f64> {
    re.captures_iter(text)
        .find(|caps: &Captures| {
            if !standalone_unit {
                return true;
            }
            let end = caps.get(0).map(|m| m.end()).unwrap_or(text.len());
            !text[end..].chars().next().is_some_and(is_cyrillic_lower)
        })
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_decimal(m.as_str()))
}

fn extract_fat_percent(lower: &str) -> Option<f64> {
    let caps = patterns().fat.captures(lower)?;
    parse_decimal(caps.get(1)?.as_str())
}

fn extract_type(lower: &str) -> Option<String> {
    PRODUCT_TYPES
        .iter()
        .find(|(stem, _)| lower.contains(stem))
        .map(|(_, label)| label.to_string())
}

fn extract_package(lower: &str) -> Option<String> {
    PACKAGE_TYPES
        .iter()
        .find(|(stem, _)| lower.contains(stem))
        .map(|(_, label)| label.to_string())
}

fn extract_flavor(lower: &str) -> Option<String> {
    FLAVORS
        .iter()
        .find(|stem| lower.contains(*stem))
        .map(|stem| stem.to_string())
}

fn extract_quoted_brand(raw: &str) -> Option<String> {
    let caps = patterns().quoted_brand.captures(raw)?;
    let brand = caps.get(1)?.as_str().trim();
    (!brand.is_empty()).then(|| brand.to_string())
}

/// Text in front of the first product-type stem that does not start the name.
fn extract_prefix_brand(raw: &str, lower: &str) -> Option<String> {
    for (stem, _) in PRODUCT_TYPES {
        let Some(byte_idx) = lower.find(stem) else {
            continue;
        };
        if byte_idx == 0 {
            continue;
        }
        let char_idx = lower[..byte_idx].chars().count();
        let prefix: String = raw.chars().take(char_idx).collect();
        let trimmed = patterns()
            .trailing_punct
            .replace(prefix.trim(), "")
            .trim()
            .to_string();
        let len = trimmed.chars().count();
        if len > 1 && len <= MAX_PREFIX_BRAND_CHARS {
            return Some(trimmed);
        }
    }
    None
}

/// Weight in grams and volume in milliliters. Later unit patterns override
/// earlier ones (`г` over `кг`, `мл` over `л`), so only one of each survives.
fn extract_weight_volume(lower: &str) -> (Option<i64>, Option<i64>) {
    let p = patterns();
    let mut weight_g = None;
    let mut volume_ml = None;

    if let Some(v) = first_quantity(&p.kilograms, lower, false) {
        weight_g = Some((v * 1000.0) as i64);
    }
    if let Some(v) = first_quantity(&p.grams, lower, true) {
        weight_g = Some(v as i64);
    }
    if let Some(v) = first_quantity(&p.liters, lower, true) {
        volume_ml = Some((v * 1000.0) as i64);
    }
    if let Some(v) = first_quantity(&p.milliliters, lower, false) {
        volume_ml = Some(v as i64);
    }
    (weight_g, volume_ml)
}

/// Extract structured attributes from an offer name. Never fails; anything
/// not found is `None`.
pub fn parse_product_name(name: &str) -> ParsedName {
    let lower = name.to_lowercase();
    let (weight_g, volume_ml) = extract_weight_volume(&lower);
    ParsedName {
        raw_name: name.to_string(),
        brand: extract_quoted_brand(name).or_else(|| extract_prefix_brand(name, &lower)),
        product_type: extract_type(&lower),
        flavor: extract_flavor(&lower),
        fat_percent: extract_fat_percent(&lower),
        package_type: extract_package(&lower),
        weight_g,
        volume_ml,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_milk_with_fat_and_volume() {
        let p = parse_product_name("Молоко Домик в деревне пастеризованное 3.2% 1л");
        assert_eq!(p.product_type.as_deref(), Some("молоко"));
        assert_eq!(p.fat_percent, Some(3.2));
        assert_eq!(p.volume_ml, Some(1000));
        assert_eq!(p.weight_g, None);
        assert_eq!(p.brand, None);
    }

    #[test]
    fn quoted_brand_wins_over_prefix() {
        let p = parse_product_name("Йогурт «Эрмигурт» клубника 2,5% 290 г стакан");
        assert_eq!(p.brand.as_deref(), Some("Эрмигурт"));
        assert_eq!(p.product_type.as_deref(), Some("йогурт"));
        assert_eq!(p.flavor.as_deref(), Some("клубник"));
        assert_eq!(p.fat_percent, Some(2.5));
        assert_eq!(p.weight_g, Some(290));
        assert_eq!(p.package_type.as_deref(), Some("стакан"));
    }

    #[test]
    fn prefix_brand_is_text_before_product_type() {
        let p = parse_product_name("Простоквашино - кефир 1% 930 мл бутылка");
        assert_eq!(p.brand.as_deref(), Some("Простоквашино"));
        assert_eq!(p.product_type.as_deref(), Some("кефир"));
        assert_eq!(p.fat_percent, Some(1.0));
        assert_eq!(p.volume_ml, Some(930));
        assert_eq!(p.package_type.as_deref(), Some("бутылка"));
    }

    #[test]
    fn grams_override_kilograms_and_reject_words() {
        let p = parse_product_name("Сыр Ламбер 1 кг кусок 500 г");
        assert_eq!(p.weight_g, Some(500));

        let kg_only = parse_product_name("Творог 9% 0,5 кг");
        assert_eq!(kg_only.weight_g, Some(500));
        assert_eq!(kg_only.fat_percent, Some(9.0));

        let no_weight = parse_product_name("Сыр для детей от 3 года");
        assert_eq!(no_weight.weight_g, None);
    }

    #[test]
    fn multipack_keeps_first_gram_match() {
        let p = parse_product_name("Сырок 2x500г");
        assert_eq!(p.weight_g, Some(500));
    }

    #[test]
    fn empty_or_garbled_names_yield_nothing() {
        assert_eq!(
            parse_product_name(""),
            ParsedName {
                raw_name: String::new(),
                ..ParsedName::default()
            }
        );
        let p = parse_product_name("???? ### !!!");
        assert!(p.brand.is_none() && p.product_type.is_none() && p.fat_percent.is_none());
    }
}

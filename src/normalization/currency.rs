/// Currency recorded when a source omits one. Sources in scope are ruble
/// denominated; no conversion is ever applied.
pub const DEFAULT_CURRENCY: &str = "RUB";

/// Symbol and alias table; first column is the ISO code the aliases map to.
const CURRENCY_ALIASES: [(&str, &[&str]); 3] = [
    ("RUB", &["RUB", "₽", "RUR", "РУБ", "Р"]),
    ("USD", &["USD", "$"]),
    ("EUR", &["EUR", "€"]),
];

/// Map a reported currency symbol or alias to its ISO code.
///
/// The price value is never touched. Unknown codes are returned upper-cased
/// and trimmed but otherwise unchanged, and a missing value or code passes
/// through as-is.
pub fn normalize_currency(
    value: Option<f64>,
    code: Option<&str>,
) -> (Option<f64>, Option<String>) {
    let (Some(value), Some(code)) = (value, code) else {
        return (value, code.map(str::to_string));
    };
    let cleaned = code.trim().to_uppercase();
    for (iso, aliases) in CURRENCY_ALIASES {
        if aliases.contains(&cleaned.as_str()) {
            return (Some(value), Some(iso.to_string()));
        }
    }
    (Some(value), Some(cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_symbols_to_iso_codes() {
        assert_eq!(
            normalize_currency(Some(100.0), Some("₽")),
            (Some(100.0), Some("RUB".to_string()))
        );
        assert_eq!(
            normalize_currency(Some(3.5), Some(" $ ")),
            (Some(3.5), Some("USD".to_string()))
        );
        assert_eq!(
            normalize_currency(Some(1.0), Some("eur")),
            (Some(1.0), Some("EUR".to_string()))
        );
        assert_eq!(
            normalize_currency(Some(80.0), Some("RUR")),
            (Some(80.0), Some("RUB".to_string()))
        );
    }

    #[test]
    fn unknown_codes_pass_through() {
        assert_eq!(
            normalize_currency(Some(50.0), Some("XYZ")),
            (Some(50.0), Some("XYZ".to_string()))
        );
    }

    #[test]
    fn missing_inputs_are_untouched() {
        assert_eq!(normalize_currency(None, Some("₽")), (None, Some("₽".to_string())));
        assert_eq!(normalize_currency(Some(10.0), None), (Some(10.0), None));
    }
}

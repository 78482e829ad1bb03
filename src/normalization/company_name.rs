use regex::Regex;
use std::sync::OnceLock;

/// Branch/office suffix patterns stripped from a lower-cased company name, in
/// application order.
const CLEAN_PATTERNS: [&str; 4] = [
    r",\s*офис.*$",
    r",\s*магазин.*$",
    r"представительство.*$",
    r"№\s*\d+",
];

fn clean_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        CLEAN_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("valid regex literal"))
            .collect()
    })
}

fn whitespace() -> &'static Regex {
    static WS: OnceLock<Regex> = OnceLock::new();
    WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex literal"))
}

/// Canonical comparison key for a discovered company name.
///
/// Lower-cases, drops office / shop / representative-office tails and
/// numbered-branch markers, then collapses whitespace. Not reversible.
pub fn canonical_company_name(name: &str) -> String {
    let mut s = name.to_lowercase();
    for re in clean_patterns() {
        s = re.replace_all(&s, "").into_owned();
    }
    whitespace().replace_all(&s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_office_and_branch_suffixes() {
        assert_eq!(
            canonical_company_name("Молочный Завод Вкуснотеево, офис 12"),
            "молочный завод вкуснотеево"
        );
        assert_eq!(
            canonical_company_name("Савушкин продукт, магазин на Ленина"),
            "савушкин продукт"
        );
        assert_eq!(
            canonical_company_name("Danone  Представительство в Казани"),
            "danone"
        );
    }

    #[test]
    fn removes_numbered_markers_and_collapses_whitespace() {
        assert_eq!(canonical_company_name("  Молоко   №  5 Плюс "), "молоко плюс");
    }

    #[test]
    fn is_deterministic() {
        let a = canonical_company_name("ООО «Экомилк», офис 3");
        let b = canonical_company_name("ООО «Экомилк», офис 3");
        assert_eq!(a, b);
        assert_eq!(a, "ооо «экомилк»");
    }
}

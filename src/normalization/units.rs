/// Convert a weight or volume into its large unit family (`kg` / `l`).
///
/// Grams and milliliters are divided by 1000; kilograms and liters pass
/// through with a canonical unit label. Unknown units are returned unchanged,
/// as is anything with a missing value or unit.
pub fn normalize_weight(value: Option<f64>, unit: Option<&str>) -> (Option<f64>, Option<String>) {
    let (Some(value), Some(unit)) = (value, unit) else {
        return (value, unit.map(str::to_string));
    };
    let cleaned = unit.trim().to_lowercase();
    match cleaned.as_str() {
        "g" | "gram" | "grams" | "г" => (Some(value / 1000.0), Some("kg".into())),
        "kg" | "kilogram" | "kilograms" | "кг" => (Some(value), Some("kg".into())),
        "ml" | "мл" => (Some(value / 1000.0), Some("l".into())),
        "l" | "liter" | "litre" | "л" => (Some(value), Some("l".into())),
        _ => (Some(value), Some(cleaned)),
    }
}

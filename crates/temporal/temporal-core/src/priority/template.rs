//! Placeholder substitution for action templates

use std::collections::BTreeMap;

/// Names a template may reference
pub const PLACEHOLDERS: [&str; 13] = [
    "unit",
    "level",
    "metric",
    "days",
    "date",
    "volume",
    "magnitude_pct",
    "confidence_pct",
    "severity",
    "ratio",
    "centers",
    "staff",
    "signals",
];

/// Replace `{name}` with its value.
///
/// Known placeholders without a value become empty; braces around any other
/// text are kept as written.
pub fn render(template: &str, values: &BTreeMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if PLACEHOLDERS.contains(&&after[..close]) => {
                if let Some(value) = values.get(&after[..close]) {
                    out.push_str(value);
                }
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> BTreeMap<&'static str, String> {
        [("unit", "PUNE".to_string()), ("days", "12".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render("Surge in {unit} in {days} days", &values()),
            "Surge in PUNE in 12 days"
        );
    }

    #[test]
    fn test_missing_value_is_empty() {
        assert_eq!(render("{unit}: {ratio}", &values()), "PUNE: ");
    }

    #[test]
    fn test_unknown_braces_kept() {
        assert_eq!(render("{unit} {other} {", &values()), "PUNE {other} {");
    }
}

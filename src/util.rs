use crate::engine::MergeSummary;

/// Parses a `KEY=VALUE` pair as given to `--value`.
///
/// Only the first `=` separates key and value, so values may contain `=`.
pub fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{input}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in '{input}'"));
    }
    if value.contains('\n') {
        return Err(format!("value for '{key}' must fit on one line"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// One-line description of a merge, e.g. `2 added, 1 removed`.
pub fn describe_summary(summary: &MergeSummary) -> String {
    if summary.is_unchanged() {
        return "up to date".to_string();
    }
    let mut parts = Vec::new();
    for (count, label) in [
        (summary.added.len(), "added"),
        (summary.updated.len(), "updated"),
        (summary.removed.len(), "removed"),
    ] {
        if count > 0 {
            parts.push(format!("{count} {label}"));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("SSOStartURL=https://x/start?a=b").unwrap(),
            ("SSOStartURL".to_string(), "https://x/start?a=b".to_string())
        );
    }

    #[test]
    fn test_parse_key_value_allows_empty_value() {
        assert_eq!(parse_key_value("Org=").unwrap().1, "");
    }

    #[test]
    fn test_parse_key_value_rejects_garbage() {
        assert!(parse_key_value("no-separator").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn test_describe_summary() {
        let summary = MergeSummary {
            added: vec!["a".into(), "b".into()],
            updated: vec![],
            removed: vec!["c".into()],
        };
        assert_eq!(describe_summary(&summary), "2 added, 1 removed");
        assert_eq!(describe_summary(&MergeSummary::default()), "up to date");
    }
}

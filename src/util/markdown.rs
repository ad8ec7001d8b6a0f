//! Report markdown conventions: `*` bullets, never `-` or `•`.

/// Render a `## References` section from an ordered list of canonical URLs.
#[must_use]
pub(crate) fn render_references(urls: &[String]) -> String {
    if urls.is_empty() {
        return "## References\n".to_string();
    }

    let mut out = String::from("## References\n\n");
    for url in urls {
        out.push_str(&format!("* [{url}]({url})\n"));
    }
    out
}

/// Truncate text to at most `limit` characters (char-boundary safe), appending
/// an ellipsis marker when truncated.
#[must_use]
pub(crate) fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(limit).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_bullets_with_asterisk() {
        let rendered = render_references(&["https://a.example".to_string()]);
        assert!(rendered.contains("* [https://a.example](https://a.example)"));
        assert!(!rendered.contains('-'));
        assert!(!rendered.contains('•'));
    }

    #[test]
    fn empty_references_still_has_header() {
        assert_eq!(render_references(&[]), "## References\n");
    }

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_appends_ellipsis_marker() {
        let truncated = truncate("hello world", 5);
        assert_eq!(truncated, "hello...");
    }
}

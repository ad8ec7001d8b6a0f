//! URL canonicalization shared by researchers, curator, and enricher.

/// Strip query string, fragment, and a single trailing slash. Returns the
/// input unchanged if it does not parse as an absolute URL.
#[must_use]
pub(crate) fn canonicalize(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.trim_end_matches('/').to_string();
    };

    url.set_query(None);
    url.set_fragment(None);

    let mut rendered = url.to_string();
    if rendered.ends_with('/') && rendered.matches('/').count() > 2 {
        rendered.pop();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_query_and_fragment() {
        assert_eq!(
            canonicalize("https://example.com/a?x=1#frag"),
            "https://example.com/a"
        );
    }

    #[test]
    fn strips_trailing_slash() {
        assert_eq!(canonicalize("https://example.com/a/"), "https://example.com/a");
    }

    #[test]
    fn keeps_bare_domain_slash() {
        assert_eq!(canonicalize("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn idempotent_on_already_canonical_url() {
        let once = canonicalize("https://example.com/a/b?q=1");
        let twice = canonicalize(&once);
        assert_eq!(once, twice);
    }
}

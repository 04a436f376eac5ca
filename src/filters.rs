//! Post-filters applied to HTML renders before caching and serving.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static SCRIPT_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script(.*?)>([\S\s]*?)</script>").expect("script tag regex")
});

static META_FRAGMENT_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<meta[^<>]*name=['"]fragment['"][^<>]*content=['"]!['"][^<>]*>"#)
        .expect("meta fragment regex")
});

/// Strip script elements; structured data blocks stay because crawlers
/// consume them.
pub fn remove_script_tags(html: &str) -> String {
    SCRIPT_TAG_RE
        .replace_all(html, |caps: &Captures| {
            if caps[1].contains("application/ld+json") {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned()
}

/// Strip `<meta name="fragment" content="!">` so crawlers do not loop
/// back through the escaped-fragment protocol.
pub fn remove_meta_fragment_tag(html: &str) -> String {
    META_FRAGMENT_TAG_RE.replace_all(html, "").into_owned()
}

pub fn apply_filters(html: &str) -> String {
    remove_meta_fragment_tag(&remove_script_tags(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_plain_script_tags() {
        let html = r#"<html><head><script src="app.js"></script></head><body>x</body></html>"#;
        let filtered = remove_script_tags(html);
        assert_eq!(filtered, "<html><head></head><body>x</body></html>");
    }

    #[test]
    fn test_removes_inline_scripts_with_bodies() {
        let html = "<body><script>var a = 1;\nconsole.log(a);</script>kept</body>";
        assert_eq!(remove_script_tags(html), "<body>kept</body>");
    }

    #[test]
    fn test_keeps_ld_json_blocks() {
        let html = r#"<script type="application/ld+json">{"@type":"Article"}</script>"#;
        assert_eq!(remove_script_tags(html), html);
    }

    #[test]
    fn test_removes_meta_fragment_tag() {
        let html = r#"<head><meta name="fragment" content="!"><title>t</title></head>"#;
        assert_eq!(
            remove_meta_fragment_tag(html),
            "<head><title>t</title></head>"
        );
    }

    #[test]
    fn test_meta_fragment_is_case_insensitive() {
        let html = r#"<META NAME="fragment" CONTENT="!">"#;
        assert_eq!(remove_meta_fragment_tag(html), "");
    }

    #[test]
    fn test_apply_filters_combines_both() {
        let html = r#"<meta name="fragment" content="!"><script>x()</script><p>body</p>"#;
        assert_eq!(apply_filters(html), "<p>body</p>");
    }
}

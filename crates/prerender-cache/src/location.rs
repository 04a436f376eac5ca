//! Storage locations derived from cache keys.
//!
//! A key (the rendered URL) maps to `<host>/<h0h1>/<h2h3>/<hex>.<format>`
//! where `<hex>` is the hex encoding of the full URL. The two-level shard
//! keeps directory fan-out manageable for busy hosts.

use std::fmt::Write;

/// Relative storage path for a key/format pair.
pub(crate) fn object_path(key: &str, format: &str) -> String {
    let hex = hex_encode(key.as_bytes());
    let host = url::Url::parse(key)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}/{}/{}/{}.{}", host, &hex[..2], &hex[2..4], &hex[4..], format)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        // Infallible for String.
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(b"http"), "68747470");
        assert_eq!(hex_encode(b""), "");
    }

    #[test]
    fn test_object_path_shape() {
        let path = object_path("http://example.com/a", "html");
        assert!(path.starts_with("example.com/68/74/"));
        assert!(path.ends_with(".html"));

        let pdf = object_path("http://example.com/a", "pdf");
        assert!(pdf.ends_with(".pdf"));
        assert_ne!(path, pdf);
    }

    #[test]
    fn test_object_path_distinct_urls() {
        let a = object_path("http://example.com/a", "html");
        let b = object_path("http://example.com/b", "html");
        assert_ne!(a, b);
    }
}

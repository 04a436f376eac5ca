use super::*;

fn render_to_string(mhtml: &Mhtml) -> String {
    String::from_utf8(mhtml.to_bytes()).unwrap()
}

#[test]
fn test_envelope_shape() {
    let mut mhtml = Mhtml::new();
    mhtml
        .add(
            "http://example.com/",
            "text/html",
            b"<html><body>hi</body></html>",
            ENCODING_QUOTED_PRINTABLE,
        )
        .unwrap();
    mhtml
        .add(
            "http://example.com/logo.png",
            "image/png",
            b"aWNvbg==",
            ENCODING_BASE64_ENCODED,
        )
        .unwrap();

    let out = render_to_string(&mhtml);
    assert!(out.starts_with("MIME-Version: 1.0\r\n"));
    assert!(out.contains("Content-Type: multipart/related; type=\"text/html\"; boundary="));

    // One delimiter per part plus the closing delimiter.
    let boundary_line = out
        .lines()
        .find(|l| l.starts_with("--"))
        .unwrap()
        .to_string();
    assert_eq!(out.matches(&boundary_line).count(), 3);
    assert!(out.trim_end().ends_with("--"));

    assert!(out.contains("Content-Location: http://example.com/\r\n"));
    assert!(out.contains("Content-Location: http://example.com/logo.png\r\n"));
    assert_eq!(mhtml.len(), 2);
}

#[test]
fn test_html_part_forces_utf8_charset() {
    let mut mhtml = Mhtml::new();
    mhtml
        .add("http://example.com/", "text/html", b"<p>x</p>", ENCODING_QUOTED_PRINTABLE)
        .unwrap();
    let out = render_to_string(&mhtml);
    assert!(out.contains("Content-Type: text/html; charset=utf-8\r\n"));
}

#[test]
fn test_quoted_printable_encoding() {
    let mut mhtml = Mhtml::new();
    mhtml
        .add(
            "http://example.com/",
            "text/html",
            "héllo=world".as_bytes(),
            ENCODING_QUOTED_PRINTABLE,
        )
        .unwrap();
    let out = render_to_string(&mhtml);
    assert!(out.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
    // '=' must be escaped, 'é' encoded as its UTF-8 bytes.
    assert!(out.contains("h=C3=A9llo=3Dworld"));
}

#[test]
fn test_base64_encoding_of_raw_payload() {
    let mut mhtml = Mhtml::new();
    mhtml
        .add("http://example.com/a.bin", "application/octet-stream", b"icon", ENCODING_BASE64)
        .unwrap();
    let out = render_to_string(&mhtml);
    assert!(out.contains("Content-Transfer-Encoding: base64\r\n"));
    assert!(out.contains("aWNvbg=="));
}

#[test]
fn test_already_encoded_payload_kept_verbatim() {
    let mut mhtml = Mhtml::new();
    mhtml
        .add("http://example.com/b.png", "image/png", b"aWNvbg==", ENCODING_BASE64_ENCODED)
        .unwrap();
    let out = render_to_string(&mhtml);
    assert!(out.contains("Content-Transfer-Encoding: base64\r\n"));
    assert!(out.contains("aWNvbg=="));
}

#[test]
fn test_unknown_encoding_rejected() {
    let mut mhtml = Mhtml::new();
    let result = mhtml.add("http://example.com/", "text/plain", b"x", "uuencode");
    assert!(matches!(result, Err(RenderError::InvalidEncoding(e)) if e == "uuencode"));
    assert!(mhtml.is_empty());
}

//! MHTML archive assembler.
//!
//! Builds a `multipart/related; type="text/html"` envelope from the
//! sub-resources captured during a render. Parts arrive either as text
//! (stored quoted-printable) or as payloads the browser already base64
//! encoded (stored as-is with a `base64` transfer encoding).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use uuid::Uuid;

use crate::error::RenderError;

/// Transfer encoding of a part handed to [`Mhtml::add`].
pub const ENCODING_QUOTED_PRINTABLE: &str = "quoted-printable";
pub const ENCODING_BASE64: &str = "base64";
/// Payload is already base64; stored verbatim under a `base64` header.
pub const ENCODING_BASE64_ENCODED: &str = "base64-encoded";

struct Part {
    location: String,
    content_type: String,
    transfer_encoding: &'static str,
    body: String,
}

/// Accumulates captured resources and serializes the archive on demand.
pub struct Mhtml {
    boundary: String,
    parts: Vec<Part>,
}

impl Mhtml {
    pub fn new() -> Self {
        Self {
            boundary: format!("==============={}==", Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    /// Append one captured resource.
    pub fn add(
        &mut self,
        location: &str,
        content_type: &str,
        payload: &[u8],
        encoding: &str,
    ) -> Result<(), RenderError> {
        let (transfer_encoding, body) = match encoding {
            ENCODING_QUOTED_PRINTABLE => (
                "quoted-printable",
                quoted_printable::encode_to_str(payload),
            ),
            ENCODING_BASE64 => ("base64", BASE64.encode(payload)),
            ENCODING_BASE64_ENCODED => (
                "base64",
                String::from_utf8_lossy(payload).into_owned(),
            ),
            other => return Err(RenderError::InvalidEncoding(other.to_string())),
        };

        // Rendered documents are always extracted as UTF-8.
        let content_type = if content_type == "text/html" {
            "text/html; charset=utf-8".to_string()
        } else {
            content_type.to_string()
        };

        self.parts.push(Part {
            location: location.to_string(),
            content_type,
            transfer_encoding,
            body,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Serialize the archive.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str(&format!(
            "Content-Type: multipart/related; type=\"text/html\"; boundary=\"{}\"\r\n\r\n",
            self.boundary
        ));
        for part in &self.parts {
            out.push_str(&format!("--{}\r\n", self.boundary));
            out.push_str(&format!("Content-Type: {}\r\n", part.content_type));
            out.push_str(&format!(
                "Content-Transfer-Encoding: {}\r\n",
                part.transfer_encoding
            ));
            out.push_str(&format!("Content-Location: {}\r\n\r\n", part.location));
            out.push_str(&part.body);
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{}--\r\n", self.boundary));
        out.into_bytes()
    }
}

impl Default for Mhtml {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "mhtml_tests.rs"]
mod tests;

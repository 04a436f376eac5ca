//! Render output formats and artifacts.

use std::fmt;
use std::str::FromStr;

/// Output format requested for a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderFormat {
    Html,
    Mhtml,
    Pdf,
    Png,
    Jpeg,
}

impl RenderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Html => "html",
            RenderFormat::Mhtml => "mhtml",
            RenderFormat::Pdf => "pdf",
            RenderFormat::Png => "png",
            RenderFormat::Jpeg => "jpeg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            RenderFormat::Html => "text/html; charset=utf-8",
            RenderFormat::Mhtml => "multipart/related",
            RenderFormat::Pdf => "application/pdf",
            RenderFormat::Png => "image/png",
            RenderFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for RenderFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "html" => Ok(RenderFormat::Html),
            "mhtml" => Ok(RenderFormat::Mhtml),
            "pdf" => Ok(RenderFormat::Pdf),
            "png" => Ok(RenderFormat::Png),
            "jpeg" => Ok(RenderFormat::Jpeg),
            other => Err(format!("unknown render format '{other}'")),
        }
    }
}

/// A finished render, paired with the page's HTTP-like status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Html(String),
    Mhtml(Vec<u8>),
    Pdf(Vec<u8>),
    Png(Vec<u8>),
    Jpeg(Vec<u8>),
}

impl Artifact {
    pub fn content_type(&self) -> &'static str {
        self.format().content_type()
    }

    pub fn format(&self) -> RenderFormat {
        match self {
            Artifact::Html(_) => RenderFormat::Html,
            Artifact::Mhtml(_) => RenderFormat::Mhtml,
            Artifact::Pdf(_) => RenderFormat::Pdf,
            Artifact::Png(_) => RenderFormat::Png,
            Artifact::Jpeg(_) => RenderFormat::Jpeg,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Artifact::Html(html) => html.into_bytes(),
            Artifact::Mhtml(bytes)
            | Artifact::Pdf(bytes)
            | Artifact::Png(bytes)
            | Artifact::Jpeg(bytes) => bytes,
        }
    }
}

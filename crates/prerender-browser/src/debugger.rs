//! HTTP client for the browser's remote debugging control endpoint.

use serde_json::Value;
use tracing::info;

use crate::error::RenderError;
use crate::protocol::PageDescriptor;

/// Discovery, creation and teardown of pages through the browser's
/// `/json/*` endpoints.
#[derive(Clone)]
pub struct Debugger {
    endpoint: String,
    client: reqwest::Client,
}

impl Debugger {
    /// `endpoint` is the browser's HTTP control address, e.g.
    /// `http://localhost:9222`.
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// All page descriptors known to the browser.
    pub async fn pages(&self) -> Result<Vec<PageDescriptor>, RenderError> {
        let url = format!("{}/json/list", self.endpoint);
        let pages = self.client.get(&url).send().await?.json().await?;
        Ok(pages)
    }

    /// Descriptors we can actually attach to.
    pub async fn debuggable_pages(&self) -> Result<Vec<PageDescriptor>, RenderError> {
        let pages = self.pages().await?;
        Ok(pages.into_iter().filter(PageDescriptor::is_debuggable).collect())
    }

    /// Create a page. The initial URL, if given, rides as the raw query
    /// string (`/json/new?<url>`), not as a parameter.
    pub async fn new_page(&self, url: Option<&str>) -> Result<PageDescriptor, RenderError> {
        let endpoint = match url {
            Some(url) => format!("{}/json/new?{}", self.endpoint, url),
            None => format!("{}/json/new", self.endpoint),
        };
        let descriptor: PageDescriptor =
            self.client.get(&endpoint).send().await?.json().await?;
        info!(page_id = %descriptor.id, "created new page");
        Ok(descriptor)
    }

    /// Close a page; the browser acknowledges with a text body.
    pub async fn close_page(&self, page_id: &str) -> Result<String, RenderError> {
        let url = format!("{}/json/close/{}", self.endpoint, page_id);
        let ack = self.client.get(&url).send().await?.text().await?;
        info!(%page_id, %ack, "closed page");
        Ok(ack)
    }

    /// Browser version object, passed through untyped.
    pub async fn version(&self) -> Result<Value, RenderError> {
        let url = format!("{}/json/version", self.endpoint);
        let version = self.client.get(&url).send().await?.json().await?;
        Ok(version)
    }
}

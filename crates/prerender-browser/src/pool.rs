//! Fixed-size pool of browser pages.
//!
//! Every render leases one page for its whole duration. Pages come back
//! through the recycle path no matter how the render ended: healthy pages
//! are blanked and re-queued, failed or exhausted pages are closed and
//! replaced. The recycle path runs on a detached task so a caller giving
//! up on the render cannot leave a page half-reset.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::artifact::{Artifact, RenderFormat};
use crate::debugger::Debugger;
use crate::error::RenderError;
use crate::page::Page;
use crate::protocol::PageDescriptor;

/// How long a render may wait for an idle page.
const LEASE_TIMEOUT: Duration = Duration::from_secs(10);
/// Wall cap for attaching to a leased page.
const ATTACH_TIMEOUT: Duration = Duration::from_secs(5);
/// Pause before provisioning a replacement, so the browser settles.
const REPLACEMENT_SETTLE: Duration = Duration::from_millis(100);

/// Pool tuning knobs.
#[derive(Debug, Clone)]
pub struct PagePoolConfig {
    /// Number of pages, and therefore concurrent renders.
    pub concurrency: usize,
    /// Renders per page before forced replacement.
    pub max_iterations: u32,
    /// Per-render wall-clock budget.
    pub render_timeout: Duration,
    /// User agent override applied before every render.
    pub user_agent: String,
}

impl Default for PagePoolConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get() * 2)
                .unwrap_or(4),
            max_iterations: 200,
            render_timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (Linux) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/59.0.3033.0 Safari/537.36 Prerender"
                .to_string(),
        }
    }
}

/// The page pool. Cheap to clone.
#[derive(Clone)]
pub struct PagePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    debugger: Debugger,
    config: PagePoolConfig,
    idle: Mutex<VecDeque<Page>>,
    idle_permits: Semaphore,
    live: Mutex<HashSet<String>>,
}

impl PagePool {
    /// `endpoint` is the browser's HTTP control address.
    pub fn new(endpoint: &str, config: PagePoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                debugger: Debugger::new(endpoint),
                config,
                idle: Mutex::new(VecDeque::new()),
                idle_permits: Semaphore::new(0),
                live: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Create the configured number of fresh pages and queue them.
    pub async fn bootstrap(&self) -> Result<(), RenderError> {
        for _ in 0..self.inner.config.concurrency {
            self.inner.provision_page().await?;
        }
        info!(pages = self.inner.config.concurrency, "page pool bootstrapped");
        Ok(())
    }

    /// All page descriptors known to the browser.
    pub async fn pages(&self) -> Result<Vec<PageDescriptor>, RenderError> {
        self.inner.debugger.pages().await
    }

    /// Browser version object.
    pub async fn version(&self) -> Result<Value, RenderError> {
        self.inner.debugger.version().await
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Close every live page and stop handing out leases.
    pub async fn shutdown(&self) {
        self.inner.idle_permits.close();
        self.inner.idle.lock().clear();
        let ids: Vec<String> = self.inner.live.lock().drain().collect();
        for id in ids {
            if let Err(e) = self.inner.debugger.close_page(&id).await {
                warn!(page_id = %id, "failed to close page on shutdown: {e}");
            }
        }
        info!("page pool shut down");
    }

    /// Render `url` into the requested format.
    pub async fn render(
        &self,
        url: &str,
        format: RenderFormat,
        proxy: Option<String>,
    ) -> Result<(Artifact, u16), RenderError> {
        let inner = self.inner.clone();
        let url = url.to_string();
        // Lease/render/recycle runs as its own task: the recycle path
        // must complete even if the caller stops waiting.
        let task =
            tokio::spawn(async move { inner.render_with_lease(&url, format, proxy).await });
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(RenderError::TemporaryBrowserFailure(format!(
                "render task aborted: {e}"
            ))),
        }
    }
}

impl PoolInner {
    async fn render_with_lease(
        &self,
        url: &str,
        format: RenderFormat,
        proxy: Option<String>,
    ) -> Result<(Artifact, u16), RenderError> {
        if self.live.lock().is_empty() {
            return Err(RenderError::NoBrowserAvailable);
        }

        let permit = match tokio::time::timeout(LEASE_TIMEOUT, self.idle_permits.acquire()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(RenderError::NoBrowserAvailable),
            Err(_) => {
                return Err(RenderError::TemporaryBrowserFailure(
                    "No Chrome page available in 10s".to_string(),
                ))
            }
        };
        permit.forget();

        let page = match self.idle.lock().pop_front() {
            Some(page) => page,
            None => {
                return Err(RenderError::TemporaryBrowserFailure(
                    "idle queue empty".to_string(),
                ))
            }
        };

        let mut reopen = false;
        let outcome = self.drive_render(&page, url, format, proxy, &mut reopen).await;
        self.manage_page(page, reopen).await;
        outcome
    }

    async fn drive_render(
        &self,
        page: &Page,
        url: &str,
        format: RenderFormat,
        proxy: Option<String>,
        reopen: &mut bool,
    ) -> Result<(Artifact, u16), RenderError> {
        match tokio::time::timeout(ATTACH_TIMEOUT, page.attach()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                *reopen = true;
                return Err(RenderError::TemporaryBrowserFailure(format!(
                    "attach failed: {e}"
                )));
            }
            Err(_) => {
                *reopen = true;
                return Err(RenderError::TemporaryBrowserFailure(
                    "attach timed out".to_string(),
                ));
            }
        }

        page.set_render_proxy(proxy);

        let rendered = tokio::time::timeout(self.config.render_timeout, async {
            page.set_user_agent(&self.config.user_agent).await?;
            page.render(url, format).await
        })
        .await;

        match rendered {
            Err(_) => Err(RenderError::Timeout(format!("rendering {url}"))),
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) if needs_reopen(&e) => {
                *reopen = true;
                match e {
                    err @ RenderError::TemporaryBrowserFailure(_) => Err(err),
                    other => Err(RenderError::TemporaryBrowserFailure(other.to_string())),
                }
            }
            Ok(Err(e)) => Err(e),
        }
    }

    /// Recycle path: always resets the page, then either re-queues it or
    /// replaces it.
    async fn manage_page(&self, page: Page, reopen: bool) {
        if page.is_attached() {
            if !reopen {
                // Blank navigation releases the page's memory before reuse.
                let _ =
                    tokio::time::timeout(Duration::from_secs(5), page.navigate("about:blank"))
                        .await;
            }
            page.detach().await;
        }

        if !reopen && page.iteration() < self.config.max_iterations {
            self.release_page(page);
            return;
        }

        let id = page.id().to_string();
        debug!(page_id = %id, reopen, iteration = page.iteration(), "replacing page");
        if let Err(e) = self.debugger.close_page(&id).await {
            warn!(page_id = %id, "failed to close page: {e}");
        }
        self.live.lock().remove(&id);
        drop(page);

        tokio::time::sleep(REPLACEMENT_SETTLE).await;
        match self.provision_page().await {
            Ok(()) => debug!("replacement page provisioned"),
            Err(e) => error!("failed to provision replacement page: {e}"),
        }
    }

    async fn provision_page(&self) -> Result<(), RenderError> {
        let descriptor = self.debugger.new_page(None).await?;
        let page = Page::new(&descriptor)?;
        self.live.lock().insert(page.id().to_string());
        self.release_page(page);
        Ok(())
    }

    fn release_page(&self, page: Page) {
        self.idle.lock().push_back(page);
        self.idle_permits.add_permits(1);
    }
}

/// Errors that mean the current page is unusable and must be replaced.
fn needs_reopen(err: &RenderError) -> bool {
    match err {
        RenderError::TemporaryBrowserFailure(_)
        | RenderError::ConnectionClosed
        | RenderError::WebSocket(_) => true,
        RenderError::Protocol { message, .. } => {
            message.to_ascii_lowercase().contains("unable to perform operation")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_reopen() {
        assert!(needs_reopen(&RenderError::ConnectionClosed));
        assert!(needs_reopen(&RenderError::WebSocket("broken pipe".to_string())));
        assert!(needs_reopen(&RenderError::TemporaryBrowserFailure(
            "Inspector target crashed".to_string()
        )));
        assert!(needs_reopen(&RenderError::Protocol {
            code: -32000,
            message: "Unable to perform operation on detached target".to_string(),
        }));
        assert!(!needs_reopen(&RenderError::TooManyResponses));
        assert!(!needs_reopen(&RenderError::Timeout("rendering".to_string())));
    }

    #[test]
    fn test_default_config() {
        let config = PagePoolConfig::default();
        assert!(config.concurrency >= 2);
        assert_eq!(config.max_iterations, 200);
        assert_eq!(config.render_timeout, Duration::from_secs(30));
        assert!(config.user_agent.contains("Prerender"));
    }
}

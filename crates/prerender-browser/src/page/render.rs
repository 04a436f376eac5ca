//! Readiness detection and per-format extraction.
//!
//! Once `Page.loadEventFired` is observed, two probes race: a quiescence
//! watcher (all accounted responses in, no body fetches in flight, more
//! than a second of network silence, and the page does not define
//! `window.prerenderReady`) and a poller for the `prerenderReady`
//! sentinel itself. The first to succeed triggers extraction; the other
//! is cancelled.

use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tracing::debug;

use crate::artifact::{Artifact, RenderFormat};
use crate::error::RenderError;

use super::events::is_response_ok;
use super::{result_value, Page};

/// Inactivity window that must elapse before the page counts as quiet.
const QUIESCENCE_WINDOW: Duration = Duration::from_secs(1);
/// Cadence of the quiescence watcher.
const QUIESCENCE_POLL: Duration = Duration::from_millis(500);
/// Cadence of the `prerenderReady` poller.
const SENTINEL_POLL: Duration = Duration::from_millis(200);
/// Renders fail when fewer than this share of responses were below 400.
const SUCCESS_RATE_FLOOR: f64 = 0.8;

impl Page {
    /// Drive one render to completion: navigate, wait for readiness, and
    /// return the extracted artifact with the page's status code.
    pub async fn render(
        &self,
        url: &str,
        format: RenderFormat,
    ) -> Result<(Artifact, u16), RenderError> {
        {
            let page = self.clone();
            self.session().on("Page.loadEventFired", move |_params: Value| {
                let page = page.clone();
                async move { page.on_load_event_fired(format).await }.boxed()
            });
        }
        {
            let page = self.clone();
            self.session()
                .on("Network.loadingFinished", move |params: Value| {
                    let page = page.clone();
                    async move {
                        page.inner.ctx.lock().touch();
                        if format == RenderFormat::Mhtml {
                            if let Some(request_id) =
                                params.get("requestId").and_then(Value::as_str)
                            {
                                page.get_response_body(request_id).await?;
                            }
                        }
                        Ok(())
                    }
                    .boxed()
                });
        }

        let proxy = {
            let mut ctx = self.inner.ctx.lock();
            ctx.url = Some(url.to_string());
            ctx.proxy.clone()
        };
        if let Some(proxy) = proxy.as_deref() {
            debug!(page_id = %self.inner.id, %proxy, "render requested through proxy");
        }
        self.navigate(url).await?;

        let rx = self.inner.render_rx.lock().take().ok_or_else(|| {
            RenderError::InvalidResponse("page is already rendering".to_string())
        })?;
        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(RenderError::ConnectionClosed),
        }
    }

    async fn on_load_event_fired(&self, format: RenderFormat) -> Result<(), RenderError> {
        if matches!(format, RenderFormat::Pdf | RenderFormat::Mhtml) {
            self.scroll_to_bottom().await?;
        }

        tokio::select! {
            ready = self.poll_prerender_ready() => ready?,
            ready = self.wait_responses_ready() => ready?,
        }

        let status = self.get_status_code().await?;
        let artifact = match format {
            RenderFormat::Html => Artifact::Html(self.get_html().await?),
            RenderFormat::Mhtml => Artifact::Mhtml(self.inner.ctx.lock().mhtml.to_bytes()),
            RenderFormat::Pdf => Artifact::Pdf(self.print_to_pdf().await?),
            RenderFormat::Png => Artifact::Png(self.screenshot(RenderFormat::Png).await?),
            RenderFormat::Jpeg => Artifact::Jpeg(self.screenshot(RenderFormat::Jpeg).await?),
        };
        debug!(page_id = %self.inner.id, status, %format, "render extracted");
        self.complete_render(Ok((artifact, status)));
        Ok(())
    }

    /// Resolves once the page flips `window.prerenderReady` truthy.
    async fn poll_prerender_ready(&self) -> Result<(), RenderError> {
        loop {
            let result = self.evaluate("window.prerenderReady == true").await?;
            if result_value(&result).and_then(Value::as_bool).unwrap_or(false) {
                return Ok(());
            }
            tokio::time::sleep(SENTINEL_POLL).await;
        }
    }

    /// Resolves once network and DOM activity has settled, provided the
    /// page does not declare its own readiness sentinel. Applies the
    /// success-rate gate before returning.
    async fn wait_responses_ready(&self) -> Result<(), RenderError> {
        loop {
            let quiet = {
                let ctx = self.inner.ctx.lock();
                ctx.requests_sent > 0
                    && ctx.responses_received.len() as u64 >= ctx.requests_sent
                    && ctx.res_body_in_flight.is_empty()
                    && ctx
                        .last_active
                        .map(|at| at.elapsed() > QUIESCENCE_WINDOW)
                        .unwrap_or(false)
            };
            if quiet {
                let result = self
                    .evaluate("typeof window.prerenderReady === \"undefined\"")
                    .await?;
                if result_value(&result).and_then(Value::as_bool).unwrap_or(false) {
                    break;
                }
            }
            tokio::time::sleep(QUIESCENCE_POLL).await;
        }

        let (succeeded, total) = {
            let ctx = self.inner.ctx.lock();
            let succeeded = ctx
                .responses_received
                .values()
                .filter(|params| is_response_ok(params.get("response")))
                .count();
            (succeeded, ctx.responses_received.len())
        };
        if total > 0 && (succeeded as f64) / (total as f64) < SUCCESS_RATE_FLOOR {
            return Err(RenderError::TooManyResponses);
        }
        Ok(())
    }
}

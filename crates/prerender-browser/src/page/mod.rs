//! Protocol-level driver for one browser page.
//!
//! A [`Page`] wraps the remote debugging [`Session`] of a single tab and
//! exposes the operations a render needs: domain enables, navigation,
//! script evaluation, DOM extraction, PDF printing, screenshots and
//! response body capture. Rendering itself (readiness detection and
//! extraction) lives in the `render` submodule.

mod context;
mod events;
mod render;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::info;

use crate::artifact::RenderFormat;
use crate::error::RenderError;
use crate::mhtml::{ENCODING_BASE64_ENCODED, ENCODING_QUOTED_PRINTABLE};
use crate::protocol::PageDescriptor;
use crate::session::Session;

use context::{RenderContext, RenderOutcome, RenderSlot};

/// Wall cap for enabling all protocol domains.
const ENABLE_EVENTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Viewport height assumed for scroll stepping.
const WINDOW_HEIGHT: i64 = 600;

/// One addressable tab, driven over its own WebSocket. Cheap to clone.
#[derive(Clone)]
pub struct Page {
    inner: Arc<PageInner>,
}

struct PageInner {
    id: String,
    iteration: AtomicU32,
    window_height: i64,
    session: Session,
    ctx: Arc<Mutex<RenderContext>>,
    render_rx: Mutex<Option<tokio::sync::oneshot::Receiver<RenderOutcome>>>,
}

impl Page {
    pub fn new(descriptor: &PageDescriptor) -> Result<Self, RenderError> {
        let ws_url = descriptor.web_socket_debugger_url.clone().ok_or_else(|| {
            RenderError::InvalidResponse(format!(
                "page {} has no WebSocket debugger URL",
                descriptor.id
            ))
        })?;

        let (slot, rx) = RenderSlot::new();
        let page = Self {
            inner: Arc::new(PageInner {
                id: descriptor.id.clone(),
                iteration: AtomicU32::new(0),
                window_height: WINDOW_HEIGHT,
                session: Session::new(ws_url),
                ctx: Arc::new(Mutex::new(RenderContext::new(slot))),
                render_rx: Mutex::new(Some(rx)),
            }),
        };
        page.install_fault_sink();
        Ok(page)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Completed non-blank navigations on this page.
    pub fn iteration(&self) -> u32 {
        self.inner.iteration.load(Ordering::SeqCst)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.session.is_attached()
    }

    pub(crate) fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Record the per-render proxy override on the context.
    pub fn set_render_proxy(&self, proxy: Option<String>) {
        self.inner.ctx.lock().proxy = proxy;
    }

    /// Open the WebSocket, subscribe the built-in events and enable the
    /// protocol domains.
    pub async fn attach(&self) -> Result<(), RenderError> {
        self.register_builtin_events();
        self.inner.session.attach().await?;
        tokio::time::timeout(ENABLE_EVENTS_TIMEOUT, self.enable_events())
            .await
            .map_err(|_| RenderError::Timeout("enabling protocol domains".to_string()))??;
        Ok(())
    }

    /// Tear the session down and reset per-render state so the page can
    /// be leased again.
    pub async fn detach(&self) {
        self.inner.session.detach().await;
        self.reset();
    }

    /// Enable all event domains a render observes, concurrently.
    pub async fn enable_events(&self) -> Result<(), RenderError> {
        let enables = [
            "Page.enable",
            "DOM.enable",
            "Log.enable",
            "Network.enable",
            "Inspector.enable",
            "LayerTree.enable",
        ];
        futures::future::try_join_all(
            enables
                .into_iter()
                .map(|method| self.inner.session.send(method, None)),
        )
        .await?;
        Ok(())
    }

    pub async fn set_user_agent(&self, user_agent: &str) -> Result<(), RenderError> {
        self.inner
            .session
            .send(
                "Network.setUserAgentOverride",
                Some(json!({"userAgent": user_agent})),
            )
            .await?;
        Ok(())
    }

    /// Navigate the page. Anything but `about:blank` counts as an
    /// iteration for the recycling clock.
    pub async fn navigate(&self, url: &str) -> Result<Value, RenderError> {
        if url != "about:blank" {
            let iteration = self.inner.iteration.fetch_add(1, Ordering::SeqCst) + 1;
            info!(page_id = %self.inner.id, iteration, %url, "navigating");
        }
        self.inner
            .session
            .send("Page.navigate", Some(json!({"url": url})))
            .await
    }

    /// Evaluate a JavaScript expression; returns the full result object.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, RenderError> {
        self.inner
            .session
            .send("Runtime.evaluate", Some(json!({"expression": expression})))
            .await
    }

    /// The document's outer HTML.
    pub async fn get_html(&self) -> Result<String, RenderError> {
        let document = self.inner.session.send("DOM.getDocument", None).await?;
        let node_id = document
            .pointer("/root/nodeId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                RenderError::InvalidResponse("DOM.getDocument missing root node id".to_string())
            })?;

        let outer = self
            .inner
            .session
            .send("DOM.getOuterHTML", Some(json!({"nodeId": node_id})))
            .await?;
        outer
            .get("outerHTML")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                RenderError::InvalidResponse("DOM.getOuterHTML missing outerHTML".to_string())
            })
    }

    /// Fetch a response body and append it to the archive accumulator.
    pub(crate) async fn get_response_body(&self, request_id: &str) -> Result<(), RenderError> {
        self.inner
            .ctx
            .lock()
            .res_body_in_flight
            .insert(request_id.to_string());

        let result = self
            .inner
            .session
            .send(
                "Network.getResponseBody",
                Some(json!({"requestId": request_id})),
            )
            .await;

        let mut ctx = self.inner.ctx.lock();
        ctx.res_body_in_flight.remove(request_id);
        let body_obj = result?;

        if let Some(body) = body_obj.get("body").and_then(Value::as_str) {
            let base64_encoded = body_obj
                .get("base64Encoded")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let response = ctx
                .responses_received
                .get(request_id)
                .and_then(|params| params.get("response"))
                .cloned();
            if let Some(response) = response {
                let url = response.get("url").and_then(Value::as_str).unwrap_or("");
                let mime_type = response
                    .get("mimeType")
                    .and_then(Value::as_str)
                    .unwrap_or("application/octet-stream");
                let encoding = if base64_encoded {
                    ENCODING_BASE64_ENCODED
                } else {
                    ENCODING_QUOTED_PRINTABLE
                };
                ctx.mhtml.add(url, mime_type, body.as_bytes(), encoding)?;
            }
        }
        Ok(())
    }

    pub async fn print_to_pdf(&self) -> Result<Vec<u8>, RenderError> {
        let result = self.inner.session.send("Page.printToPDF", None).await?;
        decode_base64_field(&result, "data")
    }

    pub async fn screenshot(&self, format: RenderFormat) -> Result<Vec<u8>, RenderError> {
        let result = self
            .inner
            .session
            .send(
                "Page.captureScreenshot",
                Some(json!({"format": format.as_str(), "fromSurface": true})),
            )
            .await?;
        decode_base64_field(&result, "data")
    }

    /// Rendered page height in pixels.
    pub async fn get_page_height(&self) -> Result<i64, RenderError> {
        let expression = "Math.max(document.body.scrollHeight, document.body.offsetHeight, \
             document.documentElement.clientHeight, document.documentElement.scrollHeight, \
             document.documentElement.offsetHeight)";
        let result = self.evaluate(expression).await?;
        result_value(&result)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or_else(|| RenderError::InvalidResponse("page height is not a number".to_string()))
    }

    /// The page's HTTP-like status: `window.prerenderStatusCode` when the
    /// page declares one, otherwise the status of the response whose url
    /// matches the tracked (possibly redirected) url, defaulting to 200.
    pub async fn get_status_code(&self) -> Result<u16, RenderError> {
        let result = self.evaluate("window.prerenderStatusCode").await?;
        let declared = result_value(&result).filter(|v| !v.is_null());
        if let Some(value) = declared {
            if value.as_str() != Some("undefined") {
                let status = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
                    .filter(|s| (100..=599).contains(s))
                    .unwrap_or(200);
                return Ok(status as u16);
            }
        }

        let ctx = self.inner.ctx.lock();
        if let Some(url) = ctx.url.as_deref() {
            for params in ctx.responses_received.values() {
                if let Some(response) = params.get("response") {
                    if response.get("url").and_then(Value::as_str) == Some(url) {
                        if let Some(status) = response.get("status").and_then(Value::as_i64) {
                            return Ok(status as u16);
                        }
                    }
                }
            }
        }
        Ok(200)
    }

    /// Scroll down in viewport increments so lazy-loaded images fetch.
    pub(crate) async fn scroll_to_bottom(&self) -> Result<(), RenderError> {
        let height = self.get_page_height().await?;
        let window_height = self.inner.window_height;
        let steps = (height + window_height - 1) / window_height;
        for i in 1..=steps {
            let scroll_y = (window_height * i).min(height);
            self.evaluate(&format!("window.scrollTo(0, {scroll_y})")).await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// Recreate the render context and completion slot.
    pub(crate) fn reset(&self) {
        let (slot, rx) = RenderSlot::new();
        *self.inner.ctx.lock() = RenderContext::new(slot);
        *self.inner.render_rx.lock() = Some(rx);
        self.install_fault_sink();
    }

    fn install_fault_sink(&self) {
        let ctx = self.inner.ctx.clone();
        self.inner.session.set_fault_sink(Some(Arc::new(move |err| {
            let slot = ctx.lock().slot.clone();
            slot.complete(Err(err));
        })));
    }

    pub(crate) fn complete_render(&self, outcome: RenderOutcome) {
        let slot = self.inner.ctx.lock().slot.clone();
        slot.complete(outcome);
    }

    fn ctx(&self) -> &Arc<Mutex<RenderContext>> {
        &self.inner.ctx
    }
}

/// `Runtime.evaluate` responses nest the value at `result.value`.
fn result_value(result: &Value) -> Option<&Value> {
    result.pointer("/result/value")
}

fn decode_base64_field(result: &Value, field: &str) -> Result<Vec<u8>, RenderError> {
    let data = result.get(field).and_then(Value::as_str).ok_or_else(|| {
        RenderError::InvalidResponse(format!("response missing '{field}' payload"))
    })?;
    BASE64
        .decode(data)
        .map_err(|e| RenderError::InvalidResponse(format!("invalid base64 payload: {e}")))
}

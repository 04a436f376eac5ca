//! Built-in event subscriptions installed at attach time.
//!
//! Network and page events feed the render context: request/response
//! accounting for the readiness detector, redirect tracking, and the
//! activity timestamp behind the quiescence window. Inspector events
//! surface browser-side page death as `TemporaryBrowserFailure`.

use futures::future;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::RenderError;

use super::Page;

/// Events that only prove the page is still busy.
const ACTIVITY_EVENTS: &[&str] = &[
    "Network.dataReceived",
    "Network.resourceChangedPriority",
    "Network.webSocketWillSendHandshakeRequest",
    "Network.webSocketHandshakeResponseReceived",
    "Network.webSocketCreated",
    "Network.webSocketClosed",
    "Network.webSocketFrameReceived",
    "Network.webSocketFrameError",
    "Network.webSocketFrameSent",
    "Network.eventSourceMessageReceived",
    "Page.domContentEventFired",
    "Page.frameAttached",
    "Page.frameNavigated",
    "Page.frameDetached",
    "Page.frameStartedLoading",
    "Page.frameStoppedLoading",
    "DOM.documentUpdated",
    "LayerTree.layerTreeDidChange",
    "LayerTree.layerPainted",
];

impl Page {
    pub(crate) fn register_builtin_events(&self) {
        let session = self.session().clone();

        session.on("Inspector.detached", |params: Value| {
            let reason = params
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            async move {
                Err(RenderError::TemporaryBrowserFailure(format!(
                    "Inspector detached: {reason}"
                )))
            }
            .boxed()
        });

        session.on("Inspector.targetCrashed", |_params: Value| {
            async move {
                Err(RenderError::TemporaryBrowserFailure(
                    "Inspector target crashed".to_string(),
                ))
            }
            .boxed()
        });

        {
            let ctx = self.ctx().clone();
            session.on("Log.entryAdded", move |params: Value| {
                ctx.lock().touch();
                log_console_entry(&params);
                future::ready(Ok(())).boxed()
            });
        }

        {
            let ctx = self.ctx().clone();
            session.on("Network.requestWillBeSent", move |params: Value| {
                let mut ctx = ctx.lock();
                ctx.touch();
                match params.get("redirectResponse") {
                    None => ctx.requests_sent += 1,
                    Some(redirect) => {
                        // A redirect of the tracked url moves the target.
                        let from = redirect.get("url").and_then(Value::as_str);
                        if from.is_some() && from == ctx.url.as_deref() {
                            if let Some(location) =
                                header_lookup(redirect.get("headers"), "location")
                            {
                                ctx.url = Some(location);
                            }
                        }
                    }
                }
                future::ready(Ok(())).boxed()
            });
        }

        for method in ["Network.responseReceived", "Network.loadingFailed"] {
            let ctx = self.ctx().clone();
            session.on(method, move |params: Value| {
                let request_id = params
                    .get("requestId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                {
                    let mut ctx = ctx.lock();
                    ctx.touch();
                    if let Some(response) = params.get("response") {
                        if !is_response_ok(Some(response)) {
                            warn!(
                                url = response.get("url").and_then(serde_json::Value::as_str).unwrap_or(""),
                                status = response.get("status").and_then(serde_json::Value::as_i64).unwrap_or(0),
                                "asset response not ok"
                            );
                        }
                    }
                    if let Some(request_id) = request_id {
                        ctx.responses_received.insert(request_id, params);
                    }
                    debug!(
                        requests_sent = ctx.requests_sent,
                        responses_received = ctx.responses_received.len(),
                        "network progress"
                    );
                }
                future::ready(Ok(())).boxed()
            });
        }

        for &method in ACTIVITY_EVENTS {
            let ctx = self.ctx().clone();
            session.on(method, move |_params: Value| {
                ctx.lock().touch();
                future::ready(Ok(())).boxed()
            });
        }
    }
}

/// A recorded response counts as ok when it exists and is below 400.
pub(crate) fn is_response_ok(response: Option<&Value>) -> bool {
    match response.and_then(|r| r.get("status")).and_then(Value::as_i64) {
        Some(status) => status < 400,
        None => false,
    }
}

/// Case-insensitive header lookup in an event's header object.
pub(crate) fn header_lookup(headers: Option<&Value>, name: &str) -> Option<String> {
    let headers = headers?.as_object()?;
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string)
}

/// Surface browser console output in our own logs.
fn log_console_entry(params: &Value) {
    let entry = match params.get("entry") {
        Some(entry) => entry,
        None => return,
    };
    let level = entry.get("level").and_then(Value::as_str).unwrap_or("info");
    let source = entry.get("source").and_then(Value::as_str).unwrap_or("");
    let text = entry.get("text").and_then(Value::as_str).unwrap_or("");
    let mut resource = entry
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    if let Some(line) = entry.get("lineNumber").and_then(Value::as_i64) {
        resource = format!("{resource}:{line}");
    }
    match level {
        "error" => warn!(%resource, %source, "console error: {text}"),
        "warning" => warn!(%resource, %source, "console warning: {text}"),
        _ => info!(%resource, %source, "console {level}: {text}"),
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;

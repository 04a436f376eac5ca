//! A scripted stand-in for a headless browser.
//!
//! Serves the per-page WebSocket endpoint of the remote debugging
//! protocol: answers requests with canned results and emits the event
//! sequence of a page load after `Page.navigate`. Behavior knobs let
//! individual tests script redirects, failing assets, crashes and the
//! `window.prerenderReady` sentinel.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Scriptable page behavior, shared with the running server.
pub struct Behavior {
    /// Outer HTML served by `DOM.getOuterHTML`.
    pub html: Mutex<String>,
    /// Emit `Inspector.targetCrashed` instead of finishing the load.
    pub crash_on_navigate: AtomicBool,
    /// Subresource responses beyond the document itself.
    pub subresource_count: AtomicUsize,
    /// How many of those subresources fail with 404.
    pub failed_subresources: AtomicUsize,
    /// Redirect the document request here before answering.
    pub redirect_location: Mutex<Option<String>>,
    /// Status of the final document response.
    pub document_status: AtomicUsize,
    /// Whether the page defines `window.prerenderReady` at all.
    pub defines_prerender_ready: AtomicBool,
    /// Milliseconds after attach before the sentinel turns truthy.
    pub prerender_ready_delay_ms: AtomicU64,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            html: Mutex::new("<html><body>rendered</body></html>".to_string()),
            crash_on_navigate: AtomicBool::new(false),
            subresource_count: AtomicUsize::new(0),
            failed_subresources: AtomicUsize::new(0),
            redirect_location: Mutex::new(None),
            document_status: AtomicUsize::new(200),
            defines_prerender_ready: AtomicBool::new(false),
            prerender_ready_delay_ms: AtomicU64::new(0),
        }
    }
}

pub struct FakeChrome {
    pub ws_url: String,
    pub behavior: Arc<Behavior>,
}

impl FakeChrome {
    /// Bind the WebSocket endpoint and start accepting page sessions.
    pub async fn start() -> Self {
        let behavior = Arc::new(Behavior::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept_behavior = behavior.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let behavior = accept_behavior.clone();
                tokio::spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                        serve_page(ws, behavior).await;
                    }
                });
            }
        });

        Self {
            ws_url: format!("ws://{addr}/devtools/page/fake"),
            behavior,
        }
    }
}

async fn serve_page(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    behavior: Arc<Behavior>,
) {
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let attached_at = Instant::now();
    while let Some(Ok(msg)) = source.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(request) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        let id = request["id"].as_u64().unwrap_or(0);
        let method = request["method"].as_str().unwrap_or("");

        match method {
            "Page.navigate" => {
                let url = request["params"]["url"].as_str().unwrap_or("").to_string();
                respond(&tx, id, json!({"frameId": "frame-1"}));
                if url != "about:blank" {
                    emit_page_load(&tx, &behavior, &url);
                }
            }
            "Runtime.evaluate" => {
                let expression = request["params"]["expression"].as_str().unwrap_or("");
                let inner = evaluate(expression, &behavior, attached_at);
                respond(&tx, id, json!({"result": inner}));
            }
            "DOM.getDocument" => respond(&tx, id, json!({"root": {"nodeId": 1}})),
            "DOM.getOuterHTML" => {
                let html = behavior.html.lock().clone();
                respond(&tx, id, json!({"outerHTML": html}));
            }
            "Page.printToPDF" => {
                respond(&tx, id, json!({"data": BASE64.encode(b"%PDF-1.4 fake document")}));
            }
            "Page.captureScreenshot" => {
                respond(&tx, id, json!({"data": BASE64.encode(b"\x89PNG fake image")}));
            }
            "Network.getResponseBody" => {
                respond(
                    &tx,
                    id,
                    json!({"body": "<html><body>sub</body></html>", "base64Encoded": false}),
                );
            }
            _ => respond(&tx, id, json!({})),
        }
    }
}

fn evaluate(expression: &str, behavior: &Behavior, attached_at: Instant) -> Value {
    if expression.contains("window.prerenderReady == true") {
        let defined = behavior.defines_prerender_ready.load(Ordering::SeqCst);
        let delay = behavior.prerender_ready_delay_ms.load(Ordering::SeqCst);
        let ready = defined && attached_at.elapsed().as_millis() as u64 >= delay;
        return json!({"type": "boolean", "value": ready});
    }
    if expression.contains("typeof window.prerenderReady") {
        let defined = behavior.defines_prerender_ready.load(Ordering::SeqCst);
        return json!({"type": "boolean", "value": !defined});
    }
    if expression.contains("prerenderStatusCode") {
        return json!({"type": "undefined"});
    }
    if expression.contains("scrollHeight") {
        return json!({"type": "number", "value": 600});
    }
    json!({"type": "undefined"})
}

/// The event sequence of a page load, in protocol order.
fn emit_page_load(tx: &mpsc::UnboundedSender<String>, behavior: &Behavior, url: &str) {
    if behavior.crash_on_navigate.load(Ordering::SeqCst) {
        emit(tx, "Inspector.targetCrashed", json!({}));
        return;
    }

    emit(tx, "Network.requestWillBeSent", json!({"requestId": "req-0"}));

    let document_url = match behavior.redirect_location.lock().clone() {
        Some(location) => {
            emit(
                tx,
                "Network.requestWillBeSent",
                json!({
                    "requestId": "req-0",
                    "redirectResponse": {
                        "url": url,
                        "status": 302,
                        "headers": {"Location": location}
                    }
                }),
            );
            location
        }
        None => url.to_string(),
    };

    let status = behavior.document_status.load(Ordering::SeqCst);
    emit(
        tx,
        "Network.responseReceived",
        json!({
            "requestId": "req-0",
            "response": {"url": document_url, "status": status, "mimeType": "text/html"}
        }),
    );
    emit(tx, "Network.loadingFinished", json!({"requestId": "req-0"}));

    let subresources = behavior.subresource_count.load(Ordering::SeqCst);
    let failed = behavior.failed_subresources.load(Ordering::SeqCst);
    for i in 1..=subresources {
        let request_id = format!("req-{i}");
        emit(tx, "Network.requestWillBeSent", json!({"requestId": request_id}));
        let status = if i <= failed { 404 } else { 200 };
        emit(
            tx,
            "Network.responseReceived",
            json!({
                "requestId": request_id,
                "response": {
                    "url": format!("{url}/asset-{i}.css"),
                    "status": status,
                    "mimeType": "text/css"
                }
            }),
        );
        emit(tx, "Network.loadingFinished", json!({"requestId": request_id}));
    }

    emit(tx, "Page.loadEventFired", json!({"timestamp": 1.0}));
}

fn respond(tx: &mpsc::UnboundedSender<String>, id: u64, result: Value) {
    let _ = tx.send(json!({"id": id, "result": result}).to_string());
}

fn emit(tx: &mpsc::UnboundedSender<String>, method: &str, params: Value) {
    let _ = tx.send(json!({"method": method, "params": params}).to_string());
}

/// Wire the fake page behind wiremock `/json/*` control endpoints so a
/// pool can discover, create and close pages against it.
pub async fn mount_control_endpoints(
    server: &wiremock::MockServer,
    ws_url: &str,
) -> Arc<AtomicUsize> {
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, Request, Respond, ResponseTemplate};

    struct NewPage {
        ws_url: String,
        counter: Arc<AtomicUsize>,
    }

    impl Respond for NewPage {
        fn respond(&self, _request: &Request) -> ResponseTemplate {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(200).set_body_json(json!({
                "id": format!("page-{n}"),
                "type": "page",
                "title": "",
                "url": "about:blank",
                "webSocketDebuggerUrl": self.ws_url,
            }))
        }
    }

    let counter = Arc::new(AtomicUsize::new(0));
    Mock::given(method("GET"))
        .and(path("/json/new"))
        .respond_with(NewPage {
            ws_url: ws_url.to_string(),
            counter: counter.clone(),
        })
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/json/close/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Target is closing"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/json/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/json/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Browser": "HeadlessChrome/59.0.3033.0",
            "Protocol-Version": "1.2",
            "User-Agent": "Mozilla/5.0",
            "webSocketDebuggerUrl": "ws://unused/devtools/browser"
        })))
        .mount(server)
        .await;

    counter
}

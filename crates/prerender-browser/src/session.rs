//! Remote debugging session: one WebSocket to one page.
//!
//! The session owns the write half of the socket and a background read
//! loop. Responses are matched to waiters through a map of oneshot
//! completions keyed by request id; events are dispatched to subscribed
//! handlers. Handlers run as their own tasks so a handler that issues new
//! requests never blocks the reader; terminating the loop aborts all of
//! them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::RenderError;
use crate::protocol::{CdpMessage, CdpRequest};

/// Frame size cap; the DOM of a heavy page fits well under this.
const MAX_FRAME_BYTES: usize = 5 * 1024 * 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Subscribed event handler. Receives the raw event params.
pub type EventHandler =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<(), RenderError>> + Send + Sync>;

/// Where handler and read-loop failures are routed; the page points this
/// at the current render's completion slot.
pub type FaultSink = Arc<dyn Fn(RenderError) + Send + Sync>;

/// A single open WebSocket to one page. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    ws_url: String,
    next_id: AtomicU64,
    attached: AtomicBool,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<Value, RenderError>>>>,
    subscriptions: RwLock<HashMap<String, EventHandler>>,
    fault: Mutex<Option<FaultSink>>,
    read_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    pub fn new(ws_url: String) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                ws_url,
                next_id: AtomicU64::new(1),
                attached: AtomicBool::new(false),
                writer: tokio::sync::Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                fault: Mutex::new(None),
                read_task: Mutex::new(None),
            }),
        }
    }

    /// Open the WebSocket and start the background read loop.
    pub async fn attach(&self) -> Result<(), RenderError> {
        let config = WebSocketConfig::default()
            .max_message_size(Some(MAX_FRAME_BYTES))
            .max_frame_size(Some(MAX_FRAME_BYTES));

        debug!(url = %self.inner.ws_url, "connecting to page");
        let (stream, _) =
            connect_async_with_config(self.inner.ws_url.as_str(), Some(config), false).await?;
        let (sink, source) = stream.split();

        *self.inner.writer.lock().await = Some(sink);
        self.inner.attached.store(true, Ordering::SeqCst);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.read_loop(source).await });
        if let Some(old) = self.inner.read_task.lock().replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Cancel the read loop and close the socket. In-flight waiters fail
    /// with `ConnectionClosed`; subscriptions are dropped.
    pub async fn detach(&self) {
        if let Some(task) = self.inner.read_task.lock().take() {
            task.abort();
        }
        if let Some(mut sink) = self.inner.writer.lock().await.take() {
            let _ = sink.close().await;
        }
        self.inner.attached.store(false, Ordering::SeqCst);
        self.inner.subscriptions.write().clear();
        self.inner.fail_pending();
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::SeqCst)
    }

    /// Issue a request and await the matching response.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<Value, RenderError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&CdpRequest {
            id,
            method: method.to_string(),
            params,
        })?;
        trace!(%frame, "send");

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        let write_result = {
            let mut writer = self.inner.writer.lock().await;
            match writer.as_mut() {
                Some(sink) => sink
                    .send(Message::Text(frame.into()))
                    .await
                    .map_err(RenderError::from),
                None => Err(RenderError::ConnectionClosed),
            }
        };
        if let Err(e) = write_result {
            self.inner.pending.lock().remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(RenderError::ConnectionClosed),
        }
    }

    /// Subscribe a handler for an event method. Idempotent;
    /// a later subscription for the same method replaces the earlier one.
    pub fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> BoxFuture<'static, Result<(), RenderError>> + Send + Sync + 'static,
    {
        self.inner
            .subscriptions
            .write()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Route handler and read-loop failures somewhere (normally the
    /// current render's completion slot).
    pub fn set_fault_sink(&self, sink: Option<FaultSink>) {
        *self.inner.fault.lock() = sink;
    }
}

impl SessionInner {
    async fn read_loop(self: Arc<Self>, mut source: WsSource) {
        let mut handlers: JoinSet<Result<(), RenderError>> = JoinSet::new();

        loop {
            tokio::select! {
                Some(finished) = handlers.join_next(), if !handlers.is_empty() => {
                    self.route_handler_result(finished);
                }
                msg = source.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        trace!(frame = %text, "recv");
                        match serde_json::from_str::<CdpMessage>(text.as_str()) {
                            Ok(frame) => self.dispatch(frame, &mut handlers),
                            Err(e) => warn!("failed to parse protocol frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!("websocket closed by peer");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("websocket error: {e}");
                        break;
                    }
                    None => break,
                }
            }
        }

        // The socket is gone: in-flight requests fail rather than hang,
        // finished handlers still get their errors routed, and the rest
        // are torn down with the loop.
        self.attached.store(false, Ordering::SeqCst);
        self.fail_pending();
        while let Some(finished) = handlers.try_join_next() {
            self.route_handler_result(finished);
        }
        handlers.abort_all();
    }

    fn route_handler_result(
        &self,
        finished: Result<Result<(), RenderError>, tokio::task::JoinError>,
    ) {
        match finished {
            Ok(Err(err)) => self.route_fault(err),
            Ok(Ok(())) => {}
            Err(join_err) if join_err.is_panic() => self.route_fault(
                RenderError::InvalidResponse(format!("event handler panicked: {join_err}")),
            ),
            Err(_) => {}
        }
    }

    /// Route one inbound frame. A frame carrying both `id` and `method`
    /// resolves the waiter and fires the handler.
    fn dispatch(self: &Arc<Self>, frame: CdpMessage, handlers: &mut JoinSet<Result<(), RenderError>>) {
        let CdpMessage {
            id,
            result,
            error,
            method,
            params,
        } = frame;

        if let Some(id) = id {
            if let Some(tx) = self.pending.lock().remove(&id) {
                let outcome = match error {
                    Some(body) => Err(RenderError::Protocol {
                        code: body.code,
                        message: body.message,
                    }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(outcome);
            }
        }

        if let Some(method) = method {
            let handler = self.subscriptions.read().get(&method).cloned();
            if let Some(handler) = handler {
                handlers.spawn(handler(params.unwrap_or(Value::Null)));
            }
        }
    }

    fn route_fault(&self, err: RenderError) {
        let sink = self.fault.lock().clone();
        match sink {
            Some(sink) => sink(err),
            None => warn!("unrouted session failure: {err}"),
        }
    }

    fn fail_pending(&self) {
        let waiters: Vec<_> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        for (_, tx) in waiters {
            let _ = tx.send(Err(RenderError::ConnectionClosed));
        }
    }
}

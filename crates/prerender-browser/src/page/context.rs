//! Per-render state carried between the event handlers and the driver.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::artifact::Artifact;
use crate::error::RenderError;
use crate::mhtml::Mhtml;

pub(crate) type RenderOutcome = Result<(Artifact, u16), RenderError>;

/// Single-shot completion slot for the final artifact. The first caller
/// wins; later completions are dropped.
pub(crate) struct RenderSlot {
    tx: Mutex<Option<oneshot::Sender<RenderOutcome>>>,
}

impl RenderSlot {
    pub(crate) fn new() -> (Arc<Self>, oneshot::Receiver<RenderOutcome>) {
        let (tx, rx) = oneshot::channel();
        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Returns false if the slot was already completed.
    pub(crate) fn complete(&self, outcome: RenderOutcome) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

/// State accumulated while one render is in flight. Reset between leases.
pub(crate) struct RenderContext {
    /// Target URL; follows the redirect chain.
    pub url: Option<String>,
    /// Proxy override requested for this render; recorded for diagnostics.
    pub proxy: Option<String>,
    /// Top-level request starts. Redirects of the same logical request do
    /// not increment this.
    pub requests_sent: u64,
    /// Browser request id -> `Network.responseReceived` params
    /// (failed loads included).
    pub responses_received: HashMap<String, Value>,
    /// Browser request ids with a `getResponseBody` call in flight.
    pub res_body_in_flight: HashSet<String>,
    /// Archive accumulator for mhtml renders.
    pub mhtml: Mhtml,
    /// Last observed network/DOM/frame/log signal.
    pub last_active: Option<Instant>,
    pub slot: Arc<RenderSlot>,
}

impl RenderContext {
    pub(crate) fn new(slot: Arc<RenderSlot>) -> Self {
        Self {
            url: None,
            proxy: None,
            requests_sent: 0,
            responses_received: HashMap::new(),
            res_body_in_flight: HashSet::new(),
            mhtml: Mhtml::new(),
            last_active: None,
            slot,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_active = Some(Instant::now());
    }
}

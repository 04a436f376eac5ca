//! Remote debugging protocol types and frame definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound JSON-RPC request frame.
#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Inbound frame: a response (correlated by `id`), an event (dispatched
/// by `method`), or both at once. Mixed arrival is normal.
#[derive(Debug, Deserialize)]
pub struct CdpMessage {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorBody>,
    pub method: Option<String>,
    pub params: Option<Value>,
}

/// Error body of a failed response.
#[derive(Debug, Deserialize)]
pub struct CdpErrorBody {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// Page descriptor from the browser's `/json/list` and `/json/new`
/// endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
    #[serde(rename = "devtoolsFrontendUrl", skip_serializing_if = "Option::is_none")]
    pub devtools_frontend_url: Option<String>,
}

impl PageDescriptor {
    /// A descriptor without a WebSocket URL is not debuggable; neither is
    /// anything that is not a page (service workers, extensions, ...).
    pub fn is_debuggable(&self) -> bool {
        self.kind == "page" && self.web_socket_debugger_url.is_some()
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;

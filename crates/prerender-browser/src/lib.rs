//! Headless Chrome rendering engine for the prerender gateway.
//!
//! Drives browser pages over the remote debugging protocol: a WebSocket
//! JSON-RPC session per page with interleaved responses and events, a
//! readiness heuristic that decides when a page has finished rendering,
//! per-format extraction (HTML, MHTML, PDF, PNG, JPEG), and a fixed-size
//! page pool with crash recovery and recycling.
//!
//! ```text
//! ┌───────────┐  /json/*   ┌─────────────────┐
//! │  PagePool │ ─────────► │     Chrome      │
//! │           │  WebSocket │ (one socket per │
//! │ Page,Page │ ◄────────► │   pooled page)  │
//! └───────────┘    CDP     └─────────────────┘
//! ```
//!
//! A render leases a page, attaches its session, navigates, waits for
//! load + network quiescence (or the page's own `window.prerenderReady`
//! sentinel), extracts the artifact, and recycles the page.

mod artifact;
mod debugger;
mod error;
mod mhtml;
mod page;
mod pool;
mod protocol;
mod session;

pub use artifact::{Artifact, RenderFormat};
pub use debugger::Debugger;
pub use error::RenderError;
pub use mhtml::{
    Mhtml, ENCODING_BASE64, ENCODING_BASE64_ENCODED, ENCODING_QUOTED_PRINTABLE,
};
pub use page::Page;
pub use pool::{PagePool, PagePoolConfig};
pub use protocol::{CdpErrorBody, CdpMessage, CdpRequest, PageDescriptor};
pub use session::{EventHandler, FaultSink, Session};

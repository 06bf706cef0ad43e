//! Transport layer implementations for WebSocket and stdio communication
//!
//! Both bindings implement [`MessageChannel`] and are driven by the same
//! [`serve_channel`] loop, so framing is the only thing that differs between
//! them. Routing lives behind [`McpDispatcher`].

use async_trait::async_trait;
use daz_foundation::codec::Envelope;
use daz_foundation::errors::DazResult;
use daz_foundation::model::mcp::McpResponse;

pub mod channel;
pub mod stdio;
pub mod ws;

pub use channel::{handle_frame, serve_channel};
pub use stdio::{start_stdio_server, LineChannel};
pub use ws::{run_ws_server, start_ws_server, WsChannel};

/// MCP message dispatcher trait for transport layer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait McpDispatcher: Send + Sync {
    /// Dispatch one decoded envelope
    ///
    /// Requests must yield `Some(response)`, notifications `None`. An `Err`
    /// is reported to the client as a -32000 server error.
    async fn dispatch(&self, envelope: Envelope) -> DazResult<Option<McpResponse>>;
}

/// One bidirectional, message-framed channel
#[async_trait]
pub trait MessageChannel: Send {
    /// Next raw frame; `None` once the peer closed the channel
    async fn receive(&mut self) -> DazResult<Option<String>>;

    /// Write one frame, fully flushed before returning
    async fn send(&mut self, frame: &str) -> DazResult<()>;
}

//! WebSocket transport implementation

use crate::{serve_channel, McpDispatcher, MessageChannel};
use async_trait::async_trait;
use daz_config::AppConfig;
use daz_foundation::errors::{DazError, DazResult};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{accept_async, WebSocketStream};

/// One WebSocket connection seen as a message channel
///
/// Text frames are messages. Binary frames are accepted and read as UTF-8.
/// Control frames are handled by the protocol layer and never surface.
pub struct WsChannel<S> {
    stream: WebSocketStream<S>,
}

impl<S> WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl<S> MessageChannel for WsChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> DazResult<Option<String>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => {
                    return Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(close_frame = ?frame, "Client sent close frame");
                    return Ok(None);
                }
                Ok(_) => continue,
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return Ok(None),
                Err(e) => return Err(DazError::transport(format!("WebSocket error: {}", e))),
            }
        }
        Ok(None)
    }

    async fn send(&mut self, frame: &str) -> DazResult<()> {
        self.stream
            .send(Message::Text(frame.to_owned().into()))
            .await
            .map_err(|e| DazError::transport(format!("Failed to send WebSocket frame: {}", e)))
    }
}

/// Connection guard that tracks active connections
///
/// Increments counter on creation, decrements on drop.
/// Used to enforce max_clients limit.
struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bind the configured address and serve WebSocket clients forever
pub async fn start_ws_server(
    config: Arc<AppConfig>,
    dispatcher: Arc<dyn McpDispatcher>,
) -> DazResult<()> {
    if !config.server.is_loopback_host() {
        tracing::warn!(
            host = %config.server.host,
            "WebSocket server bound to a non-loopback address without authentication. \
             Any client that can reach it may run DAZ Studio scripts."
        );
    }

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DazError::bootstrap(format!("Failed to bind to {}: {}", addr, e)))?;

    tracing::info!("WebSocket server listening on ws://{}", addr);

    run_ws_server(listener, config, dispatcher).await
}

/// Accept loop over an already bound listener
///
/// Every connection gets its own task; a slow tool call on one connection
/// never blocks another.
pub async fn run_ws_server(
    listener: TcpListener,
    config: Arc<AppConfig>,
    dispatcher: Arc<dyn McpDispatcher>,
) -> DazResult<()> {
    let active_connections = Arc::new(AtomicUsize::new(0));

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        if let Some(max_clients) = config.server.max_clients {
            let current = active_connections.load(Ordering::SeqCst);
            if current >= max_clients {
                tracing::warn!(
                    current_connections = current,
                    max_clients = max_clients,
                    client_addr = %addr,
                    "Max clients limit reached, rejecting connection"
                );
                // Connection will be dropped, closing the socket
                continue;
            }
        }

        tracing::debug!(client_addr = %addr, "New connection");

        let guard = ConnectionGuard::new(active_connections.clone());
        let dispatcher = dispatcher.clone();

        tokio::spawn(async move {
            let _guard = guard;
            handle_connection(stream, addr, dispatcher).await;
        });
    }
}

async fn handle_connection(stream: TcpStream, addr: SocketAddr, dispatcher: Arc<dyn McpDispatcher>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            tracing::warn!(client_addr = %addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    tracing::info!(client_addr = %addr, "Client connected");

    let mut channel = WsChannel::new(ws_stream);
    match serve_channel(&mut channel, dispatcher.as_ref(), "websocket").await {
        Ok(()) => tracing::info!(client_addr = %addr, "Client disconnected"),
        Err(e) => tracing::warn!(client_addr = %addr, error = %e, "Connection closed with error"),
    }
}

//! Transport-independent message loop
//!
//! [`handle_frame`] is the fault boundary of the server: whatever happens
//! while decoding or dispatching a frame, it returns either a well-formed
//! reply or nothing (for notifications). [`serve_channel`] drives it over any
//! [`MessageChannel`] until the channel reports end-of-input.

use crate::{McpDispatcher, MessageChannel};
use daz_config::logging::request_span;
use daz_foundation::codec::{decode, encode};
use daz_foundation::errors::DazResult;
use daz_foundation::model::mcp::{McpError, McpMessage, McpResponse};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::{debug, error, info, warn, Instrument};

/// Longest prefix of a rejected frame that is logged
const PREVIEW_LEN: usize = 100;

/// Decode, dispatch and encode one raw frame
///
/// Returns the encoded reply, or `None` when nothing must be written back.
pub async fn handle_frame(dispatcher: &dyn McpDispatcher, frame: &str) -> Option<String> {
    let envelope = match decode(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            error!(
                error = %e,
                message_preview = %preview(frame),
                "Failed to parse MCP message"
            );
            return Some(encode(&McpMessage::Response(e.into_response())));
        }
    };

    let method = envelope.method().to_string();
    let request_id = envelope.id().cloned();
    debug!(method = %method, is_request = request_id.is_some(), "Dispatching message");

    let outcome = AssertUnwindSafe(async move { dispatcher.dispatch(envelope).await })
        .catch_unwind()
        .await;

    let response = match (outcome, request_id) {
        (Ok(Ok(Some(response))), Some(_)) => response,
        (Ok(Ok(None)), None) => return None,
        (Ok(Ok(Some(_))), None) => {
            warn!(method = %method, "Dropping reply produced for a notification");
            return None;
        }
        (Ok(Ok(None)), Some(id)) => {
            error!(method = %method, "Dispatcher produced no response for a request");
            McpResponse::failure(
                id,
                McpError::server_error(format!("no response produced for '{}'", method)),
            )
        }
        (Ok(Err(e)), Some(id)) => {
            error!(method = %method, error = %e, "Failed to handle message");
            McpResponse::failure(id, McpError::server_error(e.to_string()))
        }
        (Ok(Err(e)), None) => {
            error!(method = %method, error = %e, "Failed to handle notification");
            return None;
        }
        (Err(panic), id) => {
            let detail = panic_detail(panic.as_ref());
            error!(method = %method, panic = %detail, "Handler panicked");
            McpResponse::failure(
                id?,
                McpError::server_error(format!("handler panicked: {}", detail)),
            )
        }
    };

    Some(encode(&McpMessage::Response(response)))
}

/// Serve one channel until the peer closes it
///
/// Frames are handled strictly in arrival order: the next frame is not read
/// before the reply to the current one has been sent. Only a channel-level
/// failure ends the loop early.
pub async fn serve_channel<C>(
    channel: &mut C,
    dispatcher: &dyn McpDispatcher,
    transport: &'static str,
) -> DazResult<()>
where
    C: MessageChannel + ?Sized,
{
    loop {
        let frame = match channel.receive().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(transport = transport, "Channel closed by peer");
                return Ok(());
            }
            Err(e) => {
                error!(transport = transport, error = %e, "Failed to read from channel");
                return Err(e);
            }
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        let span = request_span(&request_id, transport);

        debug!(parent: &span, message_size = frame.len(), "Received message");

        let Some(reply) = handle_frame(dispatcher, &frame)
            .instrument(span.clone())
            .await
        else {
            continue;
        };

        if let Err(e) = channel.send(&reply).instrument(span).await {
            error!(transport = transport, error = %e, "Failed to send response");
            return Err(e);
        }
    }
}

fn preview(frame: &str) -> &str {
    match frame.char_indices().nth(PREVIEW_LEN) {
        Some((index, _)) => &frame[..index],
        None => frame,
    }
}

fn panic_detail(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Envelope codec: raw frames in, typed envelopes out
//!
//! Decoding never panics and never returns a bare `serde_json::Error` to the
//! transport; every failure becomes a [`DecodeError`] that knows which reply
//! to send back.

use crate::model::mcp::{McpError, McpMessage, McpNotification, McpRequest, McpResponse};
use serde_json::{json, Value};
use thiserror::Error;

/// An inbound message, classified by the presence of an `id` key
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Request(McpRequest),
    Notification(McpNotification),
}

impl Envelope {
    pub fn method(&self) -> &str {
        match self {
            Envelope::Request(request) => &request.method,
            Envelope::Notification(notification) => &notification.method,
        }
    }

    /// Correlation id, `None` for notifications
    pub fn id(&self) -> Option<&Value> {
        match self {
            Envelope::Request(request) => Some(&request.id),
            Envelope::Notification(_) => None,
        }
    }
}

/// Failure to turn a frame into an [`Envelope`]
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The frame is not valid JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Valid JSON, but not a request or notification object
    #[error("Invalid Request: {reason}")]
    InvalidRequest { id: Option<Value>, reason: String },
}

impl DecodeError {
    /// The reply a client receives for this failure
    ///
    /// Parse errors always carry a `null` id; invalid requests echo the id
    /// when the frame had one.
    pub fn into_response(self) -> McpResponse {
        let message = self.to_string();
        match self {
            DecodeError::Parse(_) => McpResponse::failure(Value::Null, McpError::parse_error(message)),
            DecodeError::InvalidRequest { id, .. } => McpResponse::failure(
                id.unwrap_or(Value::Null),
                McpError::invalid_request(message),
            ),
        }
    }
}

/// Decode one raw frame
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(text)?;

    let Value::Object(mut object) = value else {
        return Err(DecodeError::InvalidRequest {
            id: None,
            reason: "message must be a JSON object".to_string(),
        });
    };

    let id = object.remove("id");
    let method = match object.remove("method") {
        Some(Value::String(method)) => method,
        Some(_) => {
            return Err(DecodeError::InvalidRequest {
                id,
                reason: "method must be a string".to_string(),
            })
        }
        None => {
            return Err(DecodeError::InvalidRequest {
                id,
                reason: "missing method".to_string(),
            })
        }
    };
    let jsonrpc = match object.remove("jsonrpc") {
        Some(Value::String(version)) => version,
        _ => crate::model::mcp::JSONRPC_VERSION.to_string(),
    };
    let params = object.remove("params");

    Ok(match id {
        Some(id) => Envelope::Request(McpRequest {
            jsonrpc,
            id,
            method,
            params,
        }),
        None => Envelope::Notification(McpNotification {
            jsonrpc,
            method,
            params,
        }),
    })
}

/// Encode an outbound message as a single-line JSON string
pub fn encode(message: &McpMessage) -> String {
    match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize outbound message");
            let id = match message {
                McpMessage::Request(request) => request.id.clone(),
                McpMessage::Response(response) => response.id.clone(),
                _ => Value::Null,
            };
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": McpError::SERVER_ERROR,
                    "message": format!("Server error: failed to serialize response: {}", e),
                }
            })
            .to_string()
        }
    }
}

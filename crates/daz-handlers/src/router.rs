//! Method router
//!
//! Turns a decoded envelope into the response for its method. Only protocol
//! faults become JSON-RPC errors here; tool failures travel inside a normal
//! result (see [`daz_services::ToolCallResult`]).

use crate::methods::McpMethod;
use async_trait::async_trait;
use daz_config::AppConfig;
use daz_foundation::codec::Envelope;
use daz_foundation::errors::{DazError, DazResult};
use daz_foundation::model::mcp::{
    McpError, McpNotification, McpRequest, McpResponse, ToolCall, MCP_PROTOCOL_VERSION,
};
use daz_services::services::tool_catalog;
use daz_services::{ProcessRunner, RunnerSettings, ScriptRunner, ToolInvoker};
use daz_transport::McpDispatcher;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "daz-studio-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Routes MCP methods to their handlers
#[derive(Clone)]
pub struct McpRouter {
    invoker: ToolInvoker,
}

impl McpRouter {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self {
            invoker: ToolInvoker::new(runner),
        }
    }

    /// Router backed by a real DAZ Studio process runner
    pub fn from_config(config: &AppConfig) -> Self {
        let runner = ProcessRunner::new(RunnerSettings::from_config(&config.daz));
        Self::new(Arc::new(runner))
    }

    async fn handle_request(&self, request: McpRequest) -> DazResult<McpResponse> {
        let McpRequest {
            id, method, params, ..
        } = request;

        let Some(known) = McpMethod::from_name(&method) else {
            warn!(method = %method, "Method not found");
            return Ok(McpResponse::failure(id, McpError::method_not_found(method)));
        };

        let result = match known {
            McpMethod::Initialize => Self::initialize(params.as_ref()),
            // Sent with an id by some clients; answer so requests stay paired
            McpMethod::Initialized => json!({}),
            McpMethod::ToolsList => json!({ "tools": tool_catalog::descriptors() }),
            McpMethod::ToolsCall => match self.call_tool(params).await {
                Ok(result) => result?,
                Err(error) => return Ok(McpResponse::failure(id, error)),
            },
            McpMethod::ResourcesList => json!({ "resources": [] }),
            McpMethod::PromptsList => json!({ "prompts": [] }),
        };

        Ok(McpResponse::success(id, result))
    }

    fn initialize(params: Option<&Value>) -> Value {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(MCP_PROTOCOL_VERSION);

        info!(protocol_version = %protocol_version, "Client initializing");

        json!({
            "protocolVersion": protocol_version,
            "capabilities": {
                "tools": {},
                "resources": {},
                "prompts": {}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION
            }
        })
    }

    /// Outer `Err` is a protocol fault for the client, inner one a server fault
    async fn call_tool(&self, params: Option<Value>) -> Result<DazResult<Value>, McpError> {
        let params = params.ok_or_else(|| McpError::invalid_params("Missing params"))?;
        let call: ToolCall = serde_json::from_value(params)
            .map_err(|e| McpError::invalid_params(format!("Invalid tool call: {}", e)))?;

        let arguments = call.arguments.unwrap_or_else(Map::new);
        let result = self.invoker.call(&call.name, &arguments).await;
        if result.is_error() {
            debug!(tool_name = %call.name, "Tool call finished with a tool-level error");
        }

        Ok(serde_json::to_value(&result).map_err(DazError::from))
    }

    fn handle_notification(notification: &McpNotification) {
        match McpMethod::from_name(&notification.method) {
            Some(McpMethod::Initialized) => info!("Client initialization complete"),
            _ => debug!(method = %notification.method, "Ignoring notification"),
        }
    }
}

#[async_trait]
impl McpDispatcher for McpRouter {
    async fn dispatch(&self, envelope: Envelope) -> DazResult<Option<McpResponse>> {
        match envelope {
            Envelope::Request(request) => {
                debug!(method = %request.method, id = %request.id, "Handling request");
                self.handle_request(request).await.map(Some)
            }
            Envelope::Notification(notification) => {
                Self::handle_notification(&notification);
                Ok(None)
            }
        }
    }
}

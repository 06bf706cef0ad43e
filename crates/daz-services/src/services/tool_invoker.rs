//! Tool invocation normalizer
//!
//! Maps a `tools/call` (tool name + argument map) onto a script run and
//! shapes the outcome into the payload returned inside the JSON-RPC result.
//! Failures here are never JSON-RPC errors: an unknown tool, a nonzero exit,
//! a timeout and a launch failure all become a `{"error": {...}}` payload.

use super::process_runner::{AbortReason, ProcessOutcome, ProcessResult, ScriptRunner};
use super::tool_catalog;
use daz_foundation::model::mcp::McpContentItem;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Code reported when no exit code is available
const NO_RETURNCODE: i32 = -1;

/// Payload of a `tools/call` result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolCallResult {
    Success { content: Vec<McpContentItem> },
    Failure { error: ToolError },
}

/// Tool-level error object
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolError {
    pub message: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<AbortReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_s: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolCallResult {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolCallResult::Failure { .. })
    }

    fn unknown_tool(name: &str) -> Self {
        ToolCallResult::Failure {
            error: ToolError {
                message: format!("Unknown tool: {}", name),
                code: NO_RETURNCODE,
                reason: None,
                timeout_s: None,
                duration_ms: None,
            },
        }
    }

    /// Normalize a script run: `ok` wraps the whole result as one text block
    fn from_process(script: &str, result: ProcessResult) -> Self {
        if result.is_ok() {
            let text = match serde_json::to_string(&result) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize process result");
                    result.stdout.clone()
                }
            };
            return ToolCallResult::Success {
                content: vec![McpContentItem::Text { text }],
            };
        }

        let reason = result.abort_reason();
        let timeout_s = match result.outcome {
            ProcessOutcome::Aborted { timeout_s, .. } => timeout_s,
            _ => None,
        };
        let message = match (reason, result.returncode()) {
            (Some(AbortReason::Timeout), _) => format!(
                "timeout: {} exceeded call timeout of {}s",
                script,
                timeout_s.unwrap_or_default()
            ),
            _ if !result.stderr.is_empty() => result.stderr.clone(),
            (Some(AbortReason::LaunchFailed), _) => format!("{} failed to launch", script),
            (None, Some(code)) => format!("{} exited with code {}", script, code),
            (None, None) => "Unknown error".to_string(),
        };

        ToolCallResult::Failure {
            error: ToolError {
                message,
                code: result.returncode().unwrap_or(NO_RETURNCODE),
                reason,
                timeout_s,
                duration_ms: Some(result.duration_ms),
            },
        }
    }
}

/// Resolves tool calls through the catalog and runs them
#[derive(Clone)]
pub struct ToolInvoker {
    runner: Arc<dyn ScriptRunner>,
}

impl ToolInvoker {
    pub fn new(runner: Arc<dyn ScriptRunner>) -> Self {
        Self { runner }
    }

    /// Run a tool; never fails, every outcome is a [`ToolCallResult`]
    pub async fn call(&self, name: &str, arguments: &Map<String, Value>) -> ToolCallResult {
        let Some(tool) = tool_catalog::find(name) else {
            warn!(tool_name = %name, "Unknown tool requested");
            return ToolCallResult::unknown_tool(name);
        };

        let ignored = tool.unknown_arguments(arguments);
        if !ignored.is_empty() {
            warn!(tool_name = %name, ignored = ?ignored, "Ignoring undeclared arguments");
        }

        let args = tool.positional_args(arguments);
        debug!(tool_name = %name, script = %tool.script, args = ?args, "Invoking tool");

        let result = self.runner.run(tool.script, &args).await;
        ToolCallResult::from_process(tool.script, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::process_runner::MockScriptRunner;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn invoker_with(mock: MockScriptRunner) -> ToolInvoker {
        ToolInvoker::new(Arc::new(mock))
    }

    #[tokio::test]
    async fn test_render_scene_defaults_reach_runner() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run()
            .withf(|script: &str, args: &[String]| {
                script == "render_scene.dsa" && args == ["out.png", "800", "600"]
            })
            .times(1)
            .returning(|_, _| {
                ProcessResult::new(ProcessOutcome::Exited { returncode: 0 }, "done", "", 5)
            });

        let result = invoker_with(mock)
            .call("render_scene", &args(json!({"output_path": "out.png"})))
            .await;

        assert!(!result.is_error());
    }

    #[tokio::test]
    async fn test_success_embeds_full_process_result() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run().returning(|_, _| {
            ProcessResult::new(
                ProcessOutcome::Exited { returncode: 0 },
                r#"{"loaded":"scene.duf"}"#,
                "",
                12,
            )
        });

        let result = invoker_with(mock)
            .call("load_scene", &args(json!({"scene_path": "scene.duf"})))
            .await;

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["content"][0]["type"], "text");
        let text = value["content"][0]["text"].as_str().unwrap();
        let embedded: Value = serde_json::from_str(text).unwrap();
        assert_eq!(embedded["status"], "ok");
        assert_eq!(embedded["returncode"], 0);
        assert_eq!(embedded["stdout"], r#"{"loaded":"scene.duf"}"#);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_tool_level_error() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run().times(0);

        let result = invoker_with(mock).call("explode_scene", &Map::new()).await;

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"error": {"message": "Unknown tool: explode_scene", "code": -1}})
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_uses_stderr_and_returncode() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run().returning(|_, _| {
            ProcessResult::new(
                ProcessOutcome::Exited { returncode: 3 },
                "",
                "Scene not found",
                20,
            )
        });

        let result = invoker_with(mock)
            .call("load_scene", &args(json!({"scene_path": "missing.duf"})))
            .await;

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"]["message"], "Scene not found");
        assert_eq!(value["error"]["code"], 3);
        assert!(value["error"].get("reason").is_none());
    }

    #[tokio::test]
    async fn test_nonzero_exit_without_stderr() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run().returning(|_, _| {
            ProcessResult::new(ProcessOutcome::Exited { returncode: 1 }, "", "", 20)
        });

        let result = invoker_with(mock).call("read_scene", &Map::new()).await;

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"]["message"], "read_scene.dsa exited with code 1");
    }

    #[tokio::test]
    async fn test_timeout_is_distinguishable_from_exit() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run().returning(|_, _| {
            ProcessResult::new(
                ProcessOutcome::Aborted {
                    reason: AbortReason::Timeout,
                    timeout_s: Some(60),
                },
                "",
                "",
                60_001,
            )
        });

        let result = invoker_with(mock)
            .call("render_scene", &args(json!({"output_path": "out.png"})))
            .await;

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"]["reason"], "timeout");
        assert_eq!(value["error"]["timeout_s"], 60);
        assert_eq!(value["error"]["code"], -1);
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("timeout:"));
    }

    #[tokio::test]
    async fn test_launch_failure_reports_description() {
        let mut mock = MockScriptRunner::new();
        mock.expect_run().returning(|_, _| {
            ProcessResult::new(
                ProcessOutcome::Aborted {
                    reason: AbortReason::LaunchFailed,
                    timeout_s: None,
                },
                "",
                "failed to launch dazstudio.exe: No such file or directory",
                1,
            )
        });

        let result = invoker_with(mock).call("list_content", &Map::new()).await;

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["error"]["reason"], "launch_failed");
        assert_eq!(value["error"]["code"], -1);
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("No such file or directory"));
    }
}

//! Services behind the `tools/call` method: launching DAZ Studio scripts
//! under a timeout and normalizing their outcome into MCP results.

pub mod services;

pub use services::process_runner::{
    AbortReason, ProcessOutcome, ProcessResult, ProcessRunner, ProcessStatus, RunnerSettings,
    ScriptRunner,
};
pub use services::tool_catalog::{ArgKind, ArgSpec, ToolSpec, TOOLS};
pub use services::tool_invoker::{ToolCallResult, ToolError, ToolInvoker};

#[cfg(any(test, feature = "test-helpers"))]
pub use services::process_runner::MockScriptRunner;

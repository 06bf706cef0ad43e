//! MCP method routing for the DAZ Studio bridge

pub mod methods;
pub mod router;

pub use methods::McpMethod;
pub use router::{McpRouter, SERVER_NAME, SERVER_VERSION};

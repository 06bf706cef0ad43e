//! Foundation Layer - protocol definitions and error handling
//!
//! This crate provides the building blocks shared by every other crate in
//! the DAZ Studio MCP bridge:
//! - MCP / JSON-RPC 2.0 message types (`model::mcp`)
//! - The envelope codec turning raw frames into requests and notifications (`codec`)
//! - The workspace error type (`errors`)

pub mod codec;
pub mod errors;
pub mod model;

// Re-export commonly used types for convenience
pub use codec::{decode, encode, DecodeError, Envelope};
pub use errors::{DazError, DazResult};
pub use model::*;

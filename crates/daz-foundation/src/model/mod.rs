//! Protocol data model

pub mod mcp;

pub mod process_runner;
pub mod tool_catalog;
pub mod tool_invoker;

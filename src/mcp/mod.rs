//! MCP (Model Context Protocol) server
//!
//! # Module Layout
//!
//! - `types`  -- protocol types and JSON-RPC primitives
//! - `server` -- transport-agnostic request dispatcher
//! - `stdio`  -- newline-delimited JSON over stdin/stdout
//! - `http`   -- streamable HTTP transport (axum)

pub mod http;
pub mod server;
pub mod stdio;
pub mod types;

pub use server::McpServer;

//! StackRox MCP - MCP server for StackRox Central
//!
//! This library exposes StackRox Central operations as Model Context
//! Protocol tools, backed by a resilient gRPC client.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `central`: Connection manager, retry and logging interceptors, error
//!   classification, credential providers and transports
//! - `tools`: Tool and toolset traits, the tool registry and the toolsets
//! - `mcp`: JSON-RPC dispatcher with stdio and streamable-HTTP transports
//! - `cursor`: Opaque pagination cursor
//! - `config`: Configuration management and validation
//! - `app`: Wiring and shutdown handling
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `logging` and `metrics`: Structured logs on stderr and counters
//!
//! # Example
//!
//! ```no_run
//! use stackrox_mcp::{app, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!     app::run(config).await
//! }
//! ```

pub mod app;
pub mod central;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod metrics;
pub mod tools;

// Re-export commonly used types
pub use config::Config;
pub use cursor::Cursor;
pub use error::{McpError, Result};

#[cfg(test)]
pub mod test_utils;

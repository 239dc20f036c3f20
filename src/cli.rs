//! Command-line interface definition for the StackRox MCP server
//!
//! Defines the CLI structure using clap's derive API. Without a
//! subcommand the server starts with the configured transport.

use clap::{Parser, Subcommand};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// StackRox MCP - expose StackRox Central as MCP tools
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "stackrox-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "STACKROX_MCP_CONFIG")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute (defaults to `serve`)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the MCP server
    Serve {
        /// Override the server transport (streamable-http, stdio)
        #[arg(long = "type")]
        server_type: Option<String>,

        /// Override the HTTP listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the tools exposed under the loaded configuration
    Tools,

    /// Print the validated configuration with secrets redacted
    Config,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Configuration path, falling back to [`DEFAULT_CONFIG_PATH`]
    pub fn config_path(&self) -> &str {
        self.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH)
    }
}

//! StackRox MCP - expose StackRox Central as MCP tools
//!
//! Main entry point for the server binary.

use anyhow::Result;

use stackrox_mcp::app;
use stackrox_mcp::cli::{Cli, Commands};
use stackrox_mcp::config::Config;
use stackrox_mcp::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    logging::init_logging(cli.verbose)?;

    // Load and validate configuration
    let config = Config::load(cli.config_path(), &cli)?;
    config.validate()?;

    match cli.command.clone().unwrap_or(Commands::Serve {
        server_type: None,
        port: None,
    }) {
        Commands::Serve { .. } => app::run(config).await,
        Commands::Tools => {
            for tool in app::exposed_tools(&config) {
                let access = if tool.read_only { "read-only" } else { "read-write" };
                println!("{} ({}): {}", tool.name, access, tool.description);
            }
            Ok(())
        }
        Commands::Config => {
            print!("{}", serde_yaml::to_string(&config.redacted())?);
            Ok(())
        }
    }
}

//! Read-only aware tool registry
//!
//! The registry holds every toolset in registration order and computes the
//! exposed tool list on each query. Nothing is cached, so a toolset whose
//! enablement changes is picked up by the next query.

use super::{Tool, ToolDefinition, Toolset};
use std::sync::Arc;

/// Collects the tools the server exposes
///
/// # Examples
///
/// ```no_run
/// use stackrox_mcp::central::Client;
/// use stackrox_mcp::config::Config;
/// use stackrox_mcp::tools::{all_toolsets, ToolRegistry};
/// use std::sync::Arc;
///
/// let config = Config::default();
/// let client = Arc::new(Client::new(config.central.clone()));
/// let registry = ToolRegistry::new(config.global.read_only_tools, all_toolsets(&config, client));
/// let _definitions = registry.get_all_tools();
/// ```
#[derive(Clone)]
pub struct ToolRegistry {
    read_only: bool,
    toolsets: Vec<Arc<dyn Toolset>>,
}

impl ToolRegistry {
    /// Registry over `toolsets`, hiding read-write tools when `read_only`
    pub fn new(read_only: bool, toolsets: Vec<Arc<dyn Toolset>>) -> Self {
        Self {
            read_only,
            toolsets,
        }
    }

    /// Definitions of every exposed tool, in toolset then tool order
    pub fn get_all_tools(&self) -> Vec<ToolDefinition> {
        self.exposed_tools()
            .iter()
            .map(|tool| tool.definition())
            .collect()
    }

    /// All registered toolsets, enabled or not
    pub fn get_toolsets(&self) -> &[Arc<dyn Toolset>] {
        &self.toolsets
    }

    /// Exposed tool named `name`
    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.exposed_tools()
            .into_iter()
            .find(|tool| tool.name() == name)
    }

    /// Log the registration decisions for every toolset and tool
    ///
    /// Returns the number of exposed tools.
    pub fn log_registration(&self) -> usize {
        let mut registered = 0;
        for toolset in &self.toolsets {
            if !toolset.is_enabled() {
                tracing::info!(toolset = toolset.name(), "Skipping disabled toolset");
                continue;
            }

            for tool in toolset.tools() {
                if self.read_only && !tool.is_read_only() {
                    tracing::info!(
                        tool = tool.name(),
                        "Skipping read-write tool (read-only mode enabled)"
                    );
                    continue;
                }

                tracing::info!(
                    toolset = toolset.name(),
                    tool = tool.name(),
                    read_only = tool.is_read_only(),
                    "Registering tool"
                );
                registered += 1;
            }
        }

        tracing::info!(count = registered, "Tools registration complete");
        registered
    }

    fn exposed_tools(&self) -> Vec<Arc<dyn Tool>> {
        self.toolsets
            .iter()
            .filter(|toolset| toolset.is_enabled())
            .flat_map(|toolset| toolset.tools())
            .filter(|tool| !self.read_only || tool.is_read_only())
            .collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.toolsets.iter().map(|t| t.name()).collect();
        f.debug_struct("ToolRegistry")
            .field("read_only", &self.read_only)
            .field("toolsets", &names)
            .finish()
    }
}

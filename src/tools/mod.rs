//! MCP tools backed by StackRox Central
//!
//! Tools are grouped into [`Toolset`]s that are switched on and off by
//! configuration. The [`registry::ToolRegistry`] decides which tools are
//! exposed, applying the global read-only switch on top of each toolset's
//! own enablement.

pub mod config_manager;
pub mod registry;
pub mod vulnerability;

use crate::central::{CallContext, Client};
use crate::config::Config;
use crate::error::{McpError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use registry::ToolRegistry;

/// Tool metadata advertised to MCP clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// What the tool does, shown to the model
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: serde_json::Value,
    /// The tool never changes state in Central
    pub read_only: bool,
}

impl ToolDefinition {
    /// Create a new tool definition
    ///
    /// # Arguments
    ///
    /// * `name` - Tool name
    /// * `description` - Tool description
    /// * `input_schema` - JSON schema for the arguments
    /// * `read_only` - Whether the tool only reads data
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
        read_only: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            read_only,
        }
    }
}

/// A single MCP tool
///
/// # Examples
///
/// ```
/// use stackrox_mcp::central::CallContext;
/// use stackrox_mcp::error::Result;
/// use stackrox_mcp::tools::{Tool, ToolDefinition};
/// use async_trait::async_trait;
/// use serde_json::Value;
///
/// struct Echo;
///
/// #[async_trait]
/// impl Tool for Echo {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     fn is_read_only(&self) -> bool {
///         true
///     }
///
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition::new("echo", "Echo the arguments", serde_json::json!({"type": "object"}), true)
///     }
///
///     async fn execute(&self, _ctx: &CallContext, args: Value) -> Result<Value> {
///         Ok(args)
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let out = Echo.execute(&CallContext::new(), serde_json::json!({"x": 1})).await.unwrap();
/// assert_eq!(out["x"], 1);
/// # });
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in `tools/call`
    fn name(&self) -> &str;

    /// Whether the tool only performs read operations
    fn is_read_only(&self) -> bool;

    /// Definition advertised in `tools/list`
    fn definition(&self) -> ToolDefinition;

    /// Run the tool
    ///
    /// # Errors
    ///
    /// Returns [`McpError::InvalidParams`] for bad arguments; any other
    /// error is reported to the caller as a failed tool result.
    async fn execute(&self, ctx: &CallContext, args: serde_json::Value)
        -> Result<serde_json::Value>;
}

/// A group of related tools sharing one enable switch
pub trait Toolset: Send + Sync {
    /// Toolset name
    fn name(&self) -> &str;

    /// Whether configuration enables this toolset
    fn is_enabled(&self) -> bool;

    /// Tools of the toolset; empty while disabled
    fn tools(&self) -> Vec<Arc<dyn Tool>>;
}

/// Every toolset the server knows, in registration order
pub fn all_toolsets(config: &Config, client: Arc<Client>) -> Vec<Arc<dyn Toolset>> {
    vec![
        Arc::new(config_manager::ConfigManagerToolset::new(
            config.tools.config_manager.enabled,
            client.clone(),
        )),
        Arc::new(vulnerability::VulnerabilityToolset::new(
            config.tools.vulnerability.enabled,
            client,
        )),
    ]
}

/// Deserialize tool arguments, mapping failures to invalid params
pub(crate) fn parse_args<T: DeserializeOwned>(args: serde_json::Value) -> Result<T> {
    let args = if args.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        args
    };
    serde_json::from_value(args)
        .map_err(|e| McpError::InvalidParams(format!("invalid arguments: {}", e)).into())
}

/// Fail with invalid params when a required string argument is blank
pub(crate) fn require(name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(McpError::InvalidParams(format!("missing required argument: {}", name)).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_error_contains;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Args {
        cve_name: Option<String>,
        #[serde(default)]
        offset: i64,
    }

    #[test]
    fn test_parse_args_accepts_null_as_empty_object() {
        let args: Args = parse_args(serde_json::Value::Null).unwrap();
        assert!(args.cve_name.is_none());
        assert_eq!(args.offset, 0);
    }

    #[test]
    fn test_parse_args_wrong_type_is_invalid_params() {
        let result: Result<Args> = parse_args(serde_json::json!({"offset": "ten"}));
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpError>(),
            Some(McpError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_require_names_missing_field() {
        assert_error_contains(require("cveName", "  "), "cveName");
        assert!(require("cveName", "CVE-2021-44228").is_ok());
    }

    #[test]
    fn test_all_toolsets_follow_config() {
        let mut config = crate::test_utils::test_config();
        config.tools.vulnerability.enabled = false;
        let client = Arc::new(Client::new(config.central.clone()));

        let toolsets = all_toolsets(&config, client);
        let names: Vec<_> = toolsets.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["config_manager", "vulnerability"]);
        assert!(toolsets[0].is_enabled());
        assert!(!toolsets[1].is_enabled());
        assert!(toolsets[1].tools().is_empty());
    }
}

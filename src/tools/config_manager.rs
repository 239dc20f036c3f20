//! Cluster configuration toolset

use super::{parse_args, Tool, ToolDefinition, Toolset};
use crate::central::api::{Cluster, ClustersService};
use crate::central::{CallContext, Client};
use crate::error::{McpError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Toolset name, also the configuration key
pub const TOOLSET_NAME: &str = "config_manager";

/// Tools for inspecting the clusters Central manages
pub struct ConfigManagerToolset {
    enabled: bool,
    tools: Vec<Arc<dyn Tool>>,
}

impl ConfigManagerToolset {
    pub fn new(enabled: bool, client: Arc<Client>) -> Self {
        Self {
            enabled,
            tools: vec![Arc::new(ListClustersTool::new(client))],
        }
    }
}

impl Toolset for ConfigManagerToolset {
    fn name(&self) -> &str {
        TOOLSET_NAME
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn tools(&self) -> Vec<Arc<dyn Tool>> {
        if !self.is_enabled() {
            return Vec::new();
        }
        self.tools.clone()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListClustersInput {
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    limit: i64,
}

/// Cluster as rendered in tool output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: String,
}

impl From<&Cluster> for ClusterInfo {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id.clone(),
            name: cluster.name.clone(),
            cluster_type: cluster.type_name().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListClustersOutput {
    clusters: Vec<ClusterInfo>,
    total_count: usize,
    offset: i64,
    limit: i64,
}

/// `list_clusters`: page through every cluster known to Central
pub struct ListClustersTool {
    client: Arc<Client>,
}

impl ListClustersTool {
    pub const NAME: &'static str = "list_clusters";

    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ListClustersTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "List all clusters managed by StackRox Central with their IDs, names, and types",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "offset": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Number of clusters to skip (default 0)"
                    },
                    "limit": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Maximum number of clusters to return; 0 returns all (default 0)"
                    }
                }
            }),
            true,
        )
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let input: ListClustersInput = parse_args(args)?;
        if input.offset < 0 {
            return Err(McpError::InvalidParams("offset must be non-negative".to_string()).into());
        }
        if input.limit < 0 {
            return Err(McpError::InvalidParams("limit must be non-negative".to_string()).into());
        }

        let clusters = ClustersService::new(&self.client)
            .get_clusters(ctx, "")
            .await?;

        let total_count = clusters.len();
        let start = usize::try_from(input.offset).unwrap_or(usize::MAX).min(total_count);
        let end = if input.limit == 0 {
            total_count
        } else {
            start
                .saturating_add(usize::try_from(input.limit).unwrap_or(usize::MAX))
                .min(total_count)
        };

        let output = ListClustersOutput {
            clusters: clusters[start..end].iter().map(ClusterInfo::from).collect(),
            total_count,
            offset: input.offset,
            limit: input.limit,
        };

        Ok(serde_json::to_value(output)?)
    }
}

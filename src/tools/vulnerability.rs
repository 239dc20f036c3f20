//! Vulnerability toolset
//!
//! Answers "where is this CVE?" questions by turning tool arguments into
//! Central search queries.

use super::config_manager::ClusterInfo;
use super::{parse_args, require, Tool, ToolDefinition, Toolset};
use crate::central::api::{ClustersService, DeploymentService, ListDeployment};
use crate::central::{CallContext, Client};
use crate::cursor::Cursor;
use crate::error::{McpError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Toolset name, also the configuration key
pub const TOOLSET_NAME: &str = "vulnerability";

/// Deployments returned per page
pub const DEPLOYMENTS_PAGE_SIZE: i32 = 50;

/// Tools for locating CVEs across clusters and deployments
pub struct VulnerabilityToolset {
    enabled: bool,
    tools: Vec<Arc<dyn Tool>>,
}

impl VulnerabilityToolset {
    pub fn new(enabled: bool, client: Arc<Client>) -> Self {
        Self {
            enabled,
            tools: vec![
                Arc::new(GetDeploymentsForCveTool::new(client.clone())),
                Arc::new(GetClustersWithOrchestratorCveTool::new(client)),
            ],
        }
    }
}

impl Toolset for VulnerabilityToolset {
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

/// Conjunction of `Field:"value"` search terms
#[derive(Debug, Default)]
struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    fn term(mut self, field: &str, value: &str) -> Self {
        self.terms
            .push(format!("{}:\"{}\"", field, value.replace('"', "")));
        self
    }

    fn optional_term(self, field: &str, value: Option<&str>) -> Self {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(value) => self.term(field, value),
            None => self,
        }
    }

    fn build(&self) -> String {
        self.terms.join("+")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentsForCveInput {
    #[serde(default)]
    cve_name: String,
    filter_cluster_id: Option<String>,
    filter_namespace: Option<String>,
    cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentInfo {
    id: String,
    name: String,
    namespace: String,
    cluster_id: String,
    cluster_name: String,
}

impl From<ListDeployment> for DeploymentInfo {
    fn from(deployment: ListDeployment) -> Self {
        Self {
            id: deployment.id,
            name: deployment.name,
            namespace: deployment.namespace,
            cluster_id: deployment.cluster_id,
            cluster_name: deployment.cluster,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentsForCveOutput {
    deployments: Vec<DeploymentInfo>,
    next_cursor: String,
}

/// `get_deployments_for_cve`: deployments affected by a CVE, paged
pub struct GetDeploymentsForCveTool {
    client: Arc<Client>,
}

impl GetDeploymentsForCveTool {
    pub const NAME: &'static str = "get_deployments_for_cve";

    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetDeploymentsForCveTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "Get the list of deployments affected by a specific CVE, optionally filtered by cluster and namespace",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "cveName": {
                        "type": "string",
                        "description": "CVE identifier, for example CVE-2021-44228"
                    },
                    "filterClusterId": {
                        "type": "string",
                        "description": "Only return deployments in this cluster"
                    },
                    "filterNamespace": {
                        "type": "string",
                        "description": "Only return deployments in this namespace"
                    },
                    "cursor": {
                        "type": "string",
                        "description": "Cursor from a previous response to fetch the next page"
                    }
                },
                "required": ["cveName"]
            }),
            true,
        )
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let input: DeploymentsForCveInput = parse_args(args)?;
        require("cveName", &input.cve_name)?;

        let cursor = match input.cursor.as_deref().map(str::trim) {
            None | Some("") => Cursor::default(),
            Some(encoded) => Cursor::decode(encoded)
                .map_err(|e| McpError::InvalidParams(format!("invalid cursor: {}", e)))?,
        };

        let query = SearchQuery::default()
            .term("CVE", input.cve_name.trim())
            .optional_term("Cluster ID", input.filter_cluster_id.as_deref())
            .optional_term("Namespace", input.filter_namespace.as_deref())
            .build();

        tracing::debug!(query = %query, offset = cursor.offset(), "Listing deployments for CVE");

        // One extra row tells whether another page follows.
        let mut deployments = DeploymentService::new(&self.client)
            .list_deployments(ctx, &query, cursor.offset(), DEPLOYMENTS_PAGE_SIZE + 1)
            .await?;

        let page_size = usize::try_from(DEPLOYMENTS_PAGE_SIZE).unwrap_or_default();
        let next_cursor = if deployments.len() > page_size {
            deployments.truncate(page_size);
            let next = cursor.next_cursor(DEPLOYMENTS_PAGE_SIZE);
            if next.offset() == cursor.offset() {
                String::new()
            } else {
                next.encode()
                    .map_err(|e| McpError::Cursor(e.to_string()))?
            }
        } else {
            String::new()
        };

        let output = DeploymentsForCveOutput {
            deployments: deployments.into_iter().map(DeploymentInfo::from).collect(),
            next_cursor,
        };

        Ok(serde_json::to_value(output)?)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrchestratorCveInput {
    #[serde(default)]
    cve_name: String,
}

#[derive(Debug, Serialize)]
struct OrchestratorCveOutput {
    clusters: Vec<ClusterInfo>,
}

/// `get_clusters_with_orchestrator_cve`: clusters whose Kubernetes or
/// OpenShift version is affected by a CVE
pub struct GetClustersWithOrchestratorCveTool {
    client: Arc<Client>,
}

impl GetClustersWithOrchestratorCveTool {
    pub const NAME: &'static str = "get_clusters_with_orchestrator_cve";

    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for GetClustersWithOrchestratorCveTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_read_only(&self) -> bool {
        true
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            Self::NAME,
            "Get the clusters whose orchestrator (Kubernetes or OpenShift) is affected by a specific CVE",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "cveName": {
                        "type": "string",
                        "description": "CVE identifier, for example CVE-2023-5528"
                    }
                },
                "required": ["cveName"]
            }),
            true,
        )
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let input: OrchestratorCveInput = parse_args(args)?;
        require("cveName", &input.cve_name)?;

        let query = SearchQuery::default()
            .term("Orchestrator CVE", input.cve_name.trim())
            .build();

        let clusters = ClustersService::new(&self.client)
            .get_clusters(ctx, &query)
            .await?;

        let output = OrchestratorCveOutput {
            clusters: clusters.iter().map(ClusterInfo::from).collect(),
        };
        Ok(serde_json::to_value(output)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::central::api::{
        Cluster, ClusterType, ClustersList, GetClustersRequest, ListDeploymentsResponse, RawQuery,
        LIST_DEPLOYMENTS_METHOD,
    };
    use crate::test_utils::{encode, test_config, FakeCentral};

    fn deployments(n: usize) -> ListDeploymentsResponse {
        ListDeploymentsResponse {
            deployments: (0..n)
                .map(|i| ListDeployment {
                    id: format!("dep-{}", i),
                    name: format!("web-{}", i),
                    cluster: "prod".to_string(),
                    cluster_id: "c-1".to_string(),
                    namespace: "default".to_string(),
                    priority: 1,
                })
                .collect(),
        }
    }

    fn deployments_tool(central: &Arc<FakeCentral>) -> GetDeploymentsForCveTool {
        GetDeploymentsForCveTool::new(central.client(&test_config()))
    }

    #[test]
    fn test_search_query_terms() {
        let query = SearchQuery::default()
            .term("CVE", "CVE-2021-44228")
            .optional_term("Cluster ID", Some("c-1"))
            .optional_term("Namespace", Some("  "))
            .optional_term("Namespace", None)
            .build();
        assert_eq!(query, "CVE:\"CVE-2021-44228\"+Cluster ID:\"c-1\"");
    }

    #[tokio::test]
    async fn test_deployments_query_and_first_page() {
        let central = FakeCentral::new(|method, _| {
            assert_eq!(method, LIST_DEPLOYMENTS_METHOD);
            Ok(encode(&deployments(2)))
        });

        let output = deployments_tool(&central)
            .execute(
                &CallContext::new(),
                serde_json::json!({
                    "cveName": "CVE-2021-44228",
                    "filterClusterId": "c-1",
                    "filterNamespace": "default"
                }),
            )
            .await
            .unwrap();

        let request: RawQuery = central.request(0);
        assert_eq!(
            request.query,
            "CVE:\"CVE-2021-44228\"+Cluster ID:\"c-1\"+Namespace:\"default\""
        );
        let pagination = request.pagination.unwrap();
        assert_eq!(pagination.limit, DEPLOYMENTS_PAGE_SIZE + 1);
        assert_eq!(pagination.offset, 0);

        assert_eq!(output["deployments"][1]["clusterName"], "prod");
        assert_eq!(output["deployments"][1]["clusterId"], "c-1");
        assert_eq!(output["nextCursor"], "");
    }

    #[tokio::test]
    async fn test_full_page_yields_next_cursor() {
        let central = FakeCentral::new(|_, _| Ok(encode(&deployments(51))));
        let tool = deployments_tool(&central);

        let output = tool
            .execute(&CallContext::new(), serde_json::json!({"cveName": "CVE-1"}))
            .await
            .unwrap();
        assert_eq!(output["deployments"].as_array().unwrap().len(), 50);

        let next = output["nextCursor"].as_str().unwrap().to_string();
        assert_eq!(Cursor::decode(&next).unwrap().offset(), 50);

        tool.execute(
            &CallContext::new(),
            serde_json::json!({"cveName": "CVE-1", "cursor": next}),
        )
        .await
        .unwrap();
        let second: RawQuery = central.request(1);
        assert_eq!(second.pagination.unwrap().offset, 50);
    }

    #[tokio::test]
    async fn test_empty_result_renders_empty_array() {
        let central = FakeCentral::new(|_, _| Ok(encode(&ListDeploymentsResponse::default())));

        let output = deployments_tool(&central)
            .execute(&CallContext::new(), serde_json::json!({"cveName": "CVE-1"}))
            .await
            .unwrap();
        assert!(serde_json::to_string(&output)
            .unwrap()
            .contains("\"deployments\":[]"));
    }

    #[tokio::test]
    async fn test_missing_cve_name_is_invalid_params() {
        let central = FakeCentral::new(|_, _| Ok(Default::default()));

        let err = deployments_tool(&central)
            .execute(&CallContext::new(), serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpError>(),
            Some(McpError::InvalidParams(message)) if message.contains("cveName")
        ));
        assert!(central.calls().is_empty());
    }

    #[tokio::test]
    async fn test_bad_cursor_is_invalid_params() {
        let central = FakeCentral::new(|_, _| Ok(Default::default()));

        let err = deployments_tool(&central)
            .execute(
                &CallContext::new(),
                serde_json::json!({"cveName": "CVE-1", "cursor": "%%%"}),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid cursor"));
    }

    #[tokio::test]
    async fn test_orchestrator_cve_query() {
        let central = FakeCentral::new(|_, _| {
            Ok(encode(&ClustersList {
                clusters: vec![Cluster {
                    id: "c-1".to_string(),
                    name: "ocp".to_string(),
                    r#type: ClusterType::Openshift4Cluster as i32,
                }],
            }))
        });
        let tool = GetClustersWithOrchestratorCveTool::new(central.client(&test_config()));

        let output = tool
            .execute(&CallContext::new(), serde_json::json!({"cveName": "CVE-2023-5528"}))
            .await
            .unwrap();

        let request: GetClustersRequest = central.request(0);
        assert_eq!(request.query, "Orchestrator CVE:\"CVE-2023-5528\"");
        assert_eq!(
            output,
            serde_json::json!({"clusters": [{"id": "c-1", "name": "ocp", "type": "OPENSHIFT4_CLUSTER"}]})
        );
    }

    #[test]
    fn test_toolset_lists_tools_in_order() {
        let central = FakeCentral::new(|_, _| Ok(Default::default()));
        let toolset = VulnerabilityToolset::new(true, central.client(&test_config()));
        let names: Vec<_> = toolset.tools().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(
            names,
            vec!["get_deployments_for_cve", "get_clusters_with_orchestrator_cve"]
        );
    }
}

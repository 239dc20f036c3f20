//! Central API messages and typed unary calls
//!
//! Only the fields the tools read are declared; prost skips unknown
//! fields on decode, so responses from newer Central versions still parse.

use super::client::Client;
use super::context::CallContext;
use super::error::CentralError;

/// `v1.ClustersService.GetClusters`
pub const GET_CLUSTERS_METHOD: &str = "/v1.ClustersService/GetClusters";
/// `v1.DeploymentService.ListDeployments`
pub const LIST_DEPLOYMENTS_METHOD: &str = "/v1.DeploymentService/ListDeployments";

/// Filter for `GetClusters`
#[derive(Clone, PartialEq, prost::Message)]
pub struct GetClustersRequest {
    #[prost(string, tag = "1")]
    pub query: String,
}

/// `GetClusters` response
#[derive(Clone, PartialEq, prost::Message)]
pub struct ClustersList {
    #[prost(message, repeated, tag = "1")]
    pub clusters: Vec<Cluster>,
}

/// A secured cluster
#[derive(Clone, PartialEq, prost::Message)]
pub struct Cluster {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(enumeration = "ClusterType", tag = "3")]
    pub r#type: i32,
}

impl Cluster {
    /// Proto name of the cluster type
    pub fn type_name(&self) -> &'static str {
        ClusterType::try_from(self.r#type)
            .map(|t| t.as_str_name())
            .unwrap_or("UNKNOWN_CLUSTER_TYPE")
    }
}

/// Orchestrator flavour of a cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ClusterType {
    GenericCluster = 0,
    KubernetesCluster = 1,
    OpenshiftCluster = 2,
    Openshift4Cluster = 5,
}

impl ClusterType {
    /// Name as written in the proto definition
    pub fn as_str_name(&self) -> &'static str {
        match self {
            ClusterType::GenericCluster => "GENERIC_CLUSTER",
            ClusterType::KubernetesCluster => "KUBERNETES_CLUSTER",
            ClusterType::OpenshiftCluster => "OPENSHIFT_CLUSTER",
            ClusterType::Openshift4Cluster => "OPENSHIFT4_CLUSTER",
        }
    }
}

/// Search query with optional paging
#[derive(Clone, PartialEq, prost::Message)]
pub struct RawQuery {
    #[prost(string, tag = "1")]
    pub query: String,
    #[prost(message, optional, tag = "2")]
    pub pagination: Option<Pagination>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Pagination {
    #[prost(int32, tag = "1")]
    pub limit: i32,
    #[prost(int32, tag = "2")]
    pub offset: i32,
}

/// `ListDeployments` response
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListDeploymentsResponse {
    #[prost(message, repeated, tag = "1")]
    pub deployments: Vec<ListDeployment>,
}

/// Summary row of a deployment
#[derive(Clone, PartialEq, prost::Message)]
pub struct ListDeployment {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub cluster: String,
    #[prost(string, tag = "4")]
    pub cluster_id: String,
    #[prost(string, tag = "5")]
    pub namespace: String,
    #[prost(int64, tag = "7")]
    pub priority: i64,
}

/// Typed `v1.ClustersService` calls
#[derive(Debug, Clone, Copy)]
pub struct ClustersService<'a> {
    client: &'a Client,
}

impl<'a> ClustersService<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// List clusters matching `query`; an empty query returns all of them
    pub async fn get_clusters(
        &self,
        ctx: &CallContext,
        query: &str,
    ) -> Result<Vec<Cluster>, CentralError> {
        let conn = self.client.ready_conn().await?;
        let request = GetClustersRequest {
            query: query.to_string(),
        };

        let response: ClustersList = conn
            .unary(ctx, GET_CLUSTERS_METHOD, &request)
            .await
            .map_err(|status| CentralError::from_status(status, "GetClusters"))?;

        Ok(response.clusters)
    }
}

/// Typed `v1.DeploymentService` calls
#[derive(Debug, Clone, Copy)]
pub struct DeploymentService<'a> {
    client: &'a Client,
}

impl<'a> DeploymentService<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// One page of deployments matching `query`
    pub async fn list_deployments(
        &self,
        ctx: &CallContext,
        query: &str,
        offset: i32,
        limit: i32,
    ) -> Result<Vec<ListDeployment>, CentralError> {
        let conn = self.client.ready_conn().await?;
        let request = RawQuery {
            query: query.to_string(),
            pagination: Some(Pagination { limit, offset }),
        };

        let response: ListDeploymentsResponse = conn
            .unary(ctx, LIST_DEPLOYMENTS_METHOD, &request)
            .await
            .map_err(|status| CentralError::from_status(status, "ListDeployments"))?;

        Ok(response.deployments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_cluster_type_names() {
        let cluster = Cluster {
            id: "c1".to_string(),
            name: "prod".to_string(),
            r#type: ClusterType::Openshift4Cluster as i32,
        };
        assert_eq!(cluster.type_name(), "OPENSHIFT4_CLUSTER");

        let unknown = Cluster {
            r#type: 42,
            ..cluster
        };
        assert_eq!(unknown.type_name(), "UNKNOWN_CLUSTER_TYPE");
    }

    #[test]
    fn test_raw_query_wire_layout() {
        let request = RawQuery {
            query: "CVE:\"x\"".to_string(),
            pagination: Some(Pagination {
                limit: 51,
                offset: 0,
            }),
        };
        let decoded = RawQuery::decode(request.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.pagination.unwrap().limit, 51);
        assert_eq!(decoded.query, "CVE:\"x\"");
    }

    #[test]
    fn test_list_deployment_ignores_unknown_fields() {
        // field 6 (created timestamp) is not declared
        let mut bytes = ListDeployment {
            id: "d1".to_string(),
            ..Default::default()
        }
        .encode_to_vec();
        bytes.extend_from_slice(&[0x32, 0x00]);

        let decoded = ListDeployment::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded.id, "d1");
    }
}

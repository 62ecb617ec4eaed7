//! Core data models for the pipeline

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

/// Identifies the workload a recommendation is fetched for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub cluster_id: String,
    pub namespace: String,
    pub name: String,
    /// Restricts the patch to a single container; `None` means all containers
    pub container: Option<String>,
}

impl WorkloadRef {
    pub fn new(
        cluster_id: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            namespace: namespace.into(),
            name: name.into(),
            container: None,
        }
    }

    pub fn with_container(mut self, container: Option<String>) -> Self {
        self.container = container;
        self
    }

    /// `namespace/name`
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Recommended requests and limits for one container
///
/// Unset fields are left untouched when the patch is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub cpu_request: Option<Quantity>,
    pub cpu_limit: Option<Quantity>,
    pub memory_request: Option<Quantity>,
    pub memory_limit: Option<Quantity>,
}

impl ResourceSpec {
    pub fn is_empty(&self) -> bool {
        self.cpu_request.is_none()
            && self.cpu_limit.is_none()
            && self.memory_request.is_none()
            && self.memory_limit.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecommendation {
    pub name: String,
    pub resources: ResourceSpec,
}

/// Per-container recommendations for a single workload, in the order the
/// recommendation service reported them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub containers: Vec<ContainerRecommendation>,
}

impl Recommendation {
    pub fn container(&self, name: &str) -> Option<&ContainerRecommendation> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Quantity from a plain string
pub fn quantity(value: impl Into<String>) -> Quantity {
    Quantity(value.into())
}

//! CAST AI workload-autoscaling API client

use crate::error::PipelineError;
use crate::models::{quantity, ContainerRecommendation, Recommendation, ResourceSpec, WorkloadRef};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_URL: &str = "https://api.cast.ai";

/// Source of workload recommendations
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn fetch_recommendation(
        &self,
        workload: &WorkloadRef,
    ) -> Result<Recommendation, PipelineError>;
}

/// Client for the CAST AI recommendation API
pub struct CastAiClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl CastAiClient {
    /// Create a new API client
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Fetch(format!("failed to create HTTP client: {e}")))?;

        // Keep any path prefix when joining relative endpoints
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| PipelineError::Argument(format!("invalid API URL '{base_url}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    async fn list_workloads(&self, cluster_id: &str) -> Result<Vec<ApiWorkload>, PipelineError> {
        let url = self
            .base_url
            .join(&format!(
                "v1/workload-autoscaling/clusters/{cluster_id}/workloads"
            ))
            .map_err(|e| PipelineError::Argument(format!("invalid cluster id '{cluster_id}': {e}")))?;

        let response = self
            .client
            .get(url)
            .header("X-API-Key", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| PipelineError::Fetch(format!("failed to send request: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Fetch(format!("API error ({status}): {}", body.trim())));
        }

        let list: WorkloadList = response
            .json()
            .await
            .map_err(|e| PipelineError::Fetch(format!("failed to parse response: {e}")))?;

        list.workloads.ok_or_else(|| {
            PipelineError::Fetch("unexpected API response: 'workloads' field not found".to_string())
        })
    }
}

#[async_trait]
impl RecommendationSource for CastAiClient {
    async fn fetch_recommendation(
        &self,
        workload: &WorkloadRef,
    ) -> Result<Recommendation, PipelineError> {
        let workloads = self.list_workloads(&workload.cluster_id).await?;

        let found = workloads
            .into_iter()
            .find(|w| w.name == workload.name && w.namespace == workload.namespace)
            .ok_or_else(|| {
                PipelineError::Fetch(format!(
                    "workload '{}' not found in namespace '{}'",
                    workload.name, workload.namespace
                ))
            })?;

        Ok(found.into_recommendation())
    }
}

/// Decimal cores as a quantity: `0.25` → `"0.25"`
pub fn cpu_quantity(cores: f64) -> String {
    cores.to_string()
}

/// GiB as whole mebibytes: `0.5` → `"512Mi"`
pub fn memory_quantity(gib: f64) -> String {
    format!("{}Mi", (gib * 1024.0).floor() as i64)
}

// API response types

#[derive(Debug, Deserialize)]
struct WorkloadList {
    workloads: Option<Vec<ApiWorkload>>,
}

#[derive(Debug, Deserialize)]
struct ApiWorkload {
    name: String,
    namespace: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    containers: Vec<ApiContainer>,
}

fn default_kind() -> String {
    "Deployment".to_string()
}

#[derive(Debug, Deserialize)]
struct ApiContainer {
    name: String,
    #[serde(default)]
    recommendation: Option<ApiRecommendation>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiRecommendation {
    #[serde(default)]
    requests: Option<ApiResources>,
    #[serde(default)]
    limits: Option<ApiResources>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResources {
    #[serde(default)]
    cpu_cores: Option<f64>,
    #[serde(default)]
    memory_gib: Option<f64>,
}

impl ApiWorkload {
    fn into_recommendation(self) -> Recommendation {
        let containers = self
            .containers
            .into_iter()
            .filter_map(|c| {
                let recommendation = c.recommendation?;
                let requests = recommendation.requests.unwrap_or_default();
                let limits = recommendation.limits.unwrap_or_default();
                let resources = ResourceSpec {
                    cpu_request: requests.cpu_cores.map(cpu_quantity).map(quantity),
                    cpu_limit: limits.cpu_cores.map(cpu_quantity).map(quantity),
                    memory_request: requests.memory_gib.map(memory_quantity).map(quantity),
                    memory_limit: limits.memory_gib.map(memory_quantity).map(quantity),
                };
                if resources.is_empty() {
                    return None;
                }
                Some(ContainerRecommendation {
                    name: c.name,
                    resources,
                })
            })
            .collect();

        Recommendation {
            kind: self.kind,
            name: self.name,
            namespace: self.namespace,
            containers,
        }
    }
}

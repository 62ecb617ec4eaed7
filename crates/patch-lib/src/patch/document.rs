//! Strategic-merge patch document
//!
//! Containers are addressed by their `name` key, never by list position, so
//! the patch stays correct when the manifest orders containers differently
//! from the recommendation service.

use crate::error::PipelineError;
use crate::models::ResourceSpec;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

const PATCH_API_VERSION: &str = "apps/v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: PatchMetadata,
    pub spec: WorkloadSpecPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMetadata {
    pub name: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadSpecPatch {
    pub template: PodTemplatePatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodTemplatePatch {
    pub spec: PodSpecPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSpecPatch {
    pub containers: Vec<ContainerPatch>,
}

/// One name-keyed container operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerPatch {
    pub name: String,
    pub resources: ResourcesPatch,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<QuantityPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<QuantityPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuantityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<Quantity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<Quantity>,
}

impl QuantityPatch {
    fn from_pair(cpu: &Option<Quantity>, memory: &Option<Quantity>) -> Option<Self> {
        if cpu.is_none() && memory.is_none() {
            return None;
        }
        Some(Self {
            cpu: cpu.clone(),
            memory: memory.clone(),
        })
    }
}

impl ContainerPatch {
    /// Operation for a container, or `None` if the resource spec sets nothing
    pub fn from_spec(name: &str, spec: &ResourceSpec) -> Option<Self> {
        if spec.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            resources: ResourcesPatch {
                requests: QuantityPatch::from_pair(&spec.cpu_request, &spec.memory_request),
                limits: QuantityPatch::from_pair(&spec.cpu_limit, &spec.memory_limit),
            },
        })
    }
}

impl PatchDocument {
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
        containers: Vec<ContainerPatch>,
    ) -> Self {
        Self {
            api_version: PATCH_API_VERSION.to_string(),
            kind: kind.into(),
            metadata: PatchMetadata {
                name: name.into(),
                namespace: namespace.into(),
            },
            spec: WorkloadSpecPatch {
                template: PodTemplatePatch {
                    spec: PodSpecPatch { containers },
                },
            },
        }
    }

    pub fn containers(&self) -> &[ContainerPatch] {
        &self.spec.template.spec.containers
    }

    pub fn container(&self, name: &str) -> Option<&ContainerPatch> {
        self.containers().iter().find(|c| c.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.containers().is_empty()
    }

    /// Serialize as JSON, indented by two spaces when `pretty`
    pub fn to_json(&self, pretty: bool) -> Result<String, PipelineError> {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        rendered.map_err(|e| PipelineError::PatchApply(format!("cannot serialize patch: {e}")))
    }

    pub fn from_json(text: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(text)
            .map_err(|e| PipelineError::PatchApply(format!("malformed patch document: {e}")))
    }
}

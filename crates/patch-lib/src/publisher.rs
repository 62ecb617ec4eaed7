//! Pull request creation through the `gh` CLI
//!
//! A missing `gh` is not a failure: the branch is already pushed, so the
//! publisher reports that the pull request has to be opened by hand.

use crate::error::PipelineError;
use crate::git::GitBranch;
use crate::patch::PatchDocument;
use crate::process::{CommandRunner, Invocation};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// Pull request to open for a pushed branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub title: String,
    pub body: String,
    pub base: String,
    pub head: String,
}

impl PullRequest {
    pub fn new(
        branch: &GitBranch,
        base: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            base: base.into(),
            head: branch.name.clone(),
        }
    }

    /// Title and markdown body describing `patch`
    pub fn for_patch(
        branch: &GitBranch,
        base: impl Into<String>,
        cluster_id: &str,
        patch: &PatchDocument,
    ) -> Self {
        let workload = format!("{}/{}", patch.metadata.namespace, patch.metadata.name);
        let title = format!("Apply CAST AI resource recommendations to {workload}");

        let mut body = format!(
            "Updates container resources of {} `{workload}` from the CAST AI workload \
             autoscaler recommendations for cluster `{cluster_id}`.\n\n\
             | Container | CPU request | CPU limit | Memory request | Memory limit |\n\
             |---|---|---|---|---|\n",
            patch.kind
        );
        for container in patch.containers() {
            let requests = container.resources.requests.as_ref();
            let limits = container.resources.limits.as_ref();
            body.push_str(&format!(
                "| `{}` | {} | {} | {} | {} |\n",
                container.name,
                cell(requests.and_then(|q| q.cpu.as_ref())),
                cell(limits.and_then(|q| q.cpu.as_ref())),
                cell(requests.and_then(|q| q.memory.as_ref())),
                cell(limits.and_then(|q| q.memory.as_ref())),
            ));
        }
        body.push_str("\nFields marked `-` are left unchanged.\n");

        Self::new(branch, base, title, body)
    }
}

fn cell(value: Option<&Quantity>) -> String {
    value.map_or_else(|| "-".to_string(), |q| q.0.clone())
}

/// Result of the publishing step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created { url: String },
    /// `gh` is unavailable; the pushed branch is the artifact to act on
    ManualRequired { branch: String },
}

pub struct PrPublisher {
    runner: Arc<dyn CommandRunner>,
    repo_path: PathBuf,
    repository: Option<String>,
}

impl PrPublisher {
    pub fn new(runner: Arc<dyn CommandRunner>, repo_path: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo_path: repo_path.into(),
            repository: None,
        }
    }

    /// Target `owner/repo` instead of the one `gh` infers from the checkout
    pub fn with_repository(mut self, repository: Option<String>) -> Self {
        self.repository = repository.filter(|r| !r.trim().is_empty());
        self
    }

    pub async fn publish(&self, request: &PullRequest) -> Result<PublishOutcome, PipelineError> {
        if !self.gh_available().await {
            return Ok(PublishOutcome::ManualRequired {
                branch: request.head.clone(),
            });
        }

        let mut invocation = Invocation::new("gh")
            .args(["pr", "create", "--base"])
            .arg(&request.base)
            .arg("--head")
            .arg(&request.head)
            .arg("--title")
            .arg(&request.title)
            .arg("--body")
            .arg(&request.body)
            .current_dir(&self.repo_path);
        if let Some(repository) = &self.repository {
            invocation = invocation.arg("--repo").arg(repository);
        }

        let output = self
            .runner
            .run(&invocation)
            .await
            .map_err(|e| PipelineError::PrCreation(format!("could not run gh: {e}")))?;
        if !output.success() {
            return Err(PipelineError::PrCreation(output.failure_summary()));
        }

        let url = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .unwrap_or_default()
            .to_string();
        Ok(PublishOutcome::Created { url })
    }

    async fn gh_available(&self) -> bool {
        match self.runner.run(&Invocation::new("gh").arg("--version")).await {
            Ok(output) if output.success() => true,
            Ok(output) => {
                warn!(error = %output.failure_summary(), "gh is installed but not usable");
                false
            }
            Err(e) => {
                warn!(error = %e, "gh CLI not available");
                false
            }
        }
    }
}

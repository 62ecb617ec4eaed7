//! End-to-end run: fetch, build, apply, publish
//!
//! Each step's output is the next step's only input. The patch file is
//! always written once the patch is built, so a failed or dry run still
//! leaves the artifact behind.

use crate::client::RecommendationSource;
use crate::config::DEFAULT_REMOTE;
use crate::error::PipelineError;
use crate::git::{ChangeRequest, EngineOutcome, GitBranch, GitWorkflowEngine, RemoteCredentials};
use crate::models::WorkloadRef;
use crate::observability::PipelineLogger;
use crate::patch::{build_patch, ManifestPatcher, PatchDocument};
use crate::process::CommandRunner;
use crate::publisher::{PrPublisher, PublishOutcome, PullRequest};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

/// Inputs for one run
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub workload: WorkloadRef,
    /// Manifest to patch, relative to the repository root
    pub manifest_path: Option<PathBuf>,
    /// Where the patch JSON is written
    pub output: PathBuf,
    pub pretty: bool,
    pub dry_run: bool,
    /// PR base branch; defaults to the branch the run started on
    pub base: Option<String>,
    pub branch_prefix: String,
    /// Timestamp used for the branch name
    pub now: DateTime<Utc>,
}

/// What a run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub patch: PatchDocument,
    pub patch_file: PathBuf,
    pub outcome: RunOutcome,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing touched beyond the patch file; `diff` is set when a manifest was given
    DryRun { diff: Option<String> },
    /// No manifest to patch, only the patch file was written
    PatchOnly,
    /// The manifest already carries the recommended values
    Unchanged,
    /// Branch pushed; `pr` is the outcome of opening the pull request
    Published {
        branch: GitBranch,
        diff: String,
        pr: Result<PublishOutcome, PipelineError>,
    },
}

pub struct Pipeline {
    source: Arc<dyn RecommendationSource>,
    runner: Arc<dyn CommandRunner>,
    repo_path: PathBuf,
    remote: String,
    credentials: Option<Arc<dyn RemoteCredentials>>,
    repository: Option<String>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn RecommendationSource>,
        runner: Arc<dyn CommandRunner>,
        repo_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            runner,
            repo_path: repo_path.into(),
            remote: DEFAULT_REMOTE.to_string(),
            credentials: None,
            repository: None,
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Arc<dyn RemoteCredentials>>) -> Self {
        self.credentials = credentials;
        self
    }

    /// `owner/repo` passed to `gh`
    pub fn with_repository(mut self, repository: Option<String>) -> Self {
        self.repository = repository;
        self
    }

    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineReport, PipelineError> {
        let workload = &request.workload;
        let logger = PipelineLogger::new(workload.qualified_name());

        let recommendation = self.source.fetch_recommendation(workload).await?;
        logger.log_recommendation(&recommendation.kind, recommendation.containers.len());

        let patch = build_patch(&recommendation, workload.container.as_deref())?;
        self.write_patch(request, &patch, &logger).await?;

        let report = |outcome| PipelineReport {
            patch: patch.clone(),
            patch_file: request.output.clone(),
            outcome,
        };

        let Some(manifest_path) = &request.manifest_path else {
            return Ok(report(if request.dry_run {
                RunOutcome::DryRun { diff: None }
            } else {
                RunOutcome::PatchOnly
            }));
        };

        let full_path = self.repo_path.join(manifest_path);
        let manifest = tokio::fs::read(&full_path).await.map_err(|e| {
            PipelineError::io(format!("failed to read manifest {}", full_path.display()), e)
        })?;
        let outcome = ManifestPatcher::for_path(manifest_path).apply(&manifest, &patch)?;
        logger.log_manifest_patched(&manifest_path.display().to_string(), outcome.changed);

        if request.dry_run {
            return Ok(report(RunOutcome::DryRun {
                diff: Some(outcome.diff),
            }));
        }

        let mut engine =
            GitWorkflowEngine::new(self.runner.clone(), &self.repo_path, logger.clone())
                .with_remote(&self.remote)
                .with_credentials(self.credentials.clone());
        let diff = outcome.diff.clone();
        let change = ChangeRequest {
            manifest_path: manifest_path.clone(),
            outcome,
            branch_name: GitBranch::name_for(&request.branch_prefix, &workload.name, request.now),
            commit_message: format!(
                "Apply CAST AI resource recommendations to {}",
                workload.qualified_name()
            ),
        };

        let branch = match engine.publish_change(&change).await? {
            EngineOutcome::NoChanges => return Ok(report(RunOutcome::Unchanged)),
            EngineOutcome::Pushed(branch) => branch,
        };

        let base = request
            .base
            .clone()
            .unwrap_or_else(|| branch.base_ref.clone());
        let pull_request = PullRequest::for_patch(&branch, base, &workload.cluster_id, &patch);
        let publisher = PrPublisher::new(self.runner.clone(), &self.repo_path)
            .with_repository(self.repository.clone());

        let pr = match publisher.publish(&pull_request).await {
            Ok(PublishOutcome::Created { url }) => {
                logger.log_pr_created(&url);
                engine.record_publication(true)?;
                Ok(PublishOutcome::Created { url })
            }
            Ok(manual @ PublishOutcome::ManualRequired { .. }) => {
                logger.log_pr_skipped(&branch.name, "gh CLI not available");
                engine.record_publication(false)?;
                Ok(manual)
            }
            Err(err) if err.is_recoverable() => {
                logger.log_pr_skipped(&branch.name, &err.to_string());
                engine.record_publication(false)?;
                Err(err)
            }
            Err(err) => return Err(err),
        };

        Ok(report(RunOutcome::Published { branch, diff, pr }))
    }

    async fn write_patch(
        &self,
        request: &PipelineRequest,
        patch: &PatchDocument,
        logger: &PipelineLogger,
    ) -> Result<(), PipelineError> {
        let mut json = patch.to_json(request.pretty)?;
        json.push('\n');
        tokio::fs::write(&request.output, json).await.map_err(|e| {
            PipelineError::io(
                format!("failed to write patch file {}", request.output.display()),
                e,
            )
        })?;
        logger.log_patch_written(
            &request.output.display().to_string(),
            patch.containers().len(),
        );
        Ok(())
    }
}

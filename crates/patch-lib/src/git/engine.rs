//! Branch → commit → push state machine with compensating rollback
//!
//! The engine captures the checked-out ref once, before touching anything, and
//! every failure after the work branch exists returns the checkout to that ref.
//! The work branch itself is kept locally so the failed attempt can be
//! inspected.

use super::credentials::RemoteCredentials;
use crate::config::DEFAULT_REMOTE;
use crate::error::{PipelineError, Stage};
use crate::observability::PipelineLogger;
use crate::patch::PatchOutcome;
use crate::process::{CommandRunner, Invocation};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Pipeline position of a [`GitWorkflowEngine`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Clean,
    BranchCreated,
    Committed,
    Pushed,
    PrCreated,
    PrSkipped,
    RolledBack,
}

impl WorkflowState {
    pub fn can_transition_to(self, next: WorkflowState) -> bool {
        use WorkflowState::*;
        matches!(
            (self, next),
            (Clean, BranchCreated)
                | (BranchCreated, Committed)
                | (BranchCreated, RolledBack)
                | (Committed, Pushed)
                | (Committed, RolledBack)
                | (Pushed, PrCreated)
                | (Pushed, PrSkipped)
        )
    }

    /// Stage that moves the workflow into this state
    pub fn stage(self) -> Stage {
        match self {
            WorkflowState::Clean => Stage::Preflight,
            WorkflowState::BranchCreated => Stage::Branch,
            WorkflowState::Committed => Stage::Commit,
            WorkflowState::Pushed => Stage::Push,
            WorkflowState::PrCreated | WorkflowState::PrSkipped => Stage::Publish,
            WorkflowState::RolledBack => Stage::Rollback,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::PrCreated | WorkflowState::PrSkipped | WorkflowState::RolledBack
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Clean => "clean",
            WorkflowState::BranchCreated => "branch_created",
            WorkflowState::Committed => "committed",
            WorkflowState::Pushed => "pushed",
            WorkflowState::PrCreated => "pr_created",
            WorkflowState::PrSkipped => "pr_skipped",
            WorkflowState::RolledBack => "rolled_back",
        };
        f.write_str(name)
    }
}

/// Work branch and the ref it was created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitBranch {
    pub name: String,
    pub base_ref: String,
}

impl GitBranch {
    /// `<prefix>-<workload>-<YYYYmmddHHMMSS>`
    ///
    /// One-second resolution: two runs for the same workload within a second
    /// produce the same name, which the engine reports instead of reusing.
    pub fn name_for(prefix: &str, workload: &str, now: DateTime<Utc>) -> String {
        format!("{prefix}-{workload}-{}", now.format("%Y%m%d%H%M%S"))
    }
}

/// Everything the engine needs to publish one manifest change
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    /// Manifest location relative to the repository root
    pub manifest_path: PathBuf,
    pub outcome: PatchOutcome,
    pub branch_name: String,
    pub commit_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    /// The patch did not change the manifest; nothing was created
    NoChanges,
    Pushed(GitBranch),
}

pub struct GitWorkflowEngine {
    runner: Arc<dyn CommandRunner>,
    repo_path: PathBuf,
    remote: String,
    credentials: Option<Arc<dyn RemoteCredentials>>,
    logger: PipelineLogger,
    state: WorkflowState,
    original_ref: Option<String>,
    branch: Option<String>,
}

impl GitWorkflowEngine {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        repo_path: impl Into<PathBuf>,
        logger: PipelineLogger,
    ) -> Self {
        Self {
            runner,
            repo_path: repo_path.into(),
            remote: DEFAULT_REMOTE.to_string(),
            credentials: None,
            logger,
            state: WorkflowState::Clean,
            original_ref: None,
            branch: None,
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

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Ref checked out when the engine started, once captured
    pub fn original_ref(&self) -> Option<&str> {
        self.original_ref.as_deref()
    }

    /// Branch, commit and push the patched manifest.
    ///
    /// An unchanged manifest returns [`EngineOutcome::NoChanges`] without
    /// touching the repository. Failures after the branch exists are rolled
    /// back before the error is returned.
    pub async fn publish_change(
        &mut self,
        request: &ChangeRequest,
    ) -> Result<EngineOutcome, PipelineError> {
        let manifest = request.manifest_path.to_string_lossy().into_owned();
        if !request.outcome.changed {
            self.logger.log_no_changes(&manifest);
            return Ok(EngineOutcome::NoChanges);
        }
        if self.state != WorkflowState::Clean {
            return Err(PipelineError::RepositoryState {
                stage: Stage::Preflight,
                message: format!("workflow already ran (state {})", self.state),
            });
        }

        let original = self.preflight(&manifest).await?;
        self.create_branch(&request.branch_name).await?;

        if let Err(err) = self.commit(request, &manifest).await {
            return Err(self.rollback(err, &manifest).await);
        }
        if let Err(err) = self.push(&request.branch_name).await {
            return Err(self.rollback(err, &manifest).await);
        }

        // Leave the checkout where we found it for the next workload
        if let Err(error) = self.git(&["checkout", original.as_str()]).await {
            self.logger.log_restore_failed(&original, &error);
        }

        Ok(EngineOutcome::Pushed(GitBranch {
            name: request.branch_name.clone(),
            base_ref: original,
        }))
    }

    /// Move from `Pushed` to `PrCreated` or `PrSkipped`
    pub fn record_publication(&mut self, created: bool) -> Result<(), PipelineError> {
        let next = if created {
            WorkflowState::PrCreated
        } else {
            WorkflowState::PrSkipped
        };
        self.transition(next)
    }

    async fn preflight(&mut self, manifest: &str) -> Result<String, PipelineError> {
        let preflight_error = |message: String| PipelineError::RepositoryState {
            stage: Stage::Preflight,
            message,
        };

        self.git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|e| {
                preflight_error(format!(
                    "{} is not a git work tree: {e}",
                    self.repo_path.display()
                ))
            })?;

        let status = self
            .git(&["status", "--porcelain", "--", manifest])
            .await
            .map_err(&preflight_error)?;
        if !status.is_empty() {
            return Err(preflight_error(format!(
                "{manifest} has uncommitted changes: {status}"
            )));
        }

        let head = self
            .git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .map_err(&preflight_error)?;
        let original = if head == "HEAD" {
            // Detached checkout: return to the exact commit
            self.git(&["rev-parse", "HEAD"])
                .await
                .map_err(&preflight_error)?
        } else {
            head
        };

        self.original_ref = Some(original.clone());
        Ok(original)
    }

    async fn create_branch(&mut self, name: &str) -> Result<(), PipelineError> {
        let branch_error = |message: String| PipelineError::RepositoryState {
            stage: Stage::Branch,
            message,
        };

        let local_ref = format!("refs/heads/{name}");
        if self
            .git(&["rev-parse", "--verify", "--quiet", local_ref.as_str()])
            .await
            .is_ok()
        {
            return Err(branch_error(format!(
                "branch '{name}' already exists; another run for this workload started within the same second"
            )));
        }

        self.git(&["checkout", "-b", name])
            .await
            .map_err(branch_error)?;
        self.branch = Some(name.to_string());
        self.transition(WorkflowState::BranchCreated)
    }

    async fn commit(&mut self, request: &ChangeRequest, manifest: &str) -> Result<(), PipelineError> {
        let commit_error = |message: String| PipelineError::RepositoryState {
            stage: Stage::Commit,
            message,
        };

        let target = self.repo_path.join(&request.manifest_path);
        tokio::fs::write(&target, &request.outcome.manifest)
            .await
            .map_err(|e| PipelineError::io(format!("failed to write {}", target.display()), e))?;

        self.git(&["add", "--", manifest])
            .await
            .map_err(commit_error)?;
        self.git(&["commit", "-m", request.commit_message.as_str()])
            .await
            .map_err(commit_error)?;
        self.transition(WorkflowState::Committed)
    }

    async fn push(&mut self, branch: &str) -> Result<(), PipelineError> {
        let args = match &self.credentials {
            Some(credentials) => {
                let remote_url = self
                    .git(&["remote", "get-url", self.remote.as_str()])
                    .await
                    .map_err(PipelineError::Push)?;
                let target = credentials.authenticate(&remote_url)?;
                vec![
                    "push".to_string(),
                    target,
                    format!("{branch}:refs/heads/{branch}"),
                ]
            }
            None => vec![
                "push".to_string(),
                "--set-upstream".to_string(),
                self.remote.clone(),
                branch.to_string(),
            ],
        };

        self.git(args.as_slice()).await.map_err(PipelineError::Push)?;
        self.logger.log_pushed(branch, &self.remote);
        self.transition(WorkflowState::Pushed)
    }

    /// Return to the original ref; the caller surfaces the returned error
    async fn rollback(&mut self, cause: PipelineError, manifest: &str) -> PipelineError {
        let from = self.state;
        let Some(original) = self.original_ref.clone() else {
            return cause;
        };
        let branch = self.branch.clone().unwrap_or_default();

        let mut steps: Vec<Vec<&str>> = Vec::new();
        if from == WorkflowState::BranchCreated {
            // Uncommitted manifest edit would otherwise follow us back
            steps.push(vec!["reset", "--quiet", "--", manifest]);
            steps.push(vec!["checkout", "--", manifest]);
        }
        steps.push(vec!["checkout", original.as_str()]);

        for step in &steps {
            if let Err(rollback) = self.git(step.as_slice()).await {
                self.logger.log_rollback_failed(&branch, &cause, &rollback);
                return PipelineError::RollbackFailure {
                    cause: Box::new(cause),
                    rollback,
                    branch,
                };
            }
        }

        self.state = WorkflowState::RolledBack;
        self.logger.log_rolled_back(from, &original, &cause);
        cause
    }

    fn transition(&mut self, next: WorkflowState) -> Result<(), PipelineError> {
        if !self.state.can_transition_to(next) {
            return Err(PipelineError::RepositoryState {
                stage: next.stage(),
                message: format!("invalid workflow transition {} -> {}", self.state, next),
            });
        }
        self.logger.log_transition(self.state, next);
        self.state = next;
        Ok(())
    }

    /// Run git in the repository; `Ok` carries trimmed stdout
    async fn git<S: AsRef<str>>(&self, args: &[S]) -> Result<String, String> {
        let invocation = Invocation::new("git")
            .args(args.iter().map(|a| a.as_ref().to_string()))
            .current_dir(&self.repo_path);

        let message = match self.runner.run(&invocation).await {
            Ok(output) if output.success() => return Ok(output.stdout.trim().to_string()),
            Ok(output) => format!("`{invocation}` failed with {}", output.failure_summary()),
            Err(e) => format!("could not run `{invocation}`: {e}"),
        };
        Err(self.redact(&message))
    }

    fn redact(&self, text: &str) -> String {
        match &self.credentials {
            Some(credentials) => credentials.redact(text),
            None => text.to_string(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}

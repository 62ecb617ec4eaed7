//! Logging for the pipeline
//!
//! Provides:
//! - Subscriber setup (text or JSON, filtered by `RIGHTSIZE_LOG` / `RUST_LOG`)
//! - Structured events for each pipeline step, tagged with the workload

use crate::error::PipelineError;
use crate::git::WorkflowState;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Install the global subscriber; logs go to stderr so stdout stays usable
/// for patch output. Calling it twice is harmless.
pub fn init_tracing(default_level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_env("RIGHTSIZE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
}

/// Structured logger for pipeline events
///
/// Every event carries the workload it belongs to, so logs from several
/// invocations can be told apart.
#[derive(Debug, Clone)]
pub struct PipelineLogger {
    workload: String,
}

impl PipelineLogger {
    pub fn new(workload: impl Into<String>) -> Self {
        Self {
            workload: workload.into(),
        }
    }

    pub fn log_startup(&self, version: &str, dry_run: bool) {
        info!(
            event = "startup",
            workload = %self.workload,
            version = %version,
            dry_run = dry_run,
            "Starting recommendation pipeline"
        );
    }

    pub fn log_recommendation(&self, kind: &str, containers: usize) {
        info!(
            event = "recommendation_fetched",
            workload = %self.workload,
            kind = %kind,
            containers = containers,
            "Fetched workload recommendation"
        );
    }

    pub fn log_patch_written(&self, path: &str, containers: usize) {
        info!(
            event = "patch_written",
            workload = %self.workload,
            path = %path,
            containers = containers,
            "Wrote patch document"
        );
    }

    pub fn log_manifest_patched(&self, manifest: &str, changed: bool) {
        info!(
            event = "manifest_patched",
            workload = %self.workload,
            manifest = %manifest,
            changed = changed,
            "Applied patch to manifest"
        );
    }

    pub fn log_no_changes(&self, manifest: &str) {
        info!(
            event = "no_changes",
            workload = %self.workload,
            manifest = %manifest,
            "Manifest already matches the recommendation, nothing to publish"
        );
    }

    pub fn log_transition(&self, from: WorkflowState, to: WorkflowState) {
        info!(
            event = "workflow_transition",
            workload = %self.workload,
            from = %from,
            to = %to,
            "Workflow state changed"
        );
    }

    pub fn log_pushed(&self, branch: &str, remote: &str) {
        info!(
            event = "branch_pushed",
            workload = %self.workload,
            branch = %branch,
            remote = %remote,
            "Pushed branch"
        );
    }

    pub fn log_rolled_back(&self, from: WorkflowState, original_ref: &str, cause: &PipelineError) {
        warn!(
            event = "rolled_back",
            workload = %self.workload,
            from = %from,
            original_ref = %original_ref,
            stage = %cause.stage(),
            error = %cause,
            "Rolled back to original ref"
        );
    }

    pub fn log_rollback_failed(&self, branch: &str, cause: &PipelineError, rollback_error: &str) {
        error!(
            event = "rollback_failed",
            workload = %self.workload,
            branch = %branch,
            stage = %cause.stage(),
            error = %cause,
            rollback_error = %rollback_error,
            "ROLLBACK FAILED: repository may be left on the work branch, manual intervention required"
        );
    }

    pub fn log_restore_failed(&self, original_ref: &str, error: &str) {
        error!(
            event = "restore_failed",
            workload = %self.workload,
            original_ref = %original_ref,
            error = %error,
            "Could not check out the original ref after pushing"
        );
    }

    pub fn log_pr_created(&self, url: &str) {
        info!(
            event = "pr_created",
            workload = %self.workload,
            url = %url,
            "Opened pull request"
        );
    }

    pub fn log_pr_skipped(&self, branch: &str, reason: &str) {
        warn!(
            event = "pr_skipped",
            workload = %self.workload,
            branch = %branch,
            reason = %reason,
            "Pull request must be created manually"
        );
    }
}

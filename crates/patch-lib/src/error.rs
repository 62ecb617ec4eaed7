//! Error taxonomy for the recommendation-to-pull-request pipeline
//!
//! Every variant maps onto the [`Stage`] that produced it so the binaries can
//! report which step failed. Only [`PipelineError::PrCreation`] is recoverable:
//! by the time it can occur the branch is already pushed.

use std::fmt;
use thiserror::Error;

/// Pipeline step an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Arguments,
    Fetch,
    Build,
    Apply,
    Preflight,
    Branch,
    Commit,
    Push,
    Publish,
    Rollback,
    Io,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Arguments => "arguments",
            Stage::Fetch => "fetch",
            Stage::Build => "build",
            Stage::Apply => "apply",
            Stage::Preflight => "preflight",
            Stage::Branch => "branch",
            Stage::Commit => "commit",
            Stage::Push => "push",
            Stage::Publish => "publish",
            Stage::Rollback => "rollback",
            Stage::Io => "io",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the pipeline components
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid arguments: {0}")]
    Argument(String),

    #[error("failed to fetch recommendation: {0}")]
    Fetch(String),

    #[error("no usable recommendations for workload '{workload}'")]
    EmptyRecommendation { workload: String },

    #[error("container '{container}' not found in {location}")]
    ContainerNotFound { container: String, location: String },

    #[error("invalid workload manifest: {0}")]
    ManifestParse(String),

    #[error("failed to apply patch: {0}")]
    PatchApply(String),

    #[error("repository not ready: {message}")]
    RepositoryState { stage: Stage, message: String },

    #[error("failed to push branch: {0}")]
    Push(String),

    #[error("failed to create pull request: {0}")]
    PrCreation(String),

    /// The checkout may still be on the work branch; needs an operator.
    #[error(
        "rollback failed after error ({cause}); repository may still be on branch '{branch}' \
         and needs manual attention: {rollback}"
    )]
    RollbackFailure {
        cause: Box<PipelineError>,
        rollback: String,
        branch: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn container_not_in_recommendation(container: &str) -> Self {
        PipelineError::ContainerNotFound {
            container: container.to_string(),
            location: "recommendation".to_string(),
        }
    }

    pub(crate) fn container_not_in_manifest(container: &str) -> Self {
        PipelineError::ContainerNotFound {
            container: container.to_string(),
            location: "manifest".to_string(),
        }
    }

    /// The stage this error is attributed to
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Argument(_) => Stage::Arguments,
            PipelineError::Fetch(_) => Stage::Fetch,
            PipelineError::EmptyRecommendation { .. } => Stage::Build,
            PipelineError::ContainerNotFound { location, .. } if location == "recommendation" => {
                Stage::Build
            }
            PipelineError::ContainerNotFound { .. } => Stage::Apply,
            PipelineError::ManifestParse(_) | PipelineError::PatchApply(_) => Stage::Apply,
            PipelineError::RepositoryState { stage, .. } => *stage,
            PipelineError::Push(_) => Stage::Push,
            PipelineError::PrCreation(_) => Stage::Publish,
            PipelineError::RollbackFailure { .. } => Stage::Rollback,
            PipelineError::Io { .. } => Stage::Io,
        }
    }

    /// Whether the pipeline can still report success after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::PrCreation(_))
    }

    /// Human-readable message naming the failed stage
    pub fn report(&self) -> String {
        format!("{} failed: {}", self.stage(), self)
    }
}

//! Settings shared by both binaries
//!
//! Layered from built-in defaults, an optional
//! `~/.config/rightsize/config.json`, and `RIGHTSIZE_*` environment variables
//! (e.g. `RIGHTSIZE_API_URL`, `RIGHTSIZE_BRANCH_PREFIX`). Command-line flags
//! override all of these.

use crate::client::DEFAULT_API_URL;
use crate::error::PipelineError;
use crate::observability::LogFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_BRANCH_PREFIX: &str = "castai-recommendations";
pub const DEFAULT_REMOTE: &str = "origin";

/// Resolved settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    /// Recommendation API endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Prefix for work branch names
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Remote the work branch is pushed to
    #[serde(default = "default_remote")]
    pub remote: String,

    /// `text` or `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_branch_prefix() -> String {
    DEFAULT_BRANCH_PREFIX.to_string()
}

fn default_remote() -> String {
    DEFAULT_REMOTE.to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            branch_prefix: default_branch_prefix(),
            remote: default_remote(),
            log_format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load from the user config file (if present) and the environment
    pub fn load() -> Result<Self, PipelineError> {
        Self::load_from(Self::config_path().as_deref())
    }

    /// Load with an explicit config file location
    pub fn load_from(path: Option<&Path>) -> Result<Self, PipelineError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            );
        }

        builder
            .add_source(config::Environment::with_prefix("RIGHTSIZE"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PipelineError::Argument(format!("invalid configuration: {e}")))
    }

    /// `~/.config/rightsize/config.json`
    pub fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("rightsize").join("config.json"))
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.log_format)
    }
}

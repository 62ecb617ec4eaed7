//! Library for turning CAST AI workload recommendations into pull requests
//!
//! This crate provides the core functionality for:
//! - Fetching recommendations from the CAST AI API
//! - Building strategic-merge resource patches
//! - Applying patches to workload manifests
//! - Publishing the change as a git branch and pull request

pub mod client;
pub mod config;
pub mod error;
pub mod git;
pub mod models;
pub mod observability;
pub mod output;
pub mod patch;
pub mod pipeline;
pub mod process;
pub mod publisher;

#[cfg(test)]
mod testing;

pub use client::{CastAiClient, RecommendationSource};
pub use config::Settings;
pub use error::{PipelineError, Stage};
pub use models::*;
pub use observability::{init_tracing, LogFormat, PipelineLogger};
pub use pipeline::{Pipeline, PipelineReport, PipelineRequest, RunOutcome};

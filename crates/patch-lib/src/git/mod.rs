//! Git publishing workflow
//!
//! [`GitWorkflowEngine`] drives a single working tree through
//! branch → commit → push, and rolls the checkout back to the ref it started
//! from whenever a step after branch creation fails. Push authentication is
//! plugged in through [`RemoteCredentials`].

mod credentials;
mod engine;


pub use credentials::{github_slug, GitHubToken, RemoteCredentials};
pub use engine::{
    ChangeRequest, EngineOutcome, GitBranch, GitWorkflowEngine, WorkflowState,
};

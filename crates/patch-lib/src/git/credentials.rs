//! Push authentication by remote URL rewrite
//!
//! The rewritten URL is only ever passed on the `git push` command line; it is
//! never stored in the repository's git config.

use crate::error::PipelineError;
use std::fmt;
use url::Url;

const REDACTED: &str = "***";

/// Rewrites a remote URL so a push can authenticate
pub trait RemoteCredentials: Send + Sync {
    /// URL to push to instead of `remote_url`
    fn authenticate(&self, remote_url: &str) -> Result<String, PipelineError>;

    /// Remove secrets from text that may be shown to a user
    fn redact(&self, text: &str) -> String;
}

/// Token auth for GitHub remotes (`x-access-token` basic auth)
#[derive(Clone)]
pub struct GitHubToken {
    token: String,
    repository: Option<String>,
}

impl fmt::Debug for GitHubToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubToken")
            .field("token", &REDACTED)
            .field("repository", &self.repository)
            .finish()
    }
}

impl GitHubToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            repository: None,
        }
    }

    /// Use `owner/repo` instead of deriving it from the remote URL
    pub fn with_repository(mut self, repository: Option<String>) -> Self {
        self.repository = repository.filter(|r| !r.trim().is_empty());
        self
    }
}

impl RemoteCredentials for GitHubToken {
    fn authenticate(&self, remote_url: &str) -> Result<String, PipelineError> {
        let slug = match &self.repository {
            Some(repository) => repository.trim().trim_end_matches(".git").to_string(),
            None => github_slug(remote_url).ok_or_else(|| {
                PipelineError::Push(format!(
                    "cannot derive owner/repo from remote '{}'; set GITHUB_REPOSITORY",
                    self.redact(remote_url)
                ))
            })?,
        };
        Ok(format!(
            "https://x-access-token:{}@github.com/{}.git",
            self.token, slug
        ))
    }

    fn redact(&self, text: &str) -> String {
        if self.token.is_empty() {
            return text.to_string();
        }
        text.replace(&self.token, REDACTED)
    }
}

/// `owner/repo` of a GitHub remote in https, ssh or scp-like form
pub fn github_slug(remote_url: &str) -> Option<String> {
    let remote_url = remote_url.trim();
    let path = match Url::parse(remote_url) {
        Ok(url) if url.host_str() == Some("github.com") => url.path().to_string(),
        Ok(_) => return None,
        // scp-like syntax: git@github.com:owner/repo.git
        Err(_) => remote_url
            .split_once("github.com:")
            .map(|(_, path)| path.to_string())?,
    };

    let slug = path.trim_matches('/').trim_end_matches(".git");
    let mut parts = slug.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty() => {
            Some(format!("{owner}/{repo}"))
        }
        _ => None,
    }
}

//! Commit lookup for workflow actions via the GitHub REST API.

use crate::config::ProcessorConfig;
use crate::reference::{ActionRef, is_commit_sha};
use crate::resolver::Resolver;
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Resolves `owner/repo@ref` to the full commit id via `GET /repos/{owner}/{repo}/commits/{ref}`.
pub struct GitHubCommits {
    client: Client,
    api_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
}

impl GitHubCommits {
    /// Creates a resolver against `api_url`, authenticating with `token` when given.
    pub fn new(api_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let api_url = api_url.into();
        if api_url.trim().is_empty() {
            bail!("GitHub API URL must not be empty");
        }
        let client = Client::builder()
            .user_agent(concat!("pinref/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    fn commit_url(&self, action: &ActionRef) -> String {
        format!(
            "{}/repos/{}/{}/commits/{}",
            self.api_url, action.owner, action.repo, action.git_ref
        )
    }
}

impl Resolver<ActionRef> for GitHubCommits {
    type Id = String;

    fn resolve(&self, action: &ActionRef, _config: &ProcessorConfig) -> Result<String> {
        let url = self.commit_url(action);
        let mut request = self
            .client
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .with_context(|| format!("Request to {} failed", url))?;
        let status = response.status();
        if !status.is_success() {
            bail!(
                "GitHub API returned status {} for {}/{}@{}",
                status.as_u16(),
                action.owner,
                action.repo,
                action.git_ref
            );
        }

        let commit: CommitResponse = response
            .json()
            .context("Failed to parse GitHub commit response")?;
        if !is_commit_sha(&commit.sha) {
            bail!("GitHub API returned malformed commit id '{}'", commit.sha);
        }
        Ok(commit.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_commit_urls_without_subpath() {
        let gh = GitHubCommits::new("https://ghe.example.com/api/v3/", None).unwrap();
        let action = ActionRef::parse("github/codeql-action/init@v3").unwrap();
        assert_eq!(
            gh.commit_url(&action),
            "https://ghe.example.com/api/v3/repos/github/codeql-action/commits/v3"
        );
    }

    #[test]
    fn blank_token_is_ignored() {
        let gh = GitHubCommits::new(DEFAULT_API_URL, Some("  ".to_string())).unwrap();
        assert!(gh.token.is_none());
    }

    #[test]
    fn rejects_empty_api_url() {
        assert!(GitHubCommits::new(" ", None).is_err());
    }

    #[test]
    fn commit_response_decodes_sha() {
        let body = r#"{"sha": "08eba0b27e820071cde6df949e0beb9ba4906955", "commit": {}}"#;
        let parsed: CommitResponse = serde_json::from_str(body).unwrap();
        assert!(is_commit_sha(&parsed.sha));
    }
}

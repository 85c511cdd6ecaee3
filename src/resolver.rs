//! Resolution capability.
//!
//! The pinning core never talks to the network itself. It is handed two
//! implementations of [`Resolver`]: one for images (yielding an
//! [`ImageDigest`]) and one for actions (yielding a commit id). Production
//! uses [`crate::registry::RegistryResolver`] and
//! [`crate::github::GitHubCommits`]; [`StaticResolver`] answers from an
//! in-memory table.

use crate::config::ProcessorConfig;
use crate::reference::{ActionRef, ImageRef};
use anyhow::{Result, anyhow};
use std::cell::RefCell;
use std::collections::HashMap;

/// Looks up the immutable identifier for a reference.
pub trait Resolver<R> {
    type Id;

    fn resolve(&self, reference: &R, config: &ProcessorConfig) -> Result<Self::Id>;
}

/// Which manifest a digest identifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestScope {
    /// Top-level manifest or multi-platform index.
    Index,
    /// Per-platform manifest selected from an index.
    Platform,
}

/// A resolved image digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDigest {
    pub digest: String,
    pub scope: DigestScope,
    /// Set when a platform was requested but the index digest was used instead.
    pub fallback: Option<String>,
}

impl ImageDigest {
    pub fn index(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            scope: DigestScope::Index,
            fallback: None,
        }
    }

    pub fn platform(digest: impl Into<String>) -> Self {
        Self {
            digest: digest.into(),
            scope: DigestScope::Platform,
            fallback: None,
        }
    }
}

/// Deterministic resolver answering from fixed tables.
///
/// Images are keyed by their written form (`nginx:1.25`), actions by
/// `owner/repo@ref`. Every lookup is recorded so callers can inspect what
/// was asked for.
#[derive(Debug, Default)]
pub struct StaticResolver {
    images: HashMap<String, ImageDigest>,
    commits: HashMap<String, String>,
    calls: RefCell<Vec<String>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, image: &str, digest: ImageDigest) -> Self {
        self.images.insert(image.to_string(), digest);
        self
    }

    pub fn with_commit(mut self, action: &str, sha: &str) -> Self {
        self.commits.insert(action.to_string(), sha.to_string());
        self
    }

    /// Keys looked up so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Resolver<ImageRef> for StaticResolver {
    type Id = ImageDigest;

    fn resolve(&self, image: &ImageRef, _config: &ProcessorConfig) -> Result<ImageDigest> {
        let key = image.to_string();
        self.calls.borrow_mut().push(key.clone());
        self.images
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("fetch manifest for {:?}: not found", key))
    }
}

impl Resolver<ActionRef> for StaticResolver {
    type Id = String;

    fn resolve(&self, action: &ActionRef, _config: &ProcessorConfig) -> Result<String> {
        let key = format!("{}/{}@{}", action.owner, action.repo, action.git_ref);
        self.calls.borrow_mut().push(key.clone());
        self.commits
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("no commit found for {}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_resolver_answers_known_keys_and_records_calls() {
        let resolver = StaticResolver::new()
            .with_image("nginx:1.25", ImageDigest::index("sha256:aa"))
            .with_commit("actions/checkout@v4", "08eba0b27e820071cde6df949e0beb9ba4906955");
        let config = ProcessorConfig::default();

        let image = ImageRef::parse("nginx:1.25").unwrap();
        let digest = resolver.resolve(&image, &config).unwrap();
        assert_eq!(digest, ImageDigest::index("sha256:aa"));

        let action = ActionRef::parse("actions/checkout/sub@v4").unwrap();
        let sha = Resolver::<ActionRef>::resolve(&resolver, &action, &config).unwrap();
        assert_eq!(sha, "08eba0b27e820071cde6df949e0beb9ba4906955");

        assert_eq!(resolver.calls(), vec!["nginx:1.25", "actions/checkout@v4"]);
    }

    #[test]
    fn static_resolver_errors_on_unknown_keys() {
        let resolver = StaticResolver::new();
        let config = ProcessorConfig::default();
        let image = ImageRef::parse("redis:7").unwrap();
        assert!(resolver.resolve(&image, &config).is_err());
        let action = ActionRef::parse("actions/cache@v4").unwrap();
        assert!(Resolver::<ActionRef>::resolve(&resolver, &action, &config).is_err());
    }
}

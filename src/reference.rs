//! Reference parsing and classification.
//!
//! Two shapes of reference are recognized: container images
//! (`[registry/]repository[:tag][@digest]`) and workflow actions
//! (`owner/repo[/path]@ref`). Classification is pure string inspection, so a
//! whole file can be classified before any network lookup happens.

use anyhow::{Result, bail};
use std::fmt;

/// Registry assumed for names without an explicit domain.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Result of inspecting a reference token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<R> {
    /// The token already carries an immutable identifier.
    AlreadyPinned,
    /// The token parsed and still needs resolution.
    Mutable(R),
    /// The token does not have the expected shape.
    Malformed(String),
}

/// A container image reference as written in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Repository name exactly as written, including any registry domain.
    pub name: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageRef {
    /// Parses `[registry/]repository[:tag][@algorithm:hex]`.
    pub fn parse(token: &str) -> Result<Self> {
        if token.is_empty() {
            bail!("empty image reference");
        }
        if token.contains('$') {
            bail!("image reference '{}' uses variable substitution", token);
        }
        if token.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
            bail!("invalid image reference '{}'", token);
        }

        let (name_part, digest) = match token.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest)
                    .map_err(|e| anyhow::anyhow!("invalid image reference '{}': {}", token, e))?;
                (name, Some(digest.to_string()))
            }
            None => (token, None),
        };

        let last_slash = name_part.rfind('/');
        let (name, tag) = match name_part.rfind(':') {
            Some(colon) if last_slash.is_none_or(|slash| colon > slash) => {
                (&name_part[..colon], Some(name_part[colon + 1..].to_string()))
            }
            _ => (name_part, None),
        };

        if let Some(tag) = &tag
            && !is_valid_tag(tag)
        {
            bail!("invalid tag '{}' in image reference '{}'", tag, token);
        }
        validate_name(name).map_err(|e| anyhow::anyhow!("invalid image reference '{}': {}", token, e))?;

        Ok(Self {
            name: name.to_string(),
            tag,
            digest,
        })
    }

    /// Registry host serving this image.
    pub fn registry(&self) -> &str {
        match split_domain(&self.name) {
            (Some(domain), _) => domain,
            (None, _) => DEFAULT_REGISTRY,
        }
    }

    /// Repository path on the registry; Docker Hub official images gain `library/`.
    pub fn repository(&self) -> String {
        let (domain, path) = split_domain(&self.name);
        if domain.is_none() && !path.contains('/') {
            format!("library/{}", path)
        } else {
            path.to_string()
        }
    }

    /// Fully-qualified name, e.g. `docker.io/library/nginx`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.registry(), self.repository())
    }

    /// Tag or `latest` when none is written.
    pub fn tag_or_latest(&self) -> &str {
        self.tag.as_deref().unwrap_or("latest")
    }

    /// Selector used to fetch the manifest: tag first, then digest, then `latest`.
    pub fn manifest_selector(&self) -> &str {
        self.tag
            .as_deref()
            .or(self.digest.as_deref())
            .unwrap_or("latest")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// Splits a leading registry domain off a repository name.
///
/// The first component counts as a domain when more components follow and it
/// contains `.` or `:`, or is `localhost`.
fn split_domain(name: &str) -> (Option<&str>, &str) {
    match name.split_once('/') {
        Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            (Some(first), rest)
        }
        _ => (None, name),
    }
}

fn validate_name(name: &str) -> Result<()> {
    let (domain, path) = split_domain(name);
    if let Some(domain) = domain
        && !domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'))
    {
        bail!("invalid registry domain '{}'", domain);
    }
    for component in path.split('/') {
        if component.is_empty() {
            bail!("empty path component");
        }
        if !component
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        {
            bail!("invalid path component '{}'", component);
        }
    }
    Ok(())
}

fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn validate_digest(digest: &str) -> Result<()> {
    let Some((algorithm, encoded)) = digest.split_once(':') else {
        bail!("digest '{}' is missing an algorithm", digest);
    };
    if algorithm.is_empty()
        || !algorithm
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-'))
    {
        bail!("invalid digest algorithm '{}'", algorithm);
    }
    if encoded.is_empty()
        || !encoded
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '=' | '_' | '-'))
    {
        bail!("invalid digest value '{}'", encoded);
    }
    Ok(())
}

/// Whether an image token already carries a digest of `algorithm`.
///
/// This is a plain substring check: a digest of another algorithm does not
/// count, which lets `--algo` force re-pinning.
pub fn has_digest(token: &str, algorithm: &str) -> bool {
    token.contains(&format!("@{}:", algorithm))
}

/// Classifies an image token against the configured digest algorithm.
///
/// The digest check comes first, so a token holding `@<algorithm>:` is never
/// parsed or resolved.
pub fn classify_image(token: &str, algorithm: &str) -> Classification<ImageRef> {
    if has_digest(token, algorithm) {
        return Classification::AlreadyPinned;
    }
    match ImageRef::parse(token) {
        Err(e) => Classification::Malformed(e.to_string()),
        Ok(image) => Classification::Mutable(image),
    }
}

/// A workflow action reference, `owner/repo[/path]@ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRef {
    pub owner: String,
    pub repo: String,
    /// Sub-directory inside the repository, e.g. `init` in `github/codeql-action/init`.
    pub path: Option<String>,
    pub git_ref: String,
}

impl ActionRef {
    pub fn parse(token: &str) -> Result<Self> {
        let Some((location, git_ref)) = token.split_once('@') else {
            bail!("invalid action reference format: {}", token);
        };
        let Some((owner, rest)) = location.split_once('/') else {
            bail!("invalid action reference format: {}", token);
        };
        let (repo, path) = match rest.split_once('/') {
            Some((repo, path)) => (repo, Some(path.to_string())),
            None => (rest, None),
        };
        if owner.is_empty() || repo.is_empty() || git_ref.is_empty() || path.as_deref() == Some("") {
            bail!("invalid action reference format: {}", token);
        }
        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path,
            git_ref: git_ref.to_string(),
        })
    }

    /// `owner/repo[/path]` without the ref.
    pub fn location(&self) -> String {
        match &self.path {
            Some(path) => format!("{}/{}/{}", self.owner, self.repo, path),
            None => format!("{}/{}", self.owner, self.repo),
        }
    }

    /// Returns a copy selecting a different ref.
    pub fn with_ref(&self, git_ref: &str) -> Self {
        Self {
            git_ref: git_ref.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for ActionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.location(), self.git_ref)
    }
}

/// Whether `s` is a full 40-character hex commit id (any case).
pub fn is_commit_sha(s: &str) -> bool {
    s.len() == 40 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Classifies an action token; only a full commit id counts as pinned.
pub fn classify_action(token: &str) -> Classification<ActionRef> {
    match ActionRef::parse(token) {
        Err(e) => Classification::Malformed(e.to_string()),
        Ok(action) if is_commit_sha(&action.git_ref) => Classification::AlreadyPinned,
        Ok(action) => Classification::Mutable(action),
    }
}

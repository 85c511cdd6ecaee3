//! Classification, override handling and resolution for single tokens.
//!
//! Every format driver hands its reference tokens to a [`Pinner`]. Failures
//! here are reported as warnings and turned into [`Outcome::Failed`], so one
//! bad reference never stops the rest of the file.

use crate::config::ProcessorConfig;
use crate::reference::{
    ActionRef, Classification, ImageRef, classify_action, classify_image, is_commit_sha,
};
use crate::report;
use crate::resolver::{ImageDigest, Resolver};
use anyhow::Result;

/// What happened to one reference token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<P> {
    /// Already immutable; left byte-for-byte as written.
    AlreadyPinned,
    /// Resolved and ready to be written back.
    Pinned(P),
    /// Malformed or unresolvable; a warning has been emitted.
    Failed,
}

/// An image resolved to a digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedImage {
    /// The token as it appeared in the file.
    pub written: String,
    /// The reference that was resolved (after any pin directive).
    pub image: ImageRef,
    pub digest: ImageDigest,
}

/// An action resolved to a commit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinnedAction {
    pub written: String,
    /// The reference that was resolved (after any pin directive).
    pub action: ActionRef,
    pub sha: String,
}

/// Resolves reference tokens through the injected resolvers.
pub struct Pinner<'a> {
    config: &'a ProcessorConfig,
    images: &'a dyn Resolver<ImageRef, Id = ImageDigest>,
    commits: &'a dyn Resolver<ActionRef, Id = String>,
}

impl<'a> Pinner<'a> {
    pub fn new(
        config: &'a ProcessorConfig,
        images: &'a dyn Resolver<ImageRef, Id = ImageDigest>,
        commits: &'a dyn Resolver<ActionRef, Id = String>,
    ) -> Self {
        Self {
            config,
            images,
            commits,
        }
    }

    pub fn config(&self) -> &'a ProcessorConfig {
        self.config
    }

    /// Pins an image token. `directive` is the `X` of a `# pin@X` comment.
    pub fn pin_image(&self, token: &str, directive: Option<&str>) -> Outcome<PinnedImage> {
        let image = match classify_image(token, &self.config.algorithm) {
            Classification::AlreadyPinned => return Outcome::AlreadyPinned,
            Classification::Malformed(reason) => {
                report::warn(&reason);
                return Outcome::Failed;
            }
            Classification::Mutable(image) => image,
        };

        let target = match directive {
            Some(directive) => match image_override(&image, directive) {
                Ok(target) => target,
                Err(e) => {
                    report::warn(&format!("ignoring pin directive '{}': {:#}", directive, e));
                    return Outcome::Failed;
                }
            },
            None if image.tag.is_some() => ImageRef {
                digest: None,
                ..image
            },
            None => image,
        };

        match self.images.resolve(&target, self.config) {
            Ok(digest) => {
                if let Some(fallback) = &digest.fallback {
                    report::warn(fallback);
                }
                Outcome::Pinned(PinnedImage {
                    written: token.to_string(),
                    image: target,
                    digest,
                })
            }
            Err(e) => {
                report::warn(&format!("{:#}", e));
                Outcome::Failed
            }
        }
    }

    /// Pins an action token. `directive` is the `X` of a `# pin@X` comment.
    pub fn pin_action(&self, token: &str, directive: Option<&str>) -> Outcome<PinnedAction> {
        let action = match classify_action(token) {
            Classification::AlreadyPinned => return Outcome::AlreadyPinned,
            Classification::Malformed(reason) => {
                report::warn(&reason);
                return Outcome::Failed;
            }
            Classification::Mutable(action) => action,
        };

        let action = match directive {
            Some(directive) => action.with_ref(directive),
            None => action,
        };

        if is_commit_sha(&action.git_ref) {
            let sha = action.git_ref.clone();
            return Outcome::Pinned(PinnedAction {
                written: token.to_string(),
                action,
                sha,
            });
        }

        match self.commits.resolve(&action, self.config) {
            Ok(sha) => Outcome::Pinned(PinnedAction {
                written: token.to_string(),
                action,
                sha,
            }),
            Err(e) => {
                report::warn(&format!(
                    "failed to resolve {}/{}@{}: {:#}",
                    action.owner, action.repo, action.git_ref, e
                ));
                Outcome::Failed
            }
        }
    }
}

/// Applies an image pin directive.
///
/// A directive containing `:`, `/` or `@` names a full reference; anything
/// else is a tag of the written repository.
fn image_override(image: &ImageRef, directive: &str) -> Result<ImageRef> {
    if directive.contains([':', '/', '@']) {
        ImageRef::parse(directive)
    } else {
        ImageRef::parse(&format!("{}:{}", image.name, directive))
    }
}

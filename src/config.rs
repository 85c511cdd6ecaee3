//! Processor configuration.
//!
//! A `ProcessorConfig` is built once from the command line and handed by
//! reference to every driver, resolver and rewriter. Nothing in the crate
//! mutates it after construction.

use anyhow::{Result, bail};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Restricts processing to one family of references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Dockerfiles and Compose files only.
    Docker,
    /// Workflow files only.
    Actions,
}

/// A target platform in `os/arch[/variant]` form, e.g. `linux/arm/v7`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            bail!("invalid platform '{}', expected os/arch[/variant]", s);
        }
        match parts.as_slice() {
            [os, arch] => Ok(Self {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: None,
            }),
            [os, arch, variant] => Ok(Self {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: Some(variant.to_string()),
            }),
            _ => bail!("invalid platform '{}', expected os/arch[/variant]", s),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Immutable settings for a pinning run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorConfig {
    /// Digest algorithm whose presence marks an image as already pinned.
    pub algorithm: String,
    /// Report changes without writing files.
    pub dry_run: bool,
    /// Write fully-qualified image names (`docker.io/library/nginx`).
    pub expand_registry: bool,
    /// Resolve platform-specific manifests instead of the index digest.
    pub platform: Option<Platform>,
    /// Suppress "already pinned" summaries.
    pub quiet: bool,
    /// Only process one family of references.
    pub mode: Option<Mode>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            algorithm: "sha256".to_string(),
            dry_run: false,
            expand_registry: false,
            platform: None,
            quiet: false,
            mode: None,
        }
    }
}

impl ProcessorConfig {
    /// Whether Dockerfiles and Compose files are in scope.
    pub fn handles_images(&self) -> bool {
        self.mode != Some(Mode::Actions)
    }

    /// Whether workflow files are in scope.
    pub fn handles_actions(&self) -> bool {
        self.mode != Some(Mode::Docker)
    }
}

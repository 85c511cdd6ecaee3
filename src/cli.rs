//! Command-line interface definitions.
//!
//! A single command: every positional path is a file or directory to pin.
//! Flags map onto [`ProcessorConfig`] and [`ScanOptions`].

use crate::config::{Mode, Platform, ProcessorConfig};
use crate::github::DEFAULT_API_URL;
use crate::scanner::ScanOptions;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

/// Pin container images and workflow actions to immutable digests.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Files or directories to process.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Preview changes without writing files.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Only scan the top level of directories.
    #[arg(long)]
    pub no_recursive: bool,

    /// Inspect every .yml/.yaml file for compose or workflow content.
    #[arg(short = 'a', long)]
    pub all_yaml: bool,

    /// Write fully-qualified image names (e.g. docker.io/library/nginx).
    #[arg(long)]
    pub expand_registry: bool,

    /// Digest algorithm that counts as already pinned.
    #[arg(long = "algo", default_value = "sha256")]
    pub algorithm: String,

    /// Only process one family of references.
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Suppress "already pinned" summaries.
    #[arg(short, long)]
    pub quiet: bool,

    /// Pin platform-specific manifests, e.g. linux/amd64 or linux/arm/v7.
    #[arg(long, value_parser = parse_platform)]
    pub platform: Option<Platform>,

    /// Glob patterns for files or directories to skip while scanning.
    #[arg(short, long)]
    pub exclude: Vec<String>,

    /// Confirm each file's changes before writing.
    #[arg(short, long)]
    pub interactive: bool,

    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Token used for GitHub commit lookups.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub API base URL, for GitHub Enterprise.
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub github_api_url: String,
}

impl Args {
    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig {
            algorithm: self.algorithm.clone(),
            dry_run: self.dry_run,
            expand_registry: self.expand_registry,
            platform: self.platform.clone(),
            quiet: self.quiet,
            mode: self.mode,
        }
    }

    pub fn scan_options(&self) -> Result<ScanOptions> {
        ScanOptions::new(!self.no_recursive, self.all_yaml, &self.exclude)
    }
}

fn parse_platform(s: &str) -> Result<Platform, String> {
    s.parse::<Platform>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["pinref", "."]).unwrap();
        let config = args.processor_config();
        assert_eq!(config.algorithm, "sha256");
        assert!(!config.dry_run);
        assert!(config.platform.is_none());
        assert!(config.mode.is_none());
        assert!(args.scan_options().unwrap().recursive);
    }

    #[test]
    fn parses_all_flags() {
        let args = Args::try_parse_from([
            "pinref",
            "-n",
            "--no-recursive",
            "-a",
            "--expand-registry",
            "--algo",
            "sha512",
            "--mode",
            "actions",
            "-q",
            "--platform",
            "linux/arm/v7",
            "-e",
            "vendor",
            "Dockerfile",
            "deploy",
        ])
        .unwrap();
        let config = args.processor_config();
        assert!(config.dry_run && config.expand_registry && config.quiet);
        assert_eq!(config.algorithm, "sha512");
        assert_eq!(config.mode, Some(Mode::Actions));
        assert_eq!(config.platform.unwrap().to_string(), "linux/arm/v7");
        let options = args.scan_options().unwrap();
        assert!(!options.recursive && options.all_yaml);
        assert_eq!(options.exclude.len(), 1);
        assert_eq!(args.paths, vec![PathBuf::from("Dockerfile"), PathBuf::from("deploy")]);
    }

    #[test]
    fn rejects_bad_platform_and_missing_paths() {
        assert!(Args::try_parse_from(["pinref", "--platform", "linux", "."]).is_err());
        assert!(Args::try_parse_from(["pinref"]).is_err());
    }
}

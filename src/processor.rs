//! Per-file processing.
//!
//! Each target is read whole, handed to its format driver, and written back
//! in a single write when the driver changed something. Targets are handled
//! one after another in the order the scanner produced them.

use crate::pinner::Pinner;
use crate::plan::{FileKind, PinRecord, PinnedRef, RewritePlan};
use crate::scanner::Target;
use crate::{compose, dockerfile, report, workflow};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Runs the driver for `kind` over `source`.
pub fn rewrite_source(kind: FileKind, source: &str, pinner: &Pinner<'_>) -> Result<RewritePlan<String>> {
    match kind {
        FileKind::Dockerfile => Ok(dockerfile::rewrite(source, pinner)),
        FileKind::Compose => compose::rewrite(source, pinner),
        FileKind::Workflow => Ok(workflow::rewrite(source, pinner)),
    }
}

/// Overwrites `path` with `contents`, keeping the file's permission bits.
pub fn persist(path: &Path, contents: &str) -> Result<()> {
    let permissions = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .permissions();
    std::fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    std::fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to restore permissions on {}", path.display()))
}

/// What happened to one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub kind: FileKind,
    pub changed: bool,
    pub written: bool,
    pub pins: Vec<PinRecord>,
    pub already_pinned: Vec<PinnedRef>,
    pub failures: usize,
}

/// Totals for a whole run.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub files_scanned: usize,
    pub files_changed: usize,
    pub files_written: usize,
    pub pinned: usize,
    pub already_pinned: usize,
    pub failures: usize,
    pub files: Vec<FileReport>,
}

impl RunSummary {
    fn add(&mut self, file: FileReport) {
        self.files_scanned += 1;
        self.files_changed += usize::from(file.changed);
        self.files_written += usize::from(file.written);
        self.pinned += file.pins.len();
        self.already_pinned += file.already_pinned.len();
        self.failures += file.failures;
        self.files.push(file);
    }
}

pub struct Processor<'a> {
    pinner: Pinner<'a>,
    interactive: bool,
}

impl<'a> Processor<'a> {
    pub fn new(pinner: Pinner<'a>) -> Self {
        Self {
            pinner,
            interactive: false,
        }
    }

    /// Ask before writing each changed file.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn process_file(&self, target: &Target) -> Result<FileReport> {
        let config = self.pinner.config();
        let path = &target.path;
        report::processing(target.kind, path);

        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let plan = rewrite_source(target.kind, &source, &self.pinner)
            .with_context(|| format!("Failed to process {}", path.display()))?;

        let mut written = false;
        if plan.changed {
            if !config.dry_run && self.confirm(path)? {
                persist(path, &plan.output)?;
                written = true;
            }
            report::file_changes(path, written);
        } else if plan.nothing_to_do() && !config.quiet {
            report::already_pinned(target.kind, &plan.already_pinned);
        }

        Ok(FileReport {
            path: path.clone(),
            kind: target.kind,
            changed: plan.changed,
            written,
            pins: plan.pins,
            already_pinned: plan.already_pinned,
            failures: plan.failures,
        })
    }

    /// Processes every target in order, stopping at the first file-level error.
    pub fn run(&self, targets: &[Target]) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for target in targets {
            summary.add(self.process_file(target)?);
        }
        Ok(summary)
    }

    fn confirm(&self, path: &Path) -> Result<bool> {
        if !self.interactive {
            return Ok(true);
        }
        dialoguer::Confirm::new()
            .with_prompt(format!("Write changes to {}?", path.display()))
            .default(false)
            .interact()
            .context("Failed to read confirmation")
    }
}

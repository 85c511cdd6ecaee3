//! Workflow driver.
//!
//! Line-oriented: every `uses:` value is a candidate. Plain actions resolve
//! to commit ids through the commit resolver, `docker://` references go
//! through the image resolver, and local `./` actions are left alone.

use crate::pinner::{Outcome, Pinner};
use crate::plan::{FileKind, PinRecord, RewritePlan};
use crate::report;
use crate::rewriter::{
    LineEdit, action_replacement, image_replacement, indentation, split_lines, unquoted_span,
};
use regex::Regex;
use std::sync::LazyLock;

static USES_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:-\s+)?uses:\s*([^\s#]\S*)").expect("uses pattern is valid")
});

static JOB_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*["']?([A-Za-z0-9_-]+)["']?:\s*(?:#.*)?$"#).expect("job key pattern is valid")
});

const DOCKER_SCHEME: &str = "docker://";

/// Byte span of the `uses:` value, quotes excluded.
fn uses_span(line: &str) -> Option<(usize, usize)> {
    let m = USES_LINE.captures(line)?.get(1)?;
    Some(unquoted_span(line, m.start(), m.end()))
}

/// Follows `jobs.<name>` keys to name the job each line belongs to.
#[derive(Debug, Default)]
struct JobTracker {
    in_jobs: bool,
    job_indent: Option<usize>,
    current: Option<String>,
}

impl JobTracker {
    fn observe(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }
        let indent = indentation(line);
        if indent == 0 {
            self.in_jobs = trimmed.strip_prefix("jobs:").is_some_and(|rest| {
                let rest = rest.trim_start();
                rest.is_empty() || rest.starts_with('#')
            });
            self.job_indent = None;
            self.current = None;
            return;
        }
        if !self.in_jobs {
            return;
        }
        let job_indent = *self.job_indent.get_or_insert(indent);
        if indent == job_indent
            && let Some(caps) = JOB_KEY.captures(line)
        {
            self.current = Some(caps[1].to_string());
        }
    }

    fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }
}

/// Rewrites every mutable `uses:` reference in `source`.
pub fn rewrite(source: &str, pinner: &Pinner<'_>) -> RewritePlan<String> {
    let mut plan = RewritePlan::new(String::with_capacity(source.len()));
    let mut jobs = JobTracker::default();

    for line in split_lines(source) {
        jobs.observe(line.content);
        let job = jobs.current();

        let Some((start, end)) = uses_span(line.content) else {
            plan.push(line.content);
            plan.push(line.ending);
            continue;
        };
        let token = &line.content[start..end];
        if token.starts_with("./") || token.starts_with("../") {
            plan.push(line.content);
            plan.push(line.ending);
            continue;
        }

        let rendered = if token.starts_with(DOCKER_SCHEME) {
            let edit = LineEdit::new(line.content, start + DOCKER_SCHEME.len(), end);
            pin_docker(&mut plan, pinner, &edit, token, job)
        } else {
            let edit = LineEdit::new(line.content, start, end);
            pin_action(&mut plan, pinner, &edit, job)
        };
        plan.push(rendered.as_deref().unwrap_or(line.content));
        plan.push(line.ending);
    }

    plan
}

fn pin_action(
    plan: &mut RewritePlan<String>,
    pinner: &Pinner<'_>,
    edit: &LineEdit<'_>,
    job: Option<&str>,
) -> Option<String> {
    match pinner.pin_action(edit.token(), edit.directive()) {
        Outcome::Pinned(pinned) => {
            let replacement = action_replacement(&pinned.action, &pinned.sha);
            let record = PinRecord {
                context: job.map(str::to_owned),
                original: pinned.written,
                pinned: replacement.token.clone(),
            };
            report::pin(FileKind::Workflow, &record);
            plan.record_pin(record);
            Some(edit.apply(&replacement))
        }
        Outcome::AlreadyPinned => {
            plan.record_already_pinned(edit.token(), job);
            None
        }
        Outcome::Failed => {
            plan.record_failure();
            None
        }
    }
}

fn pin_docker(
    plan: &mut RewritePlan<String>,
    pinner: &Pinner<'_>,
    edit: &LineEdit<'_>,
    full_token: &str,
    job: Option<&str>,
) -> Option<String> {
    match pinner.pin_image(edit.token(), edit.directive()) {
        Outcome::Pinned(pinned) => {
            let replacement = image_replacement(&pinned.image, &pinned.digest, pinner.config());
            let record = PinRecord {
                context: job.map(str::to_owned),
                original: full_token.to_string(),
                pinned: format!("{}{}", DOCKER_SCHEME, replacement.token),
            };
            report::pin(FileKind::Workflow, &record);
            plan.record_pin(record);
            Some(edit.apply(&replacement))
        }
        Outcome::AlreadyPinned => {
            plan.record_already_pinned(full_token, job);
            None
        }
        Outcome::Failed => {
            plan.record_failure();
            None
        }
    }
}

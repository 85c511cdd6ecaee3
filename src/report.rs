//! Terminal output.
//!
//! Warnings go to stderr with a `warn:` prefix; pin notices and summaries go
//! to stdout. Color is controlled globally through `colored`.

use crate::plan::{FileKind, PinRecord, PinnedRef};
use colored::Colorize;
use std::path::Path;

pub fn warn(message: &str) {
    eprintln!("{} {}", "warn:".yellow().bold(), message);
}

pub fn info(message: &str) {
    println!("{} {}", "info:".blue().bold(), message);
}

pub fn processing(kind: FileKind, path: &Path) {
    println!("{} {}: {}", "Processing".bold(), kind_name(kind), path.display());
}

fn kind_name(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Dockerfile => "Dockerfile",
        FileKind::Compose => "Compose",
        FileKind::Workflow => "Workflow",
    }
}

/// Prints one rewritten reference, e.g. `📌 [COMPOSE] web: nginx:1.25 → nginx:1.25@sha256:…`.
pub fn pin(kind: FileKind, record: &PinRecord) {
    let context = record
        .context
        .as_deref()
        .map(|c| format!("{}: ", c.cyan()))
        .unwrap_or_default();
    println!(
        "📌 [{}] {}{} → {}",
        kind.label().blue(),
        context,
        record.original.white(),
        record.pinned.green()
    );
}

/// Summarizes a file whose references were all pinned already.
pub fn already_pinned(kind: FileKind, refs: &[PinnedRef]) {
    print!("{}", already_pinned_summary(kind, refs));
}

/// Text printed by [`already_pinned`], one header line plus one line per reference.
pub fn already_pinned_summary(kind: FileKind, refs: &[PinnedRef]) -> String {
    let noun = match (kind, refs.len()) {
        (FileKind::Workflow, 1) => "action",
        (FileKind::Workflow, _) => "actions",
        (_, 1) => "image",
        (_, _) => "images",
    };
    let mut out = format!(
        "{} [{}] {} {} already pinned\n",
        "✓".green().bold(),
        kind.label().blue(),
        refs.len(),
        noun
    );
    for r in refs {
        let line = match &r.context {
            Some(context) => format!("    {} {}: {}\n", "-".dimmed(), context.cyan(), r.reference.dimmed()),
            None => format!("    {} {}\n", "-".dimmed(), r.reference.dimmed()),
        };
        out.push_str(&line);
    }
    out
}

/// Announces the write decision for a changed file.
pub fn file_changes(path: &Path, written: bool) {
    let verb = if written { "Updated:" } else { "Would update:" };
    println!("{} {}", verb.yellow().bold(), path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pinned(context: Option<&str>, reference: &str) -> PinnedRef {
        PinnedRef {
            context: context.map(str::to_owned),
            reference: reference.to_string(),
        }
    }

    #[test]
    fn summarizes_already_pinned_references() {
        colored::control::set_override(false);

        let actions = [
            pinned(Some("test"), "actions/checkout@08eba0b27e820071cde6df949e0beb9ba4906955"),
            pinned(Some("lint"), "actions/setup-go@0aaccfd150d50ccaeb58ebd88d36e91967a5f35b"),
        ];
        insta::assert_snapshot!(already_pinned_summary(FileKind::Workflow, &actions), @r"
        ✓ [ACTIONS] 2 actions already pinned
            - test: actions/checkout@08eba0b27e820071cde6df949e0beb9ba4906955
            - lint: actions/setup-go@0aaccfd150d50ccaeb58ebd88d36e91967a5f35b
        ");

        let images = [pinned(None, "nginx@sha256:aaaa")];
        insta::assert_snapshot!(already_pinned_summary(FileKind::Dockerfile, &images), @r"
        ✓ [DOCKERFILE] 1 image already pinned
            - nginx@sha256:aaaa
        ");
    }
}

//! Dockerfile driver.
//!
//! Line-oriented: every `FROM` instruction contributes its image token.
//! Leading `--flag` options are skipped, `scratch` and references to earlier
//! build stages are left alone, and all other lines pass through untouched.

use crate::pinner::{Outcome, Pinner};
use crate::plan::{FileKind, PinRecord, RewritePlan};
use crate::report;
use crate::rewriter::{LineEdit, image_replacement, split_lines};
use std::collections::HashSet;

/// Location of the image token within a `FROM` line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FromInstruction<'a> {
    start: usize,
    end: usize,
    stage: Option<&'a str>,
}

/// Whitespace-separated fields with their byte offsets.
fn fields(line: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                out.push((s, &line[s..i]));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push((s, &line[s..]));
    }
    out
}

fn parse_from(line: &str) -> Option<FromInstruction<'_>> {
    let fields = fields(line);
    let (keyword, rest) = fields.split_first()?;
    if !keyword.1.eq_ignore_ascii_case("FROM") {
        return None;
    }

    let mut rest = rest.iter().skip_while(|(_, f)| f.starts_with("--"));
    let &(start, image) = rest.next()?;
    if image.starts_with('#') {
        return None;
    }
    let stage = match (rest.next(), rest.next()) {
        (Some((_, kw)), Some((_, name))) if kw.eq_ignore_ascii_case("AS") => Some(*name),
        _ => None,
    };
    Some(FromInstruction {
        start,
        end: start + image.len(),
        stage,
    })
}

/// Rewrites every mutable `FROM` image in `source`.
pub fn rewrite(source: &str, pinner: &Pinner<'_>) -> RewritePlan<String> {
    let mut plan = RewritePlan::new(String::with_capacity(source.len()));
    let mut stages: HashSet<String> = HashSet::new();

    for line in split_lines(source) {
        let Some(from) = parse_from(line.content) else {
            plan.push(line.content);
            plan.push(line.ending);
            continue;
        };

        let edit = LineEdit::new(line.content, from.start, from.end);
        let token = edit.token();
        let is_candidate =
            !token.eq_ignore_ascii_case("scratch") && !stages.contains(&token.to_ascii_lowercase());
        if let Some(stage) = from.stage {
            stages.insert(stage.to_ascii_lowercase());
        }
        if !is_candidate {
            plan.push(line.content);
            plan.push(line.ending);
            continue;
        }

        match pinner.pin_image(token, edit.directive()) {
            Outcome::Pinned(pinned) => {
                let replacement = image_replacement(&pinned.image, &pinned.digest, pinner.config());
                let record = PinRecord {
                    context: from.stage.map(str::to_owned),
                    original: pinned.written,
                    pinned: replacement.token.clone(),
                };
                report::pin(FileKind::Dockerfile, &record);
                plan.record_pin(record);
                plan.push(&edit.apply(&replacement));
            }
            Outcome::AlreadyPinned => {
                plan.record_already_pinned(token, from.stage);
                plan.push(line.content);
            }
            Outcome::Failed => {
                plan.record_failure();
                plan.push(line.content);
            }
        }
        plan.push(line.ending);
    }

    plan
}

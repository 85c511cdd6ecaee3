//! In-place token rewriting and provenance comments.
//!
//! A line-oriented rewrite replaces exactly one byte span of a line (the
//! reference token) and leaves everything before it untouched. Everything
//! after it is kept too, except that a `# pin@<selector>` comment may be
//! merged in front of an existing trailing comment.

use crate::config::ProcessorConfig;
use crate::reference::{ActionRef, ImageRef};
use crate::resolver::{DigestScope, ImageDigest};
use regex::Regex;
use std::sync::LazyLock;

static PIN_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#\s*pin@(\S+)").expect("pin directive pattern is valid"));

/// Returns `X` from a `# pin@X` comment in `text`, if present.
pub fn extract_pin_directive(text: &str) -> Option<&str> {
    PIN_DIRECTIVE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Adds `# <annotation>` to a line suffix.
///
/// A suffix that already holds a pin directive is returned unchanged. An
/// existing comment is kept, with the annotation inserted just before it.
pub fn merge_pin_comment(suffix: &str, annotation: &str) -> String {
    if extract_pin_directive(suffix).is_some() {
        return suffix.to_string();
    }
    match suffix.find('#') {
        Some(hash) => format!("{}# {} {}", &suffix[..hash], annotation, &suffix[hash..]),
        None => format!("{} # {}", suffix, annotation),
    }
}

/// New token text plus the provenance comment to attach, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub token: String,
    pub annotation: Option<String>,
}

fn written_name(image: &ImageRef, config: &ProcessorConfig) -> String {
    if config.expand_registry {
        image.full_name()
    } else {
        image.name.clone()
    }
}

/// `name:tag@digest`, keeping the human-readable tag inside the reference.
///
/// An image written with only a digest stays `name@digest`.
pub fn inline_image_token(image: &ImageRef, digest: &ImageDigest, config: &ProcessorConfig) -> String {
    let name = written_name(image, config);
    if image.tag.is_none() && image.digest.is_some() {
        format!("{}@{}", name, digest.digest)
    } else {
        format!("{}:{}@{}", name, image.tag_or_latest(), digest.digest)
    }
}

/// Replacement for an image token in a line-oriented file.
///
/// Index digests drop the tag from the reference and record it as
/// `# pin@name:tag`. Platform digests keep the tag inline and add no comment.
pub fn image_replacement(image: &ImageRef, digest: &ImageDigest, config: &ProcessorConfig) -> Replacement {
    match digest.scope {
        DigestScope::Platform => Replacement {
            token: inline_image_token(image, digest, config),
            annotation: None,
        },
        DigestScope::Index => {
            let annotation = if image.tag.is_none() && image.digest.is_some() {
                None
            } else {
                Some(format!("pin@{}:{}", image.name, image.tag_or_latest()))
            };
            Replacement {
                token: format!("{}@{}", written_name(image, config), digest.digest),
                annotation,
            }
        }
    }
}

/// Replacement for an action token: `owner/repo@<sha>` with `# pin@<ref>`.
pub fn action_replacement(action: &ActionRef, sha: &str) -> Replacement {
    Replacement {
        token: action.with_ref(sha).to_string(),
        annotation: Some(format!("pin@{}", action.git_ref)),
    }
}

/// A line split from its terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub content: &'a str,
    /// `"\n"`, `"\r\n"`, or empty for a final unterminated line.
    pub ending: &'a str,
}

/// Splits text into lines, keeping each line's exact terminator.
pub fn split_lines(text: &str) -> impl Iterator<Item = Line<'_>> {
    text.split_inclusive('\n').map(|raw| {
        let content = raw
            .strip_suffix("\r\n")
            .or_else(|| raw.strip_suffix('\n'))
            .unwrap_or(raw);
        Line {
            content,
            ending: &raw[content.len()..],
        }
    })
}

/// Width of a line's leading whitespace.
pub fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Narrows `start..end` to exclude a matching pair of surrounding quotes.
pub fn unquoted_span(line: &str, start: usize, end: usize) -> (usize, usize) {
    let token = &line[start..end];
    for quote in ['"', '\''] {
        if token.len() >= 2 && token.starts_with(quote) && token.ends_with(quote) {
            return (start + 1, end - 1);
        }
    }
    (start, end)
}

/// A reference token located by byte offsets within one line.
#[derive(Debug, Clone, Copy)]
pub struct LineEdit<'a> {
    line: &'a str,
    start: usize,
    end: usize,
}

impl<'a> LineEdit<'a> {
    pub fn new(line: &'a str, start: usize, end: usize) -> Self {
        debug_assert!(start <= end && end <= line.len());
        Self { line, start, end }
    }

    pub fn token(&self) -> &'a str {
        &self.line[self.start..self.end]
    }

    /// Everything after the token, including any trailing comment.
    pub fn suffix(&self) -> &'a str {
        &self.line[self.end..]
    }

    /// Pin directive written after the token, if any.
    pub fn directive(&self) -> Option<&'a str> {
        extract_pin_directive(self.suffix())
    }

    /// Renders the line with the token replaced and the annotation merged.
    pub fn apply(&self, replacement: &Replacement) -> String {
        let suffix = match &replacement.annotation {
            Some(annotation) => merge_pin_comment(self.suffix(), annotation),
            None => self.suffix().to_string(),
        };
        format!("{}{}{}", &self.line[..self.start], replacement.token, suffix)
    }
}

//! Per-file change accumulation.
//!
//! A [`RewritePlan`] collects the rewritten output of one pass over one file,
//! whether anything changed, and what was found already pinned. It is owned
//! by a single driver call and never shared across files.

use serde::Serialize;

/// Format family of a processed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Dockerfile,
    Compose,
    Workflow,
}

impl FileKind {
    /// Tag shown in terminal output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Dockerfile => "DOCKERFILE",
            Self::Compose => "COMPOSE",
            Self::Workflow => "ACTIONS",
        }
    }
}

/// A reference rewritten during the pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinRecord {
    /// Service or job the reference belongs to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub original: String,
    pub pinned: String,
}

/// A reference that was already immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinnedRef {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub reference: String,
}

/// Output of one rewrite pass plus what happened along the way.
#[derive(Debug, Clone)]
pub struct RewritePlan<T> {
    pub output: T,
    pub changed: bool,
    pub pins: Vec<PinRecord>,
    pub already_pinned: Vec<PinnedRef>,
    pub failures: usize,
}

impl<T> RewritePlan<T> {
    pub fn new(output: T) -> Self {
        Self {
            output,
            changed: false,
            pins: Vec::new(),
            already_pinned: Vec::new(),
            failures: 0,
        }
    }

    pub fn record_pin(&mut self, record: PinRecord) {
        self.changed = true;
        self.pins.push(record);
    }

    pub fn record_already_pinned(&mut self, reference: &str, context: Option<&str>) {
        self.already_pinned.push(PinnedRef {
            context: context.map(str::to_owned),
            reference: reference.to_string(),
        });
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Whether the pass found references, all of them already pinned.
    pub fn nothing_to_do(&self) -> bool {
        !self.changed && !self.already_pinned.is_empty()
    }
}

impl RewritePlan<String> {
    /// Appends text to the output buffer.
    pub fn push(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

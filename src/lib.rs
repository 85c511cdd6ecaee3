//! pinref library for pinning container images and workflow actions.
//!
//! Mutable references such as `FROM nginx:1.25` or
//! `uses: actions/checkout@v4` are rewritten into immutable ones (an image
//! digest or a full commit id) while the rest of the file is left as it was.
//! The work happens in three phases:
//!
//! 1. **Scanning**: find Dockerfiles, Compose files and workflow files
//! 2. **Resolution**: look up each mutable reference through a [`Resolver`]
//! 3. **Rewriting**: replace the token in place and record a `# pin@...` comment
//!
//! # Example
//!
//! ```no_run
//! use pinref::config::ProcessorConfig;
//! use pinref::pinner::Pinner;
//! use pinref::processor::Processor;
//! use pinref::resolver::{ImageDigest, StaticResolver};
//! use pinref::scanner::{self, ScanOptions};
//! use std::path::PathBuf;
//!
//! let config = ProcessorConfig { dry_run: true, ..ProcessorConfig::default() };
//! let resolver = StaticResolver::new()
//!     .with_image("nginx:1.25", ImageDigest::index(format!("sha256:{}", "a".repeat(64))))
//!     .with_commit("actions/checkout@v4", "08eba0b27e820071cde6df949e0beb9ba4906955");
//!
//! let options = ScanOptions::new(true, false, &[]).unwrap();
//! let targets = scanner::collect_targets(&[PathBuf::from(".")], &options, &config).unwrap();
//! let summary = Processor::new(Pinner::new(&config, &resolver, &resolver))
//!     .run(&targets)
//!     .unwrap();
//!
//! println!("{} references would be pinned", summary.pinned);
//! ```

pub mod cli;
pub mod compose;
pub mod config;
pub mod dockerfile;
pub mod github;
pub mod pinner;
pub mod plan;
pub mod processor;
pub mod reference;
pub mod registry;
pub mod report;
pub mod resolver;
pub mod rewriter;
pub mod scanner;
pub mod workflow;

pub use config::{Mode, Platform, ProcessorConfig};
pub use plan::{FileKind, RewritePlan};
pub use processor::{FileReport, Processor, RunSummary};
pub use resolver::{ImageDigest, Resolver, StaticResolver};

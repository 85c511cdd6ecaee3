//! Target discovery.
//!
//! Walks the paths given on the command line and decides which format driver
//! each file belongs to. Detection by name comes first (`Dockerfile`,
//! `docker-compose.yml`, `.github/workflows/*.yml`); YAML files with other
//! names are sniffed for a compose or workflow shape when explicitly named or
//! when `--all-yaml` is set.

use crate::config::ProcessorConfig;
use crate::plan::FileKind;
use crate::report;
use anyhow::{Context, Result};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file and the driver that will process it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: PathBuf,
    pub kind: FileKind,
}

/// Traversal settings.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub recursive: bool,
    /// Sniff every `.yml`/`.yaml` file, not only the conventionally named ones.
    pub all_yaml: bool,
    pub exclude: Vec<glob::Pattern>,
}

impl ScanOptions {
    pub fn new(recursive: bool, all_yaml: bool, exclude: &[String]) -> Result<Self> {
        let exclude = exclude
            .iter()
            .map(|p| {
                glob::Pattern::new(p).with_context(|| format!("Invalid exclude pattern '{}'", p))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            recursive,
            all_yaml,
            exclude,
        })
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.exclude
            .iter()
            .any(|p| p.matches(name) || p.matches_path(path))
    }
}

fn lower_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

pub fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"))
}

/// Detects a file kind from its path alone.
pub fn kind_from_name(path: &Path) -> Option<FileKind> {
    let name = lower_file_name(path);
    if name == "dockerfile" || name.ends_with(".dockerfile") || name.starts_with("dockerfile.") {
        return Some(FileKind::Dockerfile);
    }
    if !is_yaml(path) {
        return None;
    }
    if name.starts_with("docker-compose.") || name.starts_with("compose.") {
        return Some(FileKind::Compose);
    }
    let in_workflows = path
        .parent()
        .is_some_and(|dir| dir.components().any(|c| c.as_os_str() == "workflows"));
    in_workflows.then_some(FileKind::Workflow)
}

/// Detects a YAML file kind from its top-level keys.
///
/// `jobs` plus `on` marks a workflow, a non-empty `services` map marks a
/// compose file. Anything else is `None`.
pub fn kind_from_content(source: &str) -> Result<Option<FileKind>> {
    if source.trim().is_empty() {
        return Ok(None);
    }
    let document: Value = serde_yaml::from_str(source).context("Failed to parse YAML")?;
    let Some(map) = document.as_mapping() else {
        return Ok(None);
    };
    let has_on = map.contains_key("on") || map.contains_key(Value::Bool(true));
    if map.contains_key("jobs") && has_on {
        return Ok(Some(FileKind::Workflow));
    }
    let has_services = map
        .get("services")
        .and_then(Value::as_mapping)
        .is_some_and(|services| !services.is_empty());
    Ok(has_services.then_some(FileKind::Compose))
}

fn in_scope(kind: FileKind, config: &ProcessorConfig) -> bool {
    match kind {
        FileKind::Dockerfile | FileKind::Compose => config.handles_images(),
        FileKind::Workflow => config.handles_actions(),
    }
}

fn sniff(path: &Path) -> Result<Option<FileKind>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    kind_from_content(&source).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Decides the driver for a file named on the command line.
///
/// Malformed YAML is an error here, since the user asked for this file.
pub fn classify_explicit(path: &Path, config: &ProcessorConfig) -> Result<Option<FileKind>> {
    let kind = match kind_from_name(path) {
        Some(kind) => Some(kind),
        None if is_yaml(path) => sniff(path)?,
        None => None,
    };
    Ok(kind.filter(|k| in_scope(*k, config)))
}

/// Decides the driver for a file found while walking a directory.
///
/// YAML that fails to parse while sniffing is skipped with a warning.
pub fn classify_discovered(
    path: &Path,
    options: &ScanOptions,
    config: &ProcessorConfig,
) -> Option<FileKind> {
    let kind = match kind_from_name(path) {
        Some(kind) => Some(kind),
        None if options.all_yaml && is_yaml(path) => match sniff(path) {
            Ok(kind) => kind,
            Err(e) => {
                report::warn(&format!("skipping {}: {:#}", path.display(), e));
                None
            }
        },
        None => None,
    };
    kind.filter(|k| in_scope(*k, config))
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|s| s.starts_with('.') && s != ".github")
}

/// Collects processable files under `paths`, in the order given.
///
/// Directory contents are visited in file-name order. A path that does not
/// exist is an error.
pub fn collect_targets(
    paths: &[PathBuf],
    options: &ScanOptions,
    config: &ProcessorConfig,
) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to access {}", path.display()))?;

        if !metadata.is_dir() {
            match classify_explicit(path, config)? {
                Some(kind) => targets.push(Target {
                    path: path.clone(),
                    kind,
                }),
                None => report::info(&format!("Skipping unsupported file: {}", path.display())),
            }
            continue;
        }

        let mut walker = WalkDir::new(path).sort_by_file_name();
        if !options.recursive {
            walker = walker.max_depth(1);
        }
        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(is_hidden(e) || options.is_excluded(e.path())))
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(kind) = classify_discovered(entry.path(), options, config) {
                targets.push(Target {
                    path: entry.into_path(),
                    kind,
                });
            }
        }
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Mode;
    use std::fs;

    fn fixture(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(path)
    }

    fn relative(targets: &[Target], root: &Path) -> Vec<(String, FileKind)> {
        targets
            .iter()
            .map(|t| {
                let rel = t.path.strip_prefix(root).unwrap();
                (rel.to_string_lossy().replace('\\', "/"), t.kind)
            })
            .collect()
    }

    #[test]
    fn detects_kinds_by_name() {
        assert_eq!(kind_from_name(Path::new("Dockerfile")), Some(FileKind::Dockerfile));
        assert_eq!(kind_from_name(Path::new("app/api.Dockerfile")), Some(FileKind::Dockerfile));
        assert_eq!(kind_from_name(Path::new("Dockerfile.dev")), Some(FileKind::Dockerfile));
        assert_eq!(kind_from_name(Path::new("docker-compose.yml")), Some(FileKind::Compose));
        assert_eq!(kind_from_name(Path::new("docker-compose.prod.yaml")), Some(FileKind::Compose));
        assert_eq!(kind_from_name(Path::new("compose.yaml")), Some(FileKind::Compose));
        assert_eq!(
            kind_from_name(Path::new(".github/workflows/ci.yml")),
            Some(FileKind::Workflow)
        );
        assert_eq!(kind_from_name(Path::new("config.yml")), None);
        assert_eq!(kind_from_name(Path::new("workflows.txt")), None);
        assert_eq!(kind_from_name(Path::new("README.md")), None);
    }

    #[test]
    fn detects_kinds_by_content() {
        let workflow = "name: ci\non: push\njobs:\n  build:\n    runs-on: ubuntu-latest\n";
        assert_eq!(kind_from_content(workflow).unwrap(), Some(FileKind::Workflow));

        let compose = "services:\n  web:\n    image: nginx\n";
        assert_eq!(kind_from_content(compose).unwrap(), Some(FileKind::Compose));

        assert_eq!(kind_from_content("services: {}\n").unwrap(), None);
        assert_eq!(kind_from_content("jobs:\n  a: {}\n").unwrap(), None);
        assert_eq!(kind_from_content("- a\n- b\n").unwrap(), None);
        assert_eq!(kind_from_content("").unwrap(), None);
        assert!(kind_from_content("key: [unclosed\n").is_err());
    }

    #[test]
    fn collects_fixture_tree() {
        let root = fixture("project");
        let options = ScanOptions::new(true, false, &[]).unwrap();
        let targets = collect_targets(&[root.clone()], &options, &ProcessorConfig::default()).unwrap();
        assert_eq!(
            relative(&targets, &root),
            vec![
                (".github/workflows/ci.yml".to_string(), FileKind::Workflow),
                ("Dockerfile".to_string(), FileKind::Dockerfile),
                ("docker-compose.yml".to_string(), FileKind::Compose),
                ("services/api/api.dockerfile".to_string(), FileKind::Dockerfile),
            ]
        );
    }

    #[test]
    fn all_yaml_sniffs_unconventional_names() {
        let root = fixture("project");
        let options = ScanOptions::new(true, true, &[]).unwrap();
        let targets = collect_targets(&[root.clone()], &options, &ProcessorConfig::default()).unwrap();
        let found = relative(&targets, &root);
        assert!(found.contains(&("deploy/stack.yml".to_string(), FileKind::Compose)));
        assert!(!found.iter().any(|(p, _)| p == "deploy/settings.yaml"));
    }

    #[test]
    fn non_recursive_scan_stays_at_top_level() {
        let root = fixture("project");
        let options = ScanOptions::new(false, false, &[]).unwrap();
        let targets = collect_targets(&[root.clone()], &options, &ProcessorConfig::default()).unwrap();
        assert_eq!(
            relative(&targets, &root),
            vec![
                ("Dockerfile".to_string(), FileKind::Dockerfile),
                ("docker-compose.yml".to_string(), FileKind::Compose),
            ]
        );
    }

    #[test]
    fn mode_and_excludes_filter_targets() {
        let root = fixture("project");
        let options = ScanOptions::new(true, false, &["services".to_string()]).unwrap();
        let config = ProcessorConfig {
            mode: Some(Mode::Docker),
            ..ProcessorConfig::default()
        };
        let targets = collect_targets(&[root.clone()], &options, &config).unwrap();
        assert_eq!(
            relative(&targets, &root),
            vec![
                ("Dockerfile".to_string(), FileKind::Dockerfile),
                ("docker-compose.yml".to_string(), FileKind::Compose),
            ]
        );

        let config = ProcessorConfig {
            mode: Some(Mode::Actions),
            ..ProcessorConfig::default()
        };
        let options = ScanOptions::new(true, false, &[]).unwrap();
        let targets = collect_targets(&[root.clone()], &options, &config).unwrap();
        assert_eq!(
            relative(&targets, &root),
            vec![(".github/workflows/ci.yml".to_string(), FileKind::Workflow)]
        );
    }

    #[test]
    fn skips_hidden_directories_other_than_github() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".cache")).unwrap();
        fs::write(dir.path().join(".cache/Dockerfile"), "FROM alpine\n").unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        let options = ScanOptions::new(true, false, &[]).unwrap();
        let targets =
            collect_targets(&[dir.path().to_path_buf()], &options, &ProcessorConfig::default()).unwrap();
        assert_eq!(relative(&targets, dir.path()), vec![("Dockerfile".to_string(), FileKind::Dockerfile)]);
    }

    #[test]
    fn explicit_files_are_sniffed_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let stack = dir.path().join("stack.yml");
        fs::write(&stack, "services:\n  web:\n    image: nginx\n").unwrap();
        let broken = dir.path().join("broken.yml");
        fs::write(&broken, "services: [unclosed\n").unwrap();
        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "FROM nginx\n").unwrap();

        let options = ScanOptions::default();
        let config = ProcessorConfig::default();
        let targets = collect_targets(&[stack.clone(), notes], &options, &config).unwrap();
        assert_eq!(
            targets,
            vec![Target {
                path: stack,
                kind: FileKind::Compose
            }]
        );
        assert!(collect_targets(&[broken], &options, &config).is_err());
    }

    #[test]
    fn discovered_malformed_yaml_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.yml"), "services: [unclosed\n").unwrap();
        let options = ScanOptions::new(true, true, &[]).unwrap();
        let targets =
            collect_targets(&[dir.path().to_path_buf()], &options, &ProcessorConfig::default()).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn missing_path_is_an_error() {
        let err = collect_targets(
            &[PathBuf::from("/definitely/not/here")],
            &ScanOptions::default(),
            &ProcessorConfig::default(),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to access"));
    }

    #[test]
    fn rejects_bad_exclude_pattern() {
        assert!(ScanOptions::new(true, false, &["[".to_string()]).is_err());
    }
}

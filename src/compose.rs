//! Compose driver.
//!
//! The file is parsed only to validate it and to learn each service's image.
//! Edits are then made line by line: an `image:` line is rewritten when it is
//! a direct field of a service under the top-level `services:` key and its
//! value matches what the parser read for that service. Every other byte of
//! the file passes through unchanged, comments and quoting included.

use crate::pinner::{Outcome, Pinner};
use crate::plan::{FileKind, PinRecord, RewritePlan};
use crate::report;
use crate::rewriter::{LineEdit, image_replacement, indentation, split_lines, unquoted_span};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

static IMAGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*image:\s*(?:&\S+\s+)?([^\s#]\S*)").expect("image pattern is valid")
});

static SERVICE_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*["']?([A-Za-z0-9._-]+)["']?:\s*(?:#.*)?$"#).expect("service key pattern is valid")
});

fn service_name(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => format!("{:?}", other),
    }
}

/// `(service, image)` pairs of every document in `source`.
fn service_images(source: &str) -> Result<HashSet<(String, String)>> {
    let mut images = HashSet::new();
    for document in serde_yaml::Deserializer::from_str(source) {
        let document = Value::deserialize(document).context("Failed to parse Compose YAML")?;
        let Some(services) = document.get("services").and_then(Value::as_mapping) else {
            continue;
        };
        for (key, service) in services {
            if let Some(image) = service.get("image").and_then(Value::as_str)
                && !image.trim().is_empty()
            {
                images.insert((service_name(key), image.to_string()));
            }
        }
    }
    Ok(images)
}

/// Follows `services.<name>` keys and the indentation of their fields.
#[derive(Debug, Default)]
struct ServiceTracker {
    in_services: bool,
    service_indent: Option<usize>,
    field_indent: Option<usize>,
    current: Option<String>,
}

impl ServiceTracker {
    fn observe(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return;
        }
        let indent = indentation(line);
        if indent == 0 {
            self.in_services = trimmed.strip_prefix("services:").is_some_and(|rest| {
                let rest = rest.trim_start();
                rest.is_empty() || rest.starts_with('#')
            });
            self.service_indent = None;
            self.field_indent = None;
            self.current = None;
            return;
        }
        if !self.in_services {
            return;
        }
        let service_indent = *self.service_indent.get_or_insert(indent);
        if indent == service_indent {
            self.current = SERVICE_KEY.captures(line).map(|caps| caps[1].to_string());
            self.field_indent = None;
        } else if indent > service_indent && self.current.is_some() {
            self.field_indent.get_or_insert(indent);
        }
    }

    /// Service owning `line`, when the line is one of its direct fields.
    fn service_of(&self, line: &str) -> Option<&str> {
        if self.field_indent != Some(indentation(line)) {
            return None;
        }
        self.current.as_deref()
    }
}

/// Byte span of an `image:` value, quotes excluded.
fn image_span(line: &str) -> Option<(usize, usize)> {
    let m = IMAGE_LINE.captures(line)?.get(1)?;
    Some(unquoted_span(line, m.start(), m.end()))
}

/// Rewrites every mutable service image in a Compose file.
///
/// Fails only when `source` is not valid YAML.
pub fn rewrite(source: &str, pinner: &Pinner<'_>) -> Result<RewritePlan<String>> {
    let images = service_images(source)?;
    let mut plan = RewritePlan::new(String::with_capacity(source.len()));
    let mut services = ServiceTracker::default();

    for line in split_lines(source) {
        services.observe(line.content);
        let target = services.service_of(line.content).and_then(|service| {
            let (start, end) = image_span(line.content)?;
            let token = &line.content[start..end];
            images
                .contains(&(service.to_string(), token.to_string()))
                .then_some((service, start, end))
        });
        let Some((service, start, end)) = target else {
            plan.push(line.content);
            plan.push(line.ending);
            continue;
        };

        let edit = LineEdit::new(line.content, start, end);
        match pinner.pin_image(edit.token(), edit.directive()) {
            Outcome::Pinned(pinned) => {
                let replacement = image_replacement(&pinned.image, &pinned.digest, pinner.config());
                let record = PinRecord {
                    context: Some(service.to_string()),
                    original: pinned.written,
                    pinned: replacement.token.clone(),
                };
                report::pin(FileKind::Compose, &record);
                plan.record_pin(record);
                plan.push(&edit.apply(&replacement));
            }
            Outcome::AlreadyPinned => {
                plan.record_already_pinned(edit.token(), Some(service));
                plan.push(line.content);
            }
            Outcome::Failed => {
                plan.record_failure();
                plan.push(line.content);
            }
        }
        plan.push(line.ending);
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
    use crate::resolver::{ImageDigest, StaticResolver};

    fn digest(c: char) -> String {
        format!("sha256:{}", c.to_string().repeat(64))
    }

    fn run(source: &str) -> Result<RewritePlan<String>> {
        let config = ProcessorConfig::default();
        let r = StaticResolver::new()
            .with_image("nginx:latest", ImageDigest::index(digest('a')))
            .with_image("postgres:16", ImageDigest::index(digest('b')))
            .with_image("ruby:3.4", ImageDigest::platform(digest('c')))
            .with_image("nginx:1.25", ImageDigest::index(digest('e')));
        let pinner = Pinner::new(&config, &r, &r);
        rewrite(source, &pinner)
    }

    #[test]
    fn locates_image_values() {
        let line = "    image: nginx:1.25 # proxy";
        let (s, e) = image_span(line).unwrap();
        assert_eq!(&line[s..e], "nginx:1.25");

        let line = "    image: 'nginx:1.25'";
        let (s, e) = image_span(line).unwrap();
        assert_eq!(&line[s..e], "nginx:1.25");

        let line = "    image: &base nginx:1.25";
        let (s, e) = image_span(line).unwrap();
        assert_eq!(&line[s..e], "nginx:1.25");

        assert!(image_span("    # image: nginx").is_none());
        assert!(image_span("    image:").is_none());
        assert!(image_span("    imagefile: x").is_none());
    }

    #[test]
    fn pins_service_images_in_place() {
        let source = "\
# top comment
version: \"3.8\"
services:
  web:
    image: nginx:latest # frontend proxy
    ports:
      - \"80:80\" # http
  db:
    environment:
      POSTGRES_DB: app
    image: \"postgres:16\"
volumes:
  data: {}
";
        let plan = run(source).unwrap();
        assert!(plan.changed);
        let services: Vec<_> = plan.pins.iter().map(|p| p.context.as_deref().unwrap()).collect();
        assert_eq!(services, vec!["web", "db"]);
        insta::assert_snapshot!(plan.output, @r#"
        # top comment
        version: "3.8"
        services:
          web:
            image: nginx@sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa # pin@nginx:latest # frontend proxy
            ports:
              - "80:80" # http
          db:
            environment:
              POSTGRES_DB: app
            image: "postgres@sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb" # pin@postgres:16
        volumes:
          data: {}
        "#);
    }

    #[test]
    fn directive_overrides_written_tag() {
        let plan = run("services:\n  web:\n    image: nginx:latest # pin@1.25\n").unwrap();
        assert_eq!(
            plan.output,
            format!("services:\n  web:\n    image: nginx@{} # pin@1.25\n", digest('e'))
        );
    }

    #[test]
    fn platform_digest_keeps_tag_inline() {
        let plan = run("services:\n  app:\n    image: ruby:3.4 # runtime\r\n").unwrap();
        assert_eq!(
            plan.output,
            format!("services:\n  app:\n    image: ruby:3.4@{} # runtime\r\n", digest('c'))
        );
    }

    #[test]
    fn anchors_and_merge_keys_survive() {
        let source = "\
x-common: &common
  restart: always
  image: nginx:latest
services:
  web:
    <<: *common
  api:
    <<: *common
    image: &api-image postgres:16
  worker:
    image: *api-image
";
        let plan = run(source).unwrap();
        assert_eq!(plan.pins.len(), 1);
        assert_eq!(plan.pins[0].context.as_deref(), Some("api"));
        assert_eq!(
            plan.output,
            source.replace(
                "&api-image postgres:16",
                &format!("&api-image postgres@{} # pin@postgres:16", digest('b'))
            )
        );
    }

    #[test]
    fn rewrites_every_document() {
        let source = "services:\n  web:\n    image: nginx:latest\n---\nservices:\n  db:\n    image: postgres:16\n";
        let plan = run(source).unwrap();
        assert_eq!(plan.pins.len(), 2);
        assert_eq!(
            plan.output,
            format!(
                "services:\n  web:\n    image: nginx@{} # pin@nginx:latest\n---\nservices:\n  db:\n    image: postgres@{} # pin@postgres:16\n",
                digest('a'),
                digest('b')
            )
        );
    }

    #[test]
    fn only_direct_service_fields_are_candidates() {
        let source = "\
x-template:
  image: postgres:16
services:
  web:
    image: nginx:latest
    labels:
      image: nginx:latest
";
        let plan = run(source).unwrap();
        assert_eq!(plan.pins.len(), 1);
        assert_eq!(
            plan.output,
            source.replacen(
                "    image: nginx:latest\n",
                &format!("    image: nginx@{} # pin@nginx:latest\n", digest('a')),
                1
            )
        );
    }

    #[test]
    fn already_pinned_compose_is_left_verbatim() {
        let source = format!(
            "# comment survives\nservices:\n  web:\n    image: nginx@{}\n  db:\n    image: postgres@{}\n",
            digest('a'),
            digest('b')
        );
        let plan = run(&source).unwrap();
        assert!(!plan.changed);
        assert_eq!(plan.output, source);
        let services: Vec<_> = plan
            .already_pinned
            .iter()
            .map(|p| p.context.as_deref().unwrap())
            .collect();
        assert_eq!(services, vec!["web", "db"]);
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let first = run("services:\n  web:\n    image: nginx:latest # proxy\n  app:\n    image: ruby:3.4\n").unwrap();
        let second = run(&first.output).unwrap();
        assert!(!second.changed);
        assert_eq!(second.output, first.output);
        assert_eq!(second.already_pinned.len(), 2);
    }

    #[test]
    fn tolerates_services_without_images() {
        for source in [
            "services: {}",
            "services:\n  web:\n    build: .\n",
            "services:\n  web:\n    image: \"\"\n",
            "name: not-compose\n",
            "",
        ] {
            let plan = run(source).unwrap();
            assert!(!plan.changed, "unexpected change for {:?}", source);
            assert_eq!(plan.output, source);
        }
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(run("services:\n  web: [unclosed\n").is_err());
        assert!(run("services:\n  web:\n    image: nginx\n---\n  : [\n").is_err());
    }

    #[test]
    fn failed_resolution_leaves_service_untouched() {
        let source = "services:\n  cache:\n    image: redis:7 # cache\n";
        let plan = run(source).unwrap();
        assert!(!plan.changed);
        assert_eq!(plan.failures, 1);
        assert_eq!(plan.output, source);
    }
}

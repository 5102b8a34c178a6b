// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with typo suggestions.
//!
//! Figment reports deserialization failures with a key path and the list of
//! keys the section accepts. This module turns them into miette diagnostics
//! that point at the offending line of the TOML source and suggest the closest
//! valid key (Jaro-Winkler similarity).

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion, e.g. `max_retires` -> `max_retries`.
const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A configuration error with rich diagnostic information.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown key `{key}` in {}", section_label(.section))]
    #[diagnostic(
        code(tether::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The unrecognized key name.
        key: String,
        /// Dotted path of the enclosing section; empty for the top level.
        section: String,
        /// Suggested correction, if any.
        suggestion: Option<String>,
        /// Comma-separated keys accepted by the section.
        valid_keys: String,
        #[label("not a recognised key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for `{key}`: {detail}")]
    #[diagnostic(code(tether::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(tether::config::missing_key),
        help("add `{key} = <value>` to your tether.toml")
    )]
    MissingKey { key: String },

    /// A semantic validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(tether::config::validation))]
    Validation { message: String },

    /// Anything else figment reports.
    #[error("configuration error: {0}")]
    #[diagnostic(code(tether::config::other))]
    Other(String),
}

fn section_label(section: &str) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{section}]")
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let valid: Vec<&str> = expected.to_vec();
                    let (span, src) = locate_key(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: section_path(&path, field),
                        suggestion: suggest_key(field, &valid),
                        valid_keys: valid.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key: path.join("."),
                    detail: format!("found {actual}"),
                    expected: expected.to_string(),
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Figment's path for an unknown field may or may not end with the field itself.
fn section_path(path: &[String], field: &str) -> String {
    let section = match path.split_last() {
        Some((last, rest)) if last == field => rest,
        _ => path,
    };
    section.join(".")
}

/// Finds the span of `field` in whichever TOML source the error came from.
fn locate_key(
    error: &figment::error::Error,
    path: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .map(|s| match s {
            figment::Source::File(p) => p.display().to_string(),
            other => other.to_string(),
        });

    let source = toml_sources
        .iter()
        .find(|(name, _)| origin.as_deref() == Some(name.as_str()))
        .or_else(|| match toml_sources {
            [only] => Some(only),
            _ => None,
        });

    let Some((name, content)) = source else {
        return (None, None);
    };

    let section = section_path(path, field);
    match find_key_offset(content, &section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name.clone(), content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside `[section]` (or before any header when `section` is empty).
pub fn find_key_offset(content: &str, section: &str, field: &str) -> Option<usize> {
    let mut in_section = section.is_empty();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.starts_with('[') {
            let header = trimmed.trim_start_matches('[').trim_end_matches(']').trim();
            in_section = header == section;
        } else if in_section {
            let indent = line.len() - line.trim_start().len();
            if let Some(after) = line.trim_start().strip_prefix(field) {
                if after.trim_start().starts_with('=') {
                    return Some(offset + indent);
                }
            }
        }
        offset += line.len();
    }

    None
}

/// Suggest the most similar valid key above the similarity threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|&key| (key, strsim::jaro_winkler(unknown, key)))
        .filter(|(_, score)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(key, _)| key.to_string())
}

/// Render diagnostics with miette's graphical handler, one report per error.
pub fn render_errors(errors: &[ConfigError]) -> String {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            out.push_str(&buf);
        } else {
            out.push_str(&format!("Error: {error}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_key() {
        let valid = &["ack_timeout_ms", "max_retries", "max_queue_size"];
        assert_eq!(suggest_key("max_retires", valid), Some("max_retries".to_string()));
    }

    #[test]
    fn no_suggestion_for_distant_key() {
        let valid = &["base_delay_ms", "max_delay_ms"];
        assert_eq!(suggest_key("zzzz", valid), None);
    }

    #[test]
    fn finds_key_inside_its_section_only() {
        let content = "[backoff]\nmax_retries = 3\n\n[queue]\n  max_retires = 2\n";
        let offset = find_key_offset(content, "queue", "max_retires").unwrap();
        assert_eq!(&content[offset..offset + "max_retires".len()], "max_retires");
        assert!(find_key_offset(content, "backoff", "max_retires").is_none());
    }

    #[test]
    fn top_level_key_before_headers() {
        let content = "stray = 1\n[session]\nname = \"x\"\n";
        assert_eq!(find_key_offset(content, "", "stray"), Some(0));
    }

    #[test]
    fn section_path_strips_trailing_field() {
        let path = vec!["queue".to_string(), "max_retires".to_string()];
        assert_eq!(section_path(&path, "max_retires"), "queue");
        let path = vec!["queue".to_string()];
        assert_eq!(section_path(&path, "max_retires"), "queue");
    }

    #[test]
    fn renders_validation_error() {
        let rendered = render_errors(&[ConfigError::Validation {
            message: "queue.max_retries must be at least 1".into(),
        }]);
        assert!(rendered.contains("queue.max_retries"));
    }
}

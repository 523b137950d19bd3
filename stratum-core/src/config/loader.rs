use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Toml,
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Unknown or missing extensions are read as TOML.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|value| value.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match ext.as_str() {
            "json" => Self::Json,
            "yaml" | "yml" => Self::Yaml,
            _ => Self::Toml,
        }
    }
}

/// Reads and parses a structured configuration file into a JSON value tree.
/// The document root must be a table.
pub fn load_from_file(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|err| Error::SourceConstruction {
        origin: "file".to_owned(),
        path: path.to_path_buf(),
        location: None,
        message: format!("failed to read: {err}"),
    })?;

    let parsed = parse_document(path, &content)?;
    if !parsed.is_object() {
        return Err(Error::SourceConstruction {
            origin: "file".to_owned(),
            path: path.to_path_buf(),
            location: None,
            message: "document root must be a table".to_owned(),
        });
    }
    Ok(parsed)
}

pub fn parse_document(path: &Path, content: &str) -> Result<Value> {
    let failure = |location: Option<String>, message: String| Error::SourceConstruction {
        origin: "file".to_owned(),
        path: path.to_path_buf(),
        location,
        message,
    };

    match DocumentFormat::from_path(path) {
        DocumentFormat::Toml => toml::from_str::<Value>(content).map_err(|err| {
            let location = err
                .span()
                .map(|span| render_offset(content, span.start));
            failure(location, err.message().trim().to_owned())
        }),
        DocumentFormat::Json => serde_json::from_str::<Value>(content).map_err(|err| {
            let location = (err.line() > 0)
                .then(|| format!("line {}, column {}", err.line(), err.column()));
            failure(location, err.to_string())
        }),
        DocumentFormat::Yaml => {
            let yaml = serde_yaml::from_str::<serde_yaml::Value>(content).map_err(|err| {
                let location = err
                    .location()
                    .map(|loc| format!("line {}, column {}", loc.line(), loc.column()));
                failure(location, err.to_string())
            })?;
            serde_json::to_value(yaml)
                .map_err(|err| failure(None, format!("unsupported yaml value: {err}")))
        }
    }
}

/// Picks the schema's table when the document has one, otherwise the whole
/// document.
pub fn select_section(document: Value, section: &str) -> Value {
    match document {
        Value::Object(mut root) => match root.remove(section) {
            Some(table @ Value::Object(_)) => table,
            Some(other) => {
                root.insert(section.to_owned(), other);
                Value::Object(root)
            }
            None => Value::Object(root),
        },
        other => other,
    }
}

/// `line L, column C` (both 1-based) for a byte offset.
fn render_offset(content: &str, offset: usize) -> String {
    let offset = offset.min(content.len());
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count() + 1)
        .unwrap_or(1);
    format!("line {line}, column {column}")
}

/// Same rendering for callers that only know the offending line's text.
pub fn locate_line(content: &str, needle: &str) -> Option<String> {
    let needle = needle.trim();
    if needle.is_empty() {
        return None;
    }
    let lines: Vec<&str> = content.lines().collect();
    lines
        .iter()
        .position(|line| line.trim() == needle)
        .or_else(|| lines.iter().position(|line| line.contains(needle)))
        .map(|index| format!("line {}", index + 1))
}

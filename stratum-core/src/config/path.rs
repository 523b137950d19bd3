use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Error, Result};

/// Characters folded when a command-line key is mapped onto schema naming.
/// `--max-workers`, `max_workers` and `MAX-WORKERS` all land on `max_workers`.
const CLI_FOLD: &[(char, char)] = &[('-', '_'), (' ', '_')];

/// Separator between nested segments in the canonical (schema) form.
pub const SEGMENT_SEPARATOR: char = '.';

/// Dotted path to a leaf field, e.g. `retry.max_attempts`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn root(name: &str) -> Self {
        Self {
            segments: vec![name.to_owned()],
        }
    }

    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Self { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Environment variable carrying this field: `PREFIX_SEGMENT<delim>SEGMENT`,
    /// upper-cased.
    pub fn env_var(&self, prefix: &str, delimiter: &str) -> String {
        let body = self
            .segments
            .iter()
            .map(|segment| segment.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(delimiter);
        if prefix.is_empty() {
            body
        } else {
            format!("{}_{body}", prefix.to_ascii_uppercase())
        }
    }

    /// File name looked up in a secrets directory.
    pub fn secret_file_name(&self) -> String {
        self.to_string()
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim().trim_start_matches('-');
        let segments = trimmed
            .split(SEGMENT_SEPARATOR)
            .map(fold_cli_segment)
            .collect::<Vec<_>>();

        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::UnknownField {
                schema: String::new(),
                field: value.to_owned(),
            });
        }

        Ok(Self { segments })
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{SEGMENT_SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn fold_cli_segment(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .map(|ch| {
            CLI_FOLD
                .iter()
                .find(|(from, _)| *from == ch)
                .map(|(_, to)| *to)
                .unwrap_or(ch)
                .to_ascii_lowercase()
        })
        .collect()
}

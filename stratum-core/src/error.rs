use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to construct {origin} source from '{}'{}: {message}", path.display(), render_location(location))]
    SourceConstruction {
        origin: String,
        path: PathBuf,
        location: Option<String>,
        message: String,
    },

    #[error("missing required field '{field}' in schema '{schema}'")]
    MissingRequiredField { schema: String, field: String },

    #[error("validation failed for '{schema}.{field}': {message}")]
    Validation {
        schema: String,
        field: String,
        message: String,
    },

    #[error("cannot resolve reference '{schema}.{field}' -> '{}': {message}", path.display())]
    ReferenceResolution {
        schema: String,
        field: String,
        path: PathBuf,
        message: String,
    },

    #[error("reference cycle detected: {}", stack.join(" → "))]
    CycleDetected { stack: Vec<String> },

    #[error("reference depth {depth} exceeds maximum {max_depth}: {}", stack.join(" → "))]
    DepthExceeded {
        depth: usize,
        max_depth: usize,
        stack: Vec<String>,
    },

    #[error("unknown schema '{0}'")]
    UnknownSchema(String),

    #[error("unknown field '{field}' in schema '{schema}'")]
    UnknownField { schema: String, field: String },

    #[error("schema '{0}' has not been resolved yet")]
    NotResolved(String),

    #[error("refusing to overwrite existing file '{}' (use force)", .0.display())]
    AlreadyExists(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("toml serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::SourceConstruction { .. } => "source_construction_error",
            Self::MissingRequiredField { .. } => "missing_required_field",
            Self::Validation { .. } => "validation_error",
            Self::ReferenceResolution { .. } => "reference_resolution_error",
            Self::CycleDetected { .. } => "cycle_detected",
            Self::DepthExceeded { .. } => "depth_exceeded",
            Self::UnknownSchema(_) => "unknown_schema",
            Self::UnknownField { .. } => "unknown_field",
            Self::NotResolved(_) => "not_resolved",
            Self::AlreadyExists(_) => "already_exists",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
            Self::Yaml(_) => "yaml_error",
            Self::TomlSerialize(_) => "toml_serialize_error",
        }
    }

    /// Process exit status for the command line; each resolution failure kind
    /// gets its own non-zero code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::SourceConstruction { .. } => 2,
            Self::MissingRequiredField { .. } => 3,
            Self::Validation { .. } => 4,
            Self::ReferenceResolution { .. } => 5,
            Self::CycleDetected { .. } => 6,
            Self::DepthExceeded { .. } => 7,
            _ => 1,
        }
    }
}

fn render_location(location: &Option<String>) -> String {
    location
        .as_ref()
        .map(|location| format!(" at {location}"))
        .unwrap_or_default()
}

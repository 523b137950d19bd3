pub mod commands;
pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    ConfigManager, FieldPath, ManagerOptions, ProvenanceRecord, ResolvedSettings, SchemaRegistry,
    Settings, SettingsSchema, SourceKind,
};
pub use error::{Error, Result};

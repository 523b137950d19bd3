//! Layered configuration: sources, schemas, resolution and provenance.

pub mod components;
pub mod graph;
pub mod loader;
pub mod manager;
pub mod path;
pub mod provenance;
pub mod resolved;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod validation;

pub use components::{
    builtin_registry, CoordinatorSettings, FrontendSettings, GroupSettings, OrchestratorSettings,
    Reference, RetrySettings, WorkerSettings,
};
pub use graph::DEFAULT_MAX_DEPTH;
pub use loader::{load_from_file, DocumentFormat};
pub use manager::{ConfigManager, ManagerOptions};
pub use path::FieldPath;
pub use provenance::{ProvenanceRecord, ProvenanceStore, SchemaProvenance, SourceKind};
pub use resolved::{ResolvedChild, ResolvedSettings};
pub use resolver::resolve;
pub use schema::{
    Constraint, CrossFieldRule, FieldKind, FieldSpec, SchemaRegistry, Settings, SettingsSchema,
    StaticValue, Transform,
};
pub use source::{
    CliSource, ConfigSource, DotenvSource, EnvSource, FileSource, SecretSource, Source,
};

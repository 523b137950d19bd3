//! Component schemas shipped with the toolset and their typed settings.
//!
//! The hierarchy is orchestrator -> group -> worker (plus an optional
//! coordinator per group); front-ends are resolved on their own.

use std::path::PathBuf;

use serde::Deserialize;

use crate::config::schema::{
    Constraint, CrossFieldRule, FieldKind, FieldSpec, SchemaRegistry, Settings, SettingsSchema,
    StaticValue, Transform,
};

pub static ORCHESTRATOR: SettingsSchema = SettingsSchema {
    name: "orchestrator",
    section: "orchestrator",
    env_prefix: "STRATUM_ORCHESTRATOR",
    description: "Top-level orchestrator; lists the worker groups it drives.",
    fields: &[
        FieldSpec {
            name: "name",
            required: true,
            description: "Deployment name.",
            constraints: &[Constraint::Pattern("^[a-z][a-z0-9-]*$")],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "log_level",
            kind: FieldKind::Choice(&["trace", "debug", "info", "warn", "error"]),
            default: Some(StaticValue::Str("info")),
            description: "Log verbosity for orchestrator processes.",
            transform: Some(Transform::Lowercase),
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "max_parallel_groups",
            kind: FieldKind::Integer,
            default: Some(StaticValue::Int(4)),
            description: "Groups started concurrently.",
            constraints: &[Constraint::Range {
                min: Some(1.0),
                max: Some(64.0),
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "state_dir",
            kind: FieldKind::Path,
            default: Some(StaticValue::Str(".stratum/state")),
            description: "Directory for run state.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "groups",
            kind: FieldKind::ReferenceList { schema: "group" },
            default: Some(StaticValue::List(&[])),
            description: "Group files, absolute or relative to the workspace root.",
            ..FieldSpec::BASE
        },
    ],
    rules: &[],
};

pub static GROUP: SettingsSchema = SettingsSchema {
    name: "group",
    section: "group",
    env_prefix: "STRATUM_GROUP",
    description: "A set of workers sharing one coordinator.",
    fields: &[
        FieldSpec {
            name: "name",
            required: true,
            description: "Group name.",
            transform: Some(Transform::Trim),
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "max_concurrency",
            kind: FieldKind::Integer,
            default: Some(StaticValue::Int(2)),
            description: "Workers running at once.",
            constraints: &[Constraint::Range {
                min: Some(1.0),
                max: Some(256.0),
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "coordinator",
            kind: FieldKind::Reference {
                schema: "coordinator",
            },
            description: "Coordinator file for this group.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "workers",
            kind: FieldKind::ReferenceList { schema: "worker" },
            required: true,
            description: "Worker files, absolute or relative to the workspace root.",
            constraints: &[Constraint::MinLength(1)],
            ..FieldSpec::BASE
        },
    ],
    rules: &[],
};

pub static WORKER_RETRY: SettingsSchema = SettingsSchema {
    name: "worker.retry",
    section: "retry",
    env_prefix: "",
    description: "Retry policy for failed tasks.",
    fields: &[
        FieldSpec {
            name: "max_attempts",
            kind: FieldKind::Integer,
            default: Some(StaticValue::Int(3)),
            description: "Attempts before a task is abandoned.",
            constraints: &[Constraint::Range {
                min: Some(0.0),
                max: Some(20.0),
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "backoff_secs",
            kind: FieldKind::Float,
            default: Some(StaticValue::Float(2.0)),
            description: "Initial delay between attempts.",
            constraints: &[Constraint::Range {
                min: Some(0.0),
                max: None,
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "max_backoff_secs",
            kind: FieldKind::Float,
            default: Some(StaticValue::Float(60.0)),
            description: "Upper bound for the delay.",
            ..FieldSpec::BASE
        },
    ],
    rules: &[CrossFieldRule::NotGreaterThan {
        lesser: "backoff_secs",
        greater: "max_backoff_secs",
    }],
};

pub static WORKER: SettingsSchema = SettingsSchema {
    name: "worker",
    section: "worker",
    env_prefix: "STRATUM_WORKER",
    description: "One agent worker process.",
    fields: &[
        FieldSpec {
            name: "name",
            required: true,
            description: "Unique worker name.",
            transform: Some(Transform::Trim),
            constraints: &[Constraint::MinLength(1)],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "timeout",
            kind: FieldKind::Integer,
            default: Some(StaticValue::Int(300)),
            description: "Seconds before a running task is abandoned.",
            constraints: &[Constraint::Range {
                min: Some(10.0),
                max: Some(600.0),
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "poll_interval_secs",
            kind: FieldKind::Float,
            default: Some(StaticValue::Float(1.5)),
            description: "Seconds between queue polls.",
            constraints: &[Constraint::Range {
                min: Some(0.1),
                max: Some(60.0),
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "enabled",
            kind: FieldKind::Boolean,
            default: Some(StaticValue::Bool(true)),
            description: "Whether the worker accepts tasks.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "capabilities",
            kind: FieldKind::StringList,
            default: Some(StaticValue::List(&[])),
            description: "Task kinds this worker accepts.",
            transform: Some(Transform::Lowercase),
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "provider",
            kind: FieldKind::Choice(&["local", "remote"]),
            default: Some(StaticValue::Str("local")),
            description: "Where model calls are executed.",
            transform: Some(Transform::Lowercase),
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "model",
            description: "Model identifier.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "api_key",
            description: "Credential for remote providers; usually from the secrets directory.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "retry",
            kind: FieldKind::Table(&WORKER_RETRY),
            description: "Retry policy.",
            ..FieldSpec::BASE
        },
    ],
    rules: &[CrossFieldRule::RequiredWhen {
        field: "api_key",
        when: "provider",
        equals: StaticValue::Str("remote"),
    }],
};

pub static COORDINATOR: SettingsSchema = SettingsSchema {
    name: "coordinator",
    section: "coordinator",
    env_prefix: "STRATUM_COORDINATOR",
    description: "Hands out task leases to the workers of a group.",
    fields: &[
        FieldSpec {
            name: "listen_addr",
            default: Some(StaticValue::Str("127.0.0.1:7400")),
            description: "Address the coordinator binds.",
            constraints: &[Constraint::Pattern(r"^[^\s:]+:\d{1,5}$")],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "heartbeat_secs",
            kind: FieldKind::Integer,
            default: Some(StaticValue::Int(15)),
            description: "Expected worker heartbeat interval.",
            constraints: &[Constraint::Range {
                min: Some(1.0),
                max: Some(3600.0),
            }],
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "lease_secs",
            kind: FieldKind::Integer,
            default: Some(StaticValue::Int(60)),
            description: "Lease length before an unacknowledged task is reassigned.",
            constraints: &[Constraint::Range {
                min: Some(1.0),
                max: Some(86400.0),
            }],
            ..FieldSpec::BASE
        },
    ],
    rules: &[CrossFieldRule::NotGreaterThan {
        lesser: "heartbeat_secs",
        greater: "lease_secs",
    }],
};

pub static FRONTEND: SettingsSchema = SettingsSchema {
    name: "frontend",
    section: "frontend",
    env_prefix: "STRATUM_FRONTEND",
    description: "Web front-end for watching runs.",
    fields: &[
        FieldSpec {
            name: "bind",
            default: Some(StaticValue::Str("127.0.0.1:8080")),
            description: "Address the front-end serves on.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "theme",
            kind: FieldKind::Choice(&["light", "dark", "system"]),
            default: Some(StaticValue::Str("system")),
            description: "UI theme.",
            transform: Some(Transform::Lowercase),
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "coordinator_url",
            description: "Coordinator to read run state from.",
            ..FieldSpec::BASE
        },
        FieldSpec {
            name: "orchestrator_url",
            description: "Orchestrator to read run state from.",
            ..FieldSpec::BASE
        },
    ],
    rules: &[CrossFieldRule::AtLeastOneOf(&[
        "coordinator_url",
        "orchestrator_url",
    ])],
};

pub fn builtin_registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(&ORCHESTRATOR)
        .with(&GROUP)
        .with(&WORKER)
        .with(&COORDINATOR)
        .with(&FRONTEND)
        .with_root("orchestrator")
}

/// A reference field: the path as written, or the resolved child after a
/// recursive load.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Reference<T> {
    Resolved(T),
    Path(PathBuf),
}

impl<T> Reference<T> {
    pub fn resolved(&self) -> Option<&T> {
        match self {
            Self::Resolved(value) => Some(value),
            Self::Path(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    pub name: String,
    pub log_level: String,
    pub max_parallel_groups: u32,
    pub state_dir: PathBuf,
    pub groups: Vec<Reference<GroupSettings>>,
}

impl Settings for OrchestratorSettings {
    fn schema() -> &'static SettingsSchema {
        &ORCHESTRATOR
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSettings {
    pub name: String,
    pub max_concurrency: u32,
    pub coordinator: Option<Reference<CoordinatorSettings>>,
    pub workers: Vec<Reference<WorkerSettings>>,
}

impl Settings for GroupSettings {
    fn schema() -> &'static SettingsSchema {
        &GROUP
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub backoff_secs: f64,
    pub max_backoff_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    pub name: String,
    pub timeout: u64,
    pub poll_interval_secs: f64,
    pub enabled: bool,
    pub capabilities: Vec<String>,
    pub provider: String,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub retry: RetrySettings,
}

impl Settings for WorkerSettings {
    fn schema() -> &'static SettingsSchema {
        &WORKER
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorSettings {
    pub listen_addr: String,
    pub heartbeat_secs: u64,
    pub lease_secs: u64,
}

impl Settings for CoordinatorSettings {
    fn schema() -> &'static SettingsSchema {
        &COORDINATOR
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendSettings {
    pub bind: String,
    pub theme: String,
    pub coordinator_url: Option<String>,
    pub orchestrator_url: Option<String>,
}

impl Settings for FrontendSettings {
    fn schema() -> &'static SettingsSchema {
        &FRONTEND
    }
}

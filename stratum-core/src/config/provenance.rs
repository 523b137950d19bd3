use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::config::path::FieldPath;
use crate::config::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Cli,
    Env,
    Dotenv,
    File,
    Secret,
    Default,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Cli => "cli",
            Self::Env => "env",
            Self::Dotenv => "dotenv",
            Self::File => "file",
            Self::Secret => "secret",
            Self::Default => "default",
        };
        f.write_str(label)
    }
}

/// Where one resolved value came from. `value` is the raw, pre-coercion value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub value: Value,
    pub source_name: String,
    pub source_kind: SourceKind,
    pub field_name: String,
    pub resolved_at: DateTime<Utc>,
}

impl ProvenanceRecord {
    pub fn new(value: Value, source_name: &str, source_kind: SourceKind, field: &FieldPath) -> Self {
        Self {
            value,
            source_name: source_name.to_owned(),
            source_kind,
            field_name: field.to_string(),
            resolved_at: Utc::now(),
        }
    }

    pub fn schema_default(value: Value, field: &FieldPath) -> Self {
        Self::new(value, "schema-default", SourceKind::Default, field)
    }
}

pub type ProvenanceMap = BTreeMap<String, ProvenanceRecord>;

/// Records of one resolution call, written by every wrapped source of that
/// call. Resolution is single-threaded, so interior mutability is enough.
#[derive(Debug, Default)]
pub struct ProvenanceLog {
    records: RefCell<ProvenanceMap>,
}

impl ProvenanceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: ProvenanceRecord) {
        self.records
            .borrow_mut()
            .insert(record.field_name.clone(), record);
    }

    pub fn get(&self, field: &str) -> Option<ProvenanceRecord> {
        self.records.borrow().get(field).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }

    pub fn take(&self) -> ProvenanceMap {
        self.records.take()
    }
}

/// Decorates a source: answers exactly as the wrapped source does and, on a
/// hit, writes a record into the shared log.
#[derive(Debug)]
pub struct Tracked<'log, S> {
    inner: S,
    log: &'log ProvenanceLog,
}

impl<'log, S: Source> Tracked<'log, S> {
    pub fn new(inner: S, log: &'log ProvenanceLog) -> Self {
        Self { inner, log }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Source> Source for Tracked<'_, S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> SourceKind {
        self.inner.kind()
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        let found = self.inner.lookup(field);
        if let Some(value) = &found {
            self.log.record(ProvenanceRecord::new(
                value.clone(),
                self.inner.name(),
                self.inner.kind(),
                field,
            ));
        }
        found
    }
}

/// Latest published provenance of one schema.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaProvenance {
    pub call_id: Uuid,
    pub context: String,
    pub records: ProvenanceMap,
}

/// Shared across calls. Each call resolves into its own log and publishes the
/// complete set at once, so concurrent resolutions of one schema never mix.
#[derive(Debug, Default)]
pub struct ProvenanceStore {
    by_schema: RwLock<HashMap<String, SchemaProvenance>>,
}

impl ProvenanceStore {
    pub fn publish(&self, schema: &str, provenance: SchemaProvenance) {
        self.by_schema
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(schema.to_owned(), provenance);
    }

    pub fn get(&self, schema: &str, field: &str) -> Option<ProvenanceRecord> {
        self.by_schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(schema)
            .and_then(|provenance| provenance.records.get(field).cloned())
    }

    pub fn snapshot(&self, schema: &str) -> Option<SchemaProvenance> {
        self.by_schema
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(schema)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{ProvenanceLog, ProvenanceStore, SchemaProvenance, SourceKind, Tracked};
    use crate::config::path::FieldPath;
    use crate::config::source::{CliSource, Source};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn cli(pairs: &[(&str, &str)]) -> CliSource {
        let args: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        CliSource::new(&args).expect("cli keys parse")
    }

    #[test]
    fn wrapper_is_transparent_and_records_hits() {
        let log = ProvenanceLog::new();
        let bare = cli(&[("timeout", "30")]);
        let tracked = Tracked::new(cli(&[("timeout", "30")]), &log);

        for field in ["timeout", "missing"] {
            let path = FieldPath::root(field);
            assert_eq!(tracked.lookup(&path), bare.lookup(&path));
        }
        assert_eq!(tracked.kind(), bare.kind());

        assert_eq!(log.len(), 1);
        let record = log.get("timeout").expect("hit should be recorded");
        assert_eq!(record.value, json!("30"));
        assert_eq!(record.source_kind, SourceKind::Cli);
        assert_eq!(record.source_name, "cli");
    }

    #[test]
    fn store_overwrites_schema_wholesale() {
        let store = ProvenanceStore::default();
        let log = ProvenanceLog::new();
        let tracked = Tracked::new(cli(&[("a", "1"), ("b", "2")]), &log);
        tracked.lookup(&FieldPath::root("a"));
        tracked.lookup(&FieldPath::root("b"));
        store.publish(
            "worker",
            SchemaProvenance {
                call_id: uuid::Uuid::new_v4(),
                context: "test".to_owned(),
                records: log.take(),
            },
        );
        assert!(store.get("worker", "b").is_some());

        let second = ProvenanceLog::new();
        Tracked::new(cli(&[("a", "9")]), &second).lookup(&FieldPath::root("a"));
        store.publish(
            "worker",
            SchemaProvenance {
                call_id: uuid::Uuid::new_v4(),
                context: "test".to_owned(),
                records: second.take(),
            },
        );
        assert_eq!(store.get("worker", "a").expect("a").value, json!("9"));
        assert!(store.get("worker", "b").is_none());
    }
}

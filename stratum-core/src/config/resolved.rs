use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::path::SEGMENT_SEPARATOR;
use crate::config::provenance::{ProvenanceMap, ProvenanceRecord};
use crate::error::{Error, Result};

/// Resolved trees behind a reference field.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResolvedChild {
    One(Box<ResolvedSettings>),
    Many(Vec<ResolvedSettings>),
}

impl ResolvedChild {
    pub fn nodes(&self) -> Vec<&ResolvedSettings> {
        match self {
            Self::One(node) => vec![node.as_ref()],
            Self::Many(nodes) => nodes.iter().collect(),
        }
    }
}

/// Validated output of one schema: one value per leaf field, each traceable
/// to a provenance record.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSettings {
    schema: &'static str,
    call_id: Uuid,
    file: Option<PathBuf>,
    values: BTreeMap<String, Value>,
    children: BTreeMap<String, ResolvedChild>,
    provenance: ProvenanceMap,
}

impl ResolvedSettings {
    pub(crate) fn new(
        schema: &'static str,
        call_id: Uuid,
        values: BTreeMap<String, Value>,
        provenance: ProvenanceMap,
    ) -> Self {
        Self {
            schema,
            call_id,
            file: None,
            values,
            children: BTreeMap::new(),
            provenance,
        }
    }

    pub(crate) fn set_file(&mut self, file: Option<&Path>) {
        self.file = file.map(Path::to_path_buf);
    }

    pub(crate) fn attach(&mut self, field: &str, child: ResolvedChild) {
        self.children.insert(field.to_owned(), child);
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Structured file this node was resolved from, when there was one.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Validated value; reference fields still hold their path text here.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.value(field).and_then(Value::as_str)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.value(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.value(field).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.value(field).and_then(Value::as_bool)
    }

    pub fn provenance(&self, field: &str) -> Option<&ProvenanceRecord> {
        self.provenance.get(field)
    }

    pub fn provenance_records(&self) -> &ProvenanceMap {
        &self.provenance
    }

    pub fn child(&self, field: &str) -> Option<&ResolvedChild> {
        self.children.get(field)
    }

    /// Nested JSON object of this node; reference fields are replaced by
    /// their resolved trees when present.
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (field, value) in &self.values {
            let rendered = match self.children.get(field) {
                Some(ResolvedChild::One(node)) => node.to_json(),
                Some(ResolvedChild::Many(nodes)) => {
                    Value::Array(nodes.iter().map(ResolvedSettings::to_json).collect())
                }
                None => value.clone(),
            };
            insert_dotted(&mut root, field, rendered);
        }
        Value::Object(root)
    }

    /// Strongly-typed view of this node.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|err| Error::Validation {
            schema: self.schema.to_owned(),
            field: "<typed>".to_owned(),
            message: format!("cannot build typed settings: {err}"),
        })
    }
}

fn insert_dotted(object: &mut Map<String, Value>, dotted: &str, value: Value) {
    match dotted.split_once(SEGMENT_SEPARATOR) {
        None => {
            object.insert(dotted.to_owned(), value);
        }
        Some((head, rest)) => {
            let entry = object
                .entry(head.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_dotted(child, rest, value);
            }
        }
    }
}

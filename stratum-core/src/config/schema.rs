use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::path::FieldPath;
use crate::error::{Error, Result};

/// A schema-level default. Kept `'static` so schemas stay plain data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StaticValue {
    Str(&'static str),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(&'static [&'static str]),
}

impl StaticValue {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Str(value) => Value::String((*value).to_owned()),
            Self::Int(value) => Value::from(*value),
            Self::Float(value) => Value::from(*value),
            Self::Bool(value) => Value::Bool(*value),
            Self::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| Value::String((*item).to_owned()))
                    .collect(),
            ),
        }
    }

    /// TOML literal for templates.
    pub fn toml_literal(&self) -> String {
        match self {
            Self::Str(value) => quote(value),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format!("{value:?}"),
            Self::Bool(value) => value.to_string(),
            Self::List(items) => format!(
                "[{}]",
                items.iter().map(|item| quote(item)).collect::<Vec<_>>().join(", ")
            ),
        }
    }
}

impl std::fmt::Display for StaticValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.toml_literal())
    }
}

fn quote(value: &str) -> String {
    // JSON string escapes are a subset of TOML basic-string escapes.
    Value::String(value.to_owned()).to_string()
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    String,
    Integer,
    Float,
    Boolean,
    Path,
    StringList,
    Choice(&'static [&'static str]),
    /// Nested table; its fields resolve as `<field>.<child>`.
    Table(&'static SettingsSchema),
    /// Path to another file resolved with the named schema.
    Reference {
        schema: &'static str,
    },
    ReferenceList {
        schema: &'static str,
    },
}

impl FieldKind {
    pub fn type_name(&self) -> String {
        match self {
            Self::String => "string".to_owned(),
            Self::Integer => "integer".to_owned(),
            Self::Float => "float".to_owned(),
            Self::Boolean => "boolean".to_owned(),
            Self::Path => "path".to_owned(),
            Self::StringList => "list<string>".to_owned(),
            Self::Choice(options) => format!("choice({})", options.join("|")),
            Self::Table(schema) => format!("table<{}>", schema.name),
            Self::Reference { schema } => format!("ref<{schema}>"),
            Self::ReferenceList { schema } => format!("list<ref<{schema}>>"),
        }
    }

    pub fn reference_schema(&self) -> Option<&'static str> {
        match self {
            Self::Reference { schema } | Self::ReferenceList { schema } => Some(schema),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, Self::StringList | Self::ReferenceList { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Constraint {
    /// Inclusive numeric bounds.
    Range { min: Option<f64>, max: Option<f64> },
    /// Minimum character count for strings, item count for lists.
    MinLength(usize),
    Pattern(&'static str),
}

impl std::fmt::Display for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range { min, max } => {
                let render = |bound: &Option<f64>| {
                    bound
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| "..".to_owned())
                };
                write!(f, "range [{}, {}]", render(min), render(max))
            }
            Self::MinLength(length) => write!(f, "min_length {length}"),
            Self::Pattern(pattern) => write!(f, "pattern {pattern}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Trim,
    Lowercase,
    Uppercase,
}

#[derive(Debug, Clone, Copy)]
pub enum CrossFieldRule {
    NotGreaterThan {
        lesser: &'static str,
        greater: &'static str,
    },
    RequiredWhen {
        field: &'static str,
        when: &'static str,
        equals: StaticValue,
    },
    AtLeastOneOf(&'static [&'static str]),
}

impl CrossFieldRule {
    pub fn describe(&self) -> String {
        match self {
            Self::NotGreaterThan { lesser, greater } => format!("{lesser} <= {greater}"),
            Self::RequiredWhen {
                field,
                when,
                equals,
            } => format!("{field} required when {when} = {equals}"),
            Self::AtLeastOneOf(fields) => format!("at least one of {}", fields.join(", ")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub default: Option<StaticValue>,
    pub required: bool,
    pub description: &'static str,
    pub constraints: &'static [Constraint],
    pub transform: Option<Transform>,
}

impl FieldSpec {
    /// Base for struct-update syntax in schema declarations.
    pub const BASE: FieldSpec = FieldSpec {
        name: "",
        kind: FieldKind::String,
        default: None,
        required: false,
        description: "",
        constraints: &[],
        transform: None,
    };
}

#[derive(Debug)]
pub struct SettingsSchema {
    pub name: &'static str,
    /// Table selected from structured files.
    pub section: &'static str,
    pub env_prefix: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
    pub rules: &'static [CrossFieldRule],
}

impl SettingsSchema {
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Every resolvable field in declaration order; nested tables are
    /// flattened into dotted paths.
    pub fn leaf_fields(&'static self) -> Vec<(FieldPath, &'static FieldSpec)> {
        let mut out = Vec::new();
        collect_leaves(self, None, &mut out);
        out
    }

    pub fn find_leaf(&'static self, path: &str) -> Option<&'static FieldSpec> {
        self.leaf_fields()
            .into_iter()
            .find(|(candidate, _)| candidate.to_string() == path)
            .map(|(_, spec)| spec)
    }

    /// Defaults keyed by dotted field path; fields without a default are absent.
    pub fn defaults(&'static self) -> BTreeMap<String, Value> {
        self.leaf_fields()
            .into_iter()
            .filter_map(|(path, spec)| spec.default.map(|value| (path.to_string(), value.to_value())))
            .collect()
    }
}

fn collect_leaves(
    schema: &'static SettingsSchema,
    prefix: Option<&FieldPath>,
    out: &mut Vec<(FieldPath, &'static FieldSpec)>,
) {
    for field in schema.fields {
        let path = match prefix {
            Some(prefix) => prefix.child(field.name),
            None => FieldPath::root(field.name),
        };
        match field.kind {
            FieldKind::Table(nested) => collect_leaves(nested, Some(&path), out),
            _ => out.push((path, field)),
        }
    }
}

/// Known schemas, in registration order.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: Vec<&'static SettingsSchema>,
    root: Option<&'static str>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: Vec::new(),
            root: None,
        }
    }

    /// The component schemas shipped with the toolset.
    pub fn builtin() -> Self {
        crate::config::components::builtin_registry()
    }

    pub fn with(mut self, schema: &'static SettingsSchema) -> Self {
        self.schemas.retain(|known| known.name != schema.name);
        self.schemas.push(schema);
        self
    }

    /// Schema used when a root file is given without naming one.
    pub fn with_root(mut self, name: &'static str) -> Self {
        self.root = Some(name);
        self
    }

    pub fn get(&self, name: &str) -> Result<&'static SettingsSchema> {
        self.schemas
            .iter()
            .copied()
            .find(|schema| schema.name == name)
            .ok_or_else(|| Error::UnknownSchema(name.to_owned()))
    }

    pub fn root(&self) -> Result<&'static SettingsSchema> {
        let name = self
            .root
            .ok_or_else(|| Error::UnknownSchema("<root>".to_owned()))?;
        self.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static SettingsSchema> + '_ {
        self.schemas.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A strongly-typed settings object backed by a schema.
pub trait Settings: DeserializeOwned {
    fn schema() -> &'static SettingsSchema;
}

//! `show`, `list` and `init`: the operations behind the `stratum` CLI.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::manager::{ConfigManager, ManagerOptions};
use crate::config::path::FieldPath;
use crate::config::provenance::SourceKind;
use crate::config::resolved::ResolvedSettings;
use crate::config::schema::{FieldKind, FieldSpec, SchemaRegistry, SettingsSchema};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Default)]
pub struct ShowRequest {
    /// Schema name; every registered schema when absent.
    pub schema: Option<String>,
    /// Root file for a recursive load.
    pub file: Option<PathBuf>,
    pub field: Option<String>,
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShownField {
    pub value: Value,
    pub source: SourceKind,
    pub origin: String,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShownNode {
    pub schema: String,
    pub file: Option<PathBuf>,
    pub fields: BTreeMap<String, ShownField>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, Vec<ShownNode>>,
}

impl ShownNode {
    fn from_resolved(resolved: &ResolvedSettings) -> Self {
        let mut fields = BTreeMap::new();
        let mut children = BTreeMap::new();
        for (name, value) in resolved.values() {
            if let Some(record) = resolved.provenance(name) {
                fields.insert(
                    name.clone(),
                    ShownField {
                        value: value.clone(),
                        source: record.source_kind,
                        origin: record.source_name.clone(),
                        resolved_at: record.resolved_at,
                    },
                );
            }
            if let Some(child) = resolved.child(name) {
                children.insert(
                    name.clone(),
                    child.nodes().into_iter().map(Self::from_resolved).collect(),
                );
            }
        }
        Self {
            schema: resolved.schema().to_owned(),
            file: resolved.file().map(Path::to_path_buf),
            fields,
            children,
        }
    }

    fn retain_field(&mut self, field: &str) {
        self.fields.retain(|name, _| name == field);
        self.children.retain(|name, _| name == field);
    }

    fn write_text(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        match &self.file {
            Some(file) => {
                let _ = writeln!(out, "{indent}{} ({})", self.schema, file.display());
            }
            None => {
                let _ = writeln!(out, "{indent}{}", self.schema);
            }
        }
        for (name, field) in &self.fields {
            let _ = writeln!(
                out,
                "{indent}  {name} = {}  [{}: {}]",
                field.value, field.source, field.origin
            );
            if let Some(children) = self.children.get(name) {
                for child in children {
                    child.write_text(out, depth + 2);
                }
            }
        }
    }
}

/// Resolved, provenance-annotated view produced by `show`.
#[derive(Debug, Clone, Serialize)]
pub struct ShowReport {
    pub context: String,
    pub nodes: Vec<ShownNode>,
}

impl ShowReport {
    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Text => {
                let mut out = String::new();
                let _ = writeln!(out, "context: {}", self.context);
                for node in &self.nodes {
                    node.write_text(&mut out, 0);
                }
                Ok(out)
            }
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }
}

pub fn show_report(manager: &ConfigManager, request: &ShowRequest) -> Result<ShowReport> {
    let registry = manager.registry();
    let schemas: Vec<&'static SettingsSchema> = match (&request.schema, &request.file) {
        (Some(name), _) => vec![registry.get(name)?],
        (None, Some(_)) => vec![registry.root()?],
        (None, None) => registry.iter().collect(),
    };

    let field = request
        .field
        .as_deref()
        .map(|raw| {
            let key = FieldPath::from_str(raw)?.to_string();
            if schemas.iter().any(|schema| schema.find_leaf(&key).is_some()) {
                Ok(key)
            } else {
                Err(Error::UnknownField {
                    schema: schema_label(&schemas),
                    field: raw.to_owned(),
                })
            }
        })
        .transpose()?;

    let mut nodes = Vec::with_capacity(schemas.len());
    for schema in schemas {
        let resolved = match &request.file {
            Some(file) => manager.load_recursive(schema, file)?,
            None => manager.load(schema)?,
        };
        let mut node = ShownNode::from_resolved(&resolved);
        if let Some(field) = &field {
            if schema.find_leaf(field).is_none() {
                continue;
            }
            node.retain_field(field);
        }
        nodes.push(node);
    }

    Ok(ShowReport {
        context: manager.context().to_owned(),
        nodes,
    })
}

pub fn show(manager: &ConfigManager, request: &ShowRequest) -> Result<String> {
    show_report(manager, request)?.render(request.format)
}

fn schema_label(schemas: &[&SettingsSchema]) -> String {
    match schemas {
        [single] => single.name.to_owned(),
        _ => "*".to_owned(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub required: bool,
    pub default: Option<Value>,
    pub description: String,
    pub env_var: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    pub name: String,
    pub section: String,
    pub env_prefix: String,
    pub description: String,
    pub root: bool,
    pub fields: Vec<FieldSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
}

/// Schema introspection; never consults a source. `options` only shapes the
/// reported variable names.
pub fn list_report(registry: &SchemaRegistry, options: &ManagerOptions) -> Vec<SchemaSummary> {
    let delimiter = &options.nested_delimiter;
    let root = registry.root().ok().map(|schema| schema.name);

    registry
        .iter()
        .map(|schema| SchemaSummary {
            name: schema.name.to_owned(),
            section: schema.section.to_owned(),
            env_prefix: schema.env_prefix.to_owned(),
            description: schema.description.to_owned(),
            root: root == Some(schema.name),
            fields: schema
                .leaf_fields()
                .into_iter()
                .map(|(path, spec)| FieldSummary {
                    name: path.to_string(),
                    type_name: spec.kind.type_name(),
                    required: spec.required,
                    default: spec.default.map(|value| value.to_value()),
                    description: spec.description.to_owned(),
                    env_var: path.env_var(schema.env_prefix, delimiter),
                    constraints: spec.constraints.iter().map(ToString::to_string).collect(),
                })
                .collect(),
            rules: collect_rules(schema),
        })
        .collect()
}

fn collect_rules(schema: &'static SettingsSchema) -> Vec<String> {
    let mut rules: Vec<String> = schema.rules.iter().map(|rule| rule.describe()).collect();
    for field in schema.fields {
        if let FieldKind::Table(nested) = field.kind {
            rules.extend(
                collect_rules(nested)
                    .into_iter()
                    .map(|rule| format!("{}: {rule}", field.name)),
            );
        }
    }
    rules
}

pub fn list(
    registry: &SchemaRegistry,
    options: &ManagerOptions,
    format: OutputFormat,
) -> Result<String> {
    let summaries = list_report(registry, options);
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&summaries)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(&summaries)?),
        OutputFormat::Text => {
            let mut out = String::new();
            for summary in &summaries {
                let marker = if summary.root { " (root)" } else { "" };
                let _ = writeln!(
                    out,
                    "{}{marker}  [section {}, env {}_*]",
                    summary.name, summary.section, summary.env_prefix
                );
                if !summary.description.is_empty() {
                    let _ = writeln!(out, "  {}", summary.description);
                }

                let mut rows = vec![["FIELD", "TYPE", "REQUIRED", "DEFAULT", "DESCRIPTION"]
                    .map(str::to_owned)];
                rows.extend(summary.fields.iter().map(|field| {
                    [
                        field.name.clone(),
                        field.type_name.clone(),
                        (if field.required { "yes" } else { "no" }).to_owned(),
                        field
                            .default
                            .as_ref()
                            .map(Value::to_string)
                            .unwrap_or_else(|| "-".to_owned()),
                        field.description.clone(),
                    ]
                }));
                write_columns(&mut out, &rows, "  ");
                for rule in &summary.rules {
                    let _ = writeln!(out, "  rule: {rule}");
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}

fn write_columns<const N: usize>(out: &mut String, rows: &[[String; N]], indent: &str) {
    let mut widths = [0usize; N];
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    for row in rows {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{indent}{}", line.trim_end());
    }
}

/// TOML template for `schema`: required fields are present but empty,
/// optional ones are commented out with their default.
pub fn render_template(schema: &'static SettingsSchema) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {} configuration", schema.name);
    if !schema.description.is_empty() {
        let _ = writeln!(out, "# {}", schema.description);
    }
    let _ = writeln!(out, "# Fill in every uncommented field before use.");
    write_table(&mut out, schema, schema.section);
    out
}

fn write_table(out: &mut String, schema: &'static SettingsSchema, header: &str) {
    let _ = writeln!(out, "\n[{header}]");
    for field in schema.fields {
        if matches!(field.kind, FieldKind::Table(_)) {
            continue;
        }
        write_field(out, field);
    }
    for field in schema.fields {
        if let FieldKind::Table(nested) = field.kind {
            write_table(out, nested, &format!("{header}.{}", field.name));
        }
    }
}

fn write_field(out: &mut String, field: &FieldSpec) {
    let mut notes = Vec::new();
    if !field.description.is_empty() {
        notes.push(field.description.to_owned());
    }
    notes.push(field.kind.type_name());
    notes.extend(field.constraints.iter().map(ToString::to_string));
    if field.required {
        notes.push("required".to_owned());
    }
    let _ = writeln!(out, "# {}", notes.join("; "));

    let empty = if field.kind.is_list() { "[]" } else { "\"\"" };
    match (field.required, field.default) {
        (true, _) => {
            let _ = writeln!(out, "{} = {empty}", field.name);
        }
        (false, Some(default)) => {
            let _ = writeln!(out, "# {} = {}", field.name, default.toml_literal());
        }
        (false, None) => {
            let _ = writeln!(out, "# {} = {empty}", field.name);
        }
    }
}

/// Writes the template for `schema` to `path`; an existing file is kept
/// unless `force` is set.
pub fn init(registry: &SchemaRegistry, schema: &str, path: &Path, force: bool) -> Result<PathBuf> {
    let schema = registry.get(schema)?;
    if path.exists() && !force {
        return Err(Error::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_template(schema))?;
    info!(schema = schema.name, path = %path.display(), "template written");
    Ok(path.to_path_buf())
}

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use serde_json::Value;
use tracing::info;

use crate::config::graph::{GraphLoader, DEFAULT_MAX_DEPTH};
use crate::config::path::FieldPath;
use crate::config::provenance::{
    ProvenanceLog, ProvenanceRecord, ProvenanceStore, SchemaProvenance, Tracked,
};
use crate::config::resolved::ResolvedSettings;
use crate::config::resolver;
use crate::config::schema::{SchemaRegistry, Settings, SettingsSchema};
use crate::config::source::{
    CliSource, ConfigSource, DotenvSource, EnvSource, FileSource, SecretSource,
};
use crate::error::{Error, Result};

/// CLI key selecting the structured configuration file.
pub const CONFIG_FILE_FLAG: &str = "config_file";
/// CLI key selecting the secrets directory.
pub const SECRETS_DIR_FLAG: &str = "secrets_dir";

#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Family prefix for control variables such as `STRATUM_CONFIG_FILE`.
    /// Field variables use each schema's own `env_prefix` instead.
    pub env_family: String,
    pub nested_delimiter: String,
    pub config_file_name: String,
    pub dotenv_file_name: String,
    pub secrets_dir_name: String,
    pub max_depth: usize,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            env_family: "STRATUM".to_owned(),
            nested_delimiter: "__".to_owned(),
            config_file_name: "stratum.toml".to_owned(),
            dotenv_file_name: ".env".to_owned(),
            secrets_dir_name: "secrets".to_owned(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ManagerOptions {
    pub fn config_file_var(&self) -> String {
        format!("{}_CONFIG_FILE", self.env_family)
    }

    pub fn secrets_dir_var(&self) -> String {
        format!("{}_SECRETS_DIR", self.env_family)
    }
}

/// Command-line and environment input captured once per call.
struct CallInputs {
    cli: CliSource,
    env: BTreeMap<String, String>,
}

/// Entry point for every component: owns the source chain and its order
/// (CLI > environment > dotenv > structured file > secrets > schema default).
pub struct ConfigManager {
    cli_args: BTreeMap<String, String>,
    workspace_root: PathBuf,
    context: String,
    registry: SchemaRegistry,
    options: ManagerOptions,
    environment: Option<BTreeMap<String, String>>,
    provenance: ProvenanceStore,
}

impl ConfigManager {
    pub fn new(
        cli_args: BTreeMap<String, String>,
        workspace_root: impl Into<PathBuf>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            cli_args,
            workspace_root: workspace_root.into(),
            context: context.into(),
            registry: SchemaRegistry::builtin(),
            options: ManagerOptions::default(),
            environment: None,
            provenance: ProvenanceStore::default(),
        }
    }

    pub fn with_registry(mut self, registry: SchemaRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses a fixed variable set instead of reading the process environment
    /// at each call.
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = Some(
            vars.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Resolves one schema against the full chain, using the default
    /// structured file.
    pub fn load(&self, schema: &'static SettingsSchema) -> Result<ResolvedSettings> {
        let inputs = self.call_inputs()?;
        let file = self.default_config_file(&inputs)?;
        let resolved = self.resolve_with_file(schema, file.as_deref(), &inputs)?;
        self.publish(&resolved);
        Ok(resolved)
    }

    pub fn load_named(&self, name: &str) -> Result<ResolvedSettings> {
        let schema = self.registry.get(name)?;
        self.load(schema)
    }

    pub fn load_as<T: Settings>(&self) -> Result<T> {
        self.load(T::schema())?.deserialize()
    }

    /// Resolves `file_path` with `schema` and follows its reference fields.
    /// Each file in the tree takes the place of the default structured file
    /// in an otherwise identical chain.
    pub fn load_recursive(
        &self,
        schema: &'static SettingsSchema,
        file_path: &Path,
    ) -> Result<ResolvedSettings> {
        let inputs = self.call_inputs()?;
        let mut loader = GraphLoader::new(
            &self.registry,
            &self.workspace_root,
            self.options.max_depth,
            |schema, path| self.resolve_with_file(schema, Some(path), &inputs),
        );
        let tree = loader.load(file_path, schema)?;
        self.publish(&tree);
        Ok(tree)
    }

    pub fn load_recursive_as<T: Settings>(&self, file_path: &Path) -> Result<T> {
        self.load_recursive(T::schema(), file_path)?.deserialize()
    }

    /// Record from the latest successful resolution of `schema`.
    pub fn get_provenance(&self, schema: &SettingsSchema, field: &str) -> Option<ProvenanceRecord> {
        self.provenance.get(schema.name, field)
    }

    /// Schema defaults only; no source is consulted.
    pub fn get_schema_defaults(&self, schema: &'static SettingsSchema) -> BTreeMap<String, Value> {
        schema.defaults()
    }

    /// Every field of the latest resolution of `schema` with its value,
    /// source and timestamp, one line per field sorted by name.
    pub fn debug_dump(&self, schema: &SettingsSchema) -> Result<String> {
        let snapshot = self
            .provenance
            .snapshot(schema.name)
            .ok_or_else(|| Error::NotResolved(schema.name.to_owned()))?;

        let rows: Vec<[String; 5]> = snapshot
            .records
            .values()
            .map(|record| {
                [
                    record.field_name.clone(),
                    record.value.to_string(),
                    record.source_kind.to_string(),
                    record.source_name.clone(),
                    record.resolved_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                ]
            })
            .collect();
        let header = ["FIELD", "VALUE", "KIND", "SOURCE", "RESOLVED_AT"].map(str::to_owned);

        let mut widths = header.clone().map(|cell| cell.len());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let _ = writeln!(out, "schema:  {}", schema.name);
        let _ = writeln!(out, "context: {}", snapshot.context);
        let _ = writeln!(out, "call:    {}", snapshot.call_id);
        for row in std::iter::once(&header).chain(rows.iter()) {
            let line = row
                .iter()
                .zip(widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join("  ");
            let _ = writeln!(out, "{}", line.trim_end());
        }
        Ok(out)
    }

    fn publish(&self, resolved: &ResolvedSettings) {
        info!(
            schema = resolved.schema(),
            call_id = %resolved.call_id(),
            context = %self.context,
            fields = resolved.provenance_records().len(),
            "configuration resolved"
        );
        self.provenance.publish(
            resolved.schema(),
            SchemaProvenance {
                call_id: resolved.call_id(),
                context: self.context.clone(),
                records: resolved.provenance_records().clone(),
            },
        );
    }

    fn resolve_with_file(
        &self,
        schema: &'static SettingsSchema,
        file: Option<&Path>,
        inputs: &CallInputs,
    ) -> Result<ResolvedSettings> {
        let sources = self.build_sources(schema, file, inputs)?;
        let log = ProvenanceLog::new();
        let tracked: Vec<Tracked<'_, ConfigSource>> = sources
            .into_iter()
            .map(|source| Tracked::new(source, &log))
            .collect();

        let mut resolved = resolver::resolve(schema, &tracked, &log)?;
        resolved.set_file(file);
        Ok(resolved)
    }

    /// The only place a chain is assembled; order is fixed.
    fn build_sources(
        &self,
        schema: &'static SettingsSchema,
        file: Option<&Path>,
        inputs: &CallInputs,
    ) -> Result<Vec<ConfigSource>> {
        self.check_cli_keys(schema, &inputs.cli)?;
        let delimiter = &self.options.nested_delimiter;
        let mut sources = vec![
            ConfigSource::Cli(inputs.cli.clone()),
            ConfigSource::Env(EnvSource::from_vars(
                schema.env_prefix,
                delimiter,
                inputs.env.clone(),
            )),
        ];

        let dotenv = self.workspace_root.join(&self.options.dotenv_file_name);
        if dotenv.is_file() {
            sources.push(ConfigSource::Dotenv(DotenvSource::open(
                &dotenv,
                schema.env_prefix,
                delimiter,
            )?));
        }

        if let Some(file) = file {
            sources.push(ConfigSource::File(FileSource::open(file, schema)?));
        }

        if let Some(dir) = self.secrets_dir(inputs)? {
            sources.push(ConfigSource::Secret(SecretSource::open(&dir)?));
        }

        Ok(sources)
    }

    /// Command-line keys must name a field of some known schema or a
    /// control flag; a typo is an error rather than a silently ignored value.
    fn check_cli_keys(&self, schema: &'static SettingsSchema, cli: &CliSource) -> Result<()> {
        let known: BTreeSet<FieldPath> = self
            .registry
            .iter()
            .chain(std::iter::once(schema))
            .flat_map(|schema| schema.leaf_fields().into_iter().map(|(path, _)| path))
            .chain([
                FieldPath::root(CONFIG_FILE_FLAG),
                FieldPath::root(SECRETS_DIR_FLAG),
            ])
            .collect();

        match cli.keys().find(|key| !known.contains(*key)) {
            Some(key) => Err(Error::UnknownField {
                schema: schema.name.to_owned(),
                field: key.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn call_inputs(&self) -> Result<CallInputs> {
        let env = match &self.environment {
            Some(vars) => vars.clone(),
            None => std::env::vars().collect(),
        };
        Ok(CallInputs {
            cli: CliSource::new(&self.cli_args)?,
            env,
        })
    }

    /// `--config-file` beats `STRATUM_CONFIG_FILE`; both must exist when
    /// given. The workspace default is optional.
    fn default_config_file(&self, inputs: &CallInputs) -> Result<Option<PathBuf>> {
        self.control_path(
            CONFIG_FILE_FLAG,
            &self.options.config_file_var(),
            &self.options.config_file_name,
            inputs,
            "file",
        )
    }

    fn secrets_dir(&self, inputs: &CallInputs) -> Result<Option<PathBuf>> {
        self.control_path(
            SECRETS_DIR_FLAG,
            &self.options.secrets_dir_var(),
            &self.options.secrets_dir_name,
            inputs,
            "secret",
        )
    }

    fn control_path(
        &self,
        flag: &str,
        var: &str,
        default_name: &str,
        inputs: &CallInputs,
        origin: &str,
    ) -> Result<Option<PathBuf>> {
        let explicit = inputs
            .cli
            .control(flag)
            .or_else(|| inputs.env.get(var).map(String::as_str))
            .filter(|value| !value.trim().is_empty());

        match explicit {
            Some(value) => {
                let path = self.workspace_path(Path::new(value.trim()));
                if path.exists() {
                    Ok(Some(path))
                } else {
                    Err(Error::SourceConstruction {
                        origin: origin.to_owned(),
                        path,
                        location: None,
                        message: "explicitly selected path does not exist".to_owned(),
                    })
                }
            }
            None => {
                let path = self.workspace_root.join(default_name);
                Ok(path.exists().then_some(path))
            }
        }
    }

    fn workspace_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace_root.join(path)
        }
    }
}

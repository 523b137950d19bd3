//! Places a configuration value may come from.
//!
//! Every variant answers one question: does this field have a value here.
//! Backing files are parsed once when the source is built; a malformed file
//! fails construction instead of behaving like an empty source.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;

use crate::config::loader;
use crate::config::path::FieldPath;
use crate::config::provenance::SourceKind;
use crate::config::schema::{FieldKind, SettingsSchema};
use crate::error::{Error, Result};

pub trait Source {
    /// Identifier recorded as the provenance source name.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    fn lookup(&self, field: &FieldPath) -> Option<Value>;
}

/// Command-line values keyed by normalized field path.
#[derive(Debug, Clone, Default)]
pub struct CliSource {
    values: BTreeMap<FieldPath, String>,
}

impl CliSource {
    /// Fails on keys that do not parse as a field path, such as `retry..max`.
    pub fn new(args: &BTreeMap<String, String>) -> Result<Self> {
        let values = args
            .iter()
            .map(|(key, value)| {
                let path = FieldPath::from_str(key).map_err(|_| Error::UnknownField {
                    schema: "<cli>".to_owned(),
                    field: key.clone(),
                })?;
                Ok((path, value.clone()))
            })
            .collect::<Result<_>>()?;
        Ok(Self { values })
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldPath> {
        self.values.keys()
    }

    /// Value of a control flag such as `config-file`, if given.
    pub fn control(&self, key: &str) -> Option<&str> {
        self.values
            .get(&FieldPath::root(key))
            .map(String::as_str)
    }
}

impl Source for CliSource {
    fn name(&self) -> &str {
        "cli"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Cli
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        self.values.get(field).cloned().map(Value::String)
    }
}

/// `PREFIX_<FIELD>` variables; nested segments are joined with the delimiter.
#[derive(Debug, Clone)]
pub struct EnvSource {
    prefix: String,
    delimiter: String,
    vars: BTreeMap<String, String>,
}

impl EnvSource {
    pub fn from_vars<I, K, V>(prefix: &str, delimiter: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            prefix: prefix.to_owned(),
            delimiter: delimiter.to_owned(),
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    pub fn from_process(prefix: &str, delimiter: &str) -> Self {
        Self::from_vars(prefix, delimiter, std::env::vars())
    }
}

impl Source for EnvSource {
    fn name(&self) -> &str {
        "env"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Env
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        self.vars
            .get(&field.env_var(&self.prefix, &self.delimiter))
            .cloned()
            .map(Value::String)
    }
}

/// A local `KEY=value` file read once, then looked up like the environment.
#[derive(Debug, Clone)]
pub struct DotenvSource {
    name: String,
    path: PathBuf,
    env: EnvSource,
}

impl DotenvSource {
    pub fn open(path: &Path, prefix: &str, delimiter: &str) -> Result<Self> {
        let failure = |location: Option<String>, message: String| Error::SourceConstruction {
            origin: "dotenv".to_owned(),
            path: path.to_path_buf(),
            location,
            message,
        };

        let content =
            std::fs::read_to_string(path).map_err(|err| failure(None, format!("failed to read: {err}")))?;
        let mut vars = BTreeMap::new();
        for item in dotenvy::from_read_iter(content.as_bytes()) {
            match item {
                Ok((key, value)) => {
                    vars.insert(key, value);
                }
                Err(dotenvy::Error::LineParse(line, index)) => {
                    let location = loader::locate_line(&content, &line)
                        .map(|line_no| format!("{line_no}, column {}", index + 1));
                    return Err(failure(location, format!("cannot parse '{}'", line.trim())));
                }
                Err(err) => return Err(failure(None, err.to_string())),
            }
        }

        Ok(Self {
            name: format!("dotenv:{}", path.display()),
            path: path.to_path_buf(),
            env: EnvSource::from_vars(prefix, delimiter, vars),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for DotenvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Dotenv
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        self.env.lookup(field)
    }
}

/// One structured file, narrowed to the schema's section.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
    section: Value,
}

impl FileSource {
    pub fn open(path: &Path, schema: &'static SettingsSchema) -> Result<Self> {
        let document = loader::load_from_file(path)?;
        Self::from_document(path, document, schema)
    }

    /// Narrows `document` to the schema's section and checks that every key
    /// the schema declares as a table is one.
    pub fn from_document(
        path: &Path,
        document: Value,
        schema: &'static SettingsSchema,
    ) -> Result<Self> {
        let misplaced = |key: String, found: &Value| Error::SourceConstruction {
            origin: "file".to_owned(),
            path: path.to_path_buf(),
            location: Some(format!("key '{key}'")),
            message: format!("expected a table, found {}", value_type(found)),
        };

        if let Some(found) = document.get(schema.section) {
            if !found.is_object() && !found.is_null() {
                return Err(misplaced(schema.section.to_owned(), found));
            }
        }
        let section = loader::select_section(document, schema.section);
        if let Some((key, found)) = find_misplaced_table(schema, &section, None) {
            return Err(misplaced(key, found));
        }

        Ok(Self {
            name: format!("file:{}", path.display()),
            path: path.to_path_buf(),
            section,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        let mut cursor = &self.section;
        for segment in field.segments() {
            cursor = cursor.as_object()?.get(segment)?;
        }
        // An explicit null (JSON/YAML) means "not set here".
        (!cursor.is_null()).then(|| cursor.clone())
    }
}

/// First key declared as a table but holding something else.
fn find_misplaced_table<'v>(
    schema: &'static SettingsSchema,
    table: &'v Value,
    prefix: Option<&FieldPath>,
) -> Option<(String, &'v Value)> {
    schema.fields.iter().find_map(|field| {
        let FieldKind::Table(nested) = field.kind else {
            return None;
        };
        let path = match prefix {
            Some(prefix) => prefix.child(field.name),
            None => FieldPath::root(field.name),
        };
        match table.get(field.name) {
            None | Some(Value::Null) => None,
            Some(found @ Value::Object(_)) => find_misplaced_table(nested, found, Some(&path)),
            Some(found) => Some((path.to_string(), found)),
        }
    })
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}

/// A directory holding one file per field; the file name is the dotted field
/// path and its content the value.
#[derive(Debug, Clone)]
pub struct SecretSource {
    name: String,
    values: BTreeMap<String, String>,
}

impl SecretSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let failure = |path: &Path, message: String| Error::SourceConstruction {
            origin: "secret".to_owned(),
            path: path.to_path_buf(),
            location: None,
            message,
        };

        let entries = std::fs::read_dir(dir)
            .map_err(|err| failure(dir, format!("failed to read directory: {err}")))?;

        let mut values = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|err| failure(dir, format!("failed to read entry: {err}")))?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') || !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|err| failure(&path, format!("failed to read secret: {err}")))?;
            values.insert(
                file_name.to_owned(),
                content.trim_end_matches(['\n', '\r']).to_owned(),
            );
        }

        Ok(Self {
            name: format!("secrets:{}", dir.display()),
            values,
        })
    }
}

impl Source for SecretSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Secret
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        self.values
            .get(&field.secret_file_name())
            .cloned()
            .map(Value::String)
    }
}

/// The closed set of sources a chain is assembled from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    Cli(CliSource),
    Env(EnvSource),
    Dotenv(DotenvSource),
    File(FileSource),
    Secret(SecretSource),
}

impl ConfigSource {
    fn as_source(&self) -> &dyn Source {
        match self {
            Self::Cli(source) => source,
            Self::Env(source) => source,
            Self::Dotenv(source) => source,
            Self::File(source) => source,
            Self::Secret(source) => source,
        }
    }
}

impl Source for ConfigSource {
    fn name(&self) -> &str {
        self.as_source().name()
    }

    fn kind(&self) -> SourceKind {
        self.as_source().kind()
    }

    fn lookup(&self, field: &FieldPath) -> Option<Value> {
        self.as_source().lookup(field)
    }
}

#[cfg(test)]
mod tests {
    use super::{CliSource, DotenvSource, EnvSource, FileSource, SecretSource, Source};
    use crate::config::components::WORKER;
    use crate::config::path::FieldPath;
    use crate::config::provenance::SourceKind;
    use crate::error::Error;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn cli_matches_kebab_and_snake_keys() {
        let mut args = BTreeMap::new();
        args.insert("--max-parallel-groups".to_owned(), "8".to_owned());
        args.insert("retry.max_attempts".to_owned(), "5".to_owned());
        let source = CliSource::new(&args).expect("keys parse");

        assert_eq!(
            source.lookup(&FieldPath::root("max_parallel_groups")),
            Some(json!("8"))
        );
        assert_eq!(
            source.lookup(&FieldPath::root("retry").child("max_attempts")),
            Some(json!("5"))
        );
        assert_eq!(source.lookup(&FieldPath::root("timeout")), None);
    }

    #[test]
    fn cli_rejects_malformed_keys() {
        let mut args = BTreeMap::new();
        args.insert("retry..max_attempts".to_owned(), "99".to_owned());
        match CliSource::new(&args).expect_err("empty segment") {
            Error::UnknownField { field, .. } => assert_eq!(field, "retry..max_attempts"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn env_reads_prefixed_and_nested_names() {
        let source = EnvSource::from_vars(
            "STRATUM_WORKER",
            "__",
            [
                ("STRATUM_WORKER_TIMEOUT", "600"),
                ("STRATUM_WORKER_RETRY__MAX_ATTEMPTS", "4"),
                ("TIMEOUT", "1"),
            ],
        );
        assert_eq!(source.lookup(&FieldPath::root("timeout")), Some(json!("600")));
        assert_eq!(
            source.lookup(&FieldPath::root("retry").child("max_attempts")),
            Some(json!("4"))
        );
        assert_eq!(source.kind(), SourceKind::Env);
    }

    #[test]
    fn dotenv_behaves_like_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        std::fs::write(&path, "# local\nSTRATUM_WORKER_TIMEOUT=45\n").expect("write");

        let source = DotenvSource::open(&path, "STRATUM_WORKER", "__").expect("dotenv should parse");
        assert_eq!(source.lookup(&FieldPath::root("timeout")), Some(json!("45")));
        assert_eq!(source.kind(), SourceKind::Dotenv);
        assert!(source.name().starts_with("dotenv:"));
    }

    #[test]
    fn malformed_dotenv_fails_with_location() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(".env");
        std::fs::write(&path, "GOOD=1\nthis is not valid\n").expect("write");

        let error = DotenvSource::open(&path, "STRATUM", "__").expect_err("should fail");
        match error {
            Error::SourceConstruction { origin, location, .. } => {
                assert_eq!(origin, "dotenv");
                let location = location.expect("location should be reported");
                assert!(location.starts_with("line 2"), "got {location}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_walks_nested_tables_within_section() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stratum.toml");
        std::fs::write(
            &path,
            "[worker]\ntimeout = 300\n\n[worker.retry]\nmax_attempts = 2\n",
        )
        .expect("write");

        let source = FileSource::open(&path, &WORKER).expect("file should parse");
        assert_eq!(source.lookup(&FieldPath::root("timeout")), Some(json!(300)));
        assert_eq!(
            source.lookup(&FieldPath::root("retry").child("max_attempts")),
            Some(json!(2))
        );
        assert_eq!(source.lookup(&FieldPath::root("name")), None);
    }

    #[test]
    fn file_rejects_scalar_where_table_is_declared() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stratum.toml");
        std::fs::write(&path, "[worker]\nname = \"w\"\nretry = 5\n").expect("write");

        match FileSource::open(&path, &WORKER).expect_err("retry must be a table") {
            Error::SourceConstruction {
                origin,
                location,
                message,
                ..
            } => {
                assert_eq!(origin, "file");
                assert_eq!(location.as_deref(), Some("key 'retry'"));
                assert!(message.contains("a number"), "got {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn file_rejects_scalar_section() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stratum.json");
        std::fs::write(&path, r#"{"worker": "oops"}"#).expect("write");
        let error = FileSource::open(&path, &WORKER).expect_err("section must be a table");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn file_treats_null_as_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("w.json");
        std::fs::write(&path, r#"{"model": null, "timeout": 12}"#).expect("write");

        let source = FileSource::open(&path, &WORKER).expect("file should parse");
        assert_eq!(source.lookup(&FieldPath::root("model")), None);
        assert_eq!(source.lookup(&FieldPath::root("timeout")), Some(json!(12)));
    }

    #[test]
    fn secrets_read_one_file_per_field() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("api_key"), "s3cr3t\n").expect("write");
        std::fs::write(dir.path().join(".hidden"), "x").expect("write");

        let source = SecretSource::open(dir.path()).expect("secrets should load");
        assert_eq!(source.lookup(&FieldPath::root("api_key")), Some(json!("s3cr3t")));
        assert_eq!(source.lookup(&FieldPath::root(".hidden")), None);
    }

    #[test]
    fn missing_secrets_directory_fails_construction() {
        let error = SecretSource::open(std::path::Path::new("/no/such/secrets"))
            .expect_err("should fail");
        assert_eq!(error.code(), "source_construction_error");
    }
}

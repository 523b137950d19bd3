use std::collections::BTreeMap;
use std::path::Path;

use stratum_core::commands::{self, OutputFormat, ShowRequest};
use stratum_core::config::components::{WorkerSettings, WORKER};
use stratum_core::{ConfigManager, Error, SchemaRegistry, SourceKind};

fn manager(root: &Path, cli: &[(&str, &str)], env: &[(&str, &str)]) -> ConfigManager {
    let args: BTreeMap<String, String> = cli
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect();
    ConfigManager::new(args, root, "integration").with_environment(env.iter().copied())
}

fn write_worker_file(root: &Path, body: &str) {
    std::fs::write(root.join("stratum.toml"), body).expect("write config file");
}

#[test]
fn environment_overrides_file_and_is_traced() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_worker_file(dir.path(), "[worker]\nname = \"w1\"\ntimeout = 300\n");

    let manager = manager(dir.path(), &[], &[("STRATUM_WORKER_TIMEOUT", "600")]);
    let resolved = manager.load(&WORKER).expect("load");

    assert_eq!(resolved.get_i64("timeout"), Some(600));
    let record = manager.get_provenance(&WORKER, "timeout").expect("record");
    assert_eq!(record.source_kind, SourceKind::Env);
    assert_eq!(record.source_name, "env");
}

#[test]
fn out_of_range_cli_value_fails_even_with_valid_lower_sources() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_worker_file(dir.path(), "[worker]\nname = \"w1\"\ntimeout = 300\n");

    let manager = manager(dir.path(), &[("timeout", "900")], &[]);
    match manager.load(&WORKER).expect_err("900 is above the limit") {
        Error::Validation { schema, field, .. } => {
            assert_eq!(schema, "worker");
            assert_eq!(field, "timeout");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn defaults_fill_every_field_when_sources_are_silent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = manager(dir.path(), &[("name", "only-cli")], &[]);
    let resolved = manager.load(&WORKER).expect("load");

    let defaults = manager.get_schema_defaults(&WORKER);
    for (field, default) in &defaults {
        assert_eq!(resolved.value(field), Some(default), "{field}");
        assert_eq!(
            resolved.provenance(field).expect("record").source_kind,
            SourceKind::Default,
            "{field}"
        );
    }
    assert_eq!(resolved.provenance_records().len(), WORKER.leaf_fields().len());
}

#[test]
fn missing_required_field_is_deterministic() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = manager(dir.path(), &[], &[]);

    let first = manager.load(&WORKER).expect_err("name is required");
    let second = manager.load(&WORKER).expect_err("name is still required");
    assert_eq!(first.to_string(), second.to_string());
    assert_eq!(first.exit_code(), 3);
    assert!(first.to_string().contains("name"));
}

#[test]
fn cross_field_rule_requires_api_key_for_remote_provider() {
    let dir = tempfile::tempdir().expect("tempdir");
    let manager = manager(dir.path(), &[("name", "w1"), ("provider", "remote")], &[]);
    match manager.load(&WORKER).expect_err("api_key missing") {
        Error::Validation { field, .. } => assert_eq!(field, "api_key"),
        other => panic!("unexpected error: {other}"),
    }

    std::fs::create_dir(dir.path().join("secrets")).expect("mkdir");
    std::fs::write(dir.path().join("secrets").join("api_key"), "k-123\n").expect("write");
    let worker: WorkerSettings = manager.load_as().expect("secret satisfies rule");
    assert_eq!(worker.api_key.as_deref(), Some("k-123"));
}

#[test]
fn init_template_round_trips_through_show() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stratum.toml");
    commands::init(&SchemaRegistry::builtin(), "worker", &path, false).expect("init");

    let template = std::fs::read_to_string(&path).expect("read template");
    std::fs::write(&path, template.replace("name = \"\"", "name = \"filled\""))
        .expect("fill template");

    let manager = manager(dir.path(), &[], &[]);
    let request = ShowRequest {
        schema: Some("worker".to_owned()),
        format: OutputFormat::Json,
        ..ShowRequest::default()
    };
    let rendered = commands::show(&manager, &request).expect("filled template resolves");
    let parsed: serde_json::Value = serde_json::from_str(&rendered).expect("json output");
    let name = &parsed["nodes"][0]["fields"]["name"];
    assert_eq!(name["value"], serde_json::json!("filled"));
    assert_eq!(name["source"], serde_json::json!("file"));

    let record = manager.get_provenance(&WORKER, "name").expect("record");
    assert_eq!(record.source_kind, SourceKind::File);
}

#[test]
fn yaml_and_json_files_are_accepted() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("worker.yaml"),
        "worker:\n  name: from-yaml\n  retry:\n    max_attempts: 5\n",
    )
    .expect("write yaml");
    std::fs::write(
        dir.path().join("worker.json"),
        r#"{"worker": {"name": "from-json", "enabled": false}}"#,
    )
    .expect("write json");

    let yaml = manager(dir.path(), &[("config-file", "worker.yaml")], &[])
        .load(&WORKER)
        .expect("yaml");
    assert_eq!(yaml.get_str("name"), Some("from-yaml"));
    assert_eq!(yaml.get_i64("retry.max_attempts"), Some(5));

    let json = manager(dir.path(), &[], &[("STRATUM_CONFIG_FILE", "worker.json")])
        .load(&WORKER)
        .expect("json");
    assert_eq!(json.get_str("name"), Some("from-json"));
    assert_eq!(json.get_bool("enabled"), Some(false));
}

#[test]
fn malformed_file_reports_its_location() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_worker_file(dir.path(), "[worker]\nname = \"w1\"\ntimeout = = 3\n");

    let error = manager(dir.path(), &[], &[])
        .load(&WORKER)
        .expect_err("malformed");
    match &error {
        Error::SourceConstruction { location, .. } => {
            assert!(location.as_deref().unwrap_or_default().contains("line 3"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(error.exit_code(), 2);
}

#[test]
fn removing_sources_top_down_walks_the_whole_chain() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path();
    std::fs::write(root.join(".env"), "STRATUM_WORKER_TIMEOUT=33\n").expect("write dotenv");
    write_worker_file(root, "[worker]\nname = \"w\"\ntimeout = 44\n");
    std::fs::create_dir(root.join("secrets")).expect("secrets dir");
    std::fs::write(root.join("secrets").join("timeout"), "55\n").expect("write secret");

    let env = [("STRATUM_WORKER_TIMEOUT", "22")];
    let check = |manager: ConfigManager, expected: i64, kind: SourceKind| {
        let resolved = manager.load(&WORKER).expect("load");
        assert_eq!(resolved.get_i64("timeout"), Some(expected));
        assert_eq!(
            resolved.provenance("timeout").expect("record").source_kind,
            kind
        );
        assert_eq!(
            resolved.provenance("name").expect("record").source_kind,
            SourceKind::File
        );
    };

    check(manager(root, &[("timeout", "11")], &env), 11, SourceKind::Cli);
    check(manager(root, &[], &env), 22, SourceKind::Env);
    check(manager(root, &[], &[]), 33, SourceKind::Dotenv);

    std::fs::remove_file(root.join(".env")).expect("remove dotenv");
    check(manager(root, &[], &[]), 44, SourceKind::File);

    write_worker_file(root, "[worker]\nname = \"w\"\n");
    check(manager(root, &[], &[]), 55, SourceKind::Secret);

    std::fs::remove_file(root.join("secrets").join("timeout")).expect("remove secret");
    check(manager(root, &[], &[]), 300, SourceKind::Default);
}

#[test]
fn scalar_in_place_of_a_table_fails_the_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_worker_file(dir.path(), "[worker]\nname = \"w\"\nretry = 5\n");

    let manager = manager(dir.path(), &[], &[]);
    let error = manager.load(&WORKER).expect_err("retry must be a table");
    assert!(matches!(error, Error::SourceConstruction { .. }));
    assert_eq!(error.exit_code(), 2);
    assert!(manager.get_provenance(&WORKER, "name").is_none());
}

#[test]
fn misspelled_override_is_reported_not_ignored() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_worker_file(dir.path(), "[worker]\nname = \"w\"\n");

    let manager = manager(dir.path(), &[("timout", "5")], &[]);
    let error = manager.load(&WORKER).expect_err("unknown key");
    assert!(matches!(error, Error::UnknownField { .. }));
    assert!(error.to_string().contains("timout"));
}

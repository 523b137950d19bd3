//! Resolution engine.
//!
//! Sources are consulted strictly in the order given; the first one reporting
//! a value wins and no merging happens across sources. Absent any source value
//! the schema default applies. Validation runs once every field has a raw
//! value, so an out-of-range value fails no matter which source supplied it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::config::provenance::{ProvenanceLog, ProvenanceRecord, SourceKind};
use crate::config::resolved::ResolvedSettings;
use crate::config::schema::SettingsSchema;
use crate::config::source::Source;
use crate::config::validation;
use crate::error::{Error, Result};

/// Resolves `schema` against `sources` (highest priority first). Wrapped
/// sources write their hits into `log`; defaults are recorded here.
pub fn resolve<S: Source>(
    schema: &'static SettingsSchema,
    sources: &[S],
    log: &ProvenanceLog,
) -> Result<ResolvedSettings> {
    let call_id = Uuid::new_v4();
    let fields = schema.leaf_fields();
    let mut raw = BTreeMap::new();

    for (path, spec) in &fields {
        let winner = sources
            .iter()
            .find_map(|source| source.lookup(path).map(|value| (source.kind(), value)));

        let value = match winner {
            Some((kind, value)) => {
                debug!(schema = schema.name, field = %path, source = %kind, "field resolved");
                value
            }
            None => match spec.default {
                Some(default) => {
                    let value = default.to_value();
                    log.record(ProvenanceRecord::schema_default(value.clone(), path));
                    debug!(schema = schema.name, field = %path, source = %SourceKind::Default, "field defaulted");
                    value
                }
                None if spec.required => {
                    return Err(Error::MissingRequiredField {
                        schema: schema.name.to_owned(),
                        field: path.to_string(),
                    });
                }
                None => {
                    log.record(ProvenanceRecord::schema_default(Value::Null, path));
                    Value::Null
                }
            },
        };
        raw.insert(path.to_string(), value);
    }

    let mut values = BTreeMap::new();
    for (path, spec) in &fields {
        let key = path.to_string();
        let raw_value = raw.get(&key).unwrap_or(&Value::Null);
        let value = validation::validate_field(schema, path, spec, raw_value)?;
        values.insert(key, value);
    }
    validation::check_rules(schema, &values)?;

    Ok(ResolvedSettings::new(schema.name, call_id, values, log.take()))
}

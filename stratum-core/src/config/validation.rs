use std::collections::BTreeMap;

use regex::Regex;
use serde_json::Value;

use crate::config::path::FieldPath;
use crate::config::schema::{
    Constraint, CrossFieldRule, FieldKind, FieldSpec, SettingsSchema, Transform,
};
use crate::error::{Error, Result};

const TRUE_WORDS: &[&str] = &["true", "1", "yes", "on"];
const FALSE_WORDS: &[&str] = &["false", "0", "no", "off"];

/// Coerces, transforms and checks one raw value against its declaration.
/// `Null` stands for an optional field nobody supplied.
pub fn validate_field(
    schema: &SettingsSchema,
    field: &FieldPath,
    spec: &FieldSpec,
    raw: &Value,
) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let coerced = coerce(&spec.kind, raw)
        .map_err(|message| invalid(schema, &field.to_string(), message))?;
    let value = match spec.transform {
        Some(transform) => apply_transform(transform, coerced),
        None => coerced,
    };

    if spec.required && is_empty(&value) {
        return Err(invalid(
            schema,
            &field.to_string(),
            "required field is empty".to_owned(),
        ));
    }

    if let FieldKind::Choice(options) = spec.kind {
        let chosen = value.as_str().unwrap_or_default();
        if !options.contains(&chosen) {
            return Err(invalid(
                schema,
                &field.to_string(),
                format!("'{chosen}' is not one of {}", options.join(", ")),
            ));
        }
    }

    for constraint in spec.constraints {
        check_constraint(constraint, &value)
            .map_err(|message| invalid(schema, &field.to_string(), message))?;
    }

    Ok(value)
}

fn coerce(kind: &FieldKind, raw: &Value) -> std::result::Result<Value, String> {
    match kind {
        FieldKind::String | FieldKind::Path | FieldKind::Choice(_) | FieldKind::Reference { .. } => {
            match raw {
                Value::String(_) => Ok(raw.clone()),
                Value::Number(number) => Ok(Value::String(number.to_string())),
                Value::Bool(flag) => Ok(Value::String(flag.to_string())),
                other => Err(format!("expected a string, got {other}")),
            }
        }
        FieldKind::Integer => match raw {
            Value::Number(number) if number.is_i64() || number.is_u64() => Ok(raw.clone()),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("'{text}' is not an integer")),
            other => Err(format!("expected an integer, got {other}")),
        },
        FieldKind::Float => match raw {
            Value::Number(number) => number
                .as_f64()
                .map(Value::from)
                .ok_or_else(|| format!("'{number}' is not a float")),
            Value::String(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .map(Value::from)
                .ok_or_else(|| format!("'{text}' is not a number")),
            other => Err(format!("expected a number, got {other}")),
        },
        FieldKind::Boolean => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            Value::String(text) => {
                let folded = text.trim().to_ascii_lowercase();
                if TRUE_WORDS.contains(&folded.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSE_WORDS.contains(&folded.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(format!("'{text}' is not a boolean"))
                }
            }
            other => Err(format!("expected a boolean, got {other}")),
        },
        FieldKind::StringList | FieldKind::ReferenceList { .. } => match raw {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(_) => Ok(item.clone()),
                    Value::Number(number) => Ok(Value::String(number.to_string())),
                    other => Err(format!("list items must be strings, got {other}")),
                })
                .collect::<std::result::Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::String(text) => Ok(Value::Array(
                text.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_owned()))
                    .collect(),
            )),
            other => Err(format!("expected a list, got {other}")),
        },
        FieldKind::Table(schema) => Err(format!(
            "'{}' is a table and has no value of its own",
            schema.name
        )),
    }
}

fn apply_transform(transform: Transform, value: Value) -> Value {
    let apply = |text: &str| match transform {
        Transform::Trim => text.trim().to_owned(),
        Transform::Lowercase => text.to_lowercase(),
        Transform::Uppercase => text.to_uppercase(),
    };
    match value {
        Value::String(text) => Value::String(apply(&text)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(text) => Value::String(apply(&text)),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

fn check_constraint(constraint: &Constraint, value: &Value) -> std::result::Result<(), String> {
    match constraint {
        Constraint::Range { min, max } => {
            let Some(number) = value.as_f64() else {
                return Ok(());
            };
            if min.is_some_and(|min| number < min) || max.is_some_and(|max| number > max) {
                return Err(format!("{value} is outside {constraint}"));
            }
            Ok(())
        }
        Constraint::MinLength(length) => {
            let actual = match value {
                Value::String(text) => text.chars().count(),
                Value::Array(items) => items.len(),
                _ => return Ok(()),
            };
            if actual < *length {
                return Err(format!("length {actual} is below {constraint}"));
            }
            Ok(())
        }
        Constraint::Pattern(pattern) => {
            let Some(text) = value.as_str() else {
                return Ok(());
            };
            let regex =
                Regex::new(pattern).map_err(|err| format!("invalid pattern '{pattern}': {err}"))?;
            if !regex.is_match(text) {
                return Err(format!("'{text}' does not match {constraint}"));
            }
            Ok(())
        }
    }
}

/// Runs the schema's cross-field rules, then those of nested tables with
/// their field names prefixed.
pub fn check_rules(schema: &'static SettingsSchema, values: &BTreeMap<String, Value>) -> Result<()> {
    check_rules_at(schema, schema, None, values)
}

fn check_rules_at(
    root: &SettingsSchema,
    schema: &'static SettingsSchema,
    prefix: Option<&FieldPath>,
    values: &BTreeMap<String, Value>,
) -> Result<()> {
    let key = |name: &str| match prefix {
        Some(prefix) => prefix.child(name).to_string(),
        None => name.to_owned(),
    };
    let lookup = |name: &str| values.get(&key(name)).unwrap_or(&Value::Null);

    for rule in schema.rules {
        match rule {
            CrossFieldRule::NotGreaterThan { lesser, greater } => {
                if let (Some(low), Some(high)) = (lookup(lesser).as_f64(), lookup(greater).as_f64()) {
                    if low > high {
                        return Err(invalid(
                            root,
                            &key(lesser),
                            format!("{low} must not exceed '{}' ({high})", key(greater)),
                        ));
                    }
                }
            }
            CrossFieldRule::RequiredWhen {
                field,
                when,
                equals,
            } => {
                if *lookup(when) == equals.to_value() && is_empty(lookup(field)) {
                    return Err(invalid(
                        root,
                        &key(field),
                        format!("required when '{}' is {equals}", key(when)),
                    ));
                }
            }
            CrossFieldRule::AtLeastOneOf(fields) => {
                if fields.iter().all(|field| is_empty(lookup(field))) {
                    let names = fields.iter().map(|field| key(field)).collect::<Vec<_>>();
                    return Err(invalid(
                        root,
                        &names.join("|"),
                        format!("at least one of {} must be set", names.join(", ")),
                    ));
                }
            }
        }
    }

    for field in schema.fields {
        if let FieldKind::Table(nested) = field.kind {
            let path = match prefix {
                Some(prefix) => prefix.child(field.name),
                None => FieldPath::root(field.name),
            };
            check_rules_at(root, nested, Some(&path), values)?;
        }
    }

    Ok(())
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn invalid(schema: &SettingsSchema, field: &str, message: String) -> Error {
    Error::Validation {
        schema: schema.name.to_owned(),
        field: field.to_owned(),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::{check_rules, validate_field};
    use crate::config::path::FieldPath;
    use crate::config::schema::{
        Constraint, CrossFieldRule, FieldKind, FieldSpec, SettingsSchema, StaticValue, Transform,
    };
    use crate::error::Error;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    static LIMITS: SettingsSchema = SettingsSchema {
        name: "limits",
        section: "limits",
        env_prefix: "",
        description: "",
        fields: &[
            FieldSpec {
                name: "low",
                kind: FieldKind::Integer,
                ..FieldSpec::BASE
            },
            FieldSpec {
                name: "high",
                kind: FieldKind::Integer,
                ..FieldSpec::BASE
            },
        ],
        rules: &[CrossFieldRule::NotGreaterThan {
            lesser: "low",
            greater: "high",
        }],
    };

    static JOB: SettingsSchema = SettingsSchema {
        name: "job",
        section: "job",
        env_prefix: "",
        description: "",
        fields: &[
            FieldSpec {
                name: "mode",
                kind: FieldKind::Choice(&["local", "remote"]),
                transform: Some(Transform::Lowercase),
                ..FieldSpec::BASE
            },
            FieldSpec {
                name: "token",
                ..FieldSpec::BASE
            },
            FieldSpec {
                name: "limits",
                kind: FieldKind::Table(&LIMITS),
                ..FieldSpec::BASE
            },
        ],
        rules: &[CrossFieldRule::RequiredWhen {
            field: "token",
            when: "mode",
            equals: StaticValue::Str("remote"),
        }],
    };

    const TIMEOUT: FieldSpec = FieldSpec {
        name: "timeout",
        kind: FieldKind::Integer,
        default: Some(StaticValue::Int(300)),
        constraints: &[Constraint::Range {
            min: Some(10.0),
            max: Some(600.0),
        }],
        ..FieldSpec::BASE
    };

    fn check(spec: &FieldSpec, raw: Value) -> crate::Result<Value> {
        validate_field(&JOB, &FieldPath::root(spec.name), spec, &raw)
    }

    #[test]
    fn coerces_text_into_declared_types() {
        assert_eq!(check(&TIMEOUT, json!("600")).expect("int"), json!(600));

        let flag = FieldSpec {
            name: "enabled",
            kind: FieldKind::Boolean,
            ..FieldSpec::BASE
        };
        assert_eq!(check(&flag, json!("Off")).expect("bool"), json!(false));

        let list = FieldSpec {
            name: "tags",
            kind: FieldKind::StringList,
            ..FieldSpec::BASE
        };
        assert_eq!(check(&list, json!("a, b,,c")).expect("list"), json!(["a", "b", "c"]));
    }

    #[test]
    fn range_violation_names_the_field() {
        let error = check(&TIMEOUT, json!("900")).expect_err("out of range");
        match error {
            Error::Validation { field, message, .. } => {
                assert_eq!(field, "timeout");
                assert!(message.contains("range [10, 600]"), "got {message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn uncoercible_value_is_a_validation_error() {
        let error = check(&TIMEOUT, json!("soon")).expect_err("not an int");
        assert!(error.to_string().contains("'soon' is not an integer"));
    }

    #[test]
    fn required_strings_reject_empty_values() {
        let name = FieldSpec {
            name: "name",
            required: true,
            ..FieldSpec::BASE
        };
        let error = check(&name, json!("  ")).expect_err("empty");
        assert!(error.to_string().contains("required field is empty"));
    }

    #[test]
    fn choice_is_checked_after_transform() {
        let mode = JOB.fields[0];
        assert_eq!(check(&mode, json!("REMOTE")).expect("choice"), json!("remote"));
        assert!(check(&mode, json!("cloud")).is_err());
    }

    #[test]
    fn pattern_constraint_uses_regex() {
        let name = FieldSpec {
            name: "name",
            constraints: &[Constraint::Pattern("^[a-z][a-z0-9-]*$")],
            ..FieldSpec::BASE
        };
        assert!(check(&name, json!("main-1")).is_ok());
        assert!(check(&name, json!("Main_1")).is_err());
    }

    #[test]
    fn cross_field_rules_reach_nested_tables() {
        let mut values = BTreeMap::new();
        values.insert("mode".to_owned(), json!("local"));
        values.insert("token".to_owned(), Value::Null);
        values.insert("limits.low".to_owned(), json!(5));
        values.insert("limits.high".to_owned(), json!(3));

        let error = check_rules(&JOB, &values).expect_err("low > high");
        match error {
            Error::Validation { schema, field, .. } => {
                assert_eq!(schema, "job");
                assert_eq!(field, "limits.low");
            }
            other => panic!("unexpected error: {other}"),
        }

        values.insert("limits.high".to_owned(), json!(9));
        assert!(check_rules(&JOB, &values).is_ok());

        values.insert("mode".to_owned(), json!("remote"));
        let error = check_rules(&JOB, &values).expect_err("token required");
        assert!(error.to_string().contains("required when 'mode' is \"remote\""));
    }
}

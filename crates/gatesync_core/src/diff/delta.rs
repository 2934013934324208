//! Field-level comparison of two serialized records.

use crate::error::{DiffError, DiffResult};
use crate::types::EntityKind;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// One changed field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDelta {
    /// Dotted path from the record root, e.g. `config.minute`.
    pub path: String,
    /// Value in the current state; `None` when absent.
    pub old: Option<Value>,
    /// Value in the desired state; `None` when absent.
    pub new: Option<Value>,
}

impl FieldDelta {
    /// Creates a delta entry.
    #[must_use]
    pub fn new(path: impl Into<String>, old: Option<Value>, new: Option<Value>) -> Self {
        Self {
            path: path.into(),
            old,
            new,
        }
    }
}

impl fmt::Display for FieldDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: &Option<Value>| match value {
            Some(value) => value.to_string(),
            None => "<absent>".to_owned(),
        };
        write!(f, "{}: {} -> {}", self.path, show(&self.old), show(&self.new))
    }
}

/// Compares two top-level field maps.
///
/// Absent, `null`, `[]` and `{}` are all "no value". Arrays named in
/// `unordered` compare as multisets. Objects recurse, and an object key the
/// desired side leaves out keeps whatever default the server filled in. A
/// top-level field whose JSON types differ is an error rather than a delta.
pub(crate) fn compare_fields(
    kind: EntityKind,
    entity: &str,
    current: &Map<String, Value>,
    desired: &Map<String, Value>,
    unordered: &[&str],
) -> DiffResult<Vec<FieldDelta>> {
    let mut deltas = Vec::new();
    for field in field_names(current, desired) {
        let old = present(current.get(field));
        let new = present(desired.get(field));
        if let (Some(old), Some(new)) = (old, new) {
            if type_name(old) != type_name(new) {
                return Err(DiffError::Incomparable {
                    kind,
                    entity: entity.to_owned(),
                    field: field.to_owned(),
                    current: type_name(old),
                    desired: type_name(new),
                });
            }
        }
        compare_value(field, old, new, unordered.contains(&field), &mut deltas);
    }
    Ok(deltas)
}

fn compare_value(
    path: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    unordered: bool,
    deltas: &mut Vec<FieldDelta>,
) {
    match (old, new) {
        (None, None) | (Some(Value::Object(_)), None) => {}
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            for (field, value) in new {
                compare_value(
                    &format!("{path}.{field}"),
                    present(old.get(field)),
                    present(Some(value)),
                    false,
                    deltas,
                );
            }
        }
        (Some(Value::Array(old_items)), Some(Value::Array(new_items))) if unordered => {
            if sorted(old_items) != sorted(new_items) {
                deltas.push(FieldDelta::new(path, old.cloned(), new.cloned()));
            }
        }
        (old, new) => {
            if old != new {
                deltas.push(FieldDelta::new(path, old.cloned(), new.cloned()));
            }
        }
    }
}

fn field_names<'a>(a: &'a Map<String, Value>, b: &'a Map<String, Value>) -> BTreeSet<&'a str> {
    a.keys().chain(b.keys()).map(String::as_str).collect()
}

/// Collapses the "no value" forms to `None`.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|value| match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    })
}

fn sorted(items: &[Value]) -> Vec<String> {
    let mut items: Vec<String> = items.iter().map(Value::to_string).collect();
    items.sort_unstable();
    items
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn compare(current: Value, desired: Value, unordered: &[&str]) -> DiffResult<Vec<FieldDelta>> {
        compare_fields(
            EntityKind::Route,
            "r1",
            &fields(current),
            &fields(desired),
            unordered,
        )
    }

    #[test]
    fn equal_records_have_no_delta() {
        let record = json!({"name": "r1", "paths": ["/a", "/b"]});
        assert!(compare(record.clone(), record, &[]).unwrap().is_empty());
    }

    #[test]
    fn absent_null_and_empty_are_equal() {
        let current = json!({"tags": [], "path": null, "config": {}});
        let desired = json!({});
        assert!(compare(current, desired, &["tags"]).unwrap().is_empty());
    }

    #[test]
    fn unordered_field_ignores_order() {
        let current = json!({"methods": ["GET", "POST"]});
        let desired = json!({"methods": ["POST", "GET"]});
        assert!(compare(current, desired, &["methods"]).unwrap().is_empty());
    }

    #[test]
    fn unordered_field_counts_duplicates() {
        let current = json!({"tags": ["a", "a", "b"]});
        let desired = json!({"tags": ["a", "b", "b"]});
        assert_eq!(compare(current, desired, &["tags"]).unwrap().len(), 1);
    }

    #[test]
    fn ordered_field_respects_order() {
        let current = json!({"paths": ["/a", "/b"]});
        let desired = json!({"paths": ["/b", "/a"]});
        let deltas = compare(current, desired, &["methods"]).unwrap();
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].path, "paths");
    }

    #[test]
    fn nested_objects_use_dotted_paths() {
        let current = json!({"config": {"minute": 10, "policy": "local"}});
        let desired = json!({"config": {"minute": 20, "policy": "local"}});
        let deltas = compare(current, desired, &[]).unwrap();
        assert_eq!(
            deltas,
            vec![FieldDelta::new("config.minute", Some(json!(10)), Some(json!(20)))]
        );
    }

    #[test]
    fn server_filled_config_keys_are_not_changes() {
        let current = json!({"config": {
            "minute": 5,
            "policy": "local",
            "fault_tolerant": true,
            "limit_by": "consumer",
            "redis": {"host": null, "port": 6379}
        }});
        let desired = json!({"config": {"minute": 5, "policy": "local", "redis": {}}});
        assert!(compare(current.clone(), desired, &[]).unwrap().is_empty());
        assert!(compare(current.clone(), json!({}), &[]).unwrap().is_empty());

        let desired = json!({"config": {"minute": 5, "limit_by": "ip"}});
        assert_eq!(
            compare(current, desired, &[]).unwrap(),
            vec![FieldDelta::new(
                "config.limit_by",
                Some(json!("consumer")),
                Some(json!("ip"))
            )]
        );
    }

    #[test]
    fn added_and_removed_fields() {
        let current = json!({"path": "/old"});
        let desired = json!({"retries": 3});
        let deltas = compare(current, desired, &[]).unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].path, "path");
        assert_eq!(deltas[0].new, None);
        assert_eq!(deltas[1].path, "retries");
        assert_eq!(deltas[1].old, None);
    }

    #[test]
    fn type_mismatch_is_incomparable() {
        let current = json!({"port": 80});
        let desired = json!({"port": "80"});
        let err = compare(current, desired, &[]).unwrap_err();
        assert_eq!(
            err,
            DiffError::Incomparable {
                kind: EntityKind::Route,
                entity: "r1".into(),
                field: "port".into(),
                current: "number",
                desired: "string",
            }
        );
    }

    #[test]
    fn nested_type_change_is_a_delta() {
        let current = json!({"config": {"limit": 5}});
        let desired = json!({"config": {"limit": "5"}});
        assert_eq!(compare(current, desired, &[]).unwrap().len(), 1);
    }

    #[test]
    fn display_shows_both_sides() {
        let delta = FieldDelta::new("config.minute", Some(json!(10)), None);
        assert_eq!(delta.to_string(), "config.minute: 10 -> <absent>");
    }
}

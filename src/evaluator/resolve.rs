//! The single field resolver shared by WHERE, HAVING, projection, GROUP BY,
//! and ORDER BY (spec.md §9 design note: one resolution path, four call
//! sites, to keep entity/metadata/participants lookup rules in one place).

use crate::ast::{Field, PathSegment};
use crate::dataset::{DatasetIndex, EvalOptions, FileRecord};
use crate::value::Value;
use indexmap::IndexMap;

/// Resolves `field` against `record`, consulting `dataset` for
/// `participants.*` lookups. Never fails: an absent or mistyped path
/// resolves to [`Value::Null`] (spec.md §4.3, total evaluation).
pub fn resolve_field(
    record: &FileRecord,
    dataset: &DatasetIndex,
    opts: &EvalOptions,
    field: &Field,
) -> Value {
    match field {
        Field::Entity(name) => record
            .entities
            .get(name)
            .cloned()
            .map(Value::String)
            .unwrap_or(Value::Null),
        Field::Metadata(path) => resolve_metadata_path(&record.metadata, path),
        Field::Participants(col) => resolve_participants(record, dataset, opts, col),
        Field::Filename => Value::String(record.filename.clone()),
        Field::Filepath => Value::String(record.filepath.clone()),
        Field::RelativePath => Value::String(record.relative_path.clone()),
    }
}

fn resolve_metadata_path(metadata: &IndexMap<String, Value>, path: &[PathSegment]) -> Value {
    let mut current: Option<&Value> = None;
    for segment in path {
        current = match segment {
            PathSegment::Key(key) => {
                let map = match current {
                    None => metadata,
                    Some(Value::Map(m)) => m,
                    _ => return Value::Null,
                };
                match map.get(key) {
                    Some(v) => Some(v),
                    None => return Value::Null,
                }
            }
            PathSegment::Index(idx) => match current {
                Some(Value::List(list)) => match list.get(*idx) {
                    Some(v) => Some(v),
                    None => return Value::Null,
                },
                _ => return Value::Null,
            },
        };
    }
    current.cloned().unwrap_or(Value::Null)
}

fn resolve_participants(
    record: &FileRecord,
    dataset: &DatasetIndex,
    opts: &EvalOptions,
    column: &str,
) -> Value {
    let Some(subject) = record.entities.get("sub") else {
        return Value::Null;
    };
    let Some(row) = dataset.participant_row(subject) else {
        return Value::Null;
    };
    if opts.case_insensitive_participants {
        row.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(column))
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Null)
    } else {
        row.get(column).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FileRecord {
        FileRecord::new("/d/sub-01/anat/sub-01_T1w.nii.gz", "sub-01/anat/sub-01_T1w.nii.gz")
            .with_entity("sub", "01")
            .with_metadata(
                "SliceTiming",
                Value::List(vec![Value::Number(0.0), Value::Number(0.5)]),
            )
    }

    #[test]
    fn resolves_entity_fields() {
        let rec = record();
        let dataset = DatasetIndex::new();
        let opts = EvalOptions::default();
        let v = resolve_field(&rec, &dataset, &opts, &Field::Entity("sub".to_string()));
        assert_eq!(v, Value::String("01".to_string()));
    }

    #[test]
    fn missing_entity_is_null() {
        let rec = record();
        let dataset = DatasetIndex::new();
        let opts = EvalOptions::default();
        let v = resolve_field(&rec, &dataset, &opts, &Field::Entity("task".to_string()));
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn resolves_metadata_subscript() {
        let rec = record();
        let dataset = DatasetIndex::new();
        let opts = EvalOptions::default();
        let field = Field::Metadata(vec![
            PathSegment::Key("SliceTiming".to_string()),
            PathSegment::Index(1),
        ]);
        assert_eq!(resolve_field(&rec, &dataset, &opts, &field), Value::Number(0.5));
    }

    #[test]
    fn out_of_range_subscript_is_null() {
        let rec = record();
        let dataset = DatasetIndex::new();
        let opts = EvalOptions::default();
        let field = Field::Metadata(vec![
            PathSegment::Key("SliceTiming".to_string()),
            PathSegment::Index(9),
        ]);
        assert_eq!(resolve_field(&rec, &dataset, &opts, &field), Value::Null);
    }

    #[test]
    fn participants_lookup_is_case_insensitive_by_default() {
        let rec = record();
        let mut dataset = DatasetIndex::new();
        dataset.participants.insert(
            "01".to_string(),
            IndexMap::from([("Age".to_string(), Value::Number(25.0))]),
        );
        let opts = EvalOptions::default();
        let v = resolve_field(&rec, &dataset, &opts, &Field::Participants("age".to_string()));
        assert_eq!(v, Value::Number(25.0));
    }

    #[test]
    fn participants_lookup_respects_case_sensitive_option() {
        let rec = record();
        let mut dataset = DatasetIndex::new();
        dataset.participants.insert(
            "01".to_string(),
            IndexMap::from([("Age".to_string(), Value::Number(25.0))]),
        );
        let opts = EvalOptions {
            case_insensitive_participants: false,
            max_rows: None,
        };
        let v = resolve_field(&rec, &dataset, &opts, &Field::Participants("age".to_string()));
        assert_eq!(v, Value::Null);
    }
}

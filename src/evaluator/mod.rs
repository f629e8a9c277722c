//! Query evaluation (spec.md §4.3).
//!
//! `evaluate` runs the six phases in order: scan & filter, project & group,
//! HAVING, DISTINCT, and ORDER BY. The evaluator is infallible — every
//! partial-data or type-mismatch case degrades to `null`/`false` rather
//! than producing a [`crate::error::Error`]; only the lexer and parser can
//! fail.

mod ops;
mod resolve;

use crate::ast::{AggFunc, Dir, Expr, Field, FuncArg, OrderByItem, Query, SelectItem};
use crate::dataset::{DatasetIndex, EvalOptions, FileRecord};
use crate::value::{compare_values, Row, Value};
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::HashSet;

pub use ops::eval_bool;

/// Run `query` against `dataset` and return the projected rows.
pub fn evaluate(dataset: &DatasetIndex, query: &Query, opts: &EvalOptions) -> Vec<Row> {
    let matched: Vec<&FileRecord> = dataset
        .files
        .iter()
        .filter(|record| {
            query.where_clause.as_ref().map_or(true, |expr| {
                eval_bool(expr, &|field| resolve::resolve_field(record, dataset, opts, field))
            })
        })
        .collect();
    log::trace!("scan matched {} of {} files", matched.len(), dataset.files.len());

    let grouped = needs_grouping(query);
    let mut rows = if grouped {
        evaluate_grouped(&matched, dataset, query, opts)
    } else {
        evaluate_flat(&matched, dataset, query, opts)
    };
    log::trace!("projected {} rows before HAVING/DISTINCT/ORDER BY", rows.len());

    if grouped {
        if let Some(having) = &query.having {
            rows.retain(|row| eval_bool(having, &|field| row_field(row, field)));
        }
    }

    let distinct = query.select.as_ref().is_some_and(|s| s.distinct);
    if distinct {
        rows = dedup_rows(rows);
    }
    log::trace!("{} rows after HAVING/DISTINCT", rows.len());

    if let Some(order_by) = &query.order_by {
        rows.sort_by(|a, b| compare_rows(a, b, order_by));
    }

    if let Some(max) = opts.max_rows {
        rows.truncate(max);
    }

    log::debug!("evaluate: {} rows returned", rows.len());
    rows
}

fn needs_grouping(query: &Query) -> bool {
    query.group_by.is_some()
        || query.having.is_some()
        || query
            .select
            .as_ref()
            .is_some_and(|s| s.items.iter().any(|item| matches!(item.expr, Expr::FuncCall { .. })))
}

/// Resolve a [`Field`] against an already-projected row (used by HAVING and
/// ORDER BY once grouping has happened, since those operate on output
/// columns rather than raw records).
fn row_field(row: &Row, field: &Field) -> Value {
    row.get(&field.canonical_name()).cloned().unwrap_or(Value::Null)
}

// ------------------------------------------------------------------------
// Ungrouped projection
// ------------------------------------------------------------------------

fn evaluate_flat(
    matched: &[&FileRecord],
    dataset: &DatasetIndex,
    query: &Query,
    opts: &EvalOptions,
) -> Vec<Row> {
    match &query.select {
        Some(select) => matched
            .iter()
            .map(|record| project_record(record, dataset, opts, &select.items))
            .collect(),
        None => matched
            .iter()
            .map(|record| full_record_row(record))
            .collect(),
    }
}

fn project_record(record: &FileRecord, dataset: &DatasetIndex, opts: &EvalOptions, items: &[SelectItem]) -> Row {
    let mut row = Row::new();
    for item in items {
        let value = match &item.expr {
            Expr::FieldRef(field) => resolve::resolve_field(record, dataset, opts, field),
            // Aggregates cannot appear here: needs_grouping() routes any
            // query with a FuncCall select item through evaluate_grouped.
            _ => Value::Null,
        };
        row.insert(item.output_name(), value);
    }
    row
}

/// The default projection when a query has no SELECT clause at all: every
/// entity plus the three path fields, with sidecar metadata nested under
/// `metadata` (spec.md §6.1 record shape).
fn full_record_row(record: &FileRecord) -> Row {
    let mut row = Row::new();
    for (key, value) in &record.entities {
        row.insert(key.clone(), Value::String(value.clone()));
    }
    row.insert("filename".to_string(), Value::String(record.filename.clone()));
    row.insert("filepath".to_string(), Value::String(record.filepath.clone()));
    row.insert(
        "relative_path".to_string(),
        Value::String(record.relative_path.clone()),
    );
    if !record.metadata.is_empty() {
        row.insert("metadata".to_string(), Value::Map(record.metadata.clone()));
    }
    row
}

// ------------------------------------------------------------------------
// Grouped projection & aggregation
// ------------------------------------------------------------------------

fn evaluate_grouped(
    matched: &[&FileRecord],
    dataset: &DatasetIndex,
    query: &Query,
    opts: &EvalOptions,
) -> Vec<Row> {
    let group_fields = query.group_by.clone().unwrap_or_default();

    // Partition into groups, preserving first-seen key order (spec.md
    // §4.3(c)); `IndexMap` gives us that for free.
    let mut groups: indexmap::IndexMap<String, (Vec<Value>, Vec<&FileRecord>)> = indexmap::IndexMap::new();
    for record in matched {
        let key_values: Vec<Value> = group_fields
            .iter()
            .map(|field| resolve::resolve_field(record, dataset, opts, field))
            .collect();
        let key = group_key(&key_values);
        groups
            .entry(key)
            .or_insert_with(|| (key_values, Vec::new()))
            .1
            .push(record);
    }
    log::trace!("partitioned into {} groups", groups.len());

    let items = query
        .select
        .as_ref()
        .map(|s| s.items.clone())
        .unwrap_or_else(|| default_grouped_select(&group_fields));

    groups
        .values()
        .map(|(key_values, records)| {
            project_group(&group_fields, key_values, records, dataset, query, opts, &items)
        })
        .collect()
}

fn group_key(values: &[Value]) -> String {
    values.iter().map(Value::as_display_string).join("\u{1}")
}

/// Synthetic SELECT used when a query has GROUP BY/HAVING but no explicit
/// SELECT list: the group key columns plus a row count.
fn default_grouped_select(group_fields: &[Field]) -> Vec<SelectItem> {
    let mut items: Vec<SelectItem> = group_fields
        .iter()
        .map(|field| SelectItem {
            expr: Expr::FieldRef(field.clone()),
            alias: None,
        })
        .collect();
    items.push(SelectItem {
        expr: Expr::FuncCall {
            func: AggFunc::Count,
            arg: FuncArg::Star,
            inner_where: None,
        },
        alias: None,
    });
    items
}

fn project_group(
    group_fields: &[Field],
    key_values: &[Value],
    records: &[&FileRecord],
    dataset: &DatasetIndex,
    _query: &Query,
    opts: &EvalOptions,
    items: &[SelectItem],
) -> Row {
    let mut row = Row::new();
    for item in items {
        let value = match &item.expr {
            Expr::FieldRef(field) => {
                if let Some(idx) = group_fields.iter().position(|f| f == field) {
                    key_values[idx].clone()
                } else {
                    auto_aggregate(field, records, dataset, opts)
                }
            }
            Expr::FuncCall { func, arg, inner_where } => {
                eval_aggregate(*func, arg, inner_where.as_deref(), records, dataset, opts)
            }
            _ => Value::Null,
        };
        row.insert(item.output_name(), value);
    }
    row
}

/// A non-grouped SELECT field inside a GROUP BY query: a scalar when every
/// record in the group agrees, otherwise the first-seen-order list of
/// distinct values (spec.md §4.3(c)).
fn auto_aggregate(field: &Field, records: &[&FileRecord], dataset: &DatasetIndex, opts: &EvalOptions) -> Value {
    let values: Vec<Value> = records
        .iter()
        .map(|r| resolve::resolve_field(r, dataset, opts, field))
        .unique_by(Value::as_display_string)
        .collect();
    match values.as_slice() {
        [] => Value::Null,
        [single] => single.clone(),
        _ => Value::List(values),
    }
}

fn eval_aggregate(
    func: AggFunc,
    arg: &FuncArg,
    inner_where: Option<&Expr>,
    records: &[&FileRecord],
    dataset: &DatasetIndex,
    opts: &EvalOptions,
) -> Value {
    let filtered: Vec<&FileRecord> = records
        .iter()
        .copied()
        .filter(|record| {
            inner_where
                .map_or(true, |cond| eval_bool(cond, &|field| resolve::resolve_field(record, dataset, opts, field)))
        })
        .collect();

    match (func, arg) {
        (AggFunc::Count, FuncArg::Star) => Value::Number(filtered.len() as f64),
        (AggFunc::Count, FuncArg::Field(field)) => Value::Number(
            filtered
                .iter()
                .filter(|r| resolve::resolve_field(r, dataset, opts, field).exists())
                .count() as f64,
        ),
        (AggFunc::Count, FuncArg::DistinctField(field)) => {
            let distinct: HashSet<String> = filtered
                .iter()
                .map(|r| resolve::resolve_field(r, dataset, opts, field))
                .filter(Value::exists)
                .map(|v| v.as_display_string())
                .collect();
            Value::Number(distinct.len() as f64)
        }
        (AggFunc::Sum, FuncArg::Field(field)) => {
            let sum: f64 = filtered
                .iter()
                .filter_map(|r| resolve::resolve_field(r, dataset, opts, field).as_number())
                .sum();
            Value::Number(sum)
        }
        (AggFunc::Avg, FuncArg::Field(field)) => {
            let nums: Vec<f64> = filtered
                .iter()
                .filter_map(|r| resolve::resolve_field(r, dataset, opts, field).as_number())
                .collect();
            if nums.is_empty() {
                Value::Null
            } else {
                Value::Number(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        (AggFunc::Max, FuncArg::Field(field)) => extreme(&filtered, dataset, opts, field, Ordering::Greater),
        (AggFunc::Min, FuncArg::Field(field)) => extreme(&filtered, dataset, opts, field, Ordering::Less),
        (AggFunc::ArrayAgg, FuncArg::Field(field)) => Value::List(
            filtered
                .iter()
                .map(|r| resolve::resolve_field(r, dataset, opts, field))
                .filter(Value::exists)
                .collect(),
        ),
        (AggFunc::ArrayAgg, FuncArg::DistinctField(field)) => Value::List(
            filtered
                .iter()
                .map(|r| resolve::resolve_field(r, dataset, opts, field))
                .filter(Value::exists)
                .unique_by(Value::as_display_string)
                .collect(),
        ),
        // SUM/AVG/MAX/MIN over `*` or DISTINCT aren't meaningful; degrade to null.
        _ => Value::Null,
    }
}

fn extreme(
    records: &[&FileRecord],
    dataset: &DatasetIndex,
    opts: &EvalOptions,
    field: &Field,
    wanted: Ordering,
) -> Value {
    let mut best: Option<Value> = None;
    for record in records {
        let value = resolve::resolve_field(record, dataset, opts, field);
        if !value.exists() {
            continue;
        }
        best = match best {
            None => Some(value),
            Some(current) => {
                if compare_values(&value, &current) == wanted {
                    Some(value)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.unwrap_or(Value::Null)
}

// ------------------------------------------------------------------------
// DISTINCT / ORDER BY
// ------------------------------------------------------------------------

fn dedup_rows(rows: Vec<Row>) -> Vec<Row> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| {
            let key: Vec<String> = row.values().map(Value::as_display_string).collect();
            seen.insert(key)
        })
        .collect()
}

fn compare_rows(a: &Row, b: &Row, order_by: &[OrderByItem]) -> Ordering {
    for item in order_by {
        let va = row_field(a, &item.field);
        let vb = row_field(b, &item.field);
        let ord = compare_for_order(&va, &vb, item.dir);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Nulls sort last regardless of direction; only non-null pairs have their
/// comparison reversed for `DESC` (spec.md §4.3(f)).
fn compare_for_order(a: &Value, b: &Value, dir: Dir) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = compare_values(a, b);
            match dir {
                Dir::Asc => ord,
                Dir::Desc => ord.reverse(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::PathSegment;
    use crate::parser::parse;

    fn qsm_dataset() -> DatasetIndex {
        let mut dataset = DatasetIndex::new();
        for part in ["mag", "phase"] {
            for run in ["1", "2"] {
                let filename = format!("sub-01_run-{run}_part-{part}_MEGRE.nii.gz");
                dataset.files.push(
                    FileRecord::new(format!("/d/sub-01/anat/{filename}"), format!("sub-01/anat/{filename}"))
                        .with_entity("sub", "01")
                        .with_entity("run", run)
                        .with_entity("part", part)
                        .with_entity("suffix", "MEGRE"),
                );
            }
        }
        dataset
    }

    #[test]
    fn where_filters_by_zero_padded_entity() {
        let dataset = qsm_dataset();
        let query = parse("sub=1").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn group_by_array_agg_with_inner_where_collects_only_matching_part() {
        let dataset = qsm_dataset();
        let query = parse("SELECT run, ARRAY_AGG(filename WHERE part=mag) AS mags GROUP BY run").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        assert_eq!(rows.len(), 2);
        for row in &rows {
            match row.get("mags").unwrap() {
                Value::List(list) => assert_eq!(list.len(), 1),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn auto_aggregation_collapses_to_scalar_when_uniform() {
        let dataset = qsm_dataset();
        let query = parse("SELECT run, suffix, COUNT(*) GROUP BY run").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        for row in &rows {
            assert_eq!(row.get("suffix").unwrap(), &Value::String("MEGRE".to_string()));
            assert_eq!(row.get("count").unwrap(), &Value::Number(2.0));
        }
    }

    #[test]
    fn auto_aggregation_becomes_list_when_values_differ() {
        let dataset = qsm_dataset();
        let query = parse("SELECT run, part GROUP BY run").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        for row in &rows {
            match row.get("part").unwrap() {
                Value::List(list) => assert_eq!(list.len(), 2),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn having_filters_post_aggregation() {
        let dataset = qsm_dataset();
        let query = parse("SELECT run, COUNT(*) GROUP BY run HAVING count>10").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        assert!(rows.is_empty());
    }

    #[test]
    fn distinct_deduplicates_full_row_tuples() {
        let dataset = qsm_dataset();
        let query = parse("SELECT DISTINCT suffix").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn order_by_sorts_nulls_last_regardless_of_direction() {
        let mut dataset = DatasetIndex::new();
        dataset.files.push(FileRecord::new("/a", "a").with_entity("run", "2"));
        dataset.files.push(FileRecord::new("/b", "b"));
        dataset.files.push(FileRecord::new("/c", "c").with_entity("run", "1"));

        let query = parse("SELECT run ORDER BY run DESC").unwrap();
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        let values: Vec<&Value> = rows.iter().map(|r| r.get("run").unwrap()).collect();
        assert_eq!(values, vec![&Value::String("2".to_string()), &Value::String("1".to_string()), &Value::Null]);
    }

    #[test]
    fn metadata_subscript_resolves_inside_where() {
        let mut dataset = DatasetIndex::new();
        dataset.files.push(
            FileRecord::new("/a", "a").with_metadata(
                "SliceTiming",
                Value::List(vec![Value::Number(0.1), Value::Number(0.2)]),
            ),
        );
        let query = crate::ast::Query {
            select: None,
            where_clause: Some(Expr::Binary(
                crate::ast::BinOp::Gt,
                Box::new(Expr::FieldRef(Field::Metadata(vec![
                    PathSegment::Key("SliceTiming".to_string()),
                    PathSegment::Index(1),
                ]))),
                Box::new(Expr::Literal(Value::Number(0.15))),
            )),
            group_by: None,
            having: None,
            order_by: None,
            format: None,
        };
        let rows = evaluate(&dataset, &query, &EvalOptions::default());
        assert_eq!(rows.len(), 1);
    }
}

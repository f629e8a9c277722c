//! Operator semantics and the boolean expression evaluator (spec.md
//! §4.3(b)). Every function here is total: a type mismatch degrades to
//! `false` rather than raising, since the evaluator never returns a
//! [`crate::error::Error`].

use crate::ast::{BinOp, Expr, Field};
use crate::value::{compare_values, Value};
use regex::Regex;
use std::cmp::Ordering;

/// Evaluate a WHERE/HAVING-shaped boolean expression against a field
/// resolver. `resolve` is called once per leaf [`Field`] encountered.
pub fn eval_bool(expr: &Expr, resolve: &dyn Fn(&Field) -> Value) -> bool {
    match expr {
        Expr::Binary(BinOp::And, lhs, rhs) => eval_bool(lhs, resolve) && eval_bool(rhs, resolve),
        Expr::Binary(BinOp::Or, lhs, rhs) => eval_bool(lhs, resolve) || eval_bool(rhs, resolve),
        Expr::Not(inner) => !eval_bool(inner, resolve),
        Expr::FieldRef(field) => resolve(field).exists(),
        Expr::Binary(op, lhs, rhs) => {
            let Expr::FieldRef(field) = lhs.as_ref() else {
                return false;
            };
            let lhs_value = resolve(field);
            eval_binary(*op, &lhs_value, rhs)
        }
        // Literals, lists, ranges, wildcards and function calls are never
        // themselves a boolean predicate.
        Expr::Literal(_) | Expr::List(_) | Expr::Range(..) | Expr::WildcardPattern(_) | Expr::FuncCall { .. } => {
            false
        }
    }
}

fn eval_binary(op: BinOp, lhs: &Value, rhs: &Expr) -> bool {
    match op {
        BinOp::Eq => values_equal(lhs, rhs),
        BinOp::Neq => !values_equal(lhs, rhs),
        BinOp::Lt => numeric_or_lexicographic(lhs, rhs, Ordering::Less, false),
        BinOp::Lte => numeric_or_lexicographic(lhs, rhs, Ordering::Less, true),
        BinOp::Gt => numeric_or_lexicographic(lhs, rhs, Ordering::Greater, false),
        BinOp::Gte => numeric_or_lexicographic(lhs, rhs, Ordering::Greater, true),
        BinOp::Regex => regex_match(lhs, rhs),
        BinOp::In => in_membership(lhs, rhs),
        BinOp::Like => like_match(lhs, rhs),
        BinOp::And | BinOp::Or => false,
    }
}

/// `=`/`!=`: numeric equality when both sides coerce to a number (this is
/// what makes `sub=1` match the zero-padded entity value `"01"`), glob
/// matching against a wildcard rhs, otherwise exact string equality.
/// A null lhs (a missing field) never equals anything, including another
/// null or an empty string (spec.md §4.3(a): comparisons against null are
/// always false).
fn values_equal(lhs: &Value, rhs: &Expr) -> bool {
    if lhs.is_null() {
        return false;
    }
    match rhs {
        Expr::WildcardPattern(pattern) => wildcard_match(&lhs.as_display_string(), pattern),
        Expr::Literal(rhs_value) => equal_coerced(lhs, rhs_value),
        _ => false,
    }
}

fn equal_coerced(lhs: &Value, rhs: &Value) -> bool {
    if lhs.is_null() {
        return false;
    }
    if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
        if a == b {
            return true;
        }
    }
    lhs.as_display_string() == rhs.as_display_string()
}

fn numeric_or_lexicographic(lhs: &Value, rhs: &Expr, wanted: Ordering, or_equal: bool) -> bool {
    let Expr::Literal(rhs_value) = rhs else {
        return false;
    };
    let ord = match (lhs.as_number(), rhs_value.as_number()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => Some(lhs.as_display_string().cmp(&rhs_value.as_display_string())),
    };
    match ord {
        Some(o) => o == wanted || (or_equal && o == Ordering::Equal),
        None => false,
    }
}

fn regex_match(lhs: &Value, rhs: &Expr) -> bool {
    let Expr::Literal(Value::String(pattern)) = rhs else {
        return false;
    };
    Regex::new(pattern)
        .map(|re| re.is_match(&lhs.as_display_string()))
        .unwrap_or(false)
}

fn in_membership(lhs: &Value, rhs: &Expr) -> bool {
    match rhs {
        Expr::List(values) => values.iter().any(|v| equal_coerced(lhs, v)),
        Expr::Range(lo, hi) => lhs.as_number().is_some_and(|n| n >= *lo && n <= *hi),
        _ => false,
    }
}

/// `LIKE` is a case-sensitive partial match, the same as `~=` (spec.md's
/// operator table) — unlike `=` against a wildcard pattern, which is
/// anchored at both ends.
fn like_match(lhs: &Value, rhs: &Expr) -> bool {
    let Expr::Literal(Value::String(pattern)) = rhs else {
        return false;
    };
    Regex::new(&like_to_regex(pattern))
        .map(|re| re.is_match(&lhs.as_display_string()))
        .unwrap_or(false)
}

fn wildcard_match(value: &str, pattern: &str) -> bool {
    Regex::new(&glob_to_regex(pattern))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

fn glob_to_regex(pattern: &str) -> String {
    let mut re = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            _ => re.push_str(&regex::escape(&ch.to_string())),
        }
    }
    re.push('$');
    re
}

fn like_to_regex(pattern: &str) -> String {
    let mut re = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            _ => re.push_str(&regex::escape(&ch.to_string())),
        }
    }
    re
}

/// Total ordering used by `MAX`/`MIN` aggregates: delegates to
/// [`compare_values`], which already implements the numeric-first,
/// nulls-excluded-by-caller comparison spec.md §4.3(d) requires.
pub fn value_order(a: &Value, b: &Value) -> Ordering {
    compare_values(a, b)
}

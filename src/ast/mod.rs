//! Abstract syntax tree for BIQL.
//!
//! The grammar is small compared to general SQL (spec.md §3): a single
//! optional SELECT/WHERE/GROUP BY/HAVING/ORDER BY/FORMAT pipeline over one
//! implicit source (the dataset's files), with no joins or subqueries.

use crate::value::Value;

/// A complete parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub select: Option<Select>,
    pub where_clause: Option<Expr>,
    pub group_by: Option<Vec<Field>>,
    pub having: Option<Expr>,
    pub order_by: Option<Vec<OrderByItem>>,
    pub format: Option<String>,
}

/// `ORDER BY <field> [ASC|DESC]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub field: Field,
    pub dir: Dir,
}

/// Sort direction. Defaults to `Asc` when omitted (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Asc,
    Desc,
}

/// `SELECT [DISTINCT] item [, item ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub items: Vec<SelectItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectItem {
    /// The output column name when no `AS alias` is given: the field's
    /// canonical name, or an aggregate's short default name (spec.md §4.2
    /// select-item canonicalization).
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expr::FieldRef(field) => field.canonical_name(),
            Expr::FuncCall { func, .. } => func.default_column_name().to_string(),
            other => other.display_text(),
        }
    }
}

/// One segment of a dotted metadata path: a JSON object key, or a `[n]`
/// list subscript (spec.md §4.3(a), subscript form, WHERE-only).
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A field reference resolvable against a file record (spec.md §3 DATA MODEL).
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// A bare name: a BIDS entity (`sub`, `task`, ...) or any other
    /// unqualified identifier looked up directly on the record's entity map.
    Entity(String),
    /// `metadata.<path>`, e.g. `metadata.RepetitionTime` or
    /// `metadata.SliceTiming[0]`.
    Metadata(Vec<PathSegment>),
    /// `participants.<column>`.
    Participants(String),
    Filename,
    Filepath,
    RelativePath,
}

impl Field {
    /// Default output column / display name for this field.
    pub fn canonical_name(&self) -> String {
        match self {
            Field::Entity(name) => name.clone(),
            Field::Metadata(path) => {
                let mut s = String::from("metadata");
                for seg in path {
                    match seg {
                        PathSegment::Key(k) => {
                            s.push('.');
                            s.push_str(k);
                        }
                        PathSegment::Index(i) => {
                            s.push_str(&format!("[{}]", i));
                        }
                    }
                }
                s
            }
            Field::Participants(name) => format!("participants.{}", name),
            Field::Filename => "filename".to_string(),
            Field::Filepath => "filepath".to_string(),
            Field::RelativePath => "relative_path".to_string(),
        }
    }
}

/// Binary comparison and logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    /// `~=`, partial regex match.
    Regex,
    /// `IN (...)` or `IN [lo:hi]`, rhs is `Expr::List` or `Expr::Range`.
    In,
    /// SQL-style `LIKE`, rhs is `Expr::Literal(Value::String(pattern))`.
    Like,
}

/// Aggregate function names (spec.md §4.3(d)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Avg,
    Max,
    Min,
    Sum,
    ArrayAgg,
}

impl AggFunc {
    pub fn default_column_name(self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Avg => "avg",
            AggFunc::Max => "max",
            AggFunc::Min => "min",
            AggFunc::Sum => "sum",
            AggFunc::ArrayAgg => "array_agg",
        }
    }
}

/// The argument to an aggregate call.
#[derive(Debug, Clone, PartialEq)]
pub enum FuncArg {
    /// `COUNT(*)`.
    Star,
    Field(Field),
    /// `COUNT(DISTINCT field)`.
    DistinctField(Field),
}

/// An expression: a boolean predicate (WHERE/HAVING) or a projected value
/// (SELECT). BIQL does not distinguish these grammatically (spec.md §4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    FieldRef(Field),
    Literal(Value),
    List(Vec<Value>),
    /// `[lo:hi]`, inclusive on both ends (spec.md §4.3(b)).
    Range(f64, f64),
    /// A glob pattern such as `*bold*` used as the rhs of `=`/`!=`.
    WildcardPattern(String),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    FuncCall {
        func: AggFunc,
        arg: FuncArg,
        /// `ARRAY_AGG(field WHERE inner)` (spec.md §4.3(d)).
        inner_where: Option<Box<Expr>>,
    },
}

impl Expr {
    /// Text used for an unaliased function-call select item's display form
    /// in error messages; not used as the default output column name.
    pub fn display_text(&self) -> String {
        match self {
            Expr::FieldRef(field) => field.canonical_name(),
            Expr::FuncCall { func, arg, .. } => {
                let arg_text = match arg {
                    FuncArg::Star => "*".to_string(),
                    FuncArg::Field(f) => f.canonical_name(),
                    FuncArg::DistinctField(f) => format!("DISTINCT {}", f.canonical_name()),
                };
                format!("{}({})", func.default_column_name().to_uppercase(), arg_text)
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_canonical_name_renders_dots_and_subscripts() {
        let field = Field::Metadata(vec![
            PathSegment::Key("SliceTiming".to_string()),
            PathSegment::Index(0),
        ]);
        assert_eq!(field.canonical_name(), "metadata.SliceTiming[0]");
    }

    #[test]
    fn select_item_output_name_prefers_alias() {
        let item = SelectItem {
            expr: Expr::FieldRef(Field::Entity("sub".to_string())),
            alias: Some("subject".to_string()),
        };
        assert_eq!(item.output_name(), "subject");
    }

    #[test]
    fn unaliased_aggregate_uses_short_default_name() {
        let item = SelectItem {
            expr: Expr::FuncCall {
                func: AggFunc::Count,
                arg: FuncArg::Star,
                inner_where: None,
            },
            alias: None,
        };
        assert_eq!(item.output_name(), "count");
    }

    #[test]
    fn func_call_display_text_is_upper_name_and_arg() {
        let expr = Expr::FuncCall {
            func: AggFunc::Sum,
            arg: FuncArg::Field(Field::Entity("run".to_string())),
            inner_where: None,
        };
        assert_eq!(expr.display_text(), "SUM(run)");
    }
}

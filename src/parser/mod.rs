//! BIQL parser.
//!
//! A recursive-descent parser over the flat token stream produced by
//! [`crate::lexer::tokenize`] (spec.md §4.2). Precedence, loosest to
//! tightest: `OR` < `AND` < `NOT` < comparison < parenthesized group.

use crate::ast::*;
use crate::error::{Error, ParseErrorKind, Result, Span};
use crate::lexer::{tokenize, Keyword, Token, TokenKind};
use crate::value::Value;
use std::collections::HashSet;

/// Parse a complete BIQL query.
pub fn parse(input: &str) -> Result<Query> {
    Parser::new(input)?.parse_query()
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    pub fn parse_query(&mut self) -> Result<Query> {
        let select = if self.check_keyword(Keyword::Select) {
            Some(self.parse_select()?)
        } else {
            None
        };

        let where_clause = if self.check_keyword(Keyword::Where) {
            self.advance();
            Some(self.parse_or_expr()?)
        } else if select.is_none() && !self.at_clause_boundary() {
            Some(self.parse_or_expr()?)
        } else {
            None
        };

        let group_by = if self.check_keyword(Keyword::Group) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            Some(self.parse_comma_separated(|p| p.parse_field(false))?)
        } else {
            None
        };

        let having = if self.check_keyword(Keyword::Having) {
            self.advance();
            Some(self.parse_or_expr()?)
        } else {
            None
        };

        let order_by = if self.check_keyword(Keyword::Order) {
            self.advance();
            self.expect_keyword(Keyword::By)?;
            Some(self.parse_comma_separated(|p| p.parse_order_by_item())?)
        } else {
            None
        };

        let format = if self.check_keyword(Keyword::Format) {
            self.advance();
            Some(self.parse_format_value()?)
        } else {
            None
        };

        self.expect_eof()?;

        Ok(Query {
            select,
            where_clause,
            group_by,
            having,
            order_by,
            format,
        })
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_keyword(Keyword::Select)?;
        let distinct = self.match_keyword(Keyword::Distinct);
        let items = self.parse_comma_separated(|p| p.parse_select_item())?;
        check_duplicate_output_names(&items)?;
        Ok(Select { distinct, items })
    }

    fn parse_select_item(&mut self) -> Result<SelectItem> {
        let expr = if let Some(func) = self.try_agg_keyword() {
            self.parse_func_call(func)?
        } else {
            Expr::FieldRef(self.parse_field(false)?)
        };

        let alias = if self.match_keyword(Keyword::As) {
            Some(self.parse_alias_name()?)
        } else {
            None
        };

        Ok(SelectItem { expr, alias })
    }

    fn parse_func_call(&mut self, func: AggFunc) -> Result<Expr> {
        self.expect_token(TokenKind::LParen)?;
        let arg = if self.check(&TokenKind::Star) {
            self.advance();
            FuncArg::Star
        } else if self.match_keyword(Keyword::Distinct) {
            FuncArg::DistinctField(self.parse_field(false)?)
        } else {
            FuncArg::Field(self.parse_field(false)?)
        };

        // `WHERE or_expr` is only legal for ARRAY_AGG, and sits inside the
        // parens (spec.md §4.2), e.g. `ARRAY_AGG(filename WHERE part=mag)`.
        let inner_where = if self.check_keyword(Keyword::Where) {
            self.advance();
            Some(Box::new(self.parse_or_expr()?))
        } else {
            None
        };

        self.expect_token(TokenKind::RParen)?;

        Ok(Expr::FuncCall {
            func,
            arg,
            inner_where,
        })
    }

    fn try_agg_keyword(&mut self) -> Option<AggFunc> {
        let kw = match &self.peek().kind {
            TokenKind::Keyword(kw) if kw.is_aggregate() => *kw,
            _ => return None,
        };
        // Only consume if this really is a call, i.e. followed by '('.
        if !matches!(self.peek_at(1).kind, TokenKind::LParen) {
            return None;
        }
        self.advance();
        Some(match kw {
            Keyword::Count => AggFunc::Count,
            Keyword::Avg => AggFunc::Avg,
            Keyword::Max => AggFunc::Max,
            Keyword::Min => AggFunc::Min,
            Keyword::Sum => AggFunc::Sum,
            Keyword::ArrayAgg => AggFunc::ArrayAgg,
            _ => unreachable!("is_aggregate() guards this"),
        })
    }

    // ------------------------------------------------------------------
    // Boolean expressions
    // ------------------------------------------------------------------

    fn parse_or_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_and_expr()?;
        while self.match_keyword(Keyword::Or) {
            let right = self.parse_and_expr()?;
            left = Expr::Binary(BinOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr> {
        let mut left = self.parse_not_expr()?;
        while self.match_keyword(Keyword::And) {
            let right = self.parse_not_expr()?;
            left = Expr::Binary(BinOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr> {
        if self.match_keyword(Keyword::Not) {
            Ok(Expr::Not(Box::new(self.parse_not_expr()?)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        if self.check(&TokenKind::LParen) {
            self.advance();
            let expr = self.parse_or_expr()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(expr);
        }

        let field_expr = if let Some(func) = self.try_agg_keyword() {
            self.parse_func_call(func)?
        } else {
            Expr::FieldRef(self.parse_field(true)?)
        };

        let op = match &self.peek().kind {
            TokenKind::Eq => Some(BinOp::Eq),
            TokenKind::Neq => Some(BinOp::Neq),
            TokenKind::Lt => Some(BinOp::Lt),
            TokenKind::Lte => Some(BinOp::Lte),
            TokenKind::Gt => Some(BinOp::Gt),
            TokenKind::Gte => Some(BinOp::Gte),
            TokenKind::Regex => Some(BinOp::Regex),
            TokenKind::Keyword(Keyword::In) => Some(BinOp::In),
            TokenKind::Keyword(Keyword::Like) => Some(BinOp::Like),
            _ => None,
        };

        let op = match op {
            Some(op) => op,
            // Bare field: existence check.
            None => return Ok(field_expr),
        };
        self.advance();

        let rhs = match op {
            BinOp::In => self.parse_in_rhs()?,
            BinOp::Like => {
                let pattern = self.expect_string_like()?;
                Expr::Literal(Value::String(pattern))
            }
            BinOp::Regex => {
                let pattern = self.expect_string_like()?;
                Expr::Literal(Value::String(pattern))
            }
            _ => self.parse_scalar_rhs()?,
        };

        Ok(Expr::Binary(op, Box::new(field_expr), Box::new(rhs)))
    }

    fn parse_in_rhs(&mut self) -> Result<Expr> {
        if self.check(&TokenKind::LBracket) {
            self.parse_range()
        } else {
            self.expect_token(TokenKind::LParen)?;
            let values = self.parse_comma_separated(|p| p.parse_literal_value())?;
            self.expect_token(TokenKind::RParen)?;
            Ok(Expr::List(values))
        }
    }

    fn parse_range(&mut self) -> Result<Expr> {
        self.expect_token(TokenKind::LBracket)?;
        let lo = self.expect_number()?;
        self.expect_token(TokenKind::Colon)?;
        let hi = self.expect_number()?;
        self.expect_token(TokenKind::RBracket)?;
        Ok(Expr::Range(lo, hi))
    }

    fn parse_literal_value(&mut self) -> Result<Value> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Value::Number(n)),
            TokenKind::String(s) => Ok(Value::String(s)),
            TokenKind::Identifier(s) => Ok(Value::String(s)),
            other => Err(Error::unexpected_token(
                "a literal value",
                other.to_string(),
                token.span,
            )),
        }
    }

    /// Parses the rhs of `=`/`!=`/`<`/`<=`/`>`/`>=`: a number, string, or
    /// bare identifier, the latter two becoming a wildcard pattern when they
    /// contain `*` or `?` (spec.md §4.3(b)).
    fn parse_scalar_rhs(&mut self) -> Result<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::String(s) | TokenKind::Identifier(s) => {
                if s.contains('*') || s.contains('?') {
                    Ok(Expr::WildcardPattern(s))
                } else {
                    Ok(Expr::Literal(Value::String(s)))
                }
            }
            other => Err(Error::unexpected_token(
                "a value",
                other.to_string(),
                token.span,
            )),
        }
    }

    fn expect_string_like(&mut self) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::String(s) | TokenKind::Identifier(s) => Ok(s),
            other => Err(Error::unexpected_token(
                "a string",
                other.to_string(),
                token.span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Fields
    // ------------------------------------------------------------------

    /// Parses a dotted field path. `allow_subscript` permits `[n]` index
    /// segments on a `metadata.` path, which is only legal inside WHERE
    /// (spec.md §4.3(a)).
    fn parse_field(&mut self, allow_subscript: bool) -> Result<Field> {
        let token = self.advance();
        let name = match token.kind {
            TokenKind::Identifier(s) => s,
            // An aggregate keyword not followed by '(' is a bare reference to
            // its own default output column, e.g. `HAVING count>1` after
            // `SELECT COUNT(*)`.
            TokenKind::Keyword(kw) if kw.is_aggregate() => kw.default_column_name().to_string(),
            _ => return Err(Error::parse(ParseErrorKind::ExpectedField, token.span)),
        };

        match name.as_str() {
            "metadata" => {
                self.expect_token(TokenKind::Dot)?;
                Ok(Field::Metadata(self.parse_path_segments(allow_subscript)?))
            }
            "participants" => {
                self.expect_token(TokenKind::Dot)?;
                let col = self.parse_path_key()?;
                Ok(Field::Participants(col))
            }
            "filename" => Ok(Field::Filename),
            "filepath" => Ok(Field::Filepath),
            "relative_path" => Ok(Field::RelativePath),
            _ => Ok(Field::Entity(name)),
        }
    }

    fn parse_path_segments(&mut self, allow_subscript: bool) -> Result<Vec<PathSegment>> {
        let mut segments = Vec::new();
        loop {
            segments.push(PathSegment::Key(self.parse_path_key()?));
            while allow_subscript && self.check(&TokenKind::LBracket) {
                self.advance();
                let idx = self.expect_number()? as usize;
                self.expect_token(TokenKind::RBracket)?;
                segments.push(PathSegment::Index(idx));
            }
            if self.check(&TokenKind::Dot) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(segments)
    }

    /// A path key following a `.`: an ordinary identifier, or a reserved
    /// keyword used as a JSON object key (e.g. `metadata.order`).
    fn parse_path_key(&mut self) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Identifier(s) => Ok(s),
            TokenKind::Keyword(_) => Ok(token.lexeme),
            other => Err(Error::unexpected_token(
                "a field name",
                other.to_string(),
                token.span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // ORDER BY / FORMAT
    // ------------------------------------------------------------------

    fn parse_order_by_item(&mut self) -> Result<OrderByItem> {
        let field = self.parse_field(false)?;
        let dir = if self.match_keyword(Keyword::Desc) {
            Dir::Desc
        } else {
            self.match_keyword(Keyword::Asc);
            Dir::Asc
        };
        Ok(OrderByItem { field, dir })
    }

    fn parse_format_value(&mut self) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Identifier(s) | TokenKind::String(s) => Ok(s),
            other => Err(Error::unexpected_token(
                "a format name",
                other.to_string(),
                token.span,
            )),
        }
    }

    fn parse_alias_name(&mut self) -> Result<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Identifier(s) => Ok(s),
            other => Err(Error::unexpected_token(
                "an alias",
                other.to_string(),
                token.span,
            )),
        }
    }

    // ------------------------------------------------------------------
    // Low-level token cursor
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    fn check_keyword(&self, kw: Keyword) -> bool {
        self.peek().is_keyword(kw)
    }

    fn match_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<Token> {
        if self.check_keyword(kw) {
            Ok(self.advance())
        } else {
            let found = self.peek().kind.to_string();
            Err(Error::unexpected_token(
                format!("keyword {:?}", kw),
                found,
                self.peek().span,
            ))
        }
    }

    fn expect_token(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(&kind) {
            Ok(self.advance())
        } else {
            let found = self.peek().kind.to_string();
            Err(Error::unexpected_token(
                kind.to_string(),
                found,
                self.peek().span,
            ))
        }
    }

    fn expect_number(&mut self) -> Result<f64> {
        let token = self.advance();
        match token.kind {
            TokenKind::Number(n) => Ok(n),
            other => Err(Error::unexpected_token(
                "a number",
                other.to_string(),
                token.span,
            )),
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        if self.peek().is_eof() {
            Ok(())
        } else {
            let found = self.peek().kind.to_string();
            Err(Error::unexpected_token("end of query", found, self.peek().span))
        }
    }

    fn parse_comma_separated<T, F>(&mut self, mut parse_fn: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Self) -> Result<T>,
    {
        let mut items = vec![parse_fn(self)?];
        while self.check(&TokenKind::Comma) {
            self.advance();
            items.push(parse_fn(self)?);
        }
        Ok(items)
    }

    fn at_clause_boundary(&self) -> bool {
        self.peek().is_eof()
            || self.check_keyword(Keyword::Group)
            || self.check_keyword(Keyword::Having)
            || self.check_keyword(Keyword::Order)
            || self.check_keyword(Keyword::Format)
    }
}

/// Open question resolution (spec.md §9): `SELECT COUNT(*), COUNT(*)` is a
/// parse error unless the second occurrence carries an explicit alias,
/// because both would otherwise collide on the default output column.
fn check_duplicate_output_names(items: &[SelectItem]) -> Result<()> {
    let mut seen = HashSet::new();
    for item in items {
        if item.alias.is_none() && matches!(item.expr, Expr::FuncCall { .. }) {
            let name = item.output_name();
            if !seen.insert(name.clone()) {
                return Err(Error::parse(
                    ParseErrorKind::DuplicateAggregateColumn(name),
                    Span::default(),
                ));
            }
        } else {
            seen.insert(item.output_name());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_comparison_is_implicit_where() {
        let q = parse("sub=01 AND task=rest").unwrap();
        assert!(q.select.is_none());
        assert!(matches!(q.where_clause, Some(Expr::Binary(BinOp::And, _, _))));
    }

    #[test]
    fn select_distinct_with_alias() {
        let q = parse("SELECT DISTINCT sub AS subject WHERE datatype=anat").unwrap();
        let select = q.select.unwrap();
        assert!(select.distinct);
        assert_eq!(select.items[0].alias.as_deref(), Some("subject"));
    }

    #[test]
    fn wildcard_rhs_on_equality() {
        let q = parse("suffix=*bold*").unwrap();
        match q.where_clause.unwrap() {
            Expr::Binary(BinOp::Eq, _, rhs) => {
                assert_eq!(*rhs, Expr::WildcardPattern("*bold*".to_string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn in_range_and_in_list() {
        let q = parse("run IN [1:3]").unwrap();
        assert!(matches!(
            q.where_clause,
            Some(Expr::Binary(BinOp::In, _, _))
        ));

        let q = parse("task IN (rest, nback)").unwrap();
        match q.where_clause.unwrap() {
            Expr::Binary(BinOp::In, _, rhs) => match *rhs {
                Expr::List(values) => assert_eq!(values.len(), 2),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn not_binds_tighter_than_and_or() {
        let q = parse("NOT sub=01 AND task=rest").unwrap();
        match q.where_clause.unwrap() {
            Expr::Binary(BinOp::And, left, _) => {
                assert!(matches!(*left, Expr::Not(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn metadata_subscript_allowed_in_where_only() {
        let q = parse("metadata.SliceTiming[0]>0.1").unwrap();
        match q.where_clause.unwrap() {
            Expr::Binary(BinOp::Gt, field, _) => match *field {
                Expr::FieldRef(Field::Metadata(segs)) => assert_eq!(segs.len(), 2),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn reserved_word_usable_as_metadata_key() {
        let q = parse("metadata.order=1").unwrap();
        assert!(q.where_clause.is_some());
    }

    #[test]
    fn group_by_having_order_by_and_format() {
        let q = parse(
            "SELECT sub, COUNT(*) GROUP BY sub HAVING count>1 ORDER BY sub DESC FORMAT json",
        )
        .unwrap();
        assert_eq!(q.group_by.unwrap().len(), 1);
        assert!(q.having.is_some());
        assert_eq!(q.order_by.unwrap()[0].dir, Dir::Desc);
        assert_eq!(q.format.as_deref(), Some("json"));
    }

    #[test]
    fn array_agg_with_inner_where() {
        let q = parse("SELECT ARRAY_AGG(filename WHERE part=mag) GROUP BY sub").unwrap();
        let item = &q.select.unwrap().items[0];
        assert!(matches!(
            item.expr,
            Expr::FuncCall {
                func: AggFunc::ArrayAgg,
                inner_where: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_unaliased_aggregate_is_a_parse_error() {
        let err = parse("SELECT COUNT(*), COUNT(*)").unwrap_err();
        assert!(matches!(
            err,
            Error::Parse {
                kind: ParseErrorKind::DuplicateAggregateColumn(_),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_aggregate_disambiguated_by_alias_is_fine() {
        assert!(parse("SELECT COUNT(*), COUNT(*) AS total").is_ok());
    }
}

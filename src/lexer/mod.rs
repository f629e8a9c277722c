//! BIQL lexer/tokenizer.
//!
//! Converts query text into a flat `Vec<Token>` ending in a single `Eof`
//! token (spec.md §4.1). The lexer performs no lookahead across tokens and
//! never backtracks; the parser is solely responsible for turning the
//! dotted-path shape (`IDENTIFIER DOT IDENTIFIER`) back into a `Field`.

mod token;

pub use token::{Keyword, Token, TokenKind};

use crate::error::{Error, LexErrorKind, Result, Span};

/// Tokenize `input` into a token stream terminated by `TokenKind::Eof`.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            if self.is_at_end() {
                tokens.push(Token::new(TokenKind::Eof, "", self.span()));
                break;
            }
            tokens.push(self.next_token()?);
        }
        Ok(tokens)
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        let start_span = self.span();
        let c = self.advance();

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '*' => TokenKind::Star,
            '=' => TokenKind::Eq,
            '!' if self.matches('=') => TokenKind::Neq,
            '<' if self.matches('=') => TokenKind::Lte,
            '<' => TokenKind::Lt,
            '>' if self.matches('=') => TokenKind::Gte,
            '>' => TokenKind::Gt,
            '~' if self.matches('=') => TokenKind::Regex,
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => {
                return self.number(start_span, c);
            }
            '.' => TokenKind::Dot,
            '\'' | '"' => return self.string(start_span, c),
            '0'..='9' => return self.number(start_span, c),
            c if is_identifier_start(c) => return self.identifier_or_keyword(start_span, c),
            other => {
                return Err(Error::lex(
                    LexErrorKind::UnexpectedCharacter(other),
                    start_span,
                ))
            }
        };

        Ok(Token::new(kind, c.to_string(), start_span))
    }

    fn identifier_or_keyword(&mut self, start_span: Span, first: char) -> Result<Token> {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if is_identifier_continue(c) {
                text.push(self.advance());
            } else {
                break;
            }
        }

        // Wildcard identifiers (containing '*' or '?') are surfaced as plain
        // identifiers; the parser decides whether they are a glob pattern
        // based on position (spec.md §4.1).
        if let Some(keyword) = Keyword::parse(&text) {
            Ok(Token::new(TokenKind::Keyword(keyword), text, start_span))
        } else {
            Ok(Token::new(TokenKind::Identifier(text.clone()), text, start_span))
        }
    }

    fn number(&mut self, start_span: Span, first: char) -> Result<Token> {
        let mut text = String::new();
        text.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(self.advance());
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.advance()); // '.'
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(self.advance());
                } else {
                    break;
                }
            }
        }
        let value: f64 = text.parse().unwrap_or(f64::NAN);
        Ok(Token::new(TokenKind::Number(value), text, start_span))
    }

    fn string(&mut self, start_span: Span, quote: char) -> Result<Token> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(Error::lex(LexErrorKind::UnterminatedString, start_span));
            }
            let c = self.advance();
            if c == quote {
                break;
            }
            value.push(c);
        }
        Ok(Token::new(TokenKind::String(value.clone()), value, start_span))
    }
}

/// Identifiers begin with a letter or underscore, and may also contain
/// digits, `-`, `*`, `?` once started (wildcard identifiers and
/// hyphenated entity values like `n-back`).
fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '*' || c == '?'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn basic_tokenization() {
        let k = kinds("sub=01 AND task=rest");
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier("sub".into()),
                TokenKind::Eq,
                TokenKind::Number(1.0),
                TokenKind::Keyword(Keyword::And),
                TokenKind::Identifier("task".into()),
                TokenKind::Eq,
                TokenKind::Identifier("rest".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_literals_strip_quotes() {
        let tokens = tokenize(r#"task="n-back" OR suffix='T1w'"#).unwrap();
        let strings: Vec<_> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["n-back".to_string(), "T1w".to_string()]);
    }

    #[test]
    fn two_char_operators_win_over_prefixes() {
        let k = kinds("metadata.RepetitionTime>=2.0 AND run<=3");
        assert!(k.contains(&TokenKind::Gte));
        assert!(k.contains(&TokenKind::Lte));
        assert!(!k.contains(&TokenKind::Gt));
        assert!(!k.contains(&TokenKind::Lt));
    }

    #[test]
    fn dotted_path_is_identifier_dot_identifier() {
        let k = kinds("metadata.RepetitionTime");
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier("metadata".into()),
                TokenKind::Dot,
                TokenKind::Identifier("RepetitionTime".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn wildcard_identifier_stays_identifier() {
        let k = kinds("suffix=*bold*");
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier("suffix".into()),
                TokenKind::Eq,
                TokenKind::Identifier("*bold*".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn regex_operator() {
        assert_eq!(
            kinds(r#"sub~="0[1-3]""#),
            vec![
                TokenKind::Identifier("sub".into()),
                TokenKind::Regex,
                TokenKind::String("0[1-3]".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn range_literal_tokens() {
        let k = kinds("run=[1:3]");
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier("run".into()),
                TokenKind::Eq,
                TokenKind::LBracket,
                TokenKind::Number(1.0),
                TokenKind::Colon,
                TokenKind::Number(3.0),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn unknown_character_is_a_lex_error() {
        let err = tokenize("sub @ 01").unwrap_err();
        assert!(matches!(err, Error::Lex { .. }));
    }

    #[test]
    fn unterminated_string_is_a_lex_error() {
        let err = tokenize("task=\"unterminated").unwrap_err();
        assert!(matches!(
            err,
            Error::Lex {
                kind: LexErrorKind::UnterminatedString,
                ..
            }
        ));
    }
}

//! Textual filter expressions.
//!
//! ```text
//! expr      := or
//! or        := and ("or" and)*
//! and       := unary ("and" unary)*
//! unary     := "not" unary | "(" expr ")" | predicate
//! predicate := path op literal
//!            | path ["not"] "in" "(" literal ("," literal)* ")"
//!            | path "is" ["not"] "null"
//!            | path ["not"] ("like" | "ilike") string
//! op        := eq | ne | gt | ge | lt | le | = | != | <> | > | >= | < | <=
//! literal   := number | 'string' | "string" | true | false | null
//! ```
//!
//! Parsing yields a [`FilterExpr`] over raw paths; [`FilterExpr::resolve`]
//! turns it into a [`Filter`] using a caller-supplied path resolver.

use super::filter::{CompareOp, Filter};
use crate::schema::Field;
use serde_json::{Number, Value as JsonValue};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("{message} at position {position}")]
    Parse {
        message: String,
        position: usize,
        annotated_input: String,
    },

    #[error("{0}")]
    Expression(String),

    #[error("{0}")]
    Value(String),

    /// Failure unrelated to the input, such as an unavailable schema
    #[error("{0}")]
    Internal(String),
}

impl FilterError {
    fn parse(input: &str, position: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            position,
            annotated_input: annotate(input, position),
        }
    }

    /// Whether the input itself is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    pub fn annotated_input(&self) -> Option<&str> {
        match self {
            Self::Parse {
                annotated_input, ..
            } => Some(annotated_input),
            _ => None,
        }
    }
}

/// Copies the input and puts a caret under `position`.
fn annotate(input: &str, position: usize) -> String {
    let end = position.min(input.len());
    let column = input
        .get(..end)
        .map(|prefix| prefix.chars().count())
        .unwrap_or(0);
    format!("{input}\n{}^", " ".repeat(column))
}

/// Unresolved filter expression over textual paths.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Compare {
        path: String,
        op: CompareOp,
        value: JsonValue,
    },
    In {
        path: String,
        values: Vec<JsonValue>,
    },
    Like {
        path: String,
        pattern: String,
        case_sensitive: bool,
    },
    IsNull {
        path: String,
        negated: bool,
    },
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Not(Box<FilterExpr>),
}

impl FilterExpr {
    /// Every path mentioned, in order of appearance.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Compare { path, .. }
            | Self::In { path, .. }
            | Self::Like { path, .. }
            | Self::IsNull { path, .. } => out.push(path),
            Self::And(items) | Self::Or(items) => {
                for item in items {
                    item.collect_paths(out);
                }
            }
            Self::Not(inner) => inner.collect_paths(out),
        }
    }

    pub fn resolve<F>(&self, resolve_field: &mut F) -> Result<Filter, FilterError>
    where
        F: FnMut(&str) -> Result<Field, FilterError>,
    {
        match self {
            Self::Compare { path, op, value } => {
                let field = scalar_field(path, resolve_field)?;
                if value.is_null() {
                    return Err(FilterError::Value(format!(
                        "Cannot compare {path} with null using {}, use 'is null' instead",
                        op.symbol()
                    )));
                }
                Ok(Filter::compare(&field, *op, value.clone()))
            }
            Self::In { path, values } => {
                let field = scalar_field(path, resolve_field)?;
                if values.iter().any(JsonValue::is_null) {
                    return Err(FilterError::Value(format!(
                        "Value list for {path} cannot contain null"
                    )));
                }
                Ok(Filter::in_list(&field, values.clone()))
            }
            Self::Like {
                path,
                pattern,
                case_sensitive,
            } => {
                let field = scalar_field(path, resolve_field)?;
                Ok(Filter::Like {
                    field,
                    pattern: pattern.clone(),
                    case_sensitive: *case_sensitive,
                })
            }
            Self::IsNull { path, negated } => {
                let field = scalar_field(path, resolve_field)?;
                Ok(Filter::IsNull {
                    field,
                    negated: *negated,
                })
            }
            Self::And(items) => Ok(Filter::And(
                items
                    .iter()
                    .map(|item| item.resolve(resolve_field))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Or(items) => Ok(Filter::Or(
                items
                    .iter()
                    .map(|item| item.resolve(resolve_field))
                    .collect::<Result<_, _>>()?,
            )),
            Self::Not(inner) => Ok(inner.resolve(resolve_field)?.not()),
        }
    }
}

fn scalar_field<F>(path: &str, resolve_field: &mut F) -> Result<Field, FilterError>
where
    F: FnMut(&str) -> Result<Field, FilterError>,
{
    let field = resolve_field(path)?;
    if !field.is_sortable() {
        return Err(FilterError::Expression(format!(
            "Field {path} cannot be used in a comparison"
        )));
    }
    Ok(field)
}

/// Parses and resolves in one step.
pub fn parse_filter<F>(input: &str, mut resolve_field: F) -> Result<Filter, FilterError>
where
    F: FnMut(&str) -> Result<Field, FilterError>,
{
    parse_filter_expr(input)?.resolve(&mut resolve_field)
}

pub fn parse_filter_expr(input: &str) -> Result<FilterExpr, FilterError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FilterError::parse(input, 0, "Empty filter expression"));
    }

    let mut parser = Parser {
        input,
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    if let Some((token, position)) = parser.tokens.get(parser.index) {
        return Err(FilterError::parse(
            input,
            *position,
            format!("Unexpected {}", token.describe()),
        ));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Number(Number),
    Str(String),
    LParen,
    RParen,
    Comma,
    Op(CompareOp),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Word(word) => format!("'{word}'"),
            Self::Number(number) => format!("number {number}"),
            Self::Str(text) => format!("string '{text}'"),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
            Self::Comma => "','".to_string(),
            Self::Op(op) => format!("'{}'", op.symbol()),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Word(word) if word.eq_ignore_ascii_case(keyword))
    }
}

/// Deepest chain of `not` and parenthesised groups a filter may nest.
pub const MAX_NESTING_DEPTH: usize = 64;

const RESERVED: &[&str] = &[
    "and", "or", "not", "in", "is", "null", "like", "ilike", "true", "false",
];

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, FilterError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let peek = |i: usize| chars.get(i).map(|(_, c)| *c);
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, position));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, position));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, position));
                i += 1;
            }
            '=' => {
                tokens.push((Token::Op(CompareOp::Eq), position));
                i += if peek(i + 1) == Some('=') { 2 } else { 1 };
            }
            '!' => {
                if peek(i + 1) != Some('=') {
                    return Err(FilterError::parse(input, position, "Unexpected character '!'"));
                }
                tokens.push((Token::Op(CompareOp::Ne), position));
                i += 2;
            }
            '<' => match peek(i + 1) {
                Some('=') => {
                    tokens.push((Token::Op(CompareOp::Le), position));
                    i += 2;
                }
                Some('>') => {
                    tokens.push((Token::Op(CompareOp::Ne), position));
                    i += 2;
                }
                _ => {
                    tokens.push((Token::Op(CompareOp::Lt), position));
                    i += 1;
                }
            },
            '>' => {
                if peek(i + 1) == Some('=') {
                    tokens.push((Token::Op(CompareOp::Ge), position));
                    i += 2;
                } else {
                    tokens.push((Token::Op(CompareOp::Gt), position));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match peek(i) {
                        None => {
                            return Err(FilterError::parse(
                                input,
                                position,
                                "Unterminated string literal",
                            ));
                        }
                        Some('\\') => {
                            if let Some(escaped) = peek(i + 1) {
                                text.push(escaped);
                            }
                            i += 2;
                        }
                        Some(ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push((Token::Str(text), position));
            }
            c if c.is_ascii_digit()
                || (c == '-' && peek(i + 1).is_some_and(|next| next.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while let Some(ch) = peek(i) {
                    let exponent_sign =
                        (ch == '-' || ch == '+') && matches!(peek(i - 1), Some('e' | 'E'));
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
                let number = parse_number(&text).ok_or_else(|| {
                    FilterError::parse(input, position, format!("Invalid number '{text}'"))
                })?;
                tokens.push((Token::Number(number), position));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while let Some(ch) = peek(i) {
                    if ch.is_alphanumeric() || ch == '_' || ch == '$' || ch == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let word: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
                tokens.push((Token::Word(word), position));
            }
            other => {
                return Err(FilterError::parse(
                    input,
                    position,
                    format!("Unexpected character '{other}'"),
                ));
            }
        }
    }

    Ok(tokens)
}

/// Integers must fit `i64` or `u64` exactly; only literals with a fraction or
/// exponent become floats.
fn parse_number(text: &str) -> Option<Number> {
    if text.contains(['.', 'e', 'E']) {
        return text.parse::<f64>().ok().and_then(Number::from_f64);
    }
    match text.parse::<i64>() {
        Ok(integer) => Some(Number::from(integer)),
        Err(_) => text.parse::<u64>().ok().map(Number::from),
    }
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<(Token, usize)>,
    index: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(token, _)| token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map(|(_, position)| *position)
            .unwrap_or(self.input.len())
    }

    fn error(&self, message: impl Into<String>) -> FilterError {
        let message = match self.peek() {
            Some(_) => message.into(),
            None => format!("{}, found end of input", message.into()),
        };
        FilterError::parse(self.input, self.position(), message)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(token, _)| token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|token| token.is_keyword(keyword)) {
            self.index += 1;
            return true;
        }
        false
    }

    fn expect(&mut self, expected: Token, label: &str) -> Result<(), FilterError> {
        if self.peek() == Some(&expected) {
            self.index += 1;
            return Ok(());
        }
        Err(self.error(format!("Expected {label}")))
    }

    fn parse_or(&mut self) -> Result<FilterExpr, FilterError> {
        let mut items = vec![self.parse_and()?];
        while self.eat_keyword("or") {
            items.push(self.parse_and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            FilterExpr::Or(items)
        })
    }

    fn parse_and(&mut self) -> Result<FilterExpr, FilterError> {
        let mut items = vec![self.parse_unary()?];
        while self.eat_keyword("and") {
            items.push(self.parse_unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            FilterExpr::And(items)
        })
    }

    fn parse_unary(&mut self) -> Result<FilterExpr, FilterError> {
        if self.peek().is_some_and(|token| token.is_keyword("not")) {
            self.descend()?;
            self.index += 1;
            let inner = self.parse_unary();
            self.depth -= 1;
            return Ok(FilterExpr::Not(Box::new(inner?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.descend()?;
            self.index += 1;
            let inner = self.parse_or().and_then(|inner| {
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            });
            self.depth -= 1;
            return inner;
        }
        self.parse_predicate()
    }

    fn descend(&mut self) -> Result<(), FilterError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(FilterError::parse(
                self.input,
                self.position(),
                "Filter nesting too deep",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_predicate(&mut self) -> Result<FilterExpr, FilterError> {
        let path = match self.peek() {
            Some(Token::Word(word))
                if !RESERVED.iter().any(|reserved| word.eq_ignore_ascii_case(reserved)) =>
            {
                word.clone()
            }
            _ => return Err(self.error("Expected a field path")),
        };
        self.index += 1;

        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            self.index += 1;
            let value = self.parse_literal()?;
            return Ok(FilterExpr::Compare { path, op, value });
        }

        if let Some(op) = self.peek().and_then(keyword_op) {
            self.index += 1;
            let value = self.parse_literal()?;
            return Ok(FilterExpr::Compare { path, op, value });
        }

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            if !self.eat_keyword("null") {
                return Err(self.error("Expected 'null'"));
            }
            return Ok(FilterExpr::IsNull { path, negated });
        }

        let negated = self.eat_keyword("not");
        let predicate = if self.eat_keyword("in") {
            self.parse_in(path)?
        } else if self.eat_keyword("like") {
            self.parse_like(path, true)?
        } else if self.eat_keyword("ilike") {
            self.parse_like(path, false)?
        } else {
            return Err(self.error(format!("Expected an operator after '{path}'")));
        };

        Ok(if negated {
            FilterExpr::Not(Box::new(predicate))
        } else {
            predicate
        })
    }

    fn parse_in(&mut self, path: String) -> Result<FilterExpr, FilterError> {
        self.expect(Token::LParen, "'('")?;
        let mut values = vec![self.parse_literal()?];
        while self.peek() == Some(&Token::Comma) {
            self.index += 1;
            values.push(self.parse_literal()?);
        }
        self.expect(Token::RParen, "')'")?;
        Ok(FilterExpr::In { path, values })
    }

    fn parse_like(&mut self, path: String, case_sensitive: bool) -> Result<FilterExpr, FilterError> {
        match self.peek() {
            Some(Token::Str(pattern)) => {
                let pattern = pattern.clone();
                self.index += 1;
                Ok(FilterExpr::Like {
                    path,
                    pattern,
                    case_sensitive,
                })
            }
            _ => Err(self.error("Expected a string pattern")),
        }
    }

    fn parse_literal(&mut self) -> Result<JsonValue, FilterError> {
        let value = match self.peek() {
            Some(Token::Number(number)) => JsonValue::Number(number.clone()),
            Some(Token::Str(text)) => JsonValue::String(text.clone()),
            Some(token) if token.is_keyword("true") => JsonValue::Bool(true),
            Some(token) if token.is_keyword("false") => JsonValue::Bool(false),
            Some(token) if token.is_keyword("null") => JsonValue::Null,
            _ => return Err(self.error("Expected a literal value")),
        };
        self.next();
        Ok(value)
    }
}

fn keyword_op(token: &Token) -> Option<CompareOp> {
    let Token::Word(word) = token else {
        return None;
    };
    match word.to_ascii_lowercase().as_str() {
        "eq" => Some(CompareOp::Eq),
        "ne" => Some(CompareOp::Ne),
        "gt" => Some(CompareOp::Gt),
        "ge" => Some(CompareOp::Ge),
        "lt" => Some(CompareOp::Lt),
        "le" => Some(CompareOp::Le),
        _ => None,
    }
}

//! SQL parsing into classified, fingerprinted statement nodes.
//!
//! `sqlparser` tokenizes the input and parses each statement against the
//! engine dialect. Its syntax tree is then converted into the typed
//! [`Statement`] model that rules, schema tracking and rollback work on.

pub mod ast;
mod convert;
mod keywords;

use crate::error::SqlAuditError;
use crate::models::{DRIVER_TYPE_MYSQL, DRIVER_TYPE_SQLITE, StatementKind};
use crate::Result;
use regex::Regex;
use sqlparser::dialect::{Dialect, MySqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};
use std::sync::OnceLock;

pub use ast::Statement;
pub use keywords::is_reserved_keyword;

/// SQL dialect used to tokenize and validate statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    MySql,
    Sqlite,
}

impl SqlDialect {
    /// Dialect for a registered engine type.
    pub fn for_engine(engine_type: &str) -> Option<Self> {
        match engine_type {
            DRIVER_TYPE_MYSQL => Some(Self::MySql),
            DRIVER_TYPE_SQLITE => Some(Self::Sqlite),
            _ => None,
        }
    }

    fn dialect(self) -> Box<dyn Dialect> {
        match self {
            Self::MySql => Box::new(MySqlDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }
}

/// One parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementNode {
    /// Statement text without the trailing delimiter
    pub text: String,
    pub kind: StatementKind,
    /// Normalized text with literals replaced by `?`
    pub fingerprint: String,
    pub stmt: Statement,
}

/// Splits `sql` into statements and parses each one.
///
/// # Errors
/// Returns [`SqlAuditError::Parse`] carrying the offending fragment when the
/// input cannot be tokenized or a statement is not valid for the dialect.
pub fn parse(dialect: SqlDialect, sql: &str) -> Result<Vec<StatementNode>> {
    let engine = dialect.dialect();
    let spanned = Tokenizer::new(engine.as_ref(), sql)
        .tokenize_with_location()
        .map_err(|err| SqlAuditError::parse(fragment_of(sql), err.to_string()))?;
    let lines = SourceLines::new(sql);

    let mut nodes = Vec::new();
    for chunk in spanned.split(|item| matches!(item.token, Token::SemiColon)) {
        let significant: Vec<&TokenWithSpan> = chunk
            .iter()
            .filter(|item| !matches!(item.token, Token::Whitespace(_)))
            .collect();
        let (Some(first), Some(last)) = (significant.first(), significant.last()) else {
            continue;
        };

        let text = lines
            .slice(first.span.start, last.span.end)
            .map_or_else(
                || render_tokens(significant.iter().map(|item| &item.token)),
                str::to_string,
            );

        let parsed = Parser::parse_sql(engine.as_ref(), &text)
            .map_err(|err| SqlAuditError::parse(fragment_of(&text), err.to_string()))?;
        let [parsed] = parsed.as_slice() else {
            return Err(SqlAuditError::parse(
                fragment_of(&text),
                format!("expected one statement, found {}", parsed.len()),
            ));
        };

        let stmt = convert::statement(parsed, &leading_keywords(&significant));
        nodes.push(StatementNode {
            kind: stmt.kind(),
            fingerprint: fingerprint(chunk.iter().map(|item| &item.token)),
            text,
            stmt,
        });
    }
    Ok(nodes)
}

/// Maps tokenizer locations (1-based line, 1-based character column) back
/// to byte offsets in the source text.
struct SourceLines<'a> {
    sql: &'a str,
    starts: Vec<usize>,
}

impl<'a> SourceLines<'a> {
    fn new(sql: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(sql.match_indices('\n').map(|(index, _)| index.saturating_add(1)))
            .collect();
        Self { sql, starts }
    }

    fn offset(&self, location: Location) -> Option<usize> {
        let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
        let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
        let start = *self.starts.get(line)?;
        let rest = self.sql.get(start..)?;
        match rest.char_indices().nth(column) {
            Some((index, _)) => start.checked_add(index),
            None if rest.chars().count() == column => Some(self.sql.len()),
            None => None,
        }
    }

    fn slice(&self, start: Location, end: Location) -> Option<&'a str> {
        let from = self.offset(start)?;
        let to = self.offset(end)?;
        self.sql.get(from..to).map(str::trim).filter(|text| !text.is_empty())
    }
}

/// First two unquoted words, upper-cased, e.g. `CREATE VIEW`.
fn leading_keywords(tokens: &[&TokenWithSpan]) -> String {
    tokens
        .iter()
        .take(2)
        .filter_map(|item| match &item.token {
            Token::Word(word) if word.quote_style.is_none() => {
                Some(word.value.to_ascii_uppercase())
            }
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_tokens<'t>(tokens: impl Iterator<Item = &'t Token>) -> String {
    tokens.map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

/// Parses input that must hold exactly one statement.
///
/// # Errors
/// Returns [`SqlAuditError::NodesCountExceedOne`] when more than one
/// statement results, or a parse error when none does.
pub fn parse_one(dialect: SqlDialect, sql: &str) -> Result<StatementNode> {
    let mut nodes = parse(dialect, sql)?;
    match nodes.len() {
        0 => Err(SqlAuditError::parse(fragment_of(sql), "no statement found")),
        1 => Ok(nodes.remove(0)),
        _ => Err(SqlAuditError::NodesCountExceedOne),
    }
}

fn fragment_of(sql: &str) -> String {
    const MAX_CHARS: usize = 64;
    let trimmed = sql.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        trimmed.to_string()
    } else {
        let head: String = trimmed.chars().take(MAX_CHARS).collect();
        format!("{}...", head)
    }
}

fn in_list_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\bin\s*\(\s*\?(?:\s*,\s*\?)*\s*\)").expect("Invalid IN-list pattern")
    })
}

/// Normalizes one statement's tokens so that statements differing only in
/// literal values share a fingerprint.
fn fingerprint<'t>(tokens: impl Iterator<Item = &'t Token>) -> String {
    let mut out = String::new();
    for token in tokens {
        let piece = match token {
            Token::Whitespace(_) => {
                if !out.is_empty() && !out.ends_with(' ') {
                    out.push(' ');
                }
                continue;
            }
            Token::SemiColon => continue,
            Token::Number(..)
            | Token::SingleQuotedString(_)
            | Token::DoubleQuotedString(_)
            | Token::NationalStringLiteral(_)
            | Token::HexStringLiteral(_) => "?".to_string(),
            Token::Word(word) if word.quote_style.is_none() => word.value.to_ascii_lowercase(),
            other => other.to_string(),
        };
        out.push_str(&piece);
    }
    let collapsed = out.trim().to_string();
    in_list_pattern()
        .replace_all(&collapsed, "in (?+)")
        .into_owned()
}

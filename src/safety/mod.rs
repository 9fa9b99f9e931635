//! Lexical gate in front of the database.
//!
//! Every statement is reduced to a single, comment-free, read-only `SELECT`
//! with a bounded `LIMIT` before it is allowed anywhere near a connection.
//! This is pattern matching, not parsing: it errs on the side of rejecting.

use regex::Regex;
use thiserror::Error;

use crate::config::SafetyConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Query is empty")]
    Empty,
    #[error("Only SELECT queries are allowed")]
    NotSelect,
    #[error("Multiple statements are not allowed")]
    MultipleStatements,
    #[error("Query contains a forbidden construct: {0}")]
    Forbidden(String),
}

/// A statement that passed the gate, ready for dry-run and execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedQuery {
    pub sql: String,
    /// The row bound was imposed or rewritten by the gate
    pub limited: bool,
}

#[derive(Debug)]
pub struct SqlGate {
    default_limit: u64,
    max_limit: u64,
    select_prefix: Regex,
    denylist: Vec<(Regex, &'static str)>,
}

impl SqlGate {
    pub fn new(config: &SafetyConfig) -> Result<Self, regex::Error> {
        let denylist = [
            (
                r"(?i)\b(drop|delete|truncate|alter|create|grant|revoke|insert|update|call|exec|execute)\b",
                "data or schema modification",
            ),
            (r"(?i)\bunion\s+(all\s+)?select\b", "UNION SELECT"),
            (r"(?i)\binto\s+outfile\b", "INTO OUTFILE"),
            (r"(?i)\bload_file\s*\(", "LOAD_FILE"),
            (r"(?i)\bsleep\s*\(", "SLEEP"),
            (r"(?i)\bbenchmark\s*\(", "BENCHMARK"),
            (r"(?i)\binformation_schema\s*\.", "information_schema access"),
            // DuckDB table functions that read from the host filesystem
            (
                r"(?i)\b(read_csv|read_csv_auto|read_parquet|read_json|read_json_auto|read_ndjson|read_text|read_blob|glob)\s*\(",
                "file access",
            ),
            // DuckDB scans a quoted path in table position as a file
            (r#"(?i)\b(from|join)\s+('|"[^"]*[./\\])"#, "file path as table"),
        ]
        .into_iter()
        .map(|(pattern, label)| Regex::new(pattern).map(|re| (re, label)))
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            select_prefix: Regex::new(r"(?i)^select\b")?,
            denylist,
        })
    }

    /// Runs the ordered gate; the first failing stage decides the rejection.
    pub fn check(&self, raw_sql: &str) -> Result<SanitizedQuery, Rejection> {
        let without_comments = strip_comments(raw_sql);
        let sql = without_comments.trim();

        if sql.is_empty() {
            return Err(Rejection::Empty);
        }

        if !self.select_prefix.is_match(sql) {
            return Err(Rejection::NotSelect);
        }

        // Lexical: a ';' inside a literal is rejected too
        let sql = sql.strip_suffix(';').unwrap_or(sql).trim_end();
        if sql.contains(';') {
            return Err(Rejection::MultipleStatements);
        }

        if let Some((_, label)) = self.denylist.iter().find(|(re, _)| re.is_match(sql)) {
            return Err(Rejection::Forbidden(label.to_string()));
        }

        Ok(self.normalize_limit(sql))
    }

    /// Only a LIMIT outside literals and parentheses bounds the statement.
    /// Anything else belongs to a subquery, so the outer bound is appended.
    fn normalize_limit(&self, sql: &str) -> SanitizedQuery {
        let Some(clause) = top_level_limit(sql) else {
            return SanitizedQuery {
                sql: format!("{} LIMIT {}", sql, self.default_limit),
                limited: true,
            };
        };

        let replacement = match clause.value {
            Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => {
                // Oversized literals saturate and get clamped like any other
                let requested = digits.parse::<u64>().unwrap_or(u64::MAX);
                let bounded = requested.clamp(1, self.max_limit);
                if bounded == requested {
                    return SanitizedQuery {
                        sql: sql.to_string(),
                        limited: false,
                    };
                }
                bounded
            }
            // Expressions, parameters and missing values all fall back
            _ => self.default_limit,
        };

        SanitizedQuery {
            sql: format!(
                "{}LIMIT {}{}",
                &sql[..clause.start],
                replacement,
                &sql[clause.end..]
            ),
            limited: true,
        }
    }
}

/// Removes `/* */`, `--` and `#` comments. Markers inside single-quoted
/// literals or double-quoted identifiers are text, not comments.
fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            // A doubled quote closes and immediately reopens
            if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => skip_to_newline(&mut chars),
            '#' => skip_to_newline(&mut chars),
            _ => out.push(c),
        }
    }

    out
}

fn skip_to_newline(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.next_if(|&c| c != '\n').is_some() {}
}

/// Byte span of a LIMIT clause and the raw value that followed it.
#[derive(Debug, PartialEq, Eq)]
struct LimitClause<'a> {
    start: usize,
    end: usize,
    value: Option<&'a str>,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || !b.is_ascii()
}

/// Finds the last `LIMIT` keyword at parenthesis depth zero and outside
/// quotes.
fn top_level_limit(sql: &str) -> Option<LimitClause<'_>> {
    const KEYWORD: &[u8] = b"limit";
    let bytes = sql.as_bytes();
    let mut quote: Option<u8> = None;
    let mut depth = 0usize;
    let mut found = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0
                && bytes.len() - i >= KEYWORD.len()
                && bytes[i..i + KEYWORD.len()].eq_ignore_ascii_case(KEYWORD)
                && (i == 0 || !is_word_byte(bytes[i - 1]))
                && bytes.get(i + KEYWORD.len()).is_none_or(|&n| !is_word_byte(n)) =>
            {
                found = Some(i);
                i += KEYWORD.len();
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    let start = found?;
    let after = start + KEYWORD.len();
    let rest = &sql[after..];
    let value_start = after + (rest.len() - rest.trim_start().len());
    let tail = &sql[value_start..];

    let value_len = if tail.starts_with('(') {
        // A parenthesized expression is one value, replaced as a whole
        let mut depth = 0usize;
        tail.bytes()
            .position(|b| {
                match b {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                depth == 0
            })
            .map_or(tail.len(), |close| close + 1)
    } else {
        tail.find(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')'))
            .unwrap_or(tail.len())
    };

    Some(if value_len == 0 {
        LimitClause {
            start,
            end: after,
            value: None,
        }
    } else {
        LimitClause {
            start,
            end: value_start + value_len,
            value: Some(&tail[..value_len]),
        }
    })
}

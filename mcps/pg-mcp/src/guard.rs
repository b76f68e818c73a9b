//! Read-only statement guard
//!
//! A coarse first line of defence for `call_tool` when the server runs in
//! read-only mode. It only looks at the leading keyword; the Postgres
//! gateway additionally runs such statements in a `READ ONLY` transaction
//! that is rolled back.

/// Leading keywords accepted in read-only mode
const READ_KEYWORDS: &[&str] = &[
    "SELECT", "SHOW", "DESCRIBE", "EXPLAIN", "WITH", "VALUES", "TABLE",
];

/// Guard that accepts only statements starting with a read keyword
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOnlyGuard;

impl ReadOnlyGuard {
    pub fn new() -> Self {
        Self
    }

    /// Check whether `sql` starts with a read keyword
    pub fn is_allowed(&self, sql: &str) -> bool {
        match leading_keyword(sql) {
            Some(word) => READ_KEYWORDS
                .iter()
                .any(|k| k.eq_ignore_ascii_case(word)),
            None => false,
        }
    }

    /// Human-readable list of what is allowed, for error messages
    pub fn allowed_keywords(&self) -> String {
        READ_KEYWORDS.join(", ")
    }
}

/// First word of `sql` after whitespace, comments and opening parentheses
fn leading_keyword(sql: &str) -> Option<&str> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            break;
        }
    }

    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let word = &rest[..end];
    (!word.is_empty()).then_some(word)
}

//! Identifier resolution for the PostgreSQL target.
//!
//! PostgreSQL folds unquoted identifiers to lower case, so a source name
//! survives the migration unchanged only if it is emitted unquoted when it is
//! already a plain lower-case identifier, and quoted otherwise. This module
//! decides which of the two applies and renders qualified target names.
//!
//! Quoting is required when any of these holds:
//! - the identifier contains an upper-case letter
//! - it contains a character outside `[a-z0-9_]`
//! - it starts with a digit
//! - it matches a reserved word (case-insensitive)
//!
//! Source-side (MSSQL) identifiers are always bracket-quoted.

use crate::error::{MigrateError, Result};
use std::fmt;

/// PostgreSQL truncates identifiers longer than this many bytes (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Words that must always be quoted when used as identifiers.
const RESERVED_WORDS: &[&str] = &[
    "user", "order", "group", "select", "from", "where", "table", "index", "view", "sequence",
    "function", "trigger", "schema",
];

/// Why an identifier has to be quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteReason {
    Uppercase,
    SpecialCharacter,
    LeadingDigit,
    ReservedWord,
}

impl QuoteReason {
    /// Human-readable trigger name.
    pub fn describe(self) -> &'static str {
        match self {
            QuoteReason::Uppercase => "contains uppercase letters",
            QuoteReason::SpecialCharacter => "contains special characters",
            QuoteReason::LeadingDigit => "starts with a digit",
            QuoteReason::ReservedWord => "is a reserved word",
        }
    }
}

impl fmt::Display for QuoteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Outcome of a quoting check, with every trigger that fired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotingDecision {
    reasons: Vec<QuoteReason>,
}

impl QuotingDecision {
    /// True when at least one trigger fired.
    pub fn required(&self) -> bool {
        !self.reasons.is_empty()
    }

    pub fn reasons(&self) -> &[QuoteReason] {
        &self.reasons
    }

    /// Comma-joined trigger names, empty when no quoting is needed.
    pub fn describe(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.describe())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Collect every reason `identifier` needs quoting in the target dialect.
pub fn quoting_reasons(identifier: &str) -> QuotingDecision {
    let mut reasons = Vec::new();

    if identifier.chars().any(|c| c.is_uppercase()) {
        reasons.push(QuoteReason::Uppercase);
    }
    if identifier
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '_'))
    {
        reasons.push(QuoteReason::SpecialCharacter);
    }
    if identifier.starts_with(|c: char| c.is_ascii_digit()) {
        reasons.push(QuoteReason::LeadingDigit);
    }
    if RESERVED_WORDS
        .iter()
        .any(|w| w.eq_ignore_ascii_case(identifier))
    {
        reasons.push(QuoteReason::ReservedWord);
    }

    QuotingDecision { reasons }
}

/// Whether `identifier` must be quoted in the target dialect.
pub fn needs_quoting(identifier: &str) -> bool {
    quoting_reasons(identifier).required()
}

/// Render an identifier for the target: quoted when required, bare otherwise.
pub fn resolve_identifier(identifier: &str) -> String {
    if needs_quoting(identifier) {
        quote_pg(identifier)
    } else {
        identifier.to_lowercase()
    }
}

/// Qualified target name `schema.name`, each part resolved independently.
pub fn target_qualified_name(schema: &str, name: &str) -> String {
    if schema.is_empty() {
        return resolve_identifier(name);
    }
    format!("{}.{}", resolve_identifier(schema), resolve_identifier(name))
}

/// Unconditionally double-quote a PostgreSQL identifier, doubling embedded quotes.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL Server identifier using brackets.
pub fn quote_mssql(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Qualify a SQL Server object name with its schema.
pub fn qualify_mssql(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_mssql(schema), quote_mssql(name))
}

/// Truncate a generated name to the PostgreSQL identifier limit on a char boundary.
pub fn truncate_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_LENGTH {
        return name.to_string();
    }
    let mut end = MAX_IDENTIFIER_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers longer than 128 bytes (the SQL Server limit).
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > 128 {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds maximum length of 128 bytes (got {} bytes): {:?}",
            name.len(),
            name
        )));
    }

    Ok(())
}

//! Function mapping rules.

use serde::{Deserialize, Serialize};

/// A source-pattern to target-pattern rewrite with a confidence score.
///
/// Patterns are matched case-insensitively on identifier boundaries. A pattern
/// ending in `(` rewrites only the function name and leaves the argument list
/// in place; a pattern ending in `()` rewrites the whole niladic call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMappingRule {
    /// Catalog id; `None` for built-in rules.
    #[serde(default)]
    pub id: Option<i64>,
    pub source_pattern: String,
    pub target_pattern: String,
    /// 0-100; rules below the configured threshold route to manual review.
    pub confidence: u8,
    #[serde(default)]
    pub notes: Option<String>,
}

impl FunctionMappingRule {
    pub fn new(source_pattern: &str, target_pattern: &str, confidence: u8) -> Self {
        Self {
            id: None,
            source_pattern: source_pattern.to_string(),
            target_pattern: target_pattern.to_string(),
            confidence: confidence.min(100),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    /// Rules shipped with the library.
    ///
    /// Functions whose argument order or semantics differ between the
    /// dialects carry a deliberately low confidence so that they always end
    /// up in manual review instead of being rewritten textually.
    pub fn builtin() -> Vec<FunctionMappingRule> {
        vec![
            Self::new("getdate()", "CURRENT_TIMESTAMP", 100),
            Self::new("getutcdate()", "(CURRENT_TIMESTAMP AT TIME ZONE 'UTC')", 95),
            Self::new("sysdatetime()", "CURRENT_TIMESTAMP", 90),
            Self::new("sysutcdatetime()", "(CURRENT_TIMESTAMP AT TIME ZONE 'UTC')", 90),
            Self::new("isnull(", "COALESCE(", 100),
            Self::new("len(", "LENGTH(", 90)
                .with_notes("LEN ignores trailing spaces, LENGTH does not"),
            Self::new("datalength(", "OCTET_LENGTH(", 85),
            Self::new("newid()", "gen_random_uuid()", 100),
            Self::new("upper(", "UPPER(", 100),
            Self::new("lower(", "LOWER(", 100),
            Self::new("user_name()", "CURRENT_USER", 90),
            Self::new("suser_sname()", "SESSION_USER", 80),
            Self::new("charindex(", "STRPOS(", 40)
                .with_notes("argument order is reversed in STRPOS"),
            Self::new("dateadd(", "DATEADD(", 30)
                .with_notes("rewrite as timestamp + interval by hand"),
            Self::new("datediff(", "DATEDIFF(", 30)
                .with_notes("rewrite with EXTRACT/AGE by hand"),
            Self::new("convert(", "CAST(", 30)
                .with_notes("CONVERT takes the type first and an optional style"),
        ]
    }
}

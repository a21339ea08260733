//! Per-table migration status and its transitions.

use crate::error::{MigrateError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of `target_tables.migration_status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl MigrationStatus {
    /// Convert to the catalog's string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStatus::Pending => "pending",
            MigrationStatus::InProgress => "in_progress",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
        }
    }

    /// Parse the catalog's string representation.
    ///
    /// A NULL status column is read as `pending` by the callers.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(MigrationStatus::Pending),
            "in_progress" => Ok(MigrationStatus::InProgress),
            "completed" => Ok(MigrationStatus::Completed),
            "failed" => Ok(MigrationStatus::Failed),
            _ => Err(MigrateError::Catalog(format!("Invalid migration status: {}", s))),
        }
    }

    /// Whether the state machine allows moving from `self` to `to`.
    ///
    /// Moving back to `pending` is an operator reset and is not covered here.
    pub fn can_transition(&self, to: MigrationStatus, force: bool) -> bool {
        use MigrationStatus::*;
        match (self, to) {
            (Pending, InProgress) => true,
            (Completed | Failed, InProgress) => force,
            // a run that died without recording an outcome
            (InProgress, InProgress) => force,
            (InProgress, Completed | Failed) => true,
            _ => false,
        }
    }

    /// Same as [`can_transition`](Self::can_transition) but reports the refusal.
    pub fn check_transition(&self, table: &str, to: MigrationStatus, force: bool) -> Result<()> {
        if self.can_transition(to, force) {
            Ok(())
        } else {
            Err(MigrateError::InvalidTransition {
                table: table.to_string(),
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        let statuses = [
            MigrationStatus::Pending,
            MigrationStatus::InProgress,
            MigrationStatus::Completed,
            MigrationStatus::Failed,
        ];

        for status in statuses {
            let parsed = MigrationStatus::parse(status.as_str()).unwrap();
            assert_eq!(parsed, status);
        }
        assert!(MigrationStatus::parse("done").is_err());
    }

    #[test]
    fn test_default_is_pending() {
        assert_eq!(MigrationStatus::default(), MigrationStatus::Pending);
    }

    #[test]
    fn test_forward_transitions() {
        use MigrationStatus::*;
        assert!(Pending.can_transition(InProgress, false));
        assert!(InProgress.can_transition(Completed, false));
        assert!(InProgress.can_transition(Failed, false));
        assert!(!Pending.can_transition(Completed, false));
        assert!(!Completed.can_transition(Failed, true));
    }

    #[test]
    fn test_rerun_requires_force() {
        use MigrationStatus::*;
        assert!(!Completed.can_transition(InProgress, false));
        assert!(Completed.can_transition(InProgress, true));
        assert!(!Failed.can_transition(InProgress, false));
        assert!(Failed.can_transition(InProgress, true));
        assert!(!InProgress.can_transition(InProgress, false));
        assert!(InProgress.can_transition(InProgress, true));
    }

    #[test]
    fn test_check_transition_reports_states() {
        let err = MigrationStatus::Completed
            .check_transition("public.accnt", MigrationStatus::InProgress, false)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("in_progress"));
        assert!(msg.contains("public.accnt"));
    }
}

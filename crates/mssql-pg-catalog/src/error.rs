//! Error types for the catalog migration library.

use thiserror::Error;

/// Main error type for catalog-driven migration operations.
///
/// Expected outcomes such as an unmapped expression or a failed validation
/// are returned as values by the models; this enum carries the faults that
/// abort an operation.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, out of range values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Metadata catalog query or write failed
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Catalog rows contradict each other (broken lineage, drifted ids)
    #[error("Metadata inconsistency in {entity}: {message}")]
    MetadataInconsistency { entity: String, message: String },

    /// Table metadata failed structural validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A migration status change that the state machine does not allow
    #[error("Table {table}: cannot move migration status from {from} to {to}")]
    InvalidTransition {
        table: String,
        from: String,
        to: String,
    },

    /// DDL or data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Row counts differ between source and target after the transfer
    #[error("Row count mismatch for table {table}: source has {source_rows}, target has {target_rows}")]
    RowCountMismatch {
        table: String,
        source_rows: i64,
        target_rows: i64,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a MetadataInconsistency error
    pub fn inconsistency(entity: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::MetadataInconsistency {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Wrap a catalog driver error.
    pub fn catalog(err: impl std::fmt::Display) -> Self {
        MigrateError::Catalog(err.to_string())
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Validation(_) | MigrateError::MetadataInconsistency { .. } => 3,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

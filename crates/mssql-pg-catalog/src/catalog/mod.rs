//! Metadata catalog access.
//!
//! The [`CatalogStore`] trait is the only way the models see the catalog.
//! Implementations:
//!
//! - **PostgreSQL**: [`PgCatalog`] in `postgres.rs`
//! - **In-memory**: [`MemoryCatalog`] in `memory.rs`, loaded from a JSON
//!   snapshot for offline planning and tests
//!
//! All reads are keyed by target table id; index rows are always selected
//! through their lineage, never through the stored `table_id`.

mod memory;
mod postgres;
mod rows;

pub use memory::{CatalogSnapshot, MemoryCatalog, SourceIndexEntry, TargetIndexEntry};
pub use postgres::PgCatalog;
pub use rows::*;

use crate::error::Result;
use crate::mapping::{FunctionMappingRule, MappingOutcome};
use crate::model::ColumnClass;
use async_trait::async_trait;

/// Read/write access to the metadata catalog.
///
/// Implementations must be `Send + Sync` so one store can back several
/// independent table migrations.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Look up a target table by schema and name (case-insensitive).
    async fn find_target_table(&self, schema: &str, name: &str) -> Result<Option<TargetTableRow>>;

    /// Source table by id.
    async fn source_table(&self, id: i64) -> Result<Option<SourceTableRow>>;

    /// All target columns of a table ordered by ordinal position.
    async fn target_columns(&self, table_id: i64) -> Result<Vec<ColumnRow>>;

    /// Target columns classified as computed.
    async fn computed_columns(&self, table_id: i64) -> Result<Vec<ColumnRow>> {
        let columns = self.target_columns(table_id).await?;
        Ok(columns
            .into_iter()
            .filter(|c| {
                c.target_type.as_deref().and_then(ColumnClass::parse) == Some(ColumnClass::Computed)
            })
            .collect())
    }

    /// Indexes of a table.
    ///
    /// Returns indexes whose lineage leads to `table_id` as well as indexes
    /// that merely claim `table_id` in their stored column, so that callers can
    /// see and report both kinds of drift.
    async fn target_indexes(&self, table_id: i64) -> Result<Vec<IndexRow>>;

    /// Columns of one index, unordered.
    async fn index_columns(&self, index_id: i64) -> Result<Vec<IndexColumnRow>>;

    async fn primary_key(&self, table_id: i64) -> Result<Option<KeyConstraintRow>>;

    async fn unique_constraints(&self, table_id: i64) -> Result<Vec<KeyConstraintRow>>;

    async fn foreign_keys(&self, table_id: i64) -> Result<Vec<ForeignKeyRow>>;

    async fn check_constraints(&self, table_id: i64) -> Result<Vec<ExpressionConstraintRow>>;

    async fn default_constraints(&self, table_id: i64) -> Result<Vec<ExpressionConstraintRow>>;

    async fn sequences(&self, table_id: i64) -> Result<Vec<SequenceRow>>;

    async fn triggers(&self, table_id: i64) -> Result<Vec<TriggerRow>>;

    /// Active function mapping rules.
    async fn function_mapping_rules(&self) -> Result<Vec<FunctionMappingRule>>;

    /// Index rows whose stored `table_id` differs from the lineage-derived one.
    async fn index_lineage_drift(&self) -> Result<Vec<LineageDrift>>;

    /// Write `migration_status` and its companion fields for one table.
    async fn update_table_status(&self, table_id: i64, update: &StatusUpdate) -> Result<()>;

    /// Write the mapping result of a computed column.
    async fn record_column_mapping(&self, column_id: i64, outcome: &MappingOutcome) -> Result<()>;

    /// Write the mapping result of a check or default constraint.
    async fn record_constraint_mapping(
        &self,
        kind: ConstraintKind,
        constraint_id: i64,
        outcome: &MappingOutcome,
    ) -> Result<()>;

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}

//! Row types read from and written to the metadata catalog.
//!
//! These mirror the catalog tables one to one. Lineage columns are kept as
//! `Option` because the upstream introspection step can leave them unset;
//! deciding what a missing link means is up to the models.

use crate::status::MigrationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `source_tables` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTableRow {
    pub id: i64,
    pub schema_name: String,
    pub object_name: String,
}

/// `target_tables` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetTableRow {
    pub id: i64,
    #[serde(default)]
    pub source_table_id: Option<i64>,
    pub schema_name: String,
    pub object_name: String,
    /// Name of the wrapping view when the table has computed columns.
    #[serde(default)]
    pub view_name: Option<String>,
    #[serde(default)]
    pub migration_status: Option<String>,
    #[serde(default)]
    pub migration_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub rows_migrated: Option<i64>,
}

/// `target_columns` row joined with its source column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRow {
    pub id: i64,
    pub table_id: i64,
    #[serde(default)]
    pub source_column_id: Option<i64>,
    /// Name of the lineage source column, `None` when the link is broken.
    #[serde(default)]
    pub source_name: Option<String>,
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub max_length: i32,
    #[serde(default)]
    pub precision: i32,
    #[serde(default)]
    pub scale: i32,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    pub ordinal_position: i32,
    /// `physical`, `computed` or `both`; unset means physical.
    #[serde(default)]
    pub target_type: Option<String>,
    /// Source-dialect expression of a computed column.
    #[serde(default)]
    pub computed_definition: Option<String>,
    #[serde(default)]
    pub target_expression: Option<String>,
    #[serde(default)]
    pub mapping_status: Option<String>,
}

/// `target_indexes` row with both the stored and the lineage-derived table id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub id: i64,
    #[serde(default)]
    pub source_index_id: Option<i64>,
    /// `target_indexes.table_id` as stored. Informational only.
    #[serde(default)]
    pub stored_table_id: Option<i64>,
    /// Target table id reached through `source_indexes → target_tables`.
    #[serde(default)]
    pub lineage_table_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub index_type: Option<String>,
    #[serde(default)]
    pub is_unique: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub fill_factor: Option<i32>,
}

/// `target_index_columns` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexColumnRow {
    pub index_id: i64,
    pub column_name: String,
    pub ordinal_position: i32,
    #[serde(default)]
    pub is_descending: bool,
}

/// Primary key or unique constraint row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyConstraintRow {
    pub id: i64,
    pub table_id: i64,
    pub name: String,
    #[serde(default)]
    pub column_names: Vec<String>,
    /// Existing unique index to promote instead of building a new one.
    #[serde(default)]
    pub using_index: Option<String>,
}

/// `target_foreign_keys` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyRow {
    pub id: i64,
    pub table_id: i64,
    pub name: String,
    #[serde(default)]
    pub column_names: Vec<String>,
    pub ref_schema: String,
    pub ref_table: String,
    #[serde(default)]
    pub ref_column_names: Vec<String>,
    #[serde(default)]
    pub on_delete: Option<String>,
    #[serde(default)]
    pub on_update: Option<String>,
}

/// Check or default constraint row; both carry one source expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionConstraintRow {
    pub id: i64,
    pub table_id: i64,
    pub name: String,
    #[serde(default)]
    pub column_name: Option<String>,
    pub source_definition: String,
    #[serde(default)]
    pub postgres_definition: Option<String>,
    #[serde(default)]
    pub mapping_status: Option<String>,
}

/// `target_sequences` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRow {
    pub id: i64,
    pub table_id: i64,
    pub schema_name: String,
    pub name: String,
    #[serde(default = "default_sequence_type")]
    pub data_type: String,
    #[serde(default = "default_one")]
    pub start_value: i64,
    #[serde(default = "default_one")]
    pub increment_by: i64,
    #[serde(default)]
    pub min_value: Option<i64>,
    #[serde(default)]
    pub max_value: Option<i64>,
    #[serde(default)]
    pub cache_size: Option<i64>,
    #[serde(default)]
    pub is_cycling: bool,
}

/// `target_triggers` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRow {
    pub id: i64,
    pub table_id: i64,
    pub name: String,
    pub timing: String,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default = "default_true")]
    pub for_each_row: bool,
    /// PostgreSQL trigger function supplied by the porting step.
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub mapping_status: Option<String>,
}

/// Which expression-bearing constraint family a mapping write-back targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Check,
    Default,
}

impl ConstraintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintKind::Check => "check",
            ConstraintKind::Default => "default",
        }
    }
}

/// Status fields written back onto `target_tables`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub status: MigrationStatus,
    pub migration_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub rows_migrated: Option<i64>,
}

/// An index whose stored `table_id` disagrees with its lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageDrift {
    pub index_id: i64,
    pub index_name: String,
    pub stored_table_id: Option<i64>,
    pub lineage_table_id: Option<i64>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> i64 {
    1
}

fn default_sequence_type() -> String {
    "bigint".to_string()
}

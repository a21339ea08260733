//! In-memory catalog store backed by a JSON snapshot.

use super::rows::*;
use super::CatalogStore;
use crate::error::{MigrateError, Result};
use crate::mapping::{FunctionMappingRule, MappingOutcome};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;

/// `source_indexes` entry of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIndexEntry {
    pub id: i64,
    pub table_id: i64,
    pub name: String,
}

/// `target_indexes` entry of a snapshot, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetIndexEntry {
    pub id: i64,
    #[serde(default)]
    pub source_index_id: Option<i64>,
    #[serde(default)]
    pub table_id: Option<i64>,
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

/// Full catalog contents in one serde document.
///
/// Column rows are stored in their joined form (source name and computed
/// definition already resolved); index lineage is resolved on read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub source_tables: Vec<SourceTableRow>,
    pub target_tables: Vec<TargetTableRow>,
    pub columns: Vec<ColumnRow>,
    pub source_indexes: Vec<SourceIndexEntry>,
    pub target_indexes: Vec<TargetIndexEntry>,
    pub index_columns: Vec<IndexColumnRow>,
    pub primary_keys: Vec<KeyConstraintRow>,
    pub unique_constraints: Vec<KeyConstraintRow>,
    pub foreign_keys: Vec<ForeignKeyRow>,
    pub check_constraints: Vec<ExpressionConstraintRow>,
    pub default_constraints: Vec<ExpressionConstraintRow>,
    pub sequences: Vec<SequenceRow>,
    pub triggers: Vec<TriggerRow>,
    pub function_mapping_rules: Vec<FunctionMappingRule>,
}

impl CatalogSnapshot {
    /// Target table id reached from an index through its source lineage.
    fn lineage_table_id(&self, index: &TargetIndexEntry) -> Option<i64> {
        let source_index = self
            .source_indexes
            .iter()
            .find(|s| Some(s.id) == index.source_index_id)?;
        self.target_tables
            .iter()
            .find(|t| t.source_table_id == Some(source_index.table_id))
            .map(|t| t.id)
    }

    fn index_row(&self, index: &TargetIndexEntry) -> IndexRow {
        IndexRow {
            id: index.id,
            source_index_id: index.source_index_id,
            stored_table_id: index.table_id,
            lineage_table_id: self.lineage_table_id(index),
            name: index.name.clone(),
            index_type: index.index_type.clone(),
            is_unique: index.is_unique,
            is_primary_key: index.is_primary_key,
            fill_factor: index.fill_factor,
        }
    }
}

/// Catalog store holding a [`CatalogSnapshot`] in memory.
///
/// Writes change the in-memory snapshot only.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogSnapshot>,
}

impl MemoryCatalog {
    pub fn new(snapshot: CatalogSnapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
        }
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: CatalogSnapshot = serde_json::from_str(json)?;
        Ok(Self::new(snapshot))
    }

    /// Load a snapshot from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> CatalogSnapshot {
        self.data.read().await.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_target_table(&self, schema: &str, name: &str) -> Result<Option<TargetTableRow>> {
        let data = self.data.read().await;
        Ok(data
            .target_tables
            .iter()
            .find(|t| {
                t.schema_name.eq_ignore_ascii_case(schema) && t.object_name.eq_ignore_ascii_case(name)
            })
            .cloned())
    }

    async fn source_table(&self, id: i64) -> Result<Option<SourceTableRow>> {
        let data = self.data.read().await;
        Ok(data.source_tables.iter().find(|t| t.id == id).cloned())
    }

    async fn target_columns(&self, table_id: i64) -> Result<Vec<ColumnRow>> {
        let data = self.data.read().await;
        let mut columns: Vec<ColumnRow> = data
            .columns
            .iter()
            .filter(|c| c.table_id == table_id)
            .cloned()
            .collect();
        columns.sort_by_key(|c| c.ordinal_position);
        Ok(columns)
    }

    async fn target_indexes(&self, table_id: i64) -> Result<Vec<IndexRow>> {
        let data = self.data.read().await;
        Ok(data
            .target_indexes
            .iter()
            .map(|i| data.index_row(i))
            .filter(|i| i.lineage_table_id == Some(table_id) || i.stored_table_id == Some(table_id))
            .collect())
    }

    async fn index_columns(&self, index_id: i64) -> Result<Vec<IndexColumnRow>> {
        let data = self.data.read().await;
        Ok(data
            .index_columns
            .iter()
            .filter(|c| c.index_id == index_id)
            .cloned()
            .collect())
    }

    async fn primary_key(&self, table_id: i64) -> Result<Option<KeyConstraintRow>> {
        let data = self.data.read().await;
        Ok(data.primary_keys.iter().find(|k| k.table_id == table_id).cloned())
    }

    async fn unique_constraints(&self, table_id: i64) -> Result<Vec<KeyConstraintRow>> {
        let data = self.data.read().await;
        Ok(by_table(&data.unique_constraints, table_id, |r| r.table_id))
    }

    async fn foreign_keys(&self, table_id: i64) -> Result<Vec<ForeignKeyRow>> {
        let data = self.data.read().await;
        Ok(by_table(&data.foreign_keys, table_id, |r| r.table_id))
    }

    async fn check_constraints(&self, table_id: i64) -> Result<Vec<ExpressionConstraintRow>> {
        let data = self.data.read().await;
        Ok(by_table(&data.check_constraints, table_id, |r| r.table_id))
    }

    async fn default_constraints(&self, table_id: i64) -> Result<Vec<ExpressionConstraintRow>> {
        let data = self.data.read().await;
        Ok(by_table(&data.default_constraints, table_id, |r| r.table_id))
    }

    async fn sequences(&self, table_id: i64) -> Result<Vec<SequenceRow>> {
        let data = self.data.read().await;
        Ok(by_table(&data.sequences, table_id, |r| r.table_id))
    }

    async fn triggers(&self, table_id: i64) -> Result<Vec<TriggerRow>> {
        let data = self.data.read().await;
        Ok(by_table(&data.triggers, table_id, |r| r.table_id))
    }

    async fn function_mapping_rules(&self) -> Result<Vec<FunctionMappingRule>> {
        Ok(self.data.read().await.function_mapping_rules.clone())
    }

    async fn index_lineage_drift(&self) -> Result<Vec<LineageDrift>> {
        let data = self.data.read().await;
        Ok(data
            .target_indexes
            .iter()
            .map(|i| data.index_row(i))
            .filter(|i| i.stored_table_id != i.lineage_table_id)
            .map(|i| LineageDrift {
                index_id: i.id,
                index_name: i.name,
                stored_table_id: i.stored_table_id,
                lineage_table_id: i.lineage_table_id,
            })
            .collect())
    }

    async fn update_table_status(&self, table_id: i64, update: &StatusUpdate) -> Result<()> {
        let mut data = self.data.write().await;
        let table = data
            .target_tables
            .iter_mut()
            .find(|t| t.id == table_id)
            .ok_or_else(|| MigrateError::Catalog(format!("target table {} not found", table_id)))?;

        table.migration_status = Some(update.status.as_str().to_string());
        table.migration_date = update.migration_date;
        table.error_message = update.error_message.clone();
        if update.rows_migrated.is_some() {
            table.rows_migrated = update.rows_migrated;
        }
        Ok(())
    }

    async fn record_column_mapping(&self, column_id: i64, outcome: &MappingOutcome) -> Result<()> {
        let mut data = self.data.write().await;
        let column = data
            .columns
            .iter_mut()
            .find(|c| c.id == column_id)
            .ok_or_else(|| MigrateError::Catalog(format!("target column {} not found", column_id)))?;

        column.target_expression = outcome.target_expression.clone();
        column.mapping_status = Some(outcome.status.as_str().to_string());
        Ok(())
    }

    async fn record_constraint_mapping(
        &self,
        kind: ConstraintKind,
        constraint_id: i64,
        outcome: &MappingOutcome,
    ) -> Result<()> {
        let mut data = self.data.write().await;
        let rows = match kind {
            ConstraintKind::Check => &mut data.check_constraints,
            ConstraintKind::Default => &mut data.default_constraints,
        };
        let row = rows
            .iter_mut()
            .find(|r| r.id == constraint_id)
            .ok_or_else(|| {
                MigrateError::Catalog(format!(
                    "{} constraint {} not found",
                    kind.as_str(),
                    constraint_id
                ))
            })?;

        row.postgres_definition = outcome.target_expression.clone();
        row.mapping_status = Some(outcome.status.as_str().to_string());
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}

fn by_table<T: Clone>(rows: &[T], table_id: i64, key: impl Fn(&T) -> i64) -> Vec<T> {
    rows.iter().filter(|r| key(r) == table_id).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::FunctionMappingState;
    use crate::status::MigrationStatus;

    fn snapshot() -> CatalogSnapshot {
        CatalogSnapshot {
            source_tables: vec![
                SourceTableRow {
                    id: 1,
                    schema_name: "dbo".into(),
                    object_name: "Accnt".into(),
                },
                SourceTableRow {
                    id: 2,
                    schema_name: "dbo".into(),
                    object_name: "Orders".into(),
                },
            ],
            target_tables: vec![
                TargetTableRow {
                    id: 10,
                    source_table_id: Some(1),
                    schema_name: "public".into(),
                    object_name: "accnt".into(),
                    view_name: None,
                    migration_status: None,
                    migration_date: None,
                    error_message: None,
                    rows_migrated: None,
                },
                TargetTableRow {
                    id: 20,
                    source_table_id: Some(2),
                    schema_name: "public".into(),
                    object_name: "orders".into(),
                    view_name: None,
                    migration_status: None,
                    migration_date: None,
                    error_message: None,
                    rows_migrated: None,
                },
            ],
            source_indexes: vec![
                SourceIndexEntry {
                    id: 100,
                    table_id: 1,
                    name: "PK_Accnt".into(),
                },
                SourceIndexEntry {
                    id: 200,
                    table_id: 2,
                    name: "IX_Orders_Date".into(),
                },
            ],
            target_indexes: vec![
                TargetIndexEntry {
                    id: 1000,
                    source_index_id: Some(100),
                    table_id: Some(10),
                    name: "pk_accnt".into(),
                    index_type: None,
                    is_unique: true,
                    is_primary_key: true,
                    fill_factor: None,
                },
                TargetIndexEntry {
                    id: 2000,
                    source_index_id: Some(200),
                    // drifted: claims to belong to accnt
                    table_id: Some(10),
                    name: "ix_orders_date".into(),
                    index_type: None,
                    is_unique: false,
                    is_primary_key: false,
                    fill_factor: None,
                },
            ],
            ..CatalogSnapshot::default()
        }
    }

    #[tokio::test]
    async fn test_find_target_table_is_case_insensitive() {
        let catalog = MemoryCatalog::new(snapshot());
        let table = catalog.find_target_table("PUBLIC", "Accnt").await.unwrap();
        assert_eq!(table.map(|t| t.id), Some(10));
        assert!(catalog.find_target_table("public", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_index_lineage_is_derived() {
        let catalog = MemoryCatalog::new(snapshot());

        let accnt = catalog.target_indexes(10).await.unwrap();
        assert_eq!(accnt.len(), 2);
        let drifted = accnt.iter().find(|i| i.id == 2000).unwrap();
        assert_eq!(drifted.stored_table_id, Some(10));
        assert_eq!(drifted.lineage_table_id, Some(20));

        let orders = catalog.target_indexes(20).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].id, 2000);
    }

    #[tokio::test]
    async fn test_lineage_drift_report() {
        let catalog = MemoryCatalog::new(snapshot());
        let drift = catalog.index_lineage_drift().await.unwrap();
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].index_name, "ix_orders_date");
        assert_eq!(drift[0].lineage_table_id, Some(20));
    }

    #[tokio::test]
    async fn test_status_update_is_written() {
        let catalog = MemoryCatalog::new(snapshot());
        let update = StatusUpdate {
            status: MigrationStatus::Failed,
            migration_date: None,
            error_message: Some("boom".into()),
            rows_migrated: None,
        };
        catalog.update_table_status(10, &update).await.unwrap();

        let table = catalog.find_target_table("public", "accnt").await.unwrap().unwrap();
        assert_eq!(table.migration_status.as_deref(), Some("failed"));
        assert_eq!(table.error_message.as_deref(), Some("boom"));

        assert!(catalog.update_table_status(99, &update).await.is_err());
    }

    #[tokio::test]
    async fn test_constraint_mapping_write_back() {
        let mut data = snapshot();
        data.check_constraints.push(ExpressionConstraintRow {
            id: 5,
            table_id: 10,
            name: "ck_accnt_num".into(),
            column_name: Some("account_num".into()),
            source_definition: "len([account_num]) > 0".into(),
            postgres_definition: None,
            mapping_status: None,
        });
        let catalog = MemoryCatalog::new(data);

        let outcome = FunctionMappingState::builtin(80).analyze("len([account_num]) > 0");
        catalog
            .record_constraint_mapping(ConstraintKind::Check, 5, &outcome)
            .await
            .unwrap();

        let checks = catalog.check_constraints(10).await.unwrap();
        assert_eq!(checks[0].mapping_status.as_deref(), Some("mapped"));
        assert_eq!(
            checks[0].postgres_definition.as_deref(),
            Some("LENGTH(account_num) > 0")
        );
    }

    #[test]
    fn test_snapshot_json_defaults() {
        let catalog = MemoryCatalog::from_json(r#"{"source_tables": []}"#).unwrap();
        assert_eq!(catalog.backend_type(), "memory");
        assert!(MemoryCatalog::from_json("not json").is_err());
    }
}

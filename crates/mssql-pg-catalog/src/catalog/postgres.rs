//! PostgreSQL-backed catalog store.

use super::rows::*;
use super::CatalogStore;
use crate::config::CatalogConfig;
use crate::db::postgres::build_pool;
use crate::error::{MigrateError, Result};
use crate::identifier::quote_pg;
use crate::mapping::{FunctionMappingRule, MappingOutcome};
use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;
use tracing::{debug, info};

/// Catalog store reading the catalog tables over a `deadpool-postgres` pool.
pub struct PgCatalog {
    pool: Pool,
    /// Quoted catalog schema.
    schema: String,
}

impl PgCatalog {
    /// Connect to the catalog database described by `config`.
    pub async fn connect(config: &CatalogConfig) -> Result<Self> {
        let pool = build_pool(
            &config.host,
            config.port,
            &config.database,
            &config.user,
            &config.password,
            config.max_connections as usize,
            "catalog",
        )?;
        let catalog = Self::new(pool, &config.schema);
        catalog.ping().await?;

        info!(
            "Connected to catalog: {}:{}/{} (schema {})",
            config.host, config.port, config.database, config.schema
        );
        Ok(catalog)
    }

    /// Wrap an existing pool.
    pub fn new(pool: Pool, schema: &str) -> Self {
        Self {
            pool,
            schema: quote_pg(schema),
        }
    }

    /// Check connectivity.
    pub async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(MigrateError::catalog)?;
        Ok(())
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), "catalog"))
    }

    async fn query(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)]) -> Result<Vec<Row>> {
        let client = self.client().await?;
        client.query(sql, params).await.map_err(MigrateError::catalog)
    }

    fn expression_constraints_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, table_id, name, column_name, source_definition, postgres_definition, mapping_status
             FROM {}.{} WHERE table_id = $1 ORDER BY id",
            self.schema, table
        )
    }

    fn key_constraints_sql(&self, table: &str) -> String {
        format!(
            "SELECT id, table_id, name, column_names, using_index
             FROM {}.{} WHERE table_id = $1 ORDER BY id",
            self.schema, table
        )
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, column: &str) -> Result<T> {
    row.try_get(column).map_err(MigrateError::catalog)
}

fn target_table_row(row: &Row) -> Result<TargetTableRow> {
    Ok(TargetTableRow {
        id: get(row, "id")?,
        source_table_id: get(row, "source_table_id")?,
        schema_name: get(row, "schema_name")?,
        object_name: get(row, "object_name")?,
        view_name: get(row, "view_name")?,
        migration_status: get(row, "migration_status")?,
        migration_date: get(row, "migration_date")?,
        error_message: get(row, "error_message")?,
        rows_migrated: get(row, "rows_migrated")?,
    })
}

fn column_row(row: &Row) -> Result<ColumnRow> {
    Ok(ColumnRow {
        id: get(row, "id")?,
        table_id: get(row, "table_id")?,
        source_column_id: get(row, "source_column_id")?,
        source_name: get(row, "source_name")?,
        name: get(row, "name")?,
        data_type: get(row, "data_type")?,
        max_length: get(row, "max_length")?,
        precision: get(row, "precision")?,
        scale: get(row, "scale")?,
        is_nullable: get(row, "is_nullable")?,
        is_identity: get(row, "is_identity")?,
        default_value: get(row, "default_value")?,
        ordinal_position: get(row, "ordinal_position")?,
        target_type: get(row, "target_type")?,
        computed_definition: get(row, "computed_definition")?,
        target_expression: get(row, "target_expression")?,
        mapping_status: get(row, "mapping_status")?,
    })
}

fn key_constraint_row(row: &Row) -> Result<KeyConstraintRow> {
    Ok(KeyConstraintRow {
        id: get(row, "id")?,
        table_id: get(row, "table_id")?,
        name: get(row, "name")?,
        column_names: get::<Option<Vec<String>>>(row, "column_names")?.unwrap_or_default(),
        using_index: get(row, "using_index")?,
    })
}

fn expression_constraint_row(row: &Row) -> Result<ExpressionConstraintRow> {
    Ok(ExpressionConstraintRow {
        id: get(row, "id")?,
        table_id: get(row, "table_id")?,
        name: get(row, "name")?,
        column_name: get(row, "column_name")?,
        source_definition: get(row, "source_definition")?,
        postgres_definition: get(row, "postgres_definition")?,
        mapping_status: get(row, "mapping_status")?,
    })
}

fn index_row(row: &Row) -> Result<IndexRow> {
    Ok(IndexRow {
        id: get(row, "id")?,
        source_index_id: get(row, "source_index_id")?,
        stored_table_id: get(row, "stored_table_id")?,
        lineage_table_id: get(row, "lineage_table_id")?,
        name: get(row, "name")?,
        index_type: get(row, "index_type")?,
        is_unique: get(row, "is_unique")?,
        is_primary_key: get(row, "is_primary_key")?,
        fill_factor: get(row, "fill_factor")?,
    })
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn find_target_table(&self, schema: &str, name: &str) -> Result<Option<TargetTableRow>> {
        let sql = format!(
            "SELECT id, source_table_id, schema_name, object_name, view_name, migration_status,
                    migration_date, error_message, rows_migrated
             FROM {}.target_tables
             WHERE lower(schema_name) = lower($1) AND lower(object_name) = lower($2)",
            self.schema
        );
        let rows = self.query(&sql, &[&schema, &name]).await?;
        rows.first().map(target_table_row).transpose()
    }

    async fn source_table(&self, id: i64) -> Result<Option<SourceTableRow>> {
        let sql = format!(
            "SELECT id, schema_name, object_name FROM {}.source_tables WHERE id = $1",
            self.schema
        );
        let rows = self.query(&sql, &[&id]).await?;
        rows.first()
            .map(|row| {
                Ok(SourceTableRow {
                    id: get(row, "id")?,
                    schema_name: get(row, "schema_name")?,
                    object_name: get(row, "object_name")?,
                })
            })
            .transpose()
    }

    async fn target_columns(&self, table_id: i64) -> Result<Vec<ColumnRow>> {
        let sql = format!(
            "SELECT tc.id, tc.table_id, tc.source_column_id, sc.name AS source_name, tc.name,
                    tc.data_type, COALESCE(tc.max_length, 0) AS max_length,
                    COALESCE(tc.\"precision\", 0) AS \"precision\", COALESCE(tc.scale, 0) AS scale,
                    tc.is_nullable, tc.is_identity, tc.default_value, tc.ordinal_position,
                    tc.target_type, sc.computed_definition, tc.target_expression, tc.mapping_status
             FROM {s}.target_columns tc
             LEFT JOIN {s}.source_columns sc ON sc.id = tc.source_column_id
             WHERE tc.table_id = $1
             ORDER BY tc.ordinal_position",
            s = self.schema
        );
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter().map(column_row).collect()
    }

    async fn target_indexes(&self, table_id: i64) -> Result<Vec<IndexRow>> {
        // table_id is derived through source lineage; the stored value is returned for comparison
        let sql = format!(
            "SELECT ti.id, ti.source_index_id, ti.table_id AS stored_table_id,
                    tt.id AS lineage_table_id, ti.name, ti.index_type, ti.is_unique,
                    ti.is_primary_key, ti.fill_factor
             FROM {s}.target_indexes ti
             LEFT JOIN {s}.source_indexes si ON si.id = ti.source_index_id
             LEFT JOIN {s}.target_tables tt ON tt.source_table_id = si.table_id
             WHERE tt.id = $1 OR ti.table_id = $1
             ORDER BY ti.id",
            s = self.schema
        );
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter().map(index_row).collect()
    }

    async fn index_columns(&self, index_id: i64) -> Result<Vec<IndexColumnRow>> {
        let sql = format!(
            "SELECT index_id, column_name, ordinal_position, is_descending
             FROM {}.target_index_columns WHERE index_id = $1",
            self.schema
        );
        let rows = self.query(&sql, &[&index_id]).await?;
        rows.iter()
            .map(|row| {
                Ok(IndexColumnRow {
                    index_id: get(row, "index_id")?,
                    column_name: get(row, "column_name")?,
                    ordinal_position: get(row, "ordinal_position")?,
                    is_descending: get(row, "is_descending")?,
                })
            })
            .collect()
    }

    async fn primary_key(&self, table_id: i64) -> Result<Option<KeyConstraintRow>> {
        let sql = self.key_constraints_sql("target_primary_keys");
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.first().map(key_constraint_row).transpose()
    }

    async fn unique_constraints(&self, table_id: i64) -> Result<Vec<KeyConstraintRow>> {
        let sql = self.key_constraints_sql("target_unique_constraints");
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter().map(key_constraint_row).collect()
    }

    async fn foreign_keys(&self, table_id: i64) -> Result<Vec<ForeignKeyRow>> {
        let sql = format!(
            "SELECT id, table_id, name, column_names, ref_schema, ref_table, ref_column_names,
                    on_delete, on_update
             FROM {}.target_foreign_keys WHERE table_id = $1 ORDER BY id",
            self.schema
        );
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter()
            .map(|row| {
                Ok(ForeignKeyRow {
                    id: get(row, "id")?,
                    table_id: get(row, "table_id")?,
                    name: get(row, "name")?,
                    column_names: get::<Option<Vec<String>>>(row, "column_names")?.unwrap_or_default(),
                    ref_schema: get(row, "ref_schema")?,
                    ref_table: get(row, "ref_table")?,
                    ref_column_names: get::<Option<Vec<String>>>(row, "ref_column_names")?
                        .unwrap_or_default(),
                    on_delete: get(row, "on_delete")?,
                    on_update: get(row, "on_update")?,
                })
            })
            .collect()
    }

    async fn check_constraints(&self, table_id: i64) -> Result<Vec<ExpressionConstraintRow>> {
        let sql = self.expression_constraints_sql("target_check_constraints");
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter().map(expression_constraint_row).collect()
    }

    async fn default_constraints(&self, table_id: i64) -> Result<Vec<ExpressionConstraintRow>> {
        let sql = self.expression_constraints_sql("target_default_constraints");
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter().map(expression_constraint_row).collect()
    }

    async fn sequences(&self, table_id: i64) -> Result<Vec<SequenceRow>> {
        let sql = format!(
            "SELECT id, table_id, schema_name, name, data_type, start_value, increment_by,
                    min_value, max_value, cache_size, is_cycling
             FROM {}.target_sequences WHERE table_id = $1 ORDER BY id",
            self.schema
        );
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter()
            .map(|row| {
                Ok(SequenceRow {
                    id: get(row, "id")?,
                    table_id: get(row, "table_id")?,
                    schema_name: get(row, "schema_name")?,
                    name: get(row, "name")?,
                    data_type: get(row, "data_type")?,
                    start_value: get(row, "start_value")?,
                    increment_by: get(row, "increment_by")?,
                    min_value: get(row, "min_value")?,
                    max_value: get(row, "max_value")?,
                    cache_size: get(row, "cache_size")?,
                    is_cycling: get(row, "is_cycling")?,
                })
            })
            .collect()
    }

    async fn triggers(&self, table_id: i64) -> Result<Vec<TriggerRow>> {
        let sql = format!(
            "SELECT id, table_id, name, timing, events, for_each_row, function_name, mapping_status
             FROM {}.target_triggers WHERE table_id = $1 ORDER BY id",
            self.schema
        );
        let rows = self.query(&sql, &[&table_id]).await?;
        rows.iter()
            .map(|row| {
                Ok(TriggerRow {
                    id: get(row, "id")?,
                    table_id: get(row, "table_id")?,
                    name: get(row, "name")?,
                    timing: get(row, "timing")?,
                    events: get::<Option<Vec<String>>>(row, "events")?.unwrap_or_default(),
                    for_each_row: get(row, "for_each_row")?,
                    function_name: get(row, "function_name")?,
                    mapping_status: get(row, "mapping_status")?,
                })
            })
            .collect()
    }

    async fn function_mapping_rules(&self) -> Result<Vec<FunctionMappingRule>> {
        let sql = format!(
            "SELECT id, source_pattern, target_pattern, confidence, notes
             FROM {}.function_mapping_rules WHERE is_active ORDER BY id",
            self.schema
        );
        let rows = self.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| {
                let confidence: i32 = get(row, "confidence")?;
                Ok(FunctionMappingRule {
                    id: Some(get(row, "id")?),
                    source_pattern: get(row, "source_pattern")?,
                    target_pattern: get(row, "target_pattern")?,
                    confidence: confidence.clamp(0, 100) as u8,
                    notes: get(row, "notes")?,
                })
            })
            .collect()
    }

    async fn index_lineage_drift(&self) -> Result<Vec<LineageDrift>> {
        let sql = format!(
            "SELECT ti.id, ti.name, ti.table_id AS stored_table_id, tt.id AS lineage_table_id
             FROM {s}.target_indexes ti
             LEFT JOIN {s}.source_indexes si ON si.id = ti.source_index_id
             LEFT JOIN {s}.target_tables tt ON tt.source_table_id = si.table_id
             WHERE ti.table_id IS DISTINCT FROM tt.id
             ORDER BY ti.id",
            s = self.schema
        );
        let rows = self.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| {
                Ok(LineageDrift {
                    index_id: get(row, "id")?,
                    index_name: get(row, "name")?,
                    stored_table_id: get(row, "stored_table_id")?,
                    lineage_table_id: get(row, "lineage_table_id")?,
                })
            })
            .collect()
    }

    async fn update_table_status(&self, table_id: i64, update: &StatusUpdate) -> Result<()> {
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(MigrateError::catalog)?;

        let sql = format!(
            "UPDATE {}.target_tables
             SET migration_status = $2, migration_date = $3, error_message = $4,
                 rows_migrated = COALESCE($5, rows_migrated)
             WHERE id = $1",
            self.schema
        );
        let updated = tx
            .execute(
                &sql,
                &[
                    &table_id,
                    &update.status.as_str(),
                    &update.migration_date,
                    &update.error_message,
                    &update.rows_migrated,
                ],
            )
            .await
            .map_err(MigrateError::catalog)?;

        if updated == 0 {
            return Err(MigrateError::Catalog(format!(
                "target table {} not found",
                table_id
            )));
        }

        tx.commit().await.map_err(MigrateError::catalog)?;
        debug!(
            "Catalog status of table {} set to {}",
            table_id,
            update.status
        );
        Ok(())
    }

    async fn record_column_mapping(&self, column_id: i64, outcome: &MappingOutcome) -> Result<()> {
        let sql = format!(
            "UPDATE {}.target_columns
             SET target_expression = $2, mapping_status = $3, mapping_notes = $4
             WHERE id = $1",
            self.schema
        );
        let client = self.client().await?;
        client
            .execute(
                &sql,
                &[
                    &column_id,
                    &outcome.target_expression,
                    &outcome.status.as_str(),
                    &outcome.notes,
                ],
            )
            .await
            .map_err(MigrateError::catalog)?;
        Ok(())
    }

    async fn record_constraint_mapping(
        &self,
        kind: ConstraintKind,
        constraint_id: i64,
        outcome: &MappingOutcome,
    ) -> Result<()> {
        let table = match kind {
            ConstraintKind::Check => "target_check_constraints",
            ConstraintKind::Default => "target_default_constraints",
        };
        let sql = format!(
            "UPDATE {}.{}
             SET postgres_definition = $2, mapping_status = $3, mapping_notes = $4
             WHERE id = $1",
            self.schema, table
        );
        let client = self.client().await?;
        client
            .execute(
                &sql,
                &[
                    &constraint_id,
                    &outcome.target_expression,
                    &outcome.status.as_str(),
                    &outcome.notes,
                ],
            )
            .await
            .map_err(MigrateError::catalog)?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}


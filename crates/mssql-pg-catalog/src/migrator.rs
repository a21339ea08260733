//! Per-table migration driver.
//!
//! [`TableMigrator::migrate`] takes one table through
//! load → validate → DDL → data → verify → status, strictly in that order.
//! Everything written to the target for one table happens in a single
//! target transaction; the catalog is told `completed` only after that
//! transaction has committed.

use crate::catalog::{CatalogStore, PgCatalog, StatusUpdate, TargetTableRow};
use crate::config::{Config, MappingSettings, MigrationSettings};
use crate::db::{
    CopyMover, DataMover, MssqlSource, PgTarget, SourceDatabase, TargetDatabase, TargetSession,
};
use crate::error::{MigrateError, Result};
use crate::identifier::{target_qualified_name, truncate_identifier};
use crate::model::{is_comment, TableModel, TablePlan};
use crate::status::MigrationStatus;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Result of migrating one table.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    /// Qualified target table name.
    pub table: String,
    pub success: bool,
    /// True when the table was already completed and nothing was done.
    pub skipped: bool,
    #[serde(rename = "duration_seconds", serialize_with = "as_seconds")]
    pub duration: Duration,
    pub rows_migrated: i64,
    pub error: Option<String>,
    /// Catalog status after the run, `None` when the table was not found.
    pub status: Option<MigrationStatus>,
}

impl MigrationOutcome {
    /// Unsuccessful outcome timed from `started`.
    pub fn failed(table: String, started: Instant, error: String, status: Option<MigrationStatus>) -> Self {
        Self {
            table,
            success: false,
            skipped: false,
            duration: started.elapsed(),
            rows_migrated: 0,
            error: Some(error),
            status,
        }
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn as_seconds<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Drives single tables from catalog metadata to a loaded target table.
pub struct TableMigrator {
    catalog: Arc<dyn CatalogStore>,
    source: Arc<dyn SourceDatabase>,
    target: Arc<dyn TargetDatabase>,
    mover: Arc<dyn DataMover>,
    settings: MigrationSettings,
    mapping: MappingSettings,
}

impl TableMigrator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        source: Arc<dyn SourceDatabase>,
        target: Arc<dyn TargetDatabase>,
        mover: Arc<dyn DataMover>,
    ) -> Self {
        Self {
            catalog,
            source,
            target,
            mover,
            settings: MigrationSettings::default(),
            mapping: MappingSettings::default(),
        }
    }

    /// Connect the catalog, source and target described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let catalog = PgCatalog::connect(&config.catalog).await?;
        let source = MssqlSource::connect(&config.source).await?;
        let target = PgTarget::connect(&config.target).await?;
        let mover = CopyMover::from_settings(&config.transfer);
        Ok(Self::new(
            Arc::new(catalog),
            Arc::new(source),
            Arc::new(target),
            Arc::new(mover),
        )
        .with_config(config))
    }

    /// Take migration and mapping settings from a loaded configuration.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.settings = config.migration.clone();
        self.mapping = config.mapping.clone();
        self
    }

    /// Migrate one table.
    ///
    /// Problems with the table itself come back as an unsuccessful outcome.
    /// `Err` is reserved for catalog faults that leave the run's status unknown.
    pub async fn migrate(&self, schema: &str, name: &str, force: bool) -> Result<MigrationOutcome> {
        let started = Instant::now();
        let catalog = self.catalog.as_ref();

        let Some(row) = catalog.find_target_table(schema, name).await? else {
            warn!("{}.{}: not found in catalog", schema, name);
            return Ok(MigrationOutcome::failed(
                format!("{}.{}", schema, name),
                started,
                "table not found in catalog".to_string(),
                None,
            ));
        };
        let mut table = match TableModel::from_row(&row) {
            Ok(table) => table,
            Err(e) => {
                let label = target_qualified_name(&row.schema_name, &truncate_identifier(&row.object_name));
                let e = MigrateError::inconsistency(format!("table {}", label), e.to_string());
                warn!("{}", e);
                return Ok(MigrationOutcome::failed(label, started, e.to_string(), None));
            }
        };
        let label = table.qualified_name();

        if !force && table.status == MigrationStatus::Completed {
            info!("{}: already completed, skipping", label);
            return Ok(MigrationOutcome {
                table: label,
                success: true,
                skipped: true,
                duration: started.elapsed(),
                rows_migrated: table.rows_migrated.unwrap_or(0),
                error: None,
                status: Some(table.status),
            });
        }

        if !table.load_metadata(catalog, &self.mapping).await {
            let reason = format!("metadata could not be loaded: {}", table.issues.join("; "));
            return Ok(MigrationOutcome::failed(label, started, reason, Some(table.status)));
        }
        if !table.validate_metadata() {
            let reason = format!("validation failed: {}", table.validation_problems().join("; "));
            return Ok(MigrationOutcome::failed(label, started, reason, Some(table.status)));
        }

        table.persist_mappings(catalog).await?;

        let update = match table.begin(force) {
            Ok(update) => update,
            Err(e) => {
                warn!("{}: {}", label, e);
                return Ok(MigrationOutcome::failed(label, started, e.to_string(), Some(table.status)));
            }
        };
        self.record(&table, &update).await?;

        match self.apply(&table, force).await {
            Ok(rows) => {
                let update = table.complete(rows)?;
                self.record(&table, &update).await?;
                info!(
                    "{}: completed, {} rows in {:.1}s",
                    label,
                    rows,
                    started.elapsed().as_secs_f64()
                );
                Ok(MigrationOutcome {
                    table: label,
                    success: true,
                    skipped: false,
                    duration: started.elapsed(),
                    rows_migrated: rows,
                    error: None,
                    status: Some(table.status),
                })
            }
            Err(e) => {
                error!("{}: migration failed: {}", label, e);
                let message = e.to_string();
                let update = table.fail(&message)?;
                self.record(&table, &update).await?;
                Ok(MigrationOutcome::failed(label, started, message, Some(table.status)))
            }
        }
    }

    async fn record(&self, table: &TableModel, update: &StatusUpdate) -> Result<()> {
        self.catalog.update_table_status(table.id, update).await?;
        debug!("{}: status {} recorded", table.qualified_name(), update.status);
        Ok(())
    }

    /// Run the target side in one transaction; roll back on any error.
    async fn apply(&self, table: &TableModel, force: bool) -> Result<i64> {
        let mut session = self.target.begin().await?;
        match self.run_in_session(table, session.as_mut(), force).await {
            Ok(rows) => {
                session.commit().await?;
                Ok(rows)
            }
            Err(e) => {
                if let Err(rollback) = session.rollback().await {
                    warn!("{}: rollback failed: {}", table.qualified_name(), rollback);
                }
                Err(e)
            }
        }
    }

    async fn run_in_session(
        &self,
        table: &TableModel,
        session: &mut dyn TargetSession,
        force: bool,
    ) -> Result<i64> {
        let label = table.qualified_name();

        if force {
            for statement in table.drop_statements() {
                execute(session, &label, &statement).await?;
            }
        }

        let plan = table.ddl_plan(self.settings.create_foreign_keys, false);
        self.execute_all(session, &label, &plan).await?;

        let request = table.transfer_request()?;
        let source_rows = self
            .source
            .row_count(&request.source_schema, &request.source_table)
            .await?;
        let copied = table
            .migrate_data(self.source.as_ref(), session, self.mover.as_ref())
            .await?;
        let target_rows = session.row_count(&label).await?;
        debug!(
            "{}: source {} rows, copied {}, target {}",
            label, source_rows, copied, target_rows
        );
        if source_rows != target_rows {
            return Err(MigrateError::RowCountMismatch {
                table: label,
                source_rows,
                target_rows,
            });
        }

        if self.settings.reset_identity {
            for statement in table.identity_reset_statements() {
                execute(session, &label, &statement).await?;
            }
        }
        // After the load so row triggers do not fire on historical data.
        if self.settings.create_triggers {
            self.execute_all(session, &label, &table.generate_triggers_ddl())
                .await?;
        }

        Ok(target_rows)
    }

    async fn execute_all(
        &self,
        session: &mut dyn TargetSession,
        label: &str,
        statements: &[String],
    ) -> Result<()> {
        let mut executed = 0usize;
        let mut left_out = 0usize;
        for statement in statements {
            if is_comment(statement) {
                warn!("{}: {}", label, statement);
                left_out += 1;
                continue;
            }
            execute(session, label, statement).await?;
            executed += 1;
        }
        if executed + left_out > 0 {
            info!(
                "{}: executed {} statements, {} left out",
                label, executed, left_out
            );
        }
        Ok(())
    }
}

async fn execute(session: &mut dyn TargetSession, label: &str, statement: &str) -> Result<()> {
    debug!("{}: {}", label, statement);
    session.execute(statement).await.map_err(|e| {
        let head = statement.lines().next().unwrap_or(statement);
        MigrateError::transfer(label, format!("{}: {}", head, e))
    })?;
    Ok(())
}

/// Load a table and build its DDL plan without touching the target.
pub async fn plan_table(
    catalog: &dyn CatalogStore,
    schema: &str,
    name: &str,
    settings: &MigrationSettings,
    mapping: &MappingSettings,
) -> Result<TablePlan> {
    let mut table = TableModel::find(catalog, schema, name)
        .await?
        .ok_or_else(|| MigrateError::Catalog(format!("table {}.{} not found", schema, name)))?;
    table.load_metadata(catalog, mapping).await;
    Ok(table.to_plan(settings.create_foreign_keys, settings.create_triggers))
}

/// Operator reset of a table's status to `pending`.
///
/// A row whose stored status cannot be parsed is reset as well.
pub async fn reset_table(catalog: &dyn CatalogStore, schema: &str, name: &str) -> Result<StatusUpdate> {
    let row = catalog
        .find_target_table(schema, name)
        .await?
        .ok_or_else(|| MigrateError::Catalog(format!("table {}.{} not found", schema, name)))?;
    let mut table = match TableModel::from_row(&row) {
        Ok(table) => table,
        Err(e) => {
            warn!("{}.{}: {}, resetting anyway", schema, name, e);
            TableModel::from_row(&TargetTableRow {
                migration_status: None,
                ..row
            })?
        }
    };
    let update = table.reset();
    catalog.update_table_status(table.id, &update).await?;
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_duration_in_seconds() {
        let outcome = MigrationOutcome {
            table: "public.accnt".into(),
            success: true,
            skipped: false,
            duration: Duration::from_millis(1500),
            rows_migrated: 3,
            error: None,
            status: Some(MigrationStatus::Completed),
        };
        let json: serde_json::Value = serde_json::from_str(&outcome.to_json().unwrap()).unwrap();
        assert_eq!(json["duration_seconds"], 1.5);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["rows_migrated"], 3);
    }
}

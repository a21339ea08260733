//! Aggregate model of one migratable table.
//!
//! A [`TableModel`] is built from its `target_tables` row, then filled by
//! [`TableModel::load_metadata`]. When the table has computed columns it owns
//! a [`ViewModel`]; the physical columns go into the base table and the view
//! selects them back together with the translated expressions.
//!
//! DDL is applied in this order:
//! sequences, base table, indexes, key/check/default constraints, foreign
//! keys, view, triggers.

use super::{
    is_comment, CheckConstraintModel, ColumnClass, ColumnModel, DefaultConstraintModel, Entity,
    ForeignKeyModel, IndexModel, PrimaryKeyModel, SequenceModel, TriggerModel,
    UniqueConstraintModel, ViewModel, ViewOwner,
};
use crate::catalog::{CatalogStore, ConstraintKind, SourceTableRow, StatusUpdate, TargetTableRow};
use crate::config::MappingSettings;
use crate::db::{DataMover, SourceDatabase, TargetSession, TransferColumn, TransferRequest};
use crate::error::{MigrateError, Result};
use crate::identifier::{target_qualified_name, truncate_identifier};
use crate::mapping::{FunctionMappingState, MappingStatus};
use crate::status::MigrationStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Columns split by where they end up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnPartition {
    pub base: Vec<ColumnModel>,
    pub computed: Vec<ColumnModel>,
}

/// Serializable summary of one computed column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedColumnPlan {
    pub name: String,
    pub source_expression: String,
    pub status: MappingStatus,
    pub target_expression: Option<String>,
    pub notes: String,
}

/// Serializable DDL plan of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePlan {
    pub table_id: i64,
    pub schema: String,
    pub name: String,
    pub qualified_name: String,
    pub source: Option<String>,
    pub status: MigrationStatus,
    pub view_name: Option<String>,
    pub base_columns: Vec<String>,
    pub computed_columns: Vec<ComputedColumnPlan>,
    /// Statements in application order; comments mark entities left out.
    pub statements: Vec<String>,
    pub skipped: Vec<String>,
    pub issues: Vec<String>,
    pub problems: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TableModel {
    pub id: i64,
    pub source_table_id: Option<i64>,
    pub schema: String,
    pub name: String,
    /// Name of the wrapping view as recorded in the catalog.
    pub view_name: Option<String>,
    pub status: MigrationStatus,
    pub migration_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub rows_migrated: Option<i64>,

    pub source: Option<SourceTableRow>,
    pub columns: Vec<ColumnModel>,
    pub view: Option<ViewModel>,
    pub indexes: Vec<IndexModel>,
    pub primary_key: Option<PrimaryKeyModel>,
    pub unique_constraints: Vec<UniqueConstraintModel>,
    pub foreign_keys: Vec<ForeignKeyModel>,
    pub check_constraints: Vec<CheckConstraintModel>,
    pub default_constraints: Vec<DefaultConstraintModel>,
    pub sequences: Vec<SequenceModel>,
    pub triggers: Vec<TriggerModel>,

    /// Metadata inconsistencies found while loading.
    pub issues: Vec<String>,
    /// Entities left out of the DDL and why.
    pub skipped: Vec<String>,
    loaded: bool,
}

impl TableModel {
    pub fn from_row(row: &TargetTableRow) -> Result<Self> {
        let status = match row.migration_status.as_deref() {
            Some(s) if !s.trim().is_empty() => MigrationStatus::parse(s)?,
            _ => MigrationStatus::Pending,
        };

        Ok(Self {
            id: row.id,
            source_table_id: row.source_table_id,
            schema: row.schema_name.clone(),
            name: row.object_name.clone(),
            view_name: row.view_name.clone(),
            status,
            migration_date: row.migration_date,
            error_message: row.error_message.clone(),
            rows_migrated: row.rows_migrated,
            source: None,
            columns: Vec::new(),
            view: None,
            indexes: Vec::new(),
            primary_key: None,
            unique_constraints: Vec::new(),
            foreign_keys: Vec::new(),
            check_constraints: Vec::new(),
            default_constraints: Vec::new(),
            sequences: Vec::new(),
            triggers: Vec::new(),
            issues: Vec::new(),
            skipped: Vec::new(),
            loaded: false,
        })
    }

    /// Look up a table by target schema and name.
    pub async fn find(catalog: &dyn CatalogStore, schema: &str, name: &str) -> Result<Option<Self>> {
        match catalog.find_target_table(schema, name).await? {
            Some(row) => Ok(Some(Self::from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub fn qualified_name(&self) -> String {
        target_qualified_name(&self.schema, &truncate_identifier(&self.name))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Whether the table needs a wrapping view.
    pub fn has_view(&self) -> bool {
        self.view.is_some()
    }

    // ===== Loading =====

    /// Populate every entity from the catalog.
    ///
    /// Returns false on a catalog inconsistency that makes the table
    /// unusable; the reason is logged and kept in [`issues`](Self::issues).
    pub async fn load_metadata(&mut self, catalog: &dyn CatalogStore, settings: &MappingSettings) -> bool {
        match self.try_load(catalog, settings).await {
            Ok(()) => {
                self.loaded = true;
                info!(
                    "{}: loaded {} columns, {} indexes, view: {}",
                    self.qualified_name(),
                    self.columns.len(),
                    self.indexes.len(),
                    self.view.as_ref().map_or("none".to_string(), |v| v.qualified_view_name())
                );
                true
            }
            Err(e) => {
                error!("{}: failed to load metadata: {}", self.qualified_name(), e);
                self.issues.push(e.to_string());
                false
            }
        }
    }

    async fn try_load(&mut self, catalog: &dyn CatalogStore, settings: &MappingSettings) -> Result<()> {
        let qualified = self.qualified_name();
        self.reset_entities();

        let source_id = self.source_table_id.ok_or_else(|| {
            MigrateError::inconsistency(format!("table {}", qualified), "no source_table_id lineage")
        })?;
        let source = catalog.source_table(source_id).await?.ok_or_else(|| {
            MigrateError::inconsistency(
                format!("table {}", qualified),
                format!("source table {} does not exist", source_id),
            )
        })?;
        self.source = Some(source);

        let rules = catalog.function_mapping_rules().await?;
        let state = FunctionMappingState::from_settings(rules, settings);

        self.load_columns(catalog, &qualified).await?;
        self.load_view(catalog, &state, &qualified).await?;
        self.load_indexes(catalog, &qualified).await?;
        self.load_constraints(catalog, &state, &qualified).await?;

        self.sequences = catalog
            .sequences(self.id)
            .await?
            .iter()
            .map(SequenceModel::from_row)
            .collect();
        self.triggers = catalog
            .triggers(self.id)
            .await?
            .iter()
            .map(|row| TriggerModel::from_row(row, &qualified))
            .collect();

        Ok(())
    }

    fn reset_entities(&mut self) {
        self.loaded = false;
        self.source = None;
        self.columns.clear();
        self.view = None;
        self.indexes.clear();
        self.primary_key = None;
        self.unique_constraints.clear();
        self.foreign_keys.clear();
        self.check_constraints.clear();
        self.default_constraints.clear();
        self.sequences.clear();
        self.triggers.clear();
        self.issues.clear();
        self.skipped.clear();
    }

    async fn load_columns(&mut self, catalog: &dyn CatalogStore, qualified: &str) -> Result<()> {
        for row in catalog.target_columns(self.id).await? {
            let class = match row.target_type.as_deref() {
                None => ColumnClass::Physical,
                Some(raw) => ColumnClass::parse(raw).unwrap_or_else(|| {
                    warn!(
                        "{}: column {} has unknown target_type {}, treating as physical",
                        qualified, row.name, raw
                    );
                    ColumnClass::Physical
                }),
            };
            if row.source_name.is_none() && class == ColumnClass::Physical {
                let issue = format!(
                    "column {} has no source column lineage; reading it by its target name",
                    row.name
                );
                warn!("{}: {}", qualified, issue);
                self.issues.push(issue);
            }
            self.columns.push(ColumnModel::from_row(&row, class));
        }
        self.columns.sort_by_key(|c| c.ordinal_position);
        Ok(())
    }

    async fn load_view(
        &mut self,
        catalog: &dyn CatalogStore,
        state: &FunctionMappingState,
        qualified: &str,
    ) -> Result<()> {
        if self.columns.iter().all(|c| c.is_physical()) {
            if let Some(view_name) = &self.view_name {
                debug!("{}: no computed columns, view {} not needed", qualified, view_name);
            }
            return Ok(());
        }

        let base_columns = self
            .columns
            .iter()
            .filter(|c| c.is_physical())
            .map(|c| c.target_name())
            .collect();
        let mut view = ViewModel::new(&self.schema, self.view_name.as_deref().unwrap_or_default());
        view.attach(
            ViewOwner {
                table_id: self.id,
                qualified_name: qualified.to_string(),
            },
            base_columns,
        );
        view.load_computed_columns(catalog, state).await?;
        self.view = Some(view);
        Ok(())
    }

    async fn load_indexes(&mut self, catalog: &dyn CatalogStore, qualified: &str) -> Result<()> {
        for row in catalog.target_indexes(self.id).await? {
            match row.lineage_table_id {
                None => {
                    self.skip(
                        qualified,
                        format!("index {}: no source index lineage", row.name),
                    );
                    continue;
                }
                Some(lineage) if lineage != self.id => {
                    self.skip(
                        qualified,
                        format!(
                            "index {}: stored table_id {} but lineage leads to table {}",
                            row.name,
                            row.stored_table_id.unwrap_or_default(),
                            lineage
                        ),
                    );
                    continue;
                }
                Some(lineage) => {
                    if row.stored_table_id != Some(lineage) {
                        let issue = format!(
                            "index {}: stored table_id {:?} differs from lineage table {}",
                            row.name, row.stored_table_id, lineage
                        );
                        warn!("{}: {}", qualified, issue);
                        self.issues.push(issue);
                    }
                }
            }

            let columns = catalog.index_columns(row.id).await?;
            self.indexes.push(IndexModel::from_row(&row, qualified, &columns));
        }
        Ok(())
    }

    async fn load_constraints(
        &mut self,
        catalog: &dyn CatalogStore,
        state: &FunctionMappingState,
        qualified: &str,
    ) -> Result<()> {
        self.primary_key = catalog
            .primary_key(self.id)
            .await?
            .map(|row| PrimaryKeyModel::from_row(&row, qualified));
        self.promote_primary_key_index();

        self.unique_constraints = catalog
            .unique_constraints(self.id)
            .await?
            .iter()
            .map(|row| UniqueConstraintModel::from_row(row, qualified))
            .collect();
        self.foreign_keys = catalog
            .foreign_keys(self.id)
            .await?
            .iter()
            .map(|row| ForeignKeyModel::from_row(row, qualified))
            .collect();

        for row in catalog.check_constraints(self.id).await? {
            let mut check = CheckConstraintModel::from_row(&row, qualified);
            check.analyze_function_state(state);
            if !check.mapping.is_mapped() {
                warn!(
                    "{}: check constraint {} is {}: {}",
                    qualified, check.name, check.mapping.status, check.mapping.notes
                );
            }
            self.check_constraints.push(check);
        }

        for row in catalog.default_constraints(self.id).await? {
            self.default_constraints
                .push(DefaultConstraintModel::from_row(&row, qualified));
        }
        let covered: HashSet<String> = self
            .default_constraints
            .iter()
            .map(|d| d.column.to_lowercase())
            .collect();
        for column in self.columns.iter().filter(|c| c.is_physical()) {
            let Some(definition) = column.default_value.as_deref() else {
                continue;
            };
            if definition.trim().is_empty() || covered.contains(&column.name.to_lowercase()) {
                continue;
            }
            self.default_constraints.push(DefaultConstraintModel::from_column_default(
                &self.name,
                qualified,
                &column.name,
                definition,
            ));
        }
        for default in &mut self.default_constraints {
            default.analyze_function_state(state);
            if !default.mapping.is_mapped() {
                warn!(
                    "{}: default {} is {}: {}",
                    qualified, default.name, default.mapping.status, default.mapping.notes
                );
            }
        }
        Ok(())
    }

    /// Reuse the primary-key index for the constraint instead of building a
    /// second one over the same columns.
    fn promote_primary_key_index(&mut self) {
        let Some(pk) = self.primary_key.as_mut() else {
            return;
        };
        if pk.using_index.is_some() {
            return;
        }
        let wanted: Vec<String> = pk.columns.iter().map(|c| c.to_lowercase()).collect();
        let candidate = self.indexes.iter().find(|idx| {
            let columns: Vec<String> = idx
                .ordered_columns()
                .iter()
                .map(|c| c.column_name.to_lowercase())
                .collect();
            idx.is_primary_key
                && idx.validate()
                && idx.index_type == "btree"
                && idx.columns.iter().all(|c| !c.is_descending)
                && columns == wanted
        });
        if let Some(index) = candidate {
            pk.using_index = Some(index.name.clone());
        }
    }

    fn skip(&mut self, qualified: &str, reason: String) {
        warn!("{}: skipping {}", qualified, reason);
        self.skipped.push(reason);
    }

    // ===== Columns =====

    pub fn separate_columns(&self) -> ColumnPartition {
        let (base, computed): (Vec<ColumnModel>, Vec<ColumnModel>) =
            self.columns.iter().cloned().partition(|c| c.is_physical());
        ColumnPartition { base, computed }
    }

    fn physical_columns(&self) -> impl Iterator<Item = &ColumnModel> {
        self.columns.iter().filter(|c| c.is_physical())
    }

    // ===== DDL =====

    pub fn base_table_ddl(&self) -> String {
        let definitions = self
            .physical_columns()
            .map(|c| c.render_definition())
            .collect::<Vec<_>>();
        format!(
            "CREATE TABLE {} (\n    {}\n)",
            self.qualified_name(),
            definitions.join(",\n    ")
        )
    }

    /// Base table, then the view when there is one.
    pub fn table_statements(&self) -> Vec<String> {
        let mut statements = vec![self.base_table_ddl()];
        if let Some(view) = &self.view {
            statements.push(view.render_definition());
        }
        statements
    }

    pub fn generate_table_ddl(&self) -> String {
        join_statements(&self.table_statements())
    }

    /// One statement per valid index; invalid ones are left out.
    pub fn generate_indexes_ddl(&self) -> Vec<String> {
        let qualified = self.qualified_name();
        self.indexes
            .iter()
            .filter_map(|index| {
                let problems = index.problems();
                if problems.is_empty() {
                    Some(index.render_definition())
                } else {
                    warn!(
                        "{}: skipping index {}: {}",
                        qualified,
                        index.name,
                        problems.join("; ")
                    );
                    None
                }
            })
            .collect()
    }

    /// Key, check and default constraints, then foreign keys when asked.
    ///
    /// Unmapped check and default expressions come back as comments.
    pub fn generate_constraints_ddl(&self, include_foreign_keys: bool) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(pk) = &self.primary_key {
            statements.push(pk.render_definition());
        }
        statements.extend(self.unique_constraints.iter().map(|u| u.render_definition()));
        statements.extend(self.check_constraints.iter().map(|c| c.render_definition()));
        statements.extend(self.default_constraints.iter().map(|d| d.render_definition()));
        if include_foreign_keys {
            statements.extend(self.foreign_keys.iter().map(|f| f.render_definition()));
        }
        statements
    }

    pub fn generate_sequences_ddl(&self) -> Vec<String> {
        self.sequences.iter().map(|s| s.render_definition()).collect()
    }

    pub fn generate_triggers_ddl(&self) -> Vec<String> {
        self.triggers.iter().map(|t| t.render_definition()).collect()
    }

    /// Every statement of the table in application order.
    pub fn ddl_plan(&self, include_foreign_keys: bool, include_triggers: bool) -> Vec<String> {
        let mut statements = self.generate_sequences_ddl();
        statements.push(self.base_table_ddl());
        statements.extend(self.generate_indexes_ddl());
        statements.extend(self.generate_constraints_ddl(include_foreign_keys));
        if let Some(view) = &self.view {
            statements.push(view.render_definition());
        }
        if include_triggers {
            statements.extend(self.generate_triggers_ddl());
        }
        statements
    }

    /// Statements that remove whatever a previous run created.
    pub fn drop_statements(&self) -> Vec<String> {
        let mut statements = Vec::new();
        if let Some(view) = &self.view {
            statements.push(view.drop_statement());
        }
        statements.push(format!("DROP TABLE IF EXISTS {} CASCADE", self.qualified_name()));
        statements.extend(self.sequences.iter().map(|s| s.drop_statement()));
        statements
    }

    /// Advance each identity sequence past the loaded rows.
    pub fn identity_reset_statements(&self) -> Vec<String> {
        let qualified = self.qualified_name();
        self.physical_columns()
            .filter(|c| c.is_identity)
            .map(|c| {
                let column = c.target_name();
                format!(
                    "SELECT setval(pg_get_serial_sequence('{}', '{}'), GREATEST(COALESCE(MAX({}), 0), 1), MAX({}) IS NOT NULL) FROM {}",
                    qualified.replace('\'', "''"),
                    truncate_identifier(&c.name).replace('\'', "''"),
                    column,
                    column,
                    qualified
                )
            })
            .collect()
    }

    // ===== Data =====

    /// Source table, target table and column order for the data mover.
    pub fn transfer_request(&self) -> Result<TransferRequest> {
        let source = self.source.as_ref().ok_or_else(|| {
            MigrateError::transfer(self.qualified_name(), "metadata not loaded")
        })?;
        Ok(TransferRequest {
            source_schema: source.schema_name.clone(),
            source_table: source.object_name.clone(),
            target_table: self.qualified_name(),
            columns: self
                .physical_columns()
                .map(|c| TransferColumn {
                    source_name: c.source_name.clone(),
                    target_name: c.target_name(),
                    source_data_type: c.data_type.clone(),
                    is_identity: c.is_identity,
                })
                .collect(),
        })
    }

    /// Hand the rows over to the data mover inside an open session.
    pub async fn migrate_data(
        &self,
        source: &dyn SourceDatabase,
        session: &mut dyn TargetSession,
        mover: &dyn DataMover,
    ) -> Result<u64> {
        let request = self.transfer_request()?;
        mover.copy_rows(&request, source, session).await
    }

    // ===== Validation =====

    /// Problems that block DDL generation for the whole table.
    pub fn validation_problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.loaded {
            problems.push("metadata not loaded".to_string());
            return problems;
        }

        if self.physical_columns().next().is_none() {
            problems.push("table has no physical columns".to_string());
        }
        for column in self.physical_columns() {
            problems.extend(column.problems());
        }

        for index in &self.indexes {
            if index.name.trim().is_empty() || index.columns.is_empty() {
                problems.extend(index.problems());
            }
        }

        if let Some(pk) = &self.primary_key {
            problems.extend(pk.problems());
        }
        for unique in &self.unique_constraints {
            problems.extend(unique.problems());
        }
        for fk in &self.foreign_keys {
            if fk.name.trim().is_empty() || fk.columns.is_empty() {
                problems.extend(fk.problems());
            }
        }
        for check in &self.check_constraints {
            if check.name.trim().is_empty() {
                problems.push("check constraint has no name".to_string());
            }
        }
        for default in &self.default_constraints {
            if default.name.trim().is_empty() {
                problems.push("default constraint has no name".to_string());
            }
        }

        let has_computed = self.columns.iter().any(|c| !c.is_physical());
        match &self.view {
            None if has_computed => {
                problems.push("table has computed columns but no view".to_string());
            }
            Some(view) if view.view_name.trim().is_empty() => {
                problems.push("table has computed columns but no view name".to_string());
            }
            _ => {}
        }
        problems
    }

    pub fn validate_metadata(&self) -> bool {
        let problems = self.validation_problems();
        for problem in &problems {
            warn!("{}: validation failed: {}", self.qualified_name(), problem);
        }
        problems.is_empty()
    }

    // ===== Status =====

    fn transition(&mut self, to: MigrationStatus, force: bool) -> Result<()> {
        self.status.check_transition(&self.qualified_name(), to, force)?;
        info!("{}: {} -> {}", self.qualified_name(), self.status, to);
        self.status = to;
        self.migration_date = Some(Utc::now());
        Ok(())
    }

    /// Move to `in_progress`.
    pub fn begin(&mut self, force: bool) -> Result<StatusUpdate> {
        self.transition(MigrationStatus::InProgress, force)?;
        self.error_message = None;
        Ok(self.status_update())
    }

    pub fn complete(&mut self, rows: i64) -> Result<StatusUpdate> {
        self.transition(MigrationStatus::Completed, false)?;
        self.error_message = None;
        self.rows_migrated = Some(rows);
        Ok(self.status_update())
    }

    /// Move to `failed`; nothing of the run is kept, so the row count is 0.
    pub fn fail(&mut self, message: &str) -> Result<StatusUpdate> {
        self.transition(MigrationStatus::Failed, false)?;
        self.error_message = Some(message.to_string());
        self.rows_migrated = Some(0);
        Ok(self.status_update())
    }

    /// Operator reset back to `pending`.
    pub fn reset(&mut self) -> StatusUpdate {
        info!("{}: {} -> pending (reset)", self.qualified_name(), self.status);
        self.status = MigrationStatus::Pending;
        self.migration_date = None;
        self.error_message = None;
        self.rows_migrated = Some(0);
        self.status_update()
    }

    pub fn status_update(&self) -> StatusUpdate {
        StatusUpdate {
            status: self.status,
            migration_date: self.migration_date,
            error_message: self.error_message.clone(),
            rows_migrated: self.rows_migrated,
        }
    }

    /// Write expression mapping results back to the catalog.
    pub async fn persist_mappings(&self, catalog: &dyn CatalogStore) -> Result<()> {
        if let Some(view) = &self.view {
            for column in &view.computed_columns {
                catalog.record_column_mapping(column.id, &column.mapping).await?;
            }
        }
        for check in &self.check_constraints {
            catalog
                .record_constraint_mapping(ConstraintKind::Check, check.id, &check.mapping)
                .await?;
        }
        for default in &self.default_constraints {
            if let Some(id) = default.id {
                catalog
                    .record_constraint_mapping(ConstraintKind::Default, id, &default.mapping)
                    .await?;
            }
        }
        Ok(())
    }

    // ===== Serialization =====

    pub fn to_plan(&self, include_foreign_keys: bool, include_triggers: bool) -> TablePlan {
        let partition = self.separate_columns();
        let mut skipped = self.skipped.clone();
        for index in &self.indexes {
            let problems = index.problems();
            if !problems.is_empty() {
                skipped.push(format!("index {}: {}", index.name, problems.join("; ")));
            }
        }

        let statements = self.ddl_plan(include_foreign_keys, include_triggers);
        skipped.extend(statements.iter().filter(|s| is_comment(s)).cloned());

        TablePlan {
            table_id: self.id,
            schema: self.schema.clone(),
            name: self.name.clone(),
            qualified_name: self.qualified_name(),
            source: self
                .source
                .as_ref()
                .map(|s| format!("{}.{}", s.schema_name, s.object_name)),
            status: self.status,
            view_name: self.view.as_ref().map(|v| v.qualified_view_name()),
            base_columns: partition.base.iter().map(|c| c.name.clone()).collect(),
            computed_columns: self
                .view
                .iter()
                .flat_map(|v| v.computed_columns.iter())
                .map(|c| ComputedColumnPlan {
                    name: c.name.clone(),
                    source_expression: c.source_expression.clone(),
                    status: c.mapping.status,
                    target_expression: c.mapping.target_expression.clone(),
                    notes: c.mapping.notes.clone(),
                })
                .collect(),
            statements,
            skipped,
            issues: self.issues.clone(),
            problems: self.validation_problems(),
        }
    }
}

fn join_statements(statements: &[String]) -> String {
    statements
        .iter()
        .map(|s| if is_comment(s) { s.clone() } else { format!("{};", s) })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{
        CatalogSnapshot, ColumnRow, ExpressionConstraintRow, IndexColumnRow, KeyConstraintRow,
        MemoryCatalog, SourceTableRow,
    };
    use crate::catalog::{SourceIndexEntry, TargetIndexEntry};

    fn column(id: i64, table_id: i64, name: &str, data_type: &str, ordinal: i32) -> ColumnRow {
        ColumnRow {
            id,
            table_id,
            source_column_id: Some(id + 1000),
            source_name: Some(name.to_string()),
            name: name.to_string(),
            data_type: data_type.to_string(),
            max_length: 0,
            precision: 0,
            scale: 0,
            is_nullable: true,
            is_identity: false,
            default_value: None,
            ordinal_position: ordinal,
            target_type: Some("physical".to_string()),
            computed_definition: None,
            target_expression: None,
            mapping_status: None,
        }
    }

    fn table(id: i64, source_id: i64, name: &str, view: Option<&str>) -> TargetTableRow {
        TargetTableRow {
            id,
            source_table_id: Some(source_id),
            schema_name: "public".into(),
            object_name: name.into(),
            view_name: view.map(String::from),
            migration_status: None,
            migration_date: None,
            error_message: None,
            rows_migrated: None,
        }
    }

    fn accnt_snapshot() -> CatalogSnapshot {
        let mut key = column(1, 10, "account_key", "int", 1);
        key.is_identity = true;
        key.is_nullable = false;
        let mut num = column(2, 10, "account_num", "varchar", 2);
        num.max_length = 20;
        let mut name = column(3, 10, "account_name", "varchar", 3);
        name.max_length = 100;

        CatalogSnapshot {
            source_tables: vec![SourceTableRow {
                id: 1,
                schema_name: "dbo".into(),
                object_name: "accnt".into(),
            }],
            target_tables: vec![table(10, 1, "accnt", None)],
            columns: vec![name, key, num],
            source_indexes: vec![SourceIndexEntry {
                id: 100,
                table_id: 1,
                name: "pk_accnt".into(),
            }],
            target_indexes: vec![TargetIndexEntry {
                id: 1000,
                source_index_id: Some(100),
                table_id: Some(10),
                name: "pk_accnt".into(),
                index_type: None,
                is_unique: true,
                is_primary_key: true,
                fill_factor: None,
            }],
            index_columns: vec![IndexColumnRow {
                index_id: 1000,
                column_name: "account_key".into(),
                ordinal_position: 1,
                is_descending: false,
            }],
            ..Default::default()
        }
    }

    async fn load(snapshot: CatalogSnapshot, name: &str) -> TableModel {
        let catalog = MemoryCatalog::new(snapshot);
        let mut model = TableModel::find(&catalog, "public", name)
            .await
            .unwrap()
            .unwrap();
        assert!(model.load_metadata(&catalog, &MappingSettings::default()).await);
        model
    }

    #[tokio::test]
    async fn test_accnt_scenario() {
        let model = load(accnt_snapshot(), "accnt").await;

        let partition = model.separate_columns();
        assert_eq!(partition.base.len(), 3);
        assert!(partition.computed.is_empty());
        assert!(!model.has_view());

        let ddl = model.generate_table_ddl();
        assert!(!ddl.contains("CREATE VIEW"));
        assert_eq!(
            ddl,
            "CREATE TABLE public.accnt (\n    account_key integer GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n    \
             account_num varchar(20),\n    account_name varchar(100)\n);"
        );

        let indexes = model.generate_indexes_ddl();
        assert_eq!(
            indexes,
            vec!["CREATE UNIQUE INDEX pk_accnt ON public.accnt (account_key ASC)".to_string()]
        );
        assert!(model.validate_metadata());
    }

    #[tokio::test]
    async fn test_computed_column_gets_view() {
        let mut snapshot = accnt_snapshot();
        snapshot.target_tables[0].view_name = Some("accnt_v".into());
        let mut computed = column(4, 10, "safe_num", "int", 4);
        computed.target_type = Some("computed".into());
        computed.computed_definition = Some("isnull(x,0)".into());
        snapshot.columns.push(computed);

        let model = load(snapshot, "accnt").await;
        let partition = model.separate_columns();
        assert_eq!(partition.base.len(), 3);
        assert_eq!(partition.computed.len(), 1);

        let view = model.view.as_ref().unwrap();
        assert_eq!(view.computed_columns[0].mapping.status, MappingStatus::Mapped);

        let statements = model.table_statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE public.accnt"));
        assert!(!statements[0].contains("safe_num"));
        assert_eq!(
            statements[1],
            "CREATE VIEW public.accnt_v AS SELECT account_key, account_num, account_name, \
             COALESCE(x,0) AS safe_num FROM public.accnt"
        );
        assert!(model.validate_metadata());
    }

    #[tokio::test]
    async fn test_missing_view_name_fails_validation() {
        let mut snapshot = accnt_snapshot();
        let mut computed = column(4, 10, "safe_num", "int", 4);
        computed.target_type = Some("computed".into());
        computed.computed_definition = Some("isnull(x,0)".into());
        snapshot.columns.push(computed);

        let model = load(snapshot, "accnt").await;
        assert!(!model.validate_metadata());
        assert!(model
            .validation_problems()
            .iter()
            .any(|p| p.contains("no view name")));
    }

    #[tokio::test]
    async fn test_unknown_target_type_defaults_to_physical() {
        let mut snapshot = accnt_snapshot();
        snapshot.columns[0].target_type = Some("mystery".into());
        snapshot.columns[1].target_type = None;
        let model = load(snapshot, "accnt").await;

        let partition = model.separate_columns();
        assert_eq!(partition.base.len() + partition.computed.len(), model.columns.len());
        assert_eq!(partition.base.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_source_table_fails_load() {
        let mut snapshot = accnt_snapshot();
        snapshot.source_tables.clear();
        let catalog = MemoryCatalog::new(snapshot);
        let mut model = TableModel::find(&catalog, "public", "accnt")
            .await
            .unwrap()
            .unwrap();
        assert!(!model.load_metadata(&catalog, &MappingSettings::default()).await);
        assert!(!model.is_loaded());
        assert_eq!(model.issues.len(), 1);
        assert!(!model.validate_metadata());
    }

    #[tokio::test]
    async fn test_index_lineage_drift_is_warning() {
        let mut snapshot = accnt_snapshot();
        snapshot.target_indexes[0].table_id = Some(99);
        let model = load(snapshot, "accnt").await;
        assert_eq!(model.indexes.len(), 1);
        assert_eq!(model.issues.len(), 1);
        assert!(model.validate_metadata());
    }

    #[tokio::test]
    async fn test_index_of_other_table_is_skipped() {
        let mut snapshot = accnt_snapshot();
        snapshot.source_tables.push(SourceTableRow {
            id: 2,
            schema_name: "dbo".into(),
            object_name: "orders".into(),
        });
        snapshot.target_tables.push(table(20, 2, "orders", None));
        snapshot.source_indexes[0].table_id = 2;

        let model = load(snapshot, "accnt").await;
        assert!(model.indexes.is_empty());
        assert_eq!(model.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_column_index_blocks_validation() {
        let mut snapshot = accnt_snapshot();
        snapshot.index_columns.clear();
        let model = load(snapshot, "accnt").await;
        assert!(model.generate_indexes_ddl().is_empty());
        assert!(!model.validate_metadata());
    }

    #[tokio::test]
    async fn test_primary_key_reuses_index() {
        let mut snapshot = accnt_snapshot();
        snapshot.primary_keys.push(KeyConstraintRow {
            id: 1,
            table_id: 10,
            name: "pk_accnt".into(),
            column_names: vec!["account_key".into()],
            using_index: None,
        });
        let model = load(snapshot, "accnt").await;
        assert_eq!(
            model.generate_constraints_ddl(true),
            vec!["ALTER TABLE public.accnt ADD CONSTRAINT pk_accnt PRIMARY KEY USING INDEX pk_accnt".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unnamed_constraint_blocks_validation() {
        let mut snapshot = accnt_snapshot();
        snapshot.unique_constraints.push(KeyConstraintRow {
            id: 1,
            table_id: 10,
            name: String::new(),
            column_names: vec!["account_num".into()],
            using_index: None,
        });
        let model = load(snapshot, "accnt").await;
        assert!(!model.validate_metadata());
    }

    #[tokio::test]
    async fn test_defaults_and_checks_are_mapped_and_persisted() {
        let mut snapshot = accnt_snapshot();
        snapshot.columns[2].default_value = Some("('X')".into());
        snapshot.check_constraints.push(ExpressionConstraintRow {
            id: 7,
            table_id: 10,
            name: "ck_name".into(),
            column_name: Some("account_name".into()),
            source_definition: "(len([account_name])>0)".into(),
            postgres_definition: None,
            mapping_status: None,
        });
        let catalog = MemoryCatalog::new(snapshot);
        let mut model = TableModel::find(&catalog, "public", "accnt")
            .await
            .unwrap()
            .unwrap();
        assert!(model.load_metadata(&catalog, &MappingSettings::default()).await);

        let constraints = model.generate_constraints_ddl(true);
        assert_eq!(
            constraints,
            vec![
                "ALTER TABLE public.accnt ADD CONSTRAINT ck_name CHECK ((LENGTH(account_name)>0))"
                    .to_string(),
                "ALTER TABLE public.accnt ALTER COLUMN account_num SET DEFAULT ('X')".to_string(),
            ]
        );

        model.persist_mappings(&catalog).await.unwrap();
        let snapshot = catalog.snapshot().await;
        assert_eq!(
            snapshot.check_constraints[0].postgres_definition.as_deref(),
            Some("(LENGTH(account_name)>0)")
        );
        assert_eq!(snapshot.check_constraints[0].mapping_status.as_deref(), Some("mapped"));
    }

    #[tokio::test]
    async fn test_identity_reset_and_transfer_request() {
        let model = load(accnt_snapshot(), "accnt").await;
        assert_eq!(
            model.identity_reset_statements(),
            vec![
                "SELECT setval(pg_get_serial_sequence('public.accnt', 'account_key'), \
                 GREATEST(COALESCE(MAX(account_key), 0), 1), MAX(account_key) IS NOT NULL) \
                 FROM public.accnt"
                    .to_string()
            ]
        );

        let request = model.transfer_request().unwrap();
        assert_eq!(request.source_schema, "dbo");
        assert_eq!(request.source_table, "accnt");
        assert_eq!(request.target_table, "public.accnt");
        assert_eq!(
            request.target_columns(),
            vec!["account_key", "account_num", "account_name"]
        );
    }

    #[tokio::test]
    async fn test_identity_reset_uses_truncated_column_name() {
        let long = format!("account_key_{}", "x".repeat(60));
        let mut snapshot = accnt_snapshot();
        snapshot.columns[1].name = long.clone();
        snapshot.columns[1].source_name = Some(long.clone());
        snapshot.target_indexes.clear();
        snapshot.index_columns.clear();

        let model = load(snapshot, "accnt").await;
        let created = &long[..63];
        assert_eq!(
            model.identity_reset_statements(),
            vec![format!(
                "SELECT setval(pg_get_serial_sequence('public.accnt', '{created}'), \
                 GREATEST(COALESCE(MAX({created}), 0), 1), MAX({created}) IS NOT NULL) \
                 FROM public.accnt"
            )]
        );
        assert!(model.base_table_ddl().contains(created));
        assert!(!model.base_table_ddl().contains(&long));
    }

    #[tokio::test]
    async fn test_status_machine() {
        let mut model = load(accnt_snapshot(), "accnt").await;
        assert_eq!(model.status, MigrationStatus::Pending);

        assert!(model.complete(3).is_err());
        model.begin(false).unwrap();
        let update = model.complete(3).unwrap();
        assert_eq!(update.status, MigrationStatus::Completed);
        assert!(update.error_message.is_none());
        assert_eq!(update.rows_migrated, Some(3));

        assert!(model.begin(false).is_err());
        model.begin(true).unwrap();
        let update = model.fail("boom").unwrap();
        assert_eq!(update.status, MigrationStatus::Failed);
        assert_eq!(update.error_message.as_deref(), Some("boom"));
        assert_eq!(update.rows_migrated, Some(0));

        let update = model.reset();
        assert_eq!(update.status, MigrationStatus::Pending);
        assert!(update.error_message.is_none());
    }

    #[tokio::test]
    async fn test_plan_lists_statements_in_order() {
        let model = load(accnt_snapshot(), "accnt").await;
        let plan = model.to_plan(true, true);
        assert_eq!(plan.qualified_name, "public.accnt");
        assert_eq!(plan.source.as_deref(), Some("dbo.accnt"));
        assert_eq!(plan.statements.len(), 2);
        assert!(plan.statements[0].starts_with("CREATE TABLE"));
        assert!(plan.statements[1].starts_with("CREATE UNIQUE INDEX"));
        assert!(plan.problems.is_empty());
        assert!(serde_json::to_string(&plan).is_ok());
    }

    #[test]
    fn test_drop_statements() {
        let model = TableModel::from_row(&table(10, 1, "Accnt", Some("accnt_v"))).unwrap();
        assert_eq!(
            model.drop_statements(),
            vec!["DROP TABLE IF EXISTS public.\"Accnt\" CASCADE".to_string()]
        );
    }

    #[test]
    fn test_invalid_status_is_rejected() {
        let mut row = table(10, 1, "accnt", None);
        row.migration_status = Some("exploded".into());
        assert!(TableModel::from_row(&row).is_err());
    }
}

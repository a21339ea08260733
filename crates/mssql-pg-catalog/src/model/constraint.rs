//! Key, foreign key, check and default constraint models.

use super::{column_list, mapping_placeholder, object_name, placeholder, Entity};
use crate::catalog::{ExpressionConstraintRow, ForeignKeyRow, KeyConstraintRow};
use crate::identifier::{target_qualified_name, truncate_identifier};
use crate::mapping::{FunctionMappingState, MappingOutcome};

/// Map SQL Server referential action to PostgreSQL.
pub fn map_referential_action(action: &str) -> &'static str {
    match action.trim().to_uppercase().replace(' ', "_").as_str() {
        "CASCADE" => "CASCADE",
        "SET_NULL" => "SET NULL",
        "SET_DEFAULT" => "SET DEFAULT",
        "RESTRICT" => "RESTRICT",
        "NO_ACTION" => "NO ACTION",
        _ => "NO ACTION",
    }
}

fn render_key(
    keyword: &str,
    table: &str,
    name: &str,
    columns: &[String],
    using_index: Option<&str>,
) -> String {
    match using_index {
        Some(index) => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {} USING INDEX {}",
            table,
            object_name(name),
            keyword,
            object_name(index)
        ),
        None => format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {} ({})",
            table,
            object_name(name),
            keyword,
            column_list(columns)
        ),
    }
}

fn key_problems(kind: &str, name: &str, columns: &[String], using_index: Option<&str>) -> Vec<String> {
    let mut problems = Vec::new();
    if name.trim().is_empty() {
        problems.push(format!("{} has no name", kind));
    }
    if columns.is_empty() && using_index.is_none() {
        problems.push(format!("{} {} has no columns", kind, name));
    }
    if columns.iter().any(|c| c.trim().is_empty()) {
        problems.push(format!("{} {} has an unnamed column", kind, name));
    }
    problems
}

/// Primary key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryKeyModel {
    pub id: i64,
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    /// Unique index promoted to the key instead of building a new one.
    pub using_index: Option<String>,
}

impl PrimaryKeyModel {
    pub fn from_row(row: &KeyConstraintRow, table_name: &str) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            table_name: table_name.to_string(),
            columns: row.column_names.clone(),
            using_index: row.using_index.clone(),
        }
    }
}

impl Entity for PrimaryKeyModel {
    fn kind(&self) -> &'static str {
        "primary key"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if !problems.is_empty() {
            return placeholder("skipped", self.kind(), &self.name, &problems.join("; "));
        }
        render_key(
            "PRIMARY KEY",
            &self.table_name,
            &self.name,
            &self.columns,
            self.using_index.as_deref(),
        )
    }

    fn problems(&self) -> Vec<String> {
        key_problems(self.kind(), &self.name, &self.columns, self.using_index.as_deref())
    }
}

/// Unique constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueConstraintModel {
    pub id: i64,
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    pub using_index: Option<String>,
}

impl UniqueConstraintModel {
    pub fn from_row(row: &KeyConstraintRow, table_name: &str) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            table_name: table_name.to_string(),
            columns: row.column_names.clone(),
            using_index: row.using_index.clone(),
        }
    }
}

impl Entity for UniqueConstraintModel {
    fn kind(&self) -> &'static str {
        "unique constraint"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if !problems.is_empty() {
            return placeholder("skipped", self.kind(), &self.name, &problems.join("; "));
        }
        render_key(
            "UNIQUE",
            &self.table_name,
            &self.name,
            &self.columns,
            self.using_index.as_deref(),
        )
    }

    fn problems(&self) -> Vec<String> {
        key_problems(self.kind(), &self.name, &self.columns, self.using_index.as_deref())
    }
}

/// Foreign key constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyModel {
    pub id: i64,
    pub name: String,
    pub table_name: String,
    pub columns: Vec<String>,
    /// Resolved, schema-qualified referenced table.
    pub ref_table: String,
    pub ref_columns: Vec<String>,
    pub on_delete: &'static str,
    pub on_update: &'static str,
}

impl ForeignKeyModel {
    pub fn from_row(row: &ForeignKeyRow, table_name: &str) -> Self {
        let ref_table = if row.ref_table.trim().is_empty() {
            String::new()
        } else {
            target_qualified_name(&row.ref_schema, &truncate_identifier(&row.ref_table))
        };
        Self {
            id: row.id,
            name: row.name.clone(),
            table_name: table_name.to_string(),
            columns: row.column_names.clone(),
            ref_table,
            ref_columns: row.ref_column_names.clone(),
            on_delete: map_referential_action(row.on_delete.as_deref().unwrap_or("")),
            on_update: map_referential_action(row.on_update.as_deref().unwrap_or("")),
        }
    }
}

impl Entity for ForeignKeyModel {
    fn kind(&self) -> &'static str {
        "foreign key"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if !problems.is_empty() {
            return placeholder("skipped", self.kind(), &self.name, &problems.join("; "));
        }
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.table_name,
            object_name(&self.name),
            column_list(&self.columns),
            self.ref_table,
            column_list(&self.ref_columns),
            self.on_delete,
            self.on_update
        )
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = key_problems(self.kind(), &self.name, &self.columns, None);
        if self.ref_table.is_empty() {
            problems.push(format!("foreign key {} has no referenced table", self.name));
        }
        if self.columns.len() != self.ref_columns.len() {
            problems.push(format!(
                "foreign key {} maps {} columns onto {} referenced columns",
                self.name,
                self.columns.len(),
                self.ref_columns.len()
            ));
        }
        problems
    }
}

/// Check constraint with a translated expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConstraintModel {
    pub id: i64,
    pub name: String,
    pub table_name: String,
    pub column: Option<String>,
    pub source_definition: String,
    pub mapping: MappingOutcome,
}

impl CheckConstraintModel {
    pub fn from_row(row: &ExpressionConstraintRow, table_name: &str) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            table_name: table_name.to_string(),
            column: row.column_name.clone(),
            source_definition: row.source_definition.clone(),
            mapping: MappingOutcome::pending(),
        }
    }

    pub fn analyze_function_state(&mut self, state: &FunctionMappingState) -> &MappingOutcome {
        self.mapping = state.analyze(&self.source_definition);
        &self.mapping
    }
}

impl Entity for CheckConstraintModel {
    fn kind(&self) -> &'static str {
        "check constraint"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        match (&self.mapping.target_expression, self.mapping.is_mapped()) {
            (Some(expr), true) if !self.name.trim().is_empty() => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
                self.table_name,
                object_name(&self.name),
                expr
            ),
            _ => mapping_placeholder(
                self.mapping.status,
                self.kind(),
                &self.name,
                &self.source_definition,
                &self.mapping.notes,
            ),
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("check constraint has no name".to_string());
        }
        if !self.mapping.is_mapped() {
            problems.push(format!(
                "check constraint {} is {}: {}",
                self.name, self.mapping.status, self.mapping.notes
            ));
        }
        problems
    }
}

/// Column default with a translated expression.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConstraintModel {
    /// Catalog id; `None` when built from a column's `default_value`.
    pub id: Option<i64>,
    pub name: String,
    pub table_name: String,
    pub column: String,
    pub source_definition: String,
    pub mapping: MappingOutcome,
}

impl DefaultConstraintModel {
    pub fn from_row(row: &ExpressionConstraintRow, table_name: &str) -> Self {
        Self {
            id: Some(row.id),
            name: row.name.clone(),
            table_name: table_name.to_string(),
            column: row.column_name.clone().unwrap_or_default(),
            source_definition: row.source_definition.clone(),
            mapping: MappingOutcome::pending(),
        }
    }

    /// Default taken from a column's `default_value` when no constraint row exists.
    pub fn from_column_default(table: &str, table_name: &str, column: &str, definition: &str) -> Self {
        Self {
            id: None,
            name: truncate_identifier(&format!("df_{}_{}", table, column)),
            table_name: table_name.to_string(),
            column: column.to_string(),
            source_definition: definition.to_string(),
            mapping: MappingOutcome::pending(),
        }
    }

    pub fn analyze_function_state(&mut self, state: &FunctionMappingState) -> &MappingOutcome {
        self.mapping = state.analyze(&self.source_definition);
        &self.mapping
    }
}

impl Entity for DefaultConstraintModel {
    fn kind(&self) -> &'static str {
        "default constraint"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        match (&self.mapping.target_expression, self.mapping.is_mapped()) {
            (Some(expr), true) if !self.column.trim().is_empty() => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                self.table_name,
                object_name(&self.column),
                expr
            ),
            _ => mapping_placeholder(
                self.mapping.status,
                self.kind(),
                &self.name,
                &self.source_definition,
                &self.mapping.notes,
            ),
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("default constraint has no name".to_string());
        }
        if self.column.trim().is_empty() {
            problems.push(format!("default constraint {} has no column", self.name));
        }
        if !self.mapping.is_mapped() {
            problems.push(format!(
                "default constraint {} is {}: {}",
                self.name, self.mapping.status, self.mapping.notes
            ));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::MappingStatus;
    use crate::model::is_comment;

    fn state() -> FunctionMappingState {
        FunctionMappingState::builtin(80)
    }

    #[test]
    fn test_referential_actions() {
        assert_eq!(map_referential_action("CASCADE"), "CASCADE");
        assert_eq!(map_referential_action("set_null"), "SET NULL");
        assert_eq!(map_referential_action("SET DEFAULT"), "SET DEFAULT");
        assert_eq!(map_referential_action("NO_ACTION"), "NO ACTION");
        assert_eq!(map_referential_action(""), "NO ACTION");
    }

    #[test]
    fn test_primary_key_rendering() {
        let pk = PrimaryKeyModel {
            id: 1,
            name: "PK_Accnt".into(),
            table_name: "public.accnt".into(),
            columns: vec!["account_key".into()],
            using_index: None,
        };
        assert_eq!(
            pk.render_definition(),
            "ALTER TABLE public.accnt ADD CONSTRAINT \"PK_Accnt\" PRIMARY KEY (account_key)"
        );

        let promoted = PrimaryKeyModel {
            using_index: Some("pk_accnt_idx".into()),
            columns: Vec::new(),
            ..pk
        };
        assert_eq!(
            promoted.render_definition(),
            "ALTER TABLE public.accnt ADD CONSTRAINT \"PK_Accnt\" PRIMARY KEY USING INDEX pk_accnt_idx"
        );
    }

    #[test]
    fn test_unnamed_unique_constraint_is_invalid() {
        let uq = UniqueConstraintModel {
            id: 1,
            name: " ".into(),
            table_name: "public.accnt".into(),
            columns: vec!["account_num".into()],
            using_index: None,
        };
        assert!(!uq.validate());
        assert!(is_comment(&uq.render_definition()));
    }

    #[test]
    fn test_foreign_key_rendering() {
        let row = ForeignKeyRow {
            id: 3,
            table_id: 20,
            name: "fk_orders_accnt".into(),
            column_names: vec!["account_key".into()],
            ref_schema: "public".into(),
            ref_table: "accnt".into(),
            ref_column_names: vec!["account_key".into()],
            on_delete: Some("CASCADE".into()),
            on_update: None,
        };
        let fk = ForeignKeyModel::from_row(&row, "public.orders");
        assert_eq!(
            fk.render_definition(),
            "ALTER TABLE public.orders ADD CONSTRAINT fk_orders_accnt FOREIGN KEY (account_key) \
             REFERENCES public.accnt (account_key) ON DELETE CASCADE ON UPDATE NO ACTION"
        );
    }

    #[test]
    fn test_foreign_key_column_count_mismatch() {
        let fk = ForeignKeyModel {
            id: 1,
            name: "fk".into(),
            table_name: "public.t".into(),
            columns: vec!["a".into(), "b".into()],
            ref_table: "public.r".into(),
            ref_columns: vec!["a".into()],
            on_delete: "NO ACTION",
            on_update: "NO ACTION",
        };
        assert!(!fk.validate());
    }

    #[test]
    fn test_check_constraint_mapping() {
        let row = ExpressionConstraintRow {
            id: 4,
            table_id: 10,
            name: "ck_created".into(),
            column_name: Some("created_at".into()),
            source_definition: "([created_at]<=getdate())".into(),
            postgres_definition: None,
            mapping_status: None,
        };
        let mut check = CheckConstraintModel::from_row(&row, "public.accnt");
        assert!(!check.validate());

        check.analyze_function_state(&state());
        assert_eq!(check.mapping.status, MappingStatus::Mapped);
        assert_eq!(
            check.render_definition(),
            "ALTER TABLE public.accnt ADD CONSTRAINT ck_created CHECK ((created_at<=CURRENT_TIMESTAMP))"
        );
        assert!(check.validate());
    }

    #[test]
    fn test_unmapped_check_renders_placeholder() {
        let row = ExpressionConstraintRow {
            id: 4,
            table_id: 10,
            name: "ck_code".into(),
            column_name: None,
            source_definition: "dbo.is_valid_code([code])=1".into(),
            postgres_definition: None,
            mapping_status: None,
        };
        let mut check = CheckConstraintModel::from_row(&row, "public.accnt");
        check.analyze_function_state(&state());
        assert!(is_comment(&check.render_definition()));
        assert!(!check.validate());
    }

    #[test]
    fn test_default_from_column_value() {
        let mut default = DefaultConstraintModel::from_column_default(
            "accnt",
            "public.accnt",
            "created_at",
            "(getdate())",
        );
        assert_eq!(default.name, "df_accnt_created_at");
        default.analyze_function_state(&state());
        assert_eq!(
            default.render_definition(),
            "ALTER TABLE public.accnt ALTER COLUMN created_at SET DEFAULT (CURRENT_TIMESTAMP)"
        );
        assert!(default.id.is_none());
    }
}

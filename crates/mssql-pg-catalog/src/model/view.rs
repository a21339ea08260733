//! The view that wraps a base table and carries its computed columns.

use super::{placeholder, ComputedColumnModel, Entity};
use crate::catalog::CatalogStore;
use crate::error::{MigrateError, Result};
use crate::identifier::{target_qualified_name, truncate_identifier};
use crate::mapping::FunctionMappingState;
use tracing::warn;

/// Back-reference from a view to the table that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOwner {
    pub table_id: i64,
    /// Resolved, schema-qualified base table.
    pub qualified_name: String,
}

/// `CREATE VIEW` over a base table plus its computed columns.
///
/// The owner is attached after construction, once the table's names are
/// known; until then the view cannot load or render.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub view_name: String,
    pub schema: String,
    /// Resolved, schema-qualified base table; set by [`attach`](Self::attach).
    pub base_table: String,
    /// Resolved base column names in select order.
    pub base_columns: Vec<String>,
    pub computed_columns: Vec<ComputedColumnModel>,
    owner: Option<ViewOwner>,
}

impl ViewModel {
    pub fn new(schema: &str, view_name: &str) -> Self {
        Self {
            view_name: view_name.to_string(),
            schema: schema.to_string(),
            base_table: String::new(),
            base_columns: Vec::new(),
            computed_columns: Vec::new(),
            owner: None,
        }
    }

    /// Link the view to its owning table and the columns it selects.
    pub fn attach(&mut self, owner: ViewOwner, base_columns: Vec<String>) {
        self.base_table = owner.qualified_name.clone();
        self.base_columns = base_columns;
        self.owner = Some(owner);
    }

    pub fn qualified_view_name(&self) -> String {
        target_qualified_name(&self.schema, &truncate_identifier(&self.view_name))
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP VIEW IF EXISTS {}", self.qualified_view_name())
    }

    /// Read the owner's computed columns and translate each expression.
    ///
    /// Returns the number of columns that did not map.
    pub async fn load_computed_columns(
        &mut self,
        catalog: &dyn CatalogStore,
        state: &FunctionMappingState,
    ) -> Result<usize> {
        let owner = self.owner.as_ref().ok_or_else(|| {
            MigrateError::inconsistency(
                format!("view {}", self.view_name),
                "view has no owning table",
            )
        })?;

        let rows = catalog.computed_columns(owner.table_id).await?;
        let mut unmapped = 0;
        self.computed_columns = rows
            .iter()
            .map(|row| {
                let mut column = ComputedColumnModel::from_row(row);
                column.analyze_function_state(state);
                if !column.mapping.is_mapped() {
                    unmapped += 1;
                    warn!(
                        "{}: computed column {} is {}: {}",
                        owner.qualified_name, column.name, column.mapping.status, column.mapping.notes
                    );
                }
                column
            })
            .collect();
        self.computed_columns.sort_by_key(|c| c.ordinal_position);
        Ok(unmapped)
    }

    pub fn render_view_ddl(&self) -> String {
        let columns = self
            .base_columns
            .iter()
            .cloned()
            .chain(self.computed_columns.iter().map(|c| c.select_expression()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE VIEW {} AS SELECT {} FROM {}",
            self.qualified_view_name(),
            columns,
            self.base_table
        )
    }
}

impl Entity for ViewModel {
    fn kind(&self) -> &'static str {
        "view"
    }

    fn name(&self) -> &str {
        &self.view_name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if problems.is_empty() {
            self.render_view_ddl()
        } else {
            placeholder("skipped", self.kind(), &self.view_name, &problems.join("; "))
        }
    }

    // Unmapped computed columns are not problems: they render as typed NULLs.
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.view_name.trim().is_empty() {
            problems.push("view has no name".to_string());
        }
        if self.owner.is_none() {
            problems.push(format!("view {} has no owning table", self.view_name));
        }
        if self.base_columns.is_empty() && self.computed_columns.is_empty() {
            problems.push(format!("view {} selects no columns", self.view_name));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogSnapshot, ColumnRow, MemoryCatalog};
    use crate::mapping::MappingStatus;

    fn computed(id: i64, name: &str, ordinal: i32, expression: &str) -> ColumnRow {
        ColumnRow {
            id,
            table_id: 10,
            source_column_id: Some(id + 100),
            source_name: Some(name.to_string()),
            name: name.to_string(),
            data_type: "int".to_string(),
            max_length: 0,
            precision: 0,
            scale: 0,
            is_nullable: true,
            is_identity: false,
            default_value: None,
            ordinal_position: ordinal,
            target_type: Some("computed".to_string()),
            computed_definition: Some(expression.to_string()),
            target_expression: None,
            mapping_status: None,
        }
    }

    fn catalog() -> MemoryCatalog {
        MemoryCatalog::new(CatalogSnapshot {
            columns: vec![
                computed(2, "bad", 3, "dbo.fn_mystery([x])"),
                computed(1, "safe_x", 2, "isnull([x],0)"),
            ],
            ..Default::default()
        })
    }

    fn attached() -> ViewModel {
        let mut view = ViewModel::new("public", "orders_v");
        view.attach(
            ViewOwner {
                table_id: 10,
                qualified_name: "public.orders".into(),
            },
            vec!["x".into()],
        );
        view
    }

    #[tokio::test]
    async fn test_load_requires_owner() {
        let mut view = ViewModel::new("public", "orders_v");
        let state = FunctionMappingState::builtin(80);
        assert!(view.load_computed_columns(&catalog(), &state).await.is_err());
        assert!(!view.validate());
    }

    #[tokio::test]
    async fn test_render_view_keeps_unmapped_columns() {
        let mut view = attached();
        let state = FunctionMappingState::builtin(80);
        let unmapped = view.load_computed_columns(&catalog(), &state).await.unwrap();
        assert_eq!(unmapped, 1);

        assert_eq!(view.computed_columns[0].name, "safe_x");
        assert_eq!(view.computed_columns[0].mapping.status, MappingStatus::Mapped);
        assert_eq!(view.computed_columns[1].mapping.status, MappingStatus::NoMappingModel);

        let ddl = view.render_view_ddl();
        assert!(ddl.starts_with("CREATE VIEW public.orders_v AS SELECT x, COALESCE(x,0) AS safe_x, NULL::integer /* no_mapping_model: "));
        assert!(ddl.ends_with(" AS bad FROM public.orders"));
        assert!(view.validate());
    }

    #[test]
    fn test_unnamed_view_is_invalid() {
        let mut view = attached();
        view.view_name = String::new();
        assert!(!view.validate());
        assert!(crate::model::is_comment(&view.render_definition()));
    }
}

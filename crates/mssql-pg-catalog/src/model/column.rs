//! Physical and computed column models.

use super::{mapping_placeholder, object_name, sanitize_comment, Entity};
use crate::catalog::ColumnRow;
use crate::mapping::{FunctionMappingState, MappingOutcome};
use crate::typemap::{is_integer_type, map_column_type};
use serde::Serialize;

/// Where a column ends up on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnClass {
    /// Materialized in the base table.
    Physical,
    /// Derived by expression in the wrapping view.
    Computed,
}

impl ColumnClass {
    /// Parse a catalog `target_type`. `both` is a physical column.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "physical" | "both" | "base" | "table" => Some(ColumnClass::Physical),
            "computed" | "view" => Some(ColumnClass::Computed),
            _ => None,
        }
    }
}

/// A column as described by the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub id: i64,
    pub name: String,
    /// Column name on the source side, used to read data.
    pub source_name: String,
    pub data_type: String,
    pub max_length: i32,
    pub precision: i32,
    pub scale: i32,
    pub is_nullable: bool,
    pub is_identity: bool,
    pub default_value: Option<String>,
    pub ordinal_position: i32,
    pub class: ColumnClass,
}

impl ColumnModel {
    pub fn from_row(row: &ColumnRow, class: ColumnClass) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            source_name: row.source_name.clone().unwrap_or_else(|| row.name.clone()),
            data_type: row.data_type.clone(),
            max_length: row.max_length,
            precision: row.precision,
            scale: row.scale,
            is_nullable: row.is_nullable,
            is_identity: row.is_identity,
            default_value: row.default_value.clone(),
            ordinal_position: row.ordinal_position,
            class,
        }
    }

    pub fn target_name(&self) -> String {
        object_name(&self.name)
    }

    pub fn pg_type(&self) -> String {
        map_column_type(&self.data_type, self.max_length, self.precision, self.scale)
    }

    pub fn is_physical(&self) -> bool {
        self.class == ColumnClass::Physical
    }
}

impl Entity for ColumnModel {
    fn kind(&self) -> &'static str {
        "column"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let identity = if self.is_identity {
            " GENERATED BY DEFAULT AS IDENTITY"
        } else {
            ""
        };
        let nullable = if self.is_nullable { "" } else { " NOT NULL" };
        format!("{} {}{}{}", self.target_name(), self.pg_type(), identity, nullable)
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("column has no name".to_string());
        }
        if self.data_type.trim().is_empty() {
            problems.push(format!("column {} has no data type", self.name));
        }
        if self.is_identity && !is_integer_type(&self.data_type) {
            problems.push(format!(
                "identity column {} has non-integer type {}",
                self.name, self.data_type
            ));
        }
        problems
    }
}

/// A computed column carried into the wrapping view.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedColumnModel {
    pub id: i64,
    pub name: String,
    pub data_type: String,
    pub max_length: i32,
    pub precision: i32,
    pub scale: i32,
    pub ordinal_position: i32,
    /// T-SQL expression from the source catalog.
    pub source_expression: String,
    pub mapping: MappingOutcome,
}

impl ComputedColumnModel {
    pub fn from_row(row: &ColumnRow) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            data_type: row.data_type.clone(),
            max_length: row.max_length,
            precision: row.precision,
            scale: row.scale,
            ordinal_position: row.ordinal_position,
            source_expression: row.computed_definition.clone().unwrap_or_default(),
            mapping: MappingOutcome::pending(),
        }
    }

    /// Translate the source expression and keep the outcome on the column.
    pub fn analyze_function_state(&mut self, state: &FunctionMappingState) -> &MappingOutcome {
        self.mapping = state.analyze(&self.source_expression);
        &self.mapping
    }

    pub fn target_name(&self) -> String {
        object_name(&self.name)
    }

    pub fn pg_type(&self) -> String {
        map_column_type(&self.data_type, self.max_length, self.precision, self.scale)
    }

    /// Select-list item for the view; a typed NULL keeps the column in
    /// place when the expression did not map.
    pub fn select_expression(&self) -> String {
        match (&self.mapping.target_expression, self.mapping.is_mapped()) {
            (Some(expr), true) => format!("{} AS {}", expr, self.target_name()),
            _ => format!(
                "NULL::{} /* {}: {} */ AS {}",
                self.pg_type(),
                self.mapping.status,
                sanitize_comment(&self.source_expression),
                self.target_name()
            ),
        }
    }
}

impl Entity for ComputedColumnModel {
    fn kind(&self) -> &'static str {
        "computed column"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        match (&self.mapping.target_expression, self.mapping.is_mapped()) {
            (Some(expr), true) => format!("{} AS {}", expr, self.target_name()),
            _ => mapping_placeholder(
                self.mapping.status,
                self.kind(),
                &self.name,
                &self.source_expression,
                &self.mapping.notes,
            ),
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("computed column has no name".to_string());
        }
        if !self.mapping.is_mapped() {
            problems.push(format!(
                "computed column {} is {}: {}",
                self.name, self.mapping.status, self.mapping.notes
            ));
        }
        problems
    }
}

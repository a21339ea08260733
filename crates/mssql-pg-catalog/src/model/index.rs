//! Index and index column models.

use super::{object_name, placeholder, Entity};
use crate::catalog::{IndexColumnRow, IndexRow};
use std::collections::HashSet;

/// Access methods an index may use.
pub const ALLOWED_INDEX_TYPES: &[&str] = &["btree", "hash", "gist", "spgist", "gin", "brin"];

const DEFAULT_INDEX_TYPE: &str = "btree";

/// Fill factor the target applies when none is given.
const DEFAULT_FILL_FACTOR: i32 = 90;

/// One key column of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumnModel {
    pub column_name: String,
    pub ordinal_position: i32,
    pub is_descending: bool,
}

impl IndexColumnModel {
    pub fn new(column_name: &str, ordinal_position: i32, is_descending: bool) -> Self {
        Self {
            column_name: column_name.to_string(),
            ordinal_position,
            is_descending,
        }
    }

    pub fn from_row(row: &IndexColumnRow) -> Self {
        Self::new(&row.column_name, row.ordinal_position, row.is_descending)
    }
}

impl Entity for IndexColumnModel {
    fn kind(&self) -> &'static str {
        "index column"
    }

    fn name(&self) -> &str {
        &self.column_name
    }

    fn render_definition(&self) -> String {
        let direction = if self.is_descending { "DESC" } else { "ASC" };
        format!("{} {}", object_name(&self.column_name), direction)
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.column_name.trim().is_empty() {
            problems.push("index column has no name".to_string());
        }
        if self.ordinal_position < 1 {
            problems.push(format!(
                "index column {} has ordinal position {}",
                self.column_name, self.ordinal_position
            ));
        }
        problems
    }
}

/// A target index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub id: i64,
    pub name: String,
    /// Resolved, schema-qualified table the index is built on.
    pub table_name: String,
    /// Lower-cased access method.
    pub index_type: String,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub fill_factor: Option<i32>,
    pub columns: Vec<IndexColumnModel>,
}

impl IndexModel {
    pub fn from_row(row: &IndexRow, table_name: &str, columns: &[IndexColumnRow]) -> Self {
        Self {
            id: row.id,
            name: row.name.clone(),
            table_name: table_name.to_string(),
            index_type: row
                .index_type
                .as_deref()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_INDEX_TYPE.to_string()),
            is_unique: row.is_unique,
            is_primary_key: row.is_primary_key,
            fill_factor: row.fill_factor,
            columns: columns.iter().map(IndexColumnModel::from_row).collect(),
        }
    }

    /// Columns sorted by ordinal position.
    pub fn ordered_columns(&self) -> Vec<&IndexColumnModel> {
        let mut columns: Vec<&IndexColumnModel> = self.columns.iter().collect();
        columns.sort_by_key(|c| c.ordinal_position);
        columns
    }

    /// Fill factor to emit, `None` when it matches the default.
    fn effective_fill_factor(&self) -> Option<i32> {
        self.fill_factor
            .filter(|f| *f != 0 && *f != DEFAULT_FILL_FACTOR)
    }
}

impl Entity for IndexModel {
    fn kind(&self) -> &'static str {
        "index"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if !problems.is_empty() {
            return placeholder("skipped", self.kind(), &self.name, &problems.join("; "));
        }

        let unique = if self.is_unique || self.is_primary_key {
            "UNIQUE "
        } else {
            ""
        };
        let using = if self.index_type == DEFAULT_INDEX_TYPE {
            String::new()
        } else {
            format!(" USING {}", self.index_type)
        };
        let columns = self
            .ordered_columns()
            .iter()
            .map(|c| c.render_definition())
            .collect::<Vec<_>>()
            .join(", ");
        let storage = self
            .effective_fill_factor()
            .map(|f| format!(" WITH (fillfactor = {})", f))
            .unwrap_or_default();

        format!(
            "CREATE {}INDEX {} ON {}{} ({}){}",
            unique,
            object_name(&self.name),
            self.table_name,
            using,
            columns,
            storage
        )
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("index has no name".to_string());
        }
        if self.columns.is_empty() {
            problems.push(format!("index {} has no columns", self.name));
        }
        if !ALLOWED_INDEX_TYPES.contains(&self.index_type.as_str()) {
            problems.push(format!(
                "index {} uses unsupported type {}",
                self.name, self.index_type
            ));
        }
        if let Some(f) = self.fill_factor {
            if f != 0 && !(10..=100).contains(&f) {
                problems.push(format!("index {} has fill factor {} outside 10..100", self.name, f));
            }
        }

        for column in &self.columns {
            problems.extend(column.problems());
        }

        let ordinals: Vec<i32> = self.ordered_columns().iter().map(|c| c.ordinal_position).collect();
        let contiguous = ordinals
            .iter()
            .enumerate()
            .all(|(i, ordinal)| *ordinal == i as i32 + 1);
        if !self.columns.is_empty() && !contiguous {
            problems.push(format!(
                "index {} has non-contiguous column ordinals {:?}",
                self.name, ordinals
            ));
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.column_name.to_lowercase()) {
                problems.push(format!(
                    "index {} lists column {} twice",
                    self.name, column.column_name
                ));
            }
        }

        problems
    }
}

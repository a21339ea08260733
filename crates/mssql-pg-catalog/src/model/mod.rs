//! Object models built from catalog rows.
//!
//! Each entity wraps one catalog row, renders its own DDL fragment from fields
//! already resolved onto it and reports its own structural problems. Entities
//! never query the catalog.

mod column;
mod constraint;
mod index;
mod sequence;
mod table;
mod trigger;
mod view;

pub use column::{ColumnClass, ColumnModel, ComputedColumnModel};
pub use constraint::{
    map_referential_action, CheckConstraintModel, DefaultConstraintModel, ForeignKeyModel,
    PrimaryKeyModel, UniqueConstraintModel,
};
pub use index::{IndexColumnModel, IndexModel, ALLOWED_INDEX_TYPES};
pub use sequence::SequenceModel;
pub use table::{ColumnPartition, ComputedColumnPlan, TableModel, TablePlan};
pub use trigger::{TriggerEvent, TriggerModel, TriggerTiming};
pub use view::{ViewModel, ViewOwner};

use crate::identifier::{resolve_identifier, truncate_identifier};
use crate::mapping::MappingStatus;

/// Common surface of every schema entity.
pub trait Entity {
    /// Entity kind for messages ("index", "check constraint", ...).
    fn kind(&self) -> &'static str;

    /// Catalog name of the entity.
    fn name(&self) -> &str;

    /// Target DDL for this entity alone, or a comment placeholder.
    fn render_definition(&self) -> String;

    /// Structural problems; empty when the entity can be rendered.
    fn problems(&self) -> Vec<String>;

    fn validate(&self) -> bool {
        self.problems().is_empty()
    }
}

/// Resolved target spelling of a catalog object name.
pub(crate) fn object_name(name: &str) -> String {
    resolve_identifier(&truncate_identifier(name))
}

/// Comma-joined resolved column names.
pub(crate) fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| object_name(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Single-line SQL comment standing in for an entity that cannot be rendered.
pub(crate) fn placeholder(status: &str, kind: &str, name: &str, detail: &str) -> String {
    format!(
        "-- [{}] {} {} not created: {}",
        status,
        kind,
        sanitize_comment(name),
        sanitize_comment(detail)
    )
}

/// Placeholder for an entity whose expression did not map.
pub(crate) fn mapping_placeholder(
    status: MappingStatus,
    kind: &str,
    name: &str,
    source_expression: &str,
    notes: &str,
) -> String {
    let detail = if notes.is_empty() {
        source_expression.to_string()
    } else {
        format!("{} ({})", source_expression, notes)
    };
    placeholder(status.as_str(), kind, name, &detail)
}

/// Make text safe inside `--` and `/* */` comments.
pub(crate) fn sanitize_comment(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace("*/", "* /")
        .replace("/*", "/ *")
}

/// Whether a rendered statement is only a comment.
pub fn is_comment(statement: &str) -> bool {
    statement.trim_start().starts_with("--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_is_single_line_comment() {
        let text = placeholder("skipped", "index", "ix_a", "bad\nthing */ DROP");
        assert!(is_comment(&text));
        assert!(!text.contains('\n'));
        assert!(!text.contains("*/"));
    }

    #[test]
    fn test_object_name_truncates_then_resolves() {
        let long = format!("IX_{}", "A".repeat(80));
        let name = object_name(&long);
        assert!(name.starts_with('"'));
        assert_eq!(name.len(), 63 + 2);
        assert_eq!(object_name("accnt"), "accnt");
    }
}

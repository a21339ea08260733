//! Standalone sequence model.

use super::{placeholder, Entity};
use crate::catalog::SequenceRow;
use crate::identifier::{target_qualified_name, truncate_identifier};
use crate::typemap::{is_integer_type, map_column_type};

/// A sequence owned by a table's migration.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceModel {
    pub id: i64,
    pub schema: String,
    pub name: String,
    pub data_type: String,
    pub start_value: i64,
    pub increment_by: i64,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub cache_size: Option<i64>,
    pub is_cycling: bool,
}

impl SequenceModel {
    pub fn from_row(row: &SequenceRow) -> Self {
        Self {
            id: row.id,
            schema: row.schema_name.clone(),
            name: row.name.clone(),
            data_type: row.data_type.clone(),
            start_value: row.start_value,
            increment_by: row.increment_by,
            min_value: row.min_value,
            max_value: row.max_value,
            cache_size: row.cache_size,
            is_cycling: row.is_cycling,
        }
    }

    pub fn qualified_name(&self) -> String {
        target_qualified_name(&self.schema, &truncate_identifier(&self.name))
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP SEQUENCE IF EXISTS {}", self.qualified_name())
    }
}

impl Entity for SequenceModel {
    fn kind(&self) -> &'static str {
        "sequence"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if !problems.is_empty() {
            return placeholder("skipped", self.kind(), &self.name, &problems.join("; "));
        }

        let mut sql = format!(
            "CREATE SEQUENCE IF NOT EXISTS {} AS {} START WITH {} INCREMENT BY {}",
            self.qualified_name(),
            map_column_type(&self.data_type, 0, 0, 0),
            self.start_value,
            self.increment_by
        );
        match self.min_value {
            Some(v) => sql.push_str(&format!(" MINVALUE {}", v)),
            None => sql.push_str(" NO MINVALUE"),
        }
        match self.max_value {
            Some(v) => sql.push_str(&format!(" MAXVALUE {}", v)),
            None => sql.push_str(" NO MAXVALUE"),
        }
        if let Some(cache) = self.cache_size.filter(|c| *c > 0) {
            sql.push_str(&format!(" CACHE {}", cache));
        }
        sql.push_str(if self.is_cycling { " CYCLE" } else { " NO CYCLE" });
        sql
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("sequence has no name".to_string());
        }
        if !is_integer_type(&self.data_type) {
            problems.push(format!(
                "sequence {} has non-integer type {}",
                self.name, self.data_type
            ));
        }
        if self.increment_by == 0 {
            problems.push(format!("sequence {} has zero increment", self.name));
        }
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min > max {
                problems.push(format!(
                    "sequence {} has MINVALUE {} above MAXVALUE {}",
                    self.name, min, max
                ));
            }
        }
        let below = self.min_value.map_or(false, |min| self.start_value < min);
        let above = self.max_value.map_or(false, |max| self.start_value > max);
        if below || above {
            problems.push(format!(
                "sequence {} starts at {} outside its range",
                self.name, self.start_value
            ));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::is_comment;

    fn sequence() -> SequenceModel {
        SequenceModel {
            id: 1,
            schema: "public".into(),
            name: "invoice_seq".into(),
            data_type: "bigint".into(),
            start_value: 1000,
            increment_by: 1,
            min_value: Some(1),
            max_value: None,
            cache_size: Some(20),
            is_cycling: false,
        }
    }

    #[test]
    fn test_render_sequence() {
        assert_eq!(
            sequence().render_definition(),
            "CREATE SEQUENCE IF NOT EXISTS public.invoice_seq AS bigint START WITH 1000 \
             INCREMENT BY 1 MINVALUE 1 NO MAXVALUE CACHE 20 NO CYCLE"
        );
        assert_eq!(
            sequence().drop_statement(),
            "DROP SEQUENCE IF EXISTS public.invoice_seq"
        );
    }

    #[test]
    fn test_int_sequence_maps_type() {
        let seq = SequenceModel {
            data_type: "int".into(),
            ..sequence()
        };
        assert!(seq.render_definition().contains(" AS integer "));
    }

    #[test]
    fn test_invalid_sequences() {
        let zero = SequenceModel {
            increment_by: 0,
            ..sequence()
        };
        assert!(!zero.validate());
        assert!(is_comment(&zero.render_definition()));

        let inverted = SequenceModel {
            min_value: Some(10),
            max_value: Some(5),
            start_value: 7,
            ..sequence()
        };
        assert!(!inverted.validate());

        let out_of_range = SequenceModel {
            start_value: 0,
            ..sequence()
        };
        assert_eq!(out_of_range.problems().len(), 1);

        let decimal = SequenceModel {
            data_type: "decimal".into(),
            ..sequence()
        };
        assert!(!decimal.validate());
    }
}

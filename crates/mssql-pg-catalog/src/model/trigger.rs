//! Trigger model.
//!
//! Trigger bodies are not translated here. A trigger is created only when
//! the catalog names a PostgreSQL trigger function for it and marks the
//! port as mapped.

use super::{object_name, placeholder, Entity};
use crate::catalog::TriggerRow;
use crate::mapping::MappingStatus;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTiming {
    Before,
    After,
    InsteadOf,
}

impl TriggerTiming {
    /// Parse a catalog timing; SQL Server's `FOR` means `AFTER`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().replace('_', " ").as_str() {
            "BEFORE" => Some(TriggerTiming::Before),
            "AFTER" | "FOR" => Some(TriggerTiming::After),
            "INSTEAD OF" | "INSTEADOF" => Some(TriggerTiming::InsteadOf),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::InsteadOf => "INSTEAD OF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
    Truncate,
}

impl TriggerEvent {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_uppercase().as_str() {
            "INSERT" => Some(TriggerEvent::Insert),
            "UPDATE" => Some(TriggerEvent::Update),
            "DELETE" => Some(TriggerEvent::Delete),
            "TRUNCATE" => Some(TriggerEvent::Truncate),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
            TriggerEvent::Truncate => "TRUNCATE",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriggerModel {
    pub id: i64,
    pub name: String,
    pub table_name: String,
    /// Raw catalog timing, kept for messages when it does not parse.
    pub raw_timing: String,
    pub timing: Option<TriggerTiming>,
    pub events: Vec<TriggerEvent>,
    pub unknown_events: Vec<String>,
    pub for_each_row: bool,
    pub function_name: Option<String>,
    pub status: MappingStatus,
}

impl TriggerModel {
    pub fn from_row(row: &TriggerRow, table_name: &str) -> Self {
        let mut events = Vec::new();
        let mut unknown_events = Vec::new();
        for raw in &row.events {
            match TriggerEvent::parse(raw) {
                Some(event) if !events.contains(&event) => events.push(event),
                Some(_) => {}
                None => unknown_events.push(raw.clone()),
            }
        }

        Self {
            id: row.id,
            name: row.name.clone(),
            table_name: table_name.to_string(),
            raw_timing: row.timing.clone(),
            timing: TriggerTiming::parse(&row.timing),
            events,
            unknown_events,
            for_each_row: row.for_each_row,
            function_name: row.function_name.clone().filter(|f| !f.trim().is_empty()),
            status: row
                .mapping_status
                .as_deref()
                .and_then(MappingStatus::parse)
                .unwrap_or_default(),
        }
    }
}

impl Entity for TriggerModel {
    fn kind(&self) -> &'static str {
        "trigger"
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn render_definition(&self) -> String {
        let problems = self.problems();
        if !problems.is_empty() {
            return placeholder(self.status.as_str(), self.kind(), &self.name, &problems.join("; "));
        }
        let (Some(timing), Some(function)) = (self.timing, self.function_name.as_deref()) else {
            return placeholder(self.status.as_str(), self.kind(), &self.name, "incomplete");
        };

        let events = self
            .events
            .iter()
            .map(|e| e.as_sql())
            .collect::<Vec<_>>()
            .join(" OR ");
        let each = if self.for_each_row { "ROW" } else { "STATEMENT" };
        let function = if function.ends_with(')') {
            function.to_string()
        } else {
            format!("{}()", function)
        };
        format!(
            "CREATE TRIGGER {} {} {} ON {} FOR EACH {} EXECUTE FUNCTION {}",
            object_name(&self.name),
            timing.as_sql(),
            events,
            self.table_name,
            each,
            function
        )
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.name.trim().is_empty() {
            problems.push("trigger has no name".to_string());
        }
        match self.timing {
            None => problems.push(format!("unknown timing {}", self.raw_timing)),
            Some(TriggerTiming::InsteadOf) => {
                problems.push("INSTEAD OF triggers are only valid on views".to_string())
            }
            Some(_) => {}
        }
        if self.events.is_empty() {
            problems.push("no events".to_string());
        }
        if !self.unknown_events.is_empty() {
            problems.push(format!("unknown events {}", self.unknown_events.join(", ")));
        }
        if self.events.contains(&TriggerEvent::Truncate) && self.for_each_row {
            problems.push("TRUNCATE triggers must be FOR EACH STATEMENT".to_string());
        }
        if self.function_name.is_none() {
            problems.push("no trigger function".to_string());
        }
        if self.status != MappingStatus::Mapped {
            problems.push(format!("body is {}", self.status));
        }
        problems
    }
}

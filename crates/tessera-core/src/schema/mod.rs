//! Schema and type-system boundary
//!
//! [`Schemata`] answers which columns (and of which type) a selector's table
//! declares; [`TypeSystem`] supplies coercions and comparators per type name.

pub mod types;

pub use types::{StandardTypeSystem, TypeFactory, TypeSystem};

use crate::model::SelectorName;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A declared column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Property name
    pub name: String,
    /// Type name understood by the type system
    #[serde(default = "default_type_name")]
    pub type_name: String,
    /// Whether the column participates in full-text search
    #[serde(default = "default_searchable")]
    pub full_text_searchable: bool,
}

fn default_type_name() -> String {
    types::STRING.to_string()
}

fn default_searchable() -> bool {
    true
}

/// A named set of columns nodes can be selected from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: SelectorName,
    /// Declared columns in declaration order
    #[serde(default)]
    pub columns: Vec<TableColumn>,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<SelectorName>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Add a column
    pub fn with_column(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.columns.push(TableColumn {
            name: name.into(),
            type_name: type_name.into(),
            full_text_searchable: true,
        });
        self
    }

    /// Look up a column
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Read-only access to declared tables
pub trait Schemata: Send + Sync {
    /// Table registered under a name
    fn table(&self, name: &SelectorName) -> Option<&Table>;
}

/// Schemata fixed at construction time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImmutableSchemata {
    tables: HashMap<SelectorName, Table>,
}

impl ImmutableSchemata {
    /// Create an empty schemata
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Build from a list of tables
    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        tables.into_iter().fold(Self::new(), Self::with_table)
    }
}

impl Schemata for ImmutableSchemata {
    fn table(&self, name: &SelectorName) -> Option<&Table> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        let schemata = ImmutableSchemata::new().with_table(
            Table::new("article")
                .with_column("title", types::STRING)
                .with_column("rank", types::LONG),
        );
        let table = schemata.table(&"article".into()).unwrap();
        assert_eq!(table.column("rank").unwrap().type_name, "LONG");
        assert!(table.column("missing").is_none());
        assert!(schemata.table(&"other".into()).is_none());
    }

    #[test]
    fn test_table_column_defaults_from_json() {
        let table: Table = serde_json::from_value(serde_json::json!({
            "name": "t",
            "columns": [{"name": "a"}]
        }))
        .unwrap();
        assert_eq!(table.columns[0].type_name, "STRING");
        assert!(table.columns[0].full_text_searchable);
    }
}

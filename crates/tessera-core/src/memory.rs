//! In-memory backing store
//!
//! Holds tables of nodes (a location plus named property values) and plays
//! both external roles the processor needs: it answers ACCESS nodes as an
//! [`AccessFactory`] and node questions as an [`Analyzer`]. Stores load from
//! JSON, which keeps property values in their natural JSON form; declared
//! column types coerce them on load.
//!
//! ```json
//! {
//!   "tables": [{
//!     "name": "article",
//!     "columns": [{ "name": "title" }, { "name": "year", "type_name": "LONG" }],
//!     "nodes": [{ "location": { "path": "/articles/a1" },
//!                 "properties": { "title": "Merge joins", "year": 2021 } }]
//!   }]
//! }
//! ```

use crate::error::{Error, Result};
use crate::execution::analyzer::Analyzer;
use crate::execution::columns::ColumnLayout;
use crate::execution::constraint::{BoxedChecker, create_checker};
use crate::execution::context::QueryContext;
use crate::execution::operators::AccessFactory;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::{Column, Constraint, SelectorName};
use crate::plan::{PlanNode, PlanType};
use crate::schema::{ImmutableSchemata, Table, TableColumn, TypeSystem};
use crate::value::{Location, Path, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// A stored node as written in a store document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Node location
    pub location: Location,
    /// Property values in JSON form
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
}

/// A table as written in a store document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name
    pub name: SelectorName,
    /// Declared columns
    #[serde(default)]
    pub columns: Vec<TableColumn>,
    /// Nodes of the table
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
}

/// Serialized form of a whole store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreDefinition {
    /// Tables in declaration order
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

/// A node with typed property values
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    /// Node location
    pub location: Location,
    /// Property values keyed by name
    pub properties: BTreeMap<String, Value>,
}

impl StoredNode {
    /// Node without properties
    pub fn new(location: Location) -> Self {
        Self {
            location,
            properties: BTreeMap::new(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }
}

#[derive(Debug, Clone)]
struct StoredTable {
    table: Table,
    nodes: Vec<StoredNode>,
}

/// Tables of nodes kept in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: HashMap<SelectorName, Arc<StoredTable>>,
    /// Path to (table, node index)
    by_path: HashMap<Path, (SelectorName, usize)>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with its nodes
    pub fn with_table(mut self, table: Table, nodes: Vec<StoredNode>) -> Self {
        for (i, node) in nodes.iter().enumerate() {
            self.by_path
                .insert(node.location.path().clone(), (table.name.clone(), i));
        }
        self.tables
            .insert(table.name.clone(), Arc::new(StoredTable { table, nodes }));
        self
    }

    /// Build a store from its document form, coercing property values to the
    /// declared column types
    pub fn from_definition(definition: StoreDefinition, types: &dyn TypeSystem) -> Result<Self> {
        let mut store = Self::new();
        for def in definition.tables {
            let table = Table {
                name: def.name,
                columns: def.columns,
            };
            let mut nodes = Vec::with_capacity(def.nodes.len());
            for node in def.nodes {
                let mut stored = StoredNode::new(node.location);
                for (name, json) in &node.properties {
                    let value = Value::from(json);
                    let value = match table.column(name) {
                        Some(column) => types.factory_or_default(&column.type_name).create(&value)?,
                        None => value,
                    };
                    stored.properties.insert(name.clone(), value);
                }
                nodes.push(stored);
            }
            tracing::debug!("Loaded table '{}' with {} nodes", table.name, nodes.len());
            store = store.with_table(table, nodes);
        }
        Ok(store)
    }

    /// Parse a JSON store document
    pub fn from_json_str(text: &str, types: &dyn TypeSystem) -> Result<Self> {
        let definition: StoreDefinition = serde_json::from_str(text)?;
        Self::from_definition(definition, types)
    }

    /// Schemata declaring every table of the store
    pub fn schemata(&self) -> ImmutableSchemata {
        ImmutableSchemata::from_tables(self.tables.values().map(|t| t.table.clone()))
    }

    /// Number of nodes across all tables
    pub fn node_count(&self) -> usize {
        self.tables.values().map(|t| t.nodes.len()).sum()
    }

    fn node(&self, location: &Location) -> Option<&StoredNode> {
        let (table, index) = self.by_path.get(location.path())?;
        self.tables.get(table)?.nodes.get(*index)
    }

    fn table_of(&self, location: &Location) -> Option<&StoredTable> {
        let (table, _) = self.by_path.get(location.path())?;
        self.tables.get(table).map(Arc::as_ref)
    }
}

/// Text searched for a node: one property, or every searchable string
fn searchable_text(table: Option<&Table>, node: &StoredNode, property: Option<&str>) -> String {
    match property {
        Some(name) => node.property(name).map(Value::to_string).unwrap_or_default(),
        None => node
            .properties
            .iter()
            .filter(|(name, value)| {
                matches!(value, Value::String(_))
                    && table
                        .and_then(|t| t.column(name))
                        .is_none_or(|c| c.full_text_searchable)
            })
            .map(|(_, value)| value.to_string())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// A full-text search every scanned node must match
#[derive(Debug, Clone)]
struct RequiredSearch {
    property: Option<String>,
    expression: Option<String>,
}

/// Searches in the AND-connected part of a select; those under OR or NOT
/// are left to the select's checker
fn required_searches(constraint: &Constraint, out: &mut Vec<RequiredSearch>) {
    match constraint {
        Constraint::And(a, b) => {
            required_searches(a, out);
            required_searches(b, out);
        }
        Constraint::FullTextSearch {
            property, expression, ..
        } => out.push(RequiredSearch {
            property: property.clone(),
            expression: expression.clone(),
        }),
        _ => {}
    }
}

/// Lowercased alphanumeric words
fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .map(|t| t.trim_matches('-').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Term-frequency score: every required term must occur and no excluded
/// (`-term`) one may; the score is the share of words that are required terms
fn score(text: &str, expression: &str) -> f64 {
    let words = terms(text);
    if words.is_empty() {
        return 0.0;
    }
    let mut required = Vec::new();
    let mut excluded = Vec::new();
    for token in expression.split_whitespace() {
        match token.strip_prefix('-') {
            Some(term) => excluded.extend(terms(term)),
            None => required.extend(terms(token)),
        }
    }
    if required.is_empty() || excluded.iter().any(|t| words.contains(t)) {
        return 0.0;
    }
    let mut hits = 0usize;
    for term in &required {
        let count = words.iter().filter(|w| *w == term).count();
        if count == 0 {
            return 0.0;
        }
        hits += count;
    }
    hits as f64 / words.len() as f64
}

impl AccessFactory for InMemoryStore {
    fn create_access(
        &self,
        ctx: &QueryContext,
        node: &PlanNode,
        layout: Arc<ColumnLayout>,
    ) -> Result<BoxedStage> {
        let source = node
            .find_at_or_below(PlanType::Source)
            .ok_or_else(|| Error::plan("ACCESS node without a SOURCE"))?;
        let table_name = source
            .properties
            .source_name
            .as_ref()
            .ok_or_else(|| Error::plan("SOURCE node without a table name"))?;
        let selector = source
            .properties
            .source_alias
            .clone()
            .unwrap_or_else(|| table_name.clone());
        let stored = self
            .tables
            .get(table_name)
            .ok_or_else(|| Error::Access(format!("no table '{}' in the store", table_name)))?;

        // Selects below the access node see every declared column, plus any
        // projected property the table does not declare.
        let mut columns: Vec<Column> = Vec::new();
        let mut types: Vec<String> = Vec::new();
        for column in &stored.table.columns {
            columns.push(Column::new(selector.clone(), column.name.clone()));
            types.push(column.type_name.clone());
        }
        for (i, column) in layout.columns().iter().enumerate() {
            if column.selector == selector && stored.table.column(&column.property).is_none() {
                columns.push(Column::new(selector.clone(), column.property.clone()));
                types.push(layout.column_type(i)?.to_string());
            }
        }
        let full = ColumnLayout::with_selectors(columns, types, vec![selector], layout.has_scores())?;

        let checkers = node
            .find_all_at_or_below(PlanType::Select)
            .into_iter()
            .filter_map(|select| select.properties.select_criteria.as_ref())
            .map(|criteria| create_checker(ctx, &full, criteria))
            .collect::<Result<Vec<_>>>()?;
        let mut searches = Vec::new();
        for select in node.find_all_at_or_below(PlanType::Select) {
            if let Some(criteria) = &select.properties.select_criteria {
                required_searches(criteria, &mut searches);
            }
        }

        let mut slots: Vec<Option<usize>> = Vec::with_capacity(layout.tuple_width());
        for column in layout.columns() {
            slots.push(full.column_index_for_property(&column.selector, &column.property));
        }
        for s in layout.selectors() {
            slots.push(full.location_index(s).ok());
        }
        if layout.has_scores() {
            for s in layout.selectors() {
                slots.push(full.score_index(s));
            }
        }

        Ok(Box::new(ScanStage {
            table: Arc::clone(stored),
            layout,
            full,
            checkers,
            searches,
            slots,
        }))
    }
}

/// Scans one table, filters with the access-level selects and narrows each
/// surviving tuple to the requested layout. Required full-text searches are
/// answered here, as an index would, and seed the score slot.
struct ScanStage {
    table: Arc<StoredTable>,
    layout: Arc<ColumnLayout>,
    full: ColumnLayout,
    checkers: Vec<BoxedChecker>,
    searches: Vec<RequiredSearch>,
    /// Full-layout slot per requested slot; `None` yields a null
    slots: Vec<Option<usize>>,
}

impl ScanStage {
    /// Best score over the required searches, `None` when one misses
    fn relevance(&self, node: &StoredNode) -> Option<f64> {
        let mut best = 0.0f64;
        for search in &self.searches {
            let expression = search.expression.as_deref()?;
            let text = searchable_text(Some(&self.table.table), node, search.property.as_deref());
            let found = score(&text, expression);
            if found <= 0.0 {
                return None;
            }
            best = best.max(found);
        }
        Some(best)
    }
}

impl Stage for ScanStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let mut tuples = Vec::new();
        for node in &self.table.nodes {
            let Some(relevance) = self.relevance(node) else {
                continue;
            };
            let mut tuple: Vec<Value> = self
                .full
                .columns()
                .iter()
                .map(|c| node.property(&c.property).cloned().unwrap_or_default())
                .collect();
            tuple.push(Value::Location(node.location.clone()));
            if self.full.has_scores() {
                tuple.push(Value::Double(relevance));
            }
            if self.checkers.iter().all(|c| c.satisfies(&mut tuple)) {
                tuples.push(
                    self.slots
                        .iter()
                        .map(|slot| slot.map(|i| tuple[i].clone()).unwrap_or_default())
                        .collect(),
                );
            }
        }
        Ok(tuples)
    }

    fn name(&self) -> &'static str {
        "Scan"
    }

    fn detail(&self) -> String {
        format!("{} nodes={}", self.table.table.name, self.table.nodes.len())
    }
}

impl Analyzer for InMemoryStore {
    fn length(&self, value: &Value) -> i64 {
        match value {
            Value::Null => 0,
            other => other.to_string().chars().count() as i64,
        }
    }

    fn has_property(&self, location: &Location, property: &str) -> Result<bool> {
        Ok(self
            .node(location)
            .is_some_and(|node| node.property(property).is_some()))
    }

    fn full_text_score(
        &self,
        location: &Location,
        property: Option<&str>,
        expression: &str,
    ) -> Result<f64> {
        let Some(node) = self.node(location) else {
            return Ok(0.0);
        };
        let table = self.table_of(location).map(|t| &t.table);
        Ok(score(&searchable_text(table, node, property), expression))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StandardTypeSystem;

    const STORE: &str = r#"{
        "tables": [{
            "name": "article",
            "columns": [{ "name": "title" }, { "name": "year", "type_name": "LONG" }],
            "nodes": [
                { "location": { "path": "/a/1" }, "properties": { "title": "Rust joins", "year": "2021" } },
                { "location": { "path": "/a/2" }, "properties": { "title": "Sorting tuples" } }
            ]
        }]
    }"#;

    fn store() -> InMemoryStore {
        InMemoryStore::from_json_str(STORE, &StandardTypeSystem::new()).unwrap()
    }

    fn context(store: &InMemoryStore) -> QueryContext {
        QueryContext::new(Arc::new(StandardTypeSystem::new()), Arc::new(store.schemata()))
    }

    #[test]
    fn test_load_coerces_declared_types() {
        let store = store();
        assert_eq!(store.node_count(), 2);
        let node = store.node(&Location::parse("/a/1").unwrap()).unwrap();
        assert_eq!(node.properties["year"], Value::Long(2021));
    }

    #[test]
    fn test_access_applies_selects_and_narrows() {
        let store = store();
        let ctx = context(&store);
        let plan = PlanNode::access(PlanNode::select(
            Constraint::PropertyExistence {
                selector: "article".into(),
                property: "year".into(),
            },
            PlanNode::source("article", None),
        ));
        let layout = Arc::new(
            ColumnLayout::new(vec![Column::new("article", "title")], vec!["STRING".into()], false).unwrap(),
        );
        let mut stage = store.create_access(&ctx, &plan, layout).unwrap();
        let tuples = stage.execute().unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0][0], Value::from("Rust joins"));
        assert_eq!(tuples[0].len(), 2);
    }

    #[test]
    fn test_access_answers_full_text_search_and_seeds_scores() {
        let store = Arc::new(store());
        let ctx = context(&store).with_analyzer(store.clone());
        let plan = PlanNode::access(PlanNode::select(
            Constraint::full_text("article", Some("rust")),
            PlanNode::source("article", None),
        ));
        let layout = Arc::new(
            ColumnLayout::new(vec![Column::new("article", "title")], vec!["STRING".into()], true).unwrap(),
        );
        let mut stage = store.create_access(&ctx, &plan, layout).unwrap();
        let tuples = stage.execute().unwrap();
        assert_eq!(tuples.len(), 1);
        assert_eq!(tuples[0][0], Value::from("Rust joins"));
        assert_eq!(tuples[0][2], Value::Double(0.5));
    }

    #[test]
    fn test_analyzer_answers() {
        let store = store();
        let one = Location::parse("/a/1").unwrap();
        assert!(store.has_property(&one, "year").unwrap());
        assert!(!store.has_property(&Location::parse("/a/2").unwrap(), "year").unwrap());
        assert!(!store.has_property(&Location::parse("/nowhere").unwrap(), "year").unwrap());
        assert_eq!(store.full_text_score(&one, None, "rust").unwrap(), 0.5);
        assert_eq!(store.full_text_score(&one, Some("title"), "rust -joins").unwrap(), 0.0);
        assert_eq!(store.full_text_score(&one, None, "python").unwrap(), 0.0);
        assert_eq!(store.length(&Value::from("abc")), 3);
    }
}

//! Optimized plan trees
//!
//! The planner and optimizer live outside this crate; what arrives here is an
//! already-optimized tree of [`PlanNode`]s, each tagged with a [`PlanType`]
//! and carrying the typed [`PlanProperties`] its kind needs.

use crate::model::{
    Column, Constraint, JoinAlgorithm, JoinCondition, JoinType, OrderBy, SelectorName,
    SetOperation,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a plan node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanType {
    /// Fetch from the access layer
    Access,
    /// Run the left child, bind its values, then run the right child
    DependentQuery,
    /// Remove duplicate rows
    DupRemove,
    /// Grouping (not executable by this engine)
    Group,
    /// Join two children
    Join,
    /// Offset and row cap
    Limit,
    /// Provably empty result
    Null,
    /// Narrow to a column subset
    Project,
    /// Filter by a constraint
    Select,
    /// Union, intersect or except of several children
    SetOperation,
    /// Order rows
    Sort,
    /// Table reference, consumed by the access layer
    Source,
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlanType::Access => "ACCESS",
            PlanType::DependentQuery => "DEPENDENT_QUERY",
            PlanType::DupRemove => "DUP_REMOVE",
            PlanType::Group => "GROUP",
            PlanType::Join => "JOIN",
            PlanType::Limit => "LIMIT",
            PlanType::Null => "NULL",
            PlanType::Project => "PROJECT",
            PlanType::Select => "SELECT",
            PlanType::SetOperation => "SET_OPERATION",
            PlanType::Sort => "SORT",
            PlanType::Source => "SOURCE",
        };
        f.write_str(name)
    }
}

/// What a SORT node orders by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKeys {
    /// Dynamic-operand orderings
    Orderings(Vec<OrderBy>),
    /// Locations of these selectors
    Selectors(Vec<SelectorName>),
}

/// Typed properties attached to plan nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanProperties {
    /// SELECT: the filter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select_criteria: Option<Constraint>,
    /// SET_OPERATION: which operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_operation: Option<SetOperation>,
    /// SET_OPERATION: keep duplicates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_use_all: Option<bool>,
    /// JOIN: join type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinType>,
    /// JOIN: algorithm
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_algorithm: Option<JoinAlgorithm>,
    /// JOIN: condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_condition: Option<JoinCondition>,
    /// JOIN: constraints applied to the joined rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_constraints: Option<Vec<Constraint>>,
    /// SOURCE: table name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_name: Option<SelectorName>,
    /// SOURCE: alias the query uses for the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_alias: Option<SelectorName>,
    /// PROJECT: projected columns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_columns: Option<Vec<Column>>,
    /// PROJECT: type name per projected column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_column_types: Option<Vec<String>>,
    /// SORT: ordering keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order_by: Option<SortKeys>,
    /// LIMIT: row cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_count: Option<usize>,
    /// LIMIT: rows to skip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_offset: Option<usize>,
    /// ACCESS: the optimizer proved the branch empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_no_results: Option<bool>,
    /// DEPENDENT_QUERY child: variable the child's values are bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_name: Option<String>,
    /// The node produces full-text scores
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_text_search: Option<bool>,
}

/// One node of an optimized plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Node kind
    #[serde(rename = "type")]
    pub node_type: PlanType,
    /// Child nodes in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,
    /// Selectors visible at this node
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selectors: Vec<SelectorName>,
    /// Typed properties
    #[serde(default)]
    pub properties: PlanProperties,
}

impl PlanNode {
    /// Bare node of the given kind
    pub fn new(node_type: PlanType) -> Self {
        Self {
            node_type,
            children: Vec::new(),
            selectors: Vec::new(),
            properties: PlanProperties::default(),
        }
    }

    fn wrapping(node_type: PlanType, children: Vec<PlanNode>) -> Self {
        let mut selectors: Vec<SelectorName> = Vec::new();
        for child in &children {
            for selector in &child.selectors {
                if !selectors.contains(selector) {
                    selectors.push(selector.clone());
                }
            }
        }
        Self {
            node_type,
            children,
            selectors,
            properties: PlanProperties::default(),
        }
    }

    /// SOURCE node for a table, optionally aliased
    pub fn source(table: impl Into<SelectorName>, alias: Option<&str>) -> Self {
        let table = table.into();
        let alias = alias.map(SelectorName::from);
        let mut node = Self::new(PlanType::Source);
        node.selectors.push(alias.clone().unwrap_or_else(|| table.clone()));
        node.properties.source_name = Some(table);
        node.properties.source_alias = alias;
        node
    }

    /// ACCESS node over a subtree ending in a SOURCE
    pub fn access(child: PlanNode) -> Self {
        Self::wrapping(PlanType::Access, vec![child])
    }

    /// ACCESS node marked as provably empty
    pub fn empty_access(child: PlanNode) -> Self {
        let mut node = Self::access(child);
        node.properties.access_no_results = Some(true);
        node
    }

    /// SELECT node
    pub fn select(criteria: Constraint, child: PlanNode) -> Self {
        let mut node = Self::wrapping(PlanType::Select, vec![child]);
        node.properties.select_criteria = Some(criteria);
        node
    }

    /// PROJECT node; types may be omitted to use the schema's declared types
    pub fn project(columns: Vec<Column>, types: Option<Vec<String>>, child: PlanNode) -> Self {
        let mut node = Self::wrapping(PlanType::Project, vec![child]);
        node.properties.project_columns = Some(columns);
        node.properties.project_column_types = types;
        node
    }

    /// JOIN node
    pub fn join(
        join_type: JoinType,
        algorithm: JoinAlgorithm,
        condition: JoinCondition,
        left: PlanNode,
        right: PlanNode,
    ) -> Self {
        let mut node = Self::wrapping(PlanType::Join, vec![left, right]);
        node.properties.join_type = Some(join_type);
        node.properties.join_algorithm = Some(algorithm);
        node.properties.join_condition = Some(condition);
        node
    }

    /// SORT node by dynamic-operand orderings
    pub fn sort(orderings: Vec<OrderBy>, child: PlanNode) -> Self {
        let mut node = Self::wrapping(PlanType::Sort, vec![child]);
        node.properties.sort_order_by = Some(SortKeys::Orderings(orderings));
        node
    }

    /// SORT node by selector locations
    pub fn sort_by_locations(selectors: Vec<SelectorName>, child: PlanNode) -> Self {
        let mut node = Self::wrapping(PlanType::Sort, vec![child]);
        node.properties.sort_order_by = Some(SortKeys::Selectors(selectors));
        node
    }

    /// LIMIT node
    pub fn limit(count: Option<usize>, offset: Option<usize>, child: PlanNode) -> Self {
        let mut node = Self::wrapping(PlanType::Limit, vec![child]);
        node.properties.limit_count = count;
        node.properties.limit_offset = offset;
        node
    }

    /// DUP_REMOVE node
    pub fn dup_remove(child: PlanNode) -> Self {
        Self::wrapping(PlanType::DupRemove, vec![child])
    }

    /// SET_OPERATION node
    pub fn set_operation(operation: SetOperation, use_all: bool, children: Vec<PlanNode>) -> Self {
        let mut node = Self::wrapping(PlanType::SetOperation, children);
        node.properties.set_operation = Some(operation);
        node.properties.set_use_all = Some(use_all);
        node
    }

    /// DEPENDENT_QUERY node; each side binds its values to the given variable
    pub fn dependent_query(
        left: PlanNode,
        left_variable: Option<&str>,
        right: PlanNode,
        right_variable: Option<&str>,
    ) -> Self {
        let mut left = left;
        left.properties.variable_name = left_variable.map(str::to_string);
        let mut right = right;
        right.properties.variable_name = right_variable.map(str::to_string);
        Self::wrapping(PlanType::DependentQuery, vec![left, right])
    }

    /// NULL node
    pub fn null(selectors: Vec<SelectorName>) -> Self {
        let mut node = Self::new(PlanType::Null);
        node.selectors = selectors;
        node
    }

    /// Attach join constraints
    pub fn with_join_constraints(mut self, constraints: Vec<Constraint>) -> Self {
        self.properties.join_constraints = Some(constraints);
        self
    }

    /// Mark the node as producing full-text scores
    pub fn with_full_text_search(mut self) -> Self {
        self.properties.full_text_search = Some(true);
        self
    }

    /// First child, if any
    pub fn first_child(&self) -> Option<&PlanNode> {
        self.children.first()
    }

    /// This node or the first descendant of the given kind, depth-first
    pub fn find_at_or_below(&self, node_type: PlanType) -> Option<&PlanNode> {
        if self.node_type == node_type {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find_at_or_below(node_type))
    }

    /// All nodes of the given kind at or below this one, depth-first
    pub fn find_all_at_or_below(&self, node_type: PlanType) -> Vec<&PlanNode> {
        let mut found = Vec::new();
        self.collect(node_type, &mut found);
        found
    }

    fn collect<'a>(&'a self, node_type: PlanType, found: &mut Vec<&'a PlanNode>) {
        if self.node_type == node_type {
            found.push(self);
        }
        for child in &self.children {
            child.collect(node_type, found);
        }
    }

    /// Whether this subtree produces full-text scores
    pub fn produces_scores(&self) -> bool {
        if self.properties.full_text_search == Some(true) {
            return true;
        }
        if let Some(criteria) = &self.properties.select_criteria {
            if criteria.contains_full_text_search() {
                return true;
            }
        }
        if let Some(constraints) = &self.properties.join_constraints {
            if constraints.iter().any(Constraint::contains_full_text_search) {
                return true;
            }
        }
        self.children.iter().any(PlanNode::produces_scores)
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.node_type, indent = depth * 2)?;
        if !self.selectors.is_empty() {
            let names: Vec<&str> = self.selectors.iter().map(SelectorName::name).collect();
            write!(f, " [{}]", names.join(", "))?;
        }
        let props = &self.properties;
        if let Some(criteria) = &props.select_criteria {
            write!(f, " {}", criteria)?;
        }
        if let Some(condition) = &props.join_condition {
            write!(f, " {}", condition)?;
        }
        if let Some(operation) = &props.set_operation {
            write!(f, " {}", operation)?;
            if props.set_use_all == Some(true) {
                write!(f, " ALL")?;
            }
        }
        if let Some(count) = props.limit_count {
            write!(f, " count={}", count)?;
        }
        if let Some(offset) = props.limit_offset {
            write!(f, " offset={}", offset)?;
        }
        if let Some(name) = &props.source_name {
            write!(f, " {}", name)?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DynamicOperand, Operator};

    fn article_access() -> PlanNode {
        PlanNode::access(PlanNode::source("article", Some("a")))
    }

    #[test]
    fn test_wrapping_nodes_collect_child_selectors() {
        let join = PlanNode::join(
            JoinType::Inner,
            JoinAlgorithm::Merge,
            JoinCondition::equi("a", "id", "b", "article"),
            article_access(),
            PlanNode::access(PlanNode::source("comment", Some("b"))),
        );
        let names: Vec<&str> = join.selectors.iter().map(SelectorName::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(join.find_all_at_or_below(PlanType::Source).len(), 2);
    }

    #[test]
    fn test_produces_scores_detects_nested_full_text() {
        let plain = PlanNode::select(
            Constraint::compare(DynamicOperand::property("a", "x"), Operator::EqualTo, 1i64),
            article_access(),
        );
        assert!(!plain.produces_scores());

        let scored = PlanNode::limit(
            Some(3),
            None,
            PlanNode::select(Constraint::full_text("a", Some("rust")), article_access()),
        );
        assert!(scored.produces_scores());
        assert!(article_access().with_full_text_search().produces_scores());
    }

    #[test]
    fn test_plan_json_roundtrip_shape() {
        let node = PlanNode::limit(Some(2), Some(1), article_access());
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["type"], "LIMIT");
        assert_eq!(json["properties"]["limit_count"], 2);
        let back: PlanNode = serde_json::from_value(json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_display_indents_children() {
        let node = PlanNode::dup_remove(article_access());
        let text = node.to_string();
        assert_eq!(text, "DUP_REMOVE [a]\n  ACCESS [a]\n    SOURCE [a] article\n");
    }
}

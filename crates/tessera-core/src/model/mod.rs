//! Query model consumed from the optimized plan
//!
//! These are immutable ASTs: selectors, projected columns, orderings, join
//! conditions, constraints and dynamic operands. Stages compile them once and
//! never mutate them.

pub mod constraint;
pub mod operand;

pub use constraint::{Constraint, Operator, StaticOperand};
pub use operand::{ArithmeticOperator, DynamicOperand};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a selector (a source of nodes, roughly a table alias)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorName(String);

impl SelectorName {
    /// Create a selector name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SelectorName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for SelectorName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A projected column: a property of a selector, optionally renamed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    /// Selector the property is read from
    pub selector: SelectorName,
    /// Property name
    pub property: String,
    /// Display name; defaults to the property name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

impl Column {
    /// Column displayed under its property name
    pub fn new(selector: impl Into<SelectorName>, property: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            property: property.into(),
            column_name: None,
        }
    }

    /// Column displayed under an explicit name
    pub fn named(
        selector: impl Into<SelectorName>,
        property: impl Into<String>,
        column_name: impl Into<String>,
    ) -> Self {
        Self {
            selector: selector.into(),
            property: property.into(),
            column_name: Some(column_name.into()),
        }
    }

    /// Display name without selector qualification
    pub fn display_name(&self) -> &str {
        self.column_name.as_deref().unwrap_or(&self.property)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.selector, self.property)?;
        if let Some(name) = &self.column_name {
            write!(f, " AS {}", name)?;
        }
        Ok(())
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    /// Smallest first
    #[default]
    Ascending,
    /// Largest first
    Descending,
}

/// One ordering key of a sort
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    /// Value the rows are ordered by
    pub operand: DynamicOperand,
    /// Direction
    #[serde(default)]
    pub order: Order,
}

impl OrderBy {
    /// Ascending ordering on an operand
    pub fn ascending(operand: DynamicOperand) -> Self {
        Self {
            operand,
            order: Order::Ascending,
        }
    }

    /// Descending ordering on an operand
    pub fn descending(operand: DynamicOperand) -> Self {
        Self {
            operand,
            order: Order::Descending,
        }
    }
}

/// Join type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    /// Only matching pairs
    #[default]
    Inner,
    /// Matching pairs plus unmatched left tuples
    LeftOuter,
    /// Matching pairs plus unmatched right tuples
    RightOuter,
    /// Matching pairs plus unmatched tuples of both sides
    FullOuter,
    /// Every left tuple with every right tuple
    Cross,
}

impl JoinType {
    /// Whether unmatched left tuples are padded and emitted
    pub fn keeps_unmatched_left(self) -> bool {
        matches!(self, JoinType::LeftOuter | JoinType::FullOuter)
    }

    /// Whether unmatched right tuples are padded and emitted
    pub fn keeps_unmatched_right(self) -> bool {
        matches!(self, JoinType::RightOuter | JoinType::FullOuter)
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinType::Inner => "INNER",
            JoinType::LeftOuter => "LEFT OUTER",
            JoinType::RightOuter => "RIGHT OUTER",
            JoinType::FullOuter => "FULL OUTER",
            JoinType::Cross => "CROSS",
        };
        f.write_str(name)
    }
}

/// Join algorithm chosen by the planner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinAlgorithm {
    /// Quadratic scan, works for any condition
    #[default]
    NestedLoop,
    /// Linear walk over inputs sorted by the join key
    Merge,
}

/// Relationship between the two sides of a join
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinCondition {
    /// `selector1.property1 = selector2.property2`
    Equi {
        /// First selector
        selector1: SelectorName,
        /// Property of the first selector
        property1: String,
        /// Second selector
        selector2: SelectorName,
        /// Property of the second selector
        property2: String,
    },
    /// Both selectors address the same node
    SameNode {
        /// First selector
        selector1: SelectorName,
        /// Second selector
        selector2: SelectorName,
    },
    /// The child selector's node is an immediate child of the parent's
    ChildNode {
        /// Parent side
        parent_selector: SelectorName,
        /// Child side
        child_selector: SelectorName,
    },
    /// The descendant selector's node lies below the ancestor's
    DescendantNode {
        /// Ancestor side
        ancestor_selector: SelectorName,
        /// Descendant side
        descendant_selector: SelectorName,
    },
}

impl JoinCondition {
    /// Equi-join helper
    pub fn equi(
        selector1: impl Into<SelectorName>,
        property1: impl Into<String>,
        selector2: impl Into<SelectorName>,
        property2: impl Into<String>,
    ) -> Self {
        JoinCondition::Equi {
            selector1: selector1.into(),
            property1: property1.into(),
            selector2: selector2.into(),
            property2: property2.into(),
        }
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinCondition::Equi {
                selector1,
                property1,
                selector2,
                property2,
            } => write!(f, "{}.{} = {}.{}", selector1, property1, selector2, property2),
            JoinCondition::SameNode {
                selector1,
                selector2,
            } => write!(f, "ISSAMENODE({},{})", selector1, selector2),
            JoinCondition::ChildNode {
                parent_selector,
                child_selector,
            } => write!(f, "ISCHILDNODE({},{})", child_selector, parent_selector),
            JoinCondition::DescendantNode {
                ancestor_selector,
                descendant_selector,
            } => write!(
                f,
                "ISDESCENDANTNODE({},{})",
                descendant_selector, ancestor_selector
            ),
        }
    }
}

/// Kind of set operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOperation {
    /// Tuples of any source
    Union,
    /// Tuples present in every source
    Intersect,
    /// Tuples of the first source absent from the others
    Except,
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetOperation::Union => write!(f, "UNION"),
            SetOperation::Intersect => write!(f, "INTERSECT"),
            SetOperation::Except => write!(f, "EXCEPT"),
        }
    }
}

//! Boolean predicate trees

use super::{DynamicOperand, SelectorName};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `=`
    EqualTo,
    /// `!=`
    NotEqualTo,
    /// `<`
    LessThan,
    /// `<=`
    LessThanOrEqualTo,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanOrEqualTo,
    /// `LIKE` with `%` and `_` wildcards
    Like,
}

impl Operator {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::EqualTo => "=",
            Operator::NotEqualTo => "!=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqualTo => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqualTo => ">=",
            Operator::Like => "LIKE",
        }
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaticOperand {
    /// Constant value
    Literal(Value),
    /// Named variable resolved from the query context at evaluation time
    BindVariable(String),
}

impl StaticOperand {
    /// Literal helper
    pub fn literal(value: impl Into<Value>) -> Self {
        StaticOperand::Literal(value.into())
    }

    /// Bind variable helper
    pub fn variable(name: impl Into<String>) -> Self {
        StaticOperand::BindVariable(name.into())
    }
}

impl fmt::Display for StaticOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticOperand::Literal(Value::String(s)) => write!(f, "'{}'", s),
            StaticOperand::Literal(value) => write!(f, "{}", value),
            StaticOperand::BindVariable(name) => write!(f, "${}", name),
        }
    }
}

/// Predicate over one tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// Both sides hold
    And(Box<Constraint>, Box<Constraint>),
    /// Either side holds
    Or(Box<Constraint>, Box<Constraint>),
    /// Negation
    Not(Box<Constraint>),
    /// `operand <op> value`
    Comparison {
        /// Left-hand side
        operand: DynamicOperand,
        /// Operator
        operator: Operator,
        /// Right-hand side
        value: StaticOperand,
    },
    /// `operand BETWEEN lower AND upper`
    Between {
        /// Tested value
        operand: DynamicOperand,
        /// Lower bound
        lower: StaticOperand,
        /// Upper bound
        upper: StaticOperand,
        /// Whether the lower bound is inclusive
        #[serde(default = "inclusive")]
        include_lower: bool,
        /// Whether the upper bound is inclusive
        #[serde(default = "inclusive")]
        include_upper: bool,
    },
    /// `operand IN (values...)`
    SetCriteria {
        /// Tested value
        operand: DynamicOperand,
        /// Candidate values; list-valued variables are expanded
        values: Vec<StaticOperand>,
    },
    /// The selector's node has the property
    PropertyExistence {
        /// Selector
        selector: SelectorName,
        /// Property name
        property: String,
    },
    /// Full-text match on the node or one of its properties
    FullTextSearch {
        /// Selector
        selector: SelectorName,
        /// Restrict the search to this property
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property: Option<String>,
        /// Search expression; a missing expression never matches
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expression: Option<String>,
    },
    /// The selector's node is the node at `path`
    SameNode {
        /// Selector
        selector: SelectorName,
        /// Absolute node path
        path: String,
    },
    /// The selector's node is an immediate child of `parent_path`
    ChildNode {
        /// Selector
        selector: SelectorName,
        /// Absolute parent path
        parent_path: String,
    },
    /// The selector's node lies below `ancestor_path`
    DescendantNode {
        /// Selector
        selector: SelectorName,
        /// Absolute ancestor path
        ancestor_path: String,
    },
}

fn inclusive() -> bool {
    true
}

fn push_unique<'a>(selector: &'a SelectorName, out: &mut Vec<&'a SelectorName>) {
    if !out.contains(&selector) {
        out.push(selector);
    }
}

impl Constraint {
    /// `a AND b`
    pub fn and(left: Constraint, right: Constraint) -> Self {
        Constraint::And(Box::new(left), Box::new(right))
    }

    /// `a OR b`
    pub fn or(left: Constraint, right: Constraint) -> Self {
        Constraint::Or(Box::new(left), Box::new(right))
    }

    /// `NOT a`
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Constraint) -> Self {
        Constraint::Not(Box::new(inner))
    }

    /// `operand <op> literal`
    pub fn compare(operand: DynamicOperand, operator: Operator, value: impl Into<Value>) -> Self {
        Constraint::Comparison {
            operand,
            operator,
            value: StaticOperand::literal(value),
        }
    }

    /// Full-text search over all properties of a selector's node
    pub fn full_text(selector: impl Into<SelectorName>, expression: Option<&str>) -> Self {
        Constraint::FullTextSearch {
            selector: selector.into(),
            property: None,
            expression: expression.map(str::to_string),
        }
    }

    /// Whether any full-text search predicate occurs in this tree
    pub fn contains_full_text_search(&self) -> bool {
        match self {
            Constraint::And(a, b) | Constraint::Or(a, b) => {
                a.contains_full_text_search() || b.contains_full_text_search()
            }
            Constraint::Not(inner) => inner.contains_full_text_search(),
            Constraint::FullTextSearch { .. } => true,
            _ => false,
        }
    }

    /// Selectors referenced anywhere in this tree, first-seen order
    pub fn selectors(&self) -> Vec<&SelectorName> {
        let mut out: Vec<&SelectorName> = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a SelectorName>) {
        match self {
            Constraint::And(a, b) | Constraint::Or(a, b) => {
                a.collect_selectors(out);
                b.collect_selectors(out);
            }
            Constraint::Not(inner) => inner.collect_selectors(out),
            Constraint::Comparison { operand, .. }
            | Constraint::Between { operand, .. }
            | Constraint::SetCriteria { operand, .. } => {
                for selector in operand.selectors() {
                    push_unique(selector, out);
                }
            }
            Constraint::PropertyExistence { selector, .. }
            | Constraint::FullTextSearch { selector, .. }
            | Constraint::SameNode { selector, .. }
            | Constraint::ChildNode { selector, .. }
            | Constraint::DescendantNode { selector, .. } => push_unique(selector, out),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::And(a, b) => write!(f, "({} AND {})", a, b),
            Constraint::Or(a, b) => write!(f, "({} OR {})", a, b),
            Constraint::Not(inner) => write!(f, "NOT {}", inner),
            Constraint::Comparison {
                operand,
                operator,
                value,
            } => write!(f, "{} {} {}", operand, operator.symbol(), value),
            Constraint::Between {
                operand,
                lower,
                upper,
                include_lower,
                include_upper,
            } => {
                write!(f, "{} BETWEEN {}", operand, lower)?;
                if !include_lower {
                    write!(f, " EXCLUSIVE")?;
                }
                write!(f, " AND {}", upper)?;
                if !include_upper {
                    write!(f, " EXCLUSIVE")?;
                }
                Ok(())
            }
            Constraint::SetCriteria { operand, values } => {
                write!(f, "{} IN (", operand)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, ")")
            }
            Constraint::PropertyExistence { selector, property } => {
                write!(f, "{}.{} IS NOT NULL", selector, property)
            }
            Constraint::FullTextSearch {
                selector,
                property,
                expression,
            } => {
                let target = match property {
                    Some(property) => format!("{}.{}", selector, property),
                    None => selector.to_string(),
                };
                write!(
                    f,
                    "CONTAINS({},'{}')",
                    target,
                    expression.as_deref().unwrap_or("")
                )
            }
            Constraint::SameNode { selector, path } => {
                write!(f, "ISSAMENODE({},'{}')", selector, path)
            }
            Constraint::ChildNode {
                selector,
                parent_path,
            } => write!(f, "ISCHILDNODE({},'{}')", selector, parent_path),
            Constraint::DescendantNode {
                selector,
                ancestor_path,
            } => write!(f, "ISDESCENDANTNODE({},'{}')", selector, ancestor_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_full_text_search_walks_the_tree() {
        let plain = Constraint::compare(
            DynamicOperand::property("s", "a"),
            Operator::EqualTo,
            1i64,
        );
        assert!(!plain.contains_full_text_search());

        let nested = Constraint::and(
            plain.clone(),
            Constraint::not(Constraint::full_text("s", Some("rust"))),
        );
        assert!(nested.contains_full_text_search());
    }

    #[test]
    fn test_constraint_display() {
        let constraint = Constraint::or(
            Constraint::compare(
                DynamicOperand::property("s", "title"),
                Operator::Like,
                "a%",
            ),
            Constraint::DescendantNode {
                selector: "s".into(),
                ancestor_path: "/docs".to_string(),
            },
        );
        assert_eq!(
            constraint.to_string(),
            "(s.title LIKE 'a%' OR ISDESCENDANTNODE(s,'/docs'))"
        );
    }

    #[test]
    fn test_between_defaults_to_inclusive_bounds() {
        let json = serde_json::json!({
            "between": {
                "operand": {"property_value": {"selector": "s", "property": "n"}},
                "lower": {"literal": {"type": "long", "value": 1}},
                "upper": {"literal": {"type": "long", "value": 5}}
            }
        });
        let constraint: Constraint = serde_json::from_value(json).unwrap();
        match constraint {
            Constraint::Between {
                include_lower,
                include_upper,
                ..
            } => assert!(include_lower && include_upper),
            other => panic!("unexpected constraint {other:?}"),
        }
    }
}

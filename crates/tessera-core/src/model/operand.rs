//! Dynamic operands: per-tuple value expressions

use super::SelectorName;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arithmetic operators usable between two dynamic operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOperator {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl ArithmeticOperator {
    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            ArithmeticOperator::Add => "+",
            ArithmeticOperator::Subtract => "-",
            ArithmeticOperator::Multiply => "*",
            ArithmeticOperator::Divide => "/",
        }
    }
}

/// Expression evaluated against one tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicOperand {
    /// Value of a projected property
    PropertyValue {
        /// Owning selector
        selector: SelectorName,
        /// Property name
        property: String,
    },
    /// Value of a reference property; with no property named, the first
    /// non-null reference column of the selector
    ReferenceValue {
        /// Owning selector
        selector: SelectorName,
        /// Reference property, if restricted to one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        property: Option<String>,
    },
    /// Length of the operand's value
    Length(Box<DynamicOperand>),
    /// Lower-cased string form of the operand
    LowerCase(Box<DynamicOperand>),
    /// Upper-cased string form of the operand
    UpperCase(Box<DynamicOperand>),
    /// Depth of the selector's node
    NodeDepth {
        /// Selector
        selector: SelectorName,
    },
    /// Path of the selector's node
    NodePath {
        /// Selector
        selector: SelectorName,
    },
    /// Name (last segment) of the selector's node
    NodeName {
        /// Selector
        selector: SelectorName,
    },
    /// Name of the selector's node without namespace prefix
    NodeLocalName {
        /// Selector
        selector: SelectorName,
    },
    /// Full-text relevance score recorded for the selector
    FullTextSearchScore {
        /// Selector
        selector: SelectorName,
    },
    /// `left <op> right`
    Arithmetic {
        /// Left-hand operand
        left: Box<DynamicOperand>,
        /// Operator
        operator: ArithmeticOperator,
        /// Right-hand operand
        right: Box<DynamicOperand>,
    },
}

impl DynamicOperand {
    /// `selector.property`
    pub fn property(selector: impl Into<SelectorName>, property: impl Into<String>) -> Self {
        DynamicOperand::PropertyValue {
            selector: selector.into(),
            property: property.into(),
        }
    }

    /// `NAME(selector)`
    pub fn node_name(selector: impl Into<SelectorName>) -> Self {
        DynamicOperand::NodeName {
            selector: selector.into(),
        }
    }

    /// `PATH(selector)`
    pub fn node_path(selector: impl Into<SelectorName>) -> Self {
        DynamicOperand::NodePath {
            selector: selector.into(),
        }
    }

    /// `DEPTH(selector)`
    pub fn node_depth(selector: impl Into<SelectorName>) -> Self {
        DynamicOperand::NodeDepth {
            selector: selector.into(),
        }
    }

    /// `SCORE(selector)`
    pub fn score(selector: impl Into<SelectorName>) -> Self {
        DynamicOperand::FullTextSearchScore {
            selector: selector.into(),
        }
    }

    /// `left <op> right`
    pub fn arithmetic(left: DynamicOperand, operator: ArithmeticOperator, right: DynamicOperand) -> Self {
        DynamicOperand::Arithmetic {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    /// Selectors referenced anywhere in this operand
    pub fn selectors(&self) -> Vec<&SelectorName> {
        let mut out = Vec::new();
        self.collect_selectors(&mut out);
        out
    }

    fn collect_selectors<'a>(&'a self, out: &mut Vec<&'a SelectorName>) {
        match self {
            DynamicOperand::PropertyValue { selector, .. }
            | DynamicOperand::ReferenceValue { selector, .. }
            | DynamicOperand::NodeDepth { selector }
            | DynamicOperand::NodePath { selector }
            | DynamicOperand::NodeName { selector }
            | DynamicOperand::NodeLocalName { selector }
            | DynamicOperand::FullTextSearchScore { selector } => {
                if !out.contains(&selector) {
                    out.push(selector);
                }
            }
            DynamicOperand::Length(inner)
            | DynamicOperand::LowerCase(inner)
            | DynamicOperand::UpperCase(inner) => inner.collect_selectors(out),
            DynamicOperand::Arithmetic { left, right, .. } => {
                left.collect_selectors(out);
                right.collect_selectors(out);
            }
        }
    }
}

impl fmt::Display for DynamicOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynamicOperand::PropertyValue { selector, property } => {
                write!(f, "{}.{}", selector, property)
            }
            DynamicOperand::ReferenceValue { selector, property } => match property {
                Some(property) => write!(f, "REFERENCE({}.{})", selector, property),
                None => write!(f, "REFERENCE({})", selector),
            },
            DynamicOperand::Length(inner) => write!(f, "LENGTH({})", inner),
            DynamicOperand::LowerCase(inner) => write!(f, "LOWER({})", inner),
            DynamicOperand::UpperCase(inner) => write!(f, "UPPER({})", inner),
            DynamicOperand::NodeDepth { selector } => write!(f, "DEPTH({})", selector),
            DynamicOperand::NodePath { selector } => write!(f, "PATH({})", selector),
            DynamicOperand::NodeName { selector } => write!(f, "NAME({})", selector),
            DynamicOperand::NodeLocalName { selector } => write!(f, "LOCALNAME({})", selector),
            DynamicOperand::FullTextSearchScore { selector } => write!(f, "SCORE({})", selector),
            DynamicOperand::Arithmetic {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", left, operator.symbol(), right),
        }
    }
}

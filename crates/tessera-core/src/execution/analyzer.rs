//! Relationship analyzer consulted by constraint checks

use crate::error::Result;
use crate::value::{Location, Value};

/// Answers structural and full-text questions about stored nodes.
///
/// Implemented by the access layer, which knows the actual content; without
/// an analyzer, node relationships fall back to path comparisons.
pub trait Analyzer: Send + Sync {
    /// Length of a property value
    fn length(&self, value: &Value) -> i64;

    /// Whether two locations address the same node
    fn is_same_node(&self, a: &Location, b: &Location) -> bool {
        a.is_same(b)
    }

    /// Whether `location` lies strictly below `ancestor`
    fn is_descendant_of(&self, location: &Location, ancestor: &Location) -> bool {
        location.path().is_descendant_of(ancestor.path())
    }

    /// Whether the node carries the property
    fn has_property(&self, location: &Location, property: &str) -> Result<bool>;

    /// Full-text relevance of the node (or of one of its properties) for the
    /// expression; 0.0 means no match
    fn full_text_score(
        &self,
        location: &Location,
        property: Option<&str>,
        expression: &str,
    ) -> Result<f64>;
}

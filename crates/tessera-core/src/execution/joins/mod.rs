//! Join stages
//!
//! Both algorithms share the pieces derived once from the join condition:
//! a per-side key extractor, the relational predicate, the comparator merge
//! join walks its sorted inputs with, and the tuple merger that lays a left
//! and right tuple out in the concatenated layout.

pub mod merge_join;
pub mod nested_loop;

pub use merge_join::MergeJoinStage;
pub use nested_loop::NestedLoopJoinStage;

use crate::error::{Error, Result};
use crate::execution::analyzer::Analyzer;
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::operators::sort::{CompareFn, KeyFn, SortKey};
use crate::execution::stage::Tuple;
use crate::model::{JoinCondition, JoinType, SelectorName};
use crate::value::{Path, Value};
use std::cmp::Ordering;
use std::sync::Arc;

/// Builds joined tuples in the concatenated layout; a missing side is
/// filled with nulls
#[derive(Debug, Clone)]
pub struct TupleMerger {
    left_columns: usize,
    right_columns: usize,
    left_locations: usize,
    right_locations: usize,
    left_scores: bool,
    right_scores: bool,
    joined_scores: bool,
    width: usize,
}

impl TupleMerger {
    /// Merger for the given sides and their joined layout
    pub fn new(left: &ColumnLayout, right: &ColumnLayout, joined: &ColumnLayout) -> Self {
        Self {
            left_columns: left.column_count(),
            right_columns: right.column_count(),
            left_locations: left.location_count(),
            right_locations: right.location_count(),
            left_scores: left.has_scores(),
            right_scores: right.has_scores(),
            joined_scores: joined.has_scores(),
            width: joined.tuple_width(),
        }
    }

    /// Merge a pair; either side may be absent for outer-join padding
    pub fn merge(&self, left: Option<&[Value]>, right: Option<&[Value]>) -> Tuple {
        let mut out = Vec::with_capacity(self.width);
        let lc = self.left_columns;
        let rc = self.right_columns;
        let ll = self.left_locations;
        let rl = self.right_locations;

        push_slice(&mut out, left, 0..lc);
        push_slice(&mut out, right, 0..rc);
        push_slice(&mut out, left, lc..lc + ll);
        push_slice(&mut out, right, rc..rc + rl);
        if self.joined_scores {
            let left_scores = left.filter(|_| self.left_scores);
            let right_scores = right.filter(|_| self.right_scores);
            push_slice(&mut out, left_scores, lc + ll..lc + 2 * ll);
            push_slice(&mut out, right_scores, rc + rl..rc + 2 * rl);
        }
        out
    }
}

fn push_slice(out: &mut Tuple, tuple: Option<&[Value]>, range: std::ops::Range<usize>) {
    match tuple {
        Some(tuple) => out.extend_from_slice(&tuple[range]),
        None => out.extend(range.map(|_| Value::Null)),
    }
}

/// Which side of the join a selector lives on
fn side_of(selector: &SelectorName, left: &ColumnLayout, right: &ColumnLayout) -> Result<bool> {
    if left.has_selector(selector) {
        Ok(true)
    } else if right.has_selector(selector) {
        Ok(false)
    } else {
        Err(Error::NoSuchSelector(selector.to_string()))
    }
}

fn property_key(layout: &ColumnLayout, selector: &SelectorName, property: &str) -> Result<(KeyFn, String)> {
    let index = layout
        .column_index_for_property(selector, property)
        .ok_or_else(|| Error::NoSuchColumn(format!("{}.{}", selector, property)))?;
    let type_name = layout.column_type(index)?.to_string();
    let key: KeyFn = Arc::new(move |tuple: &[Value]| tuple.get(index).cloned().unwrap_or_default());
    Ok((key, type_name))
}

fn path_key(layout: &ColumnLayout, selector: &SelectorName, parent: bool) -> Result<KeyFn> {
    let index = layout.location_index(selector)?;
    Ok(Arc::new(move |tuple: &[Value]| {
        let path = tuple.get(index).and_then(Value::as_location).map(|l| l.path());
        let path: Option<Path> = if parent {
            path.and_then(Path::parent)
        } else {
            path.cloned()
        };
        path.map(Value::Path).unwrap_or_default()
    }))
}

enum Predicate {
    /// Keys equal under the comparator
    Keyed {
        left_key: KeyFn,
        right_key: KeyFn,
        compare: CompareFn,
    },
    /// One side's node lies below the other's
    Descendant {
        ancestor_on_left: bool,
        ancestor_index: usize,
        descendant_index: usize,
        analyzer: Option<Arc<dyn Analyzer>>,
    },
    /// Cross join
    Always,
}

/// The relational predicate of a join condition, with merge-join keys where
/// the condition admits a total order
pub struct JoinMatcher {
    predicate: Predicate,
    description: String,
}

impl JoinMatcher {
    /// Derive extractors, predicate and comparator for a condition
    pub fn new(
        ctx: &QueryContext,
        join_type: JoinType,
        condition: &JoinCondition,
        left: &ColumnLayout,
        right: &ColumnLayout,
    ) -> Result<Self> {
        if join_type == JoinType::Cross {
            return Ok(Self::cross());
        }
        let description = condition.to_string();
        let path_compare: CompareFn = Arc::new(|a: &Value, b: &Value| a.total_cmp(b));
        let predicate = match condition {
            JoinCondition::Equi {
                selector1,
                property1,
                selector2,
                property2,
            } => {
                let (left_sel, left_prop, right_sel, right_prop) =
                    if side_of(selector1, left, right)? {
                        (selector1, property1, selector2, property2)
                    } else {
                        (selector2, property2, selector1, property1)
                    };
                let (left_key, left_type) = property_key(left, left_sel, left_prop)?;
                let (right_key, right_type) = property_key(right, right_sel, right_prop)?;
                let types = Arc::clone(ctx.type_system());
                let compare: CompareFn = if left_type.eq_ignore_ascii_case(&right_type) {
                    Arc::new(move |a: &Value, b: &Value| {
                        types.factory_or_default(&left_type).compare(a, b)
                    })
                } else {
                    Arc::new(move |a: &Value, b: &Value| types.default_compare(a, b))
                };
                Predicate::Keyed {
                    left_key,
                    right_key,
                    compare,
                }
            }
            JoinCondition::SameNode {
                selector1,
                selector2,
            } => {
                let (left_sel, right_sel) = if side_of(selector1, left, right)? {
                    (selector1, selector2)
                } else {
                    (selector2, selector1)
                };
                Predicate::Keyed {
                    left_key: path_key(left, left_sel, false)?,
                    right_key: path_key(right, right_sel, false)?,
                    compare: path_compare,
                }
            }
            JoinCondition::ChildNode {
                parent_selector,
                child_selector,
            } => {
                let parent_on_left = side_of(parent_selector, left, right)?;
                let (left_key, right_key) = if parent_on_left {
                    (
                        path_key(left, parent_selector, false)?,
                        path_key(right, child_selector, true)?,
                    )
                } else {
                    (
                        path_key(left, child_selector, true)?,
                        path_key(right, parent_selector, false)?,
                    )
                };
                Predicate::Keyed {
                    left_key,
                    right_key,
                    compare: path_compare,
                }
            }
            JoinCondition::DescendantNode {
                ancestor_selector,
                descendant_selector,
            } => {
                let ancestor_on_left = side_of(ancestor_selector, left, right)?;
                let (ancestor_layout, descendant_layout) = if ancestor_on_left {
                    (left, right)
                } else {
                    (right, left)
                };
                Predicate::Descendant {
                    ancestor_on_left,
                    ancestor_index: ancestor_layout.location_index(ancestor_selector)?,
                    descendant_index: descendant_layout.location_index(descendant_selector)?,
                    analyzer: ctx.analyzer().cloned(),
                }
            }
        };
        Ok(Self {
            predicate,
            description,
        })
    }

    /// Matcher accepting every pair
    pub fn cross() -> Self {
        Self {
            predicate: Predicate::Always,
            description: JoinType::Cross.to_string(),
        }
    }

    /// Whether merge join can evaluate this condition
    pub fn supports_merge(&self) -> bool {
        matches!(self.predicate, Predicate::Keyed { .. })
    }

    /// Relational predicate between a left and a right tuple
    pub fn matches(&self, left: &[Value], right: &[Value]) -> bool {
        match &self.predicate {
            Predicate::Always => true,
            Predicate::Keyed {
                left_key,
                right_key,
                compare,
            } => {
                let a = left_key(left);
                let b = right_key(right);
                !a.is_null() && !b.is_null() && compare(&a, &b) == Ordering::Equal
            }
            Predicate::Descendant {
                ancestor_on_left,
                ancestor_index,
                descendant_index,
                analyzer,
            } => {
                let (ancestor_tuple, descendant_tuple) = if *ancestor_on_left {
                    (left, right)
                } else {
                    (right, left)
                };
                let ancestor = ancestor_tuple.get(*ancestor_index).and_then(Value::as_location);
                let descendant = descendant_tuple
                    .get(*descendant_index)
                    .and_then(Value::as_location);
                match (ancestor, descendant, analyzer) {
                    (Some(a), Some(d), Some(analyzer)) => analyzer.is_descendant_of(d, a),
                    (Some(a), Some(d), None) => d.path().is_descendant_of(a.path()),
                    _ => false,
                }
            }
        }
    }

    /// Sort keys ordering the left and right inputs for merge join
    pub fn merge_keys(&self) -> Option<(SortKey, SortKey)> {
        match &self.predicate {
            Predicate::Keyed {
                left_key,
                right_key,
                compare,
            } => Some((
                SortKey::new(Arc::clone(left_key), Arc::clone(compare), false),
                SortKey::new(Arc::clone(right_key), Arc::clone(compare), false),
            )),
            _ => None,
        }
    }

    fn keyed_parts(&self) -> Option<(&KeyFn, &KeyFn, &CompareFn)> {
        match &self.predicate {
            Predicate::Keyed {
                left_key,
                right_key,
                compare,
            } => Some((left_key, right_key, compare)),
            _ => None,
        }
    }

    /// Condition text for plan traces
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Joined layout for two sides
pub(crate) fn joined_layout(left: &ColumnLayout, right: &ColumnLayout) -> Result<Arc<ColumnLayout>> {
    Ok(Arc::new(left.join_with(right)?))
}

/// Append padded unmatched tuples for outer joins
pub(crate) fn pad_unmatched(
    join_type: JoinType,
    merger: &TupleMerger,
    left: &[Tuple],
    left_matched: &[bool],
    right: &[Tuple],
    right_matched: &[bool],
    out: &mut Vec<Tuple>,
) {
    if join_type.keeps_unmatched_left() {
        for (tuple, _) in left.iter().zip(left_matched).filter(|(_, m)| !**m) {
            out.push(merger.merge(Some(tuple.as_slice()), None));
        }
    }
    if join_type.keeps_unmatched_right() {
        for (tuple, _) in right.iter().zip(right_matched).filter(|(_, m)| !**m) {
            out.push(merger.merge(None, Some(tuple.as_slice())));
        }
    }
}

//! Merge join over inputs sorted by the join key
//!
//! Both inputs are wrapped in a sort on their side's key, which passes input
//! already in key order through untouched, then walked in lockstep. Runs of equal keys on both sides produce their cross product.
//! Null keys never match and are passed over.

use super::{JoinMatcher, TupleMerger, joined_layout, pad_unmatched};
use crate::error::{Error, Result};
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::operators::sort::{CompareFn, SortValuesStage};
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::{JoinCondition, JoinType};
use crate::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Join stage walking two key-sorted inputs
pub struct MergeJoinStage {
    left: BoxedStage,
    right: BoxedStage,
    layout: Arc<ColumnLayout>,
    join_type: JoinType,
    matcher: JoinMatcher,
    merger: TupleMerger,
}

impl MergeJoinStage {
    /// Join two delegates on `condition`, which must be an equality on
    /// property values or on (parent) paths
    pub fn new(
        ctx: &QueryContext,
        join_type: JoinType,
        condition: &JoinCondition,
        left: BoxedStage,
        right: BoxedStage,
    ) -> Result<Self> {
        let layout = joined_layout(left.layout(), right.layout())?;
        let matcher = JoinMatcher::new(ctx, join_type, condition, left.layout(), right.layout())?;
        let (left_key, right_key) = matcher.merge_keys().ok_or_else(|| {
            Error::plan(format!("merge join cannot evaluate {}", condition))
        })?;
        let merger = TupleMerger::new(left.layout(), right.layout(), &layout);
        let description = format!("key of {}", condition);
        let left: BoxedStage = Box::new(SortValuesStage::with_keys(left, vec![left_key], description.clone()));
        let right: BoxedStage = Box::new(SortValuesStage::with_keys(right, vec![right_key], description));
        Ok(Self {
            left,
            right,
            layout,
            join_type,
            matcher,
            merger,
        })
    }
}

impl Stage for MergeJoinStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let left = self.left.execute()?;
        let right = self.right.execute()?;
        let Some((left_key, right_key, compare)) = self.matcher.keyed_parts() else {
            return Err(Error::internal("merge join lost its key extractors"));
        };
        let left_keys: Vec<Value> = left.iter().map(|t| left_key(t.as_slice())).collect();
        let right_keys: Vec<Value> = right.iter().map(|t| right_key(t.as_slice())).collect();

        let mut left_matched = vec![false; left.len()];
        let mut right_matched = vec![false; right.len()];
        let mut out = Vec::new();
        let mut li = 0;
        let mut ri = 0;

        while li < left.len() && ri < right.len() {
            if left_keys[li].is_null() {
                li += 1;
                continue;
            }
            if right_keys[ri].is_null() {
                ri += 1;
                continue;
            }
            match compare(&left_keys[li], &right_keys[ri]) {
                Ordering::Less => li += 1,
                Ordering::Greater => ri += 1,
                Ordering::Equal => {
                    let left_end = group_end(&left_keys, li, compare);
                    let right_end = group_end(&right_keys, ri, compare);
                    for l in li..left_end {
                        for r in ri..right_end {
                            out.push(self.merger.merge(Some(left[l].as_slice()), Some(right[r].as_slice())));
                        }
                    }
                    left_matched[li..left_end].fill(true);
                    right_matched[ri..right_end].fill(true);
                    li = left_end;
                    ri = right_end;
                }
            }
        }
        pad_unmatched(
            self.join_type,
            &self.merger,
            &left,
            &left_matched,
            &right,
            &right_matched,
            &mut out,
        );
        tracing::trace!(
            "Merge join of {}x{} tuples produced {}",
            left.len(),
            right.len(),
            out.len()
        );
        Ok(out)
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
    }

    fn name(&self) -> &'static str {
        "MergeJoin"
    }

    fn detail(&self) -> String {
        format!("{} ON {}", self.join_type, self.matcher.description())
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }
}

/// End (exclusive) of the run of keys equal to `keys[start]`
fn group_end(keys: &[Value], start: usize, compare: &CompareFn) -> usize {
    let mut end = start + 1;
    while end < keys.len() && compare(&keys[start], &keys[end]) == Ordering::Equal {
        end += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::joins::NestedLoopJoinStage;
    use crate::execution::stage::TupleStage;
    use crate::model::Column;
    use crate::schema::{ImmutableSchemata, StandardTypeSystem};
    use crate::value::Location;

    fn context() -> QueryContext {
        QueryContext::new(
            Arc::new(StandardTypeSystem::new()),
            Arc::new(ImmutableSchemata::new()),
        )
    }

    fn side(selector: &str, keys: &[Option<i64>]) -> BoxedStage {
        let layout = Arc::new(
            ColumnLayout::new(vec![Column::new(selector, "k")], vec!["LONG".into()], false).unwrap(),
        );
        let tuples = keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let path = format!("/{}/{}", selector, i);
                vec![
                    k.map(Value::Long).unwrap_or_default(),
                    Value::Location(Location::parse(&path).unwrap()),
                ]
            })
            .collect();
        Box::new(TupleStage::new(layout, tuples).unwrap())
    }

    fn sorted(mut tuples: Vec<Tuple>) -> Vec<String> {
        let mut rendered: Vec<String> = tuples
            .drain(..)
            .map(|t| t.iter().map(ToString::to_string).collect::<Vec<_>>().join("|"))
            .collect();
        rendered.sort();
        rendered
    }

    fn run_both(join_type: JoinType, left: &[Option<i64>], right: &[Option<i64>]) -> (Vec<Tuple>, Vec<Tuple>) {
        let condition = JoinCondition::equi("a", "k", "b", "k");
        let mut merge =
            MergeJoinStage::new(&context(), join_type, &condition, side("a", left), side("b", right)).unwrap();
        let mut nested =
            NestedLoopJoinStage::new(&context(), join_type, &condition, side("a", left), side("b", right))
                .unwrap();
        (merge.execute().unwrap(), nested.execute().unwrap())
    }

    #[test]
    fn test_duplicate_keys_produce_group_cross_product() {
        let (merge, nested) = run_both(JoinType::Inner, &[Some(1), Some(1), Some(2)], &[Some(1), Some(2), Some(2)]);
        assert_eq!(merge.len(), 4);
        assert_eq!(sorted(merge), sorted(nested));
    }

    #[test]
    fn test_unsorted_inputs_and_null_keys() {
        let left = [Some(3), None, Some(1), Some(3)];
        let right = [None, Some(3), Some(2), Some(1)];
        for join_type in [JoinType::Inner, JoinType::LeftOuter, JoinType::RightOuter, JoinType::FullOuter] {
            let (merge, nested) = run_both(join_type, &left, &right);
            assert_eq!(sorted(merge), sorted(nested), "{}", join_type);
        }
    }

    #[test]
    fn test_ordered_inputs_are_not_resorted() {
        let condition = JoinCondition::equi("a", "k", "b", "k");
        let left = side("a", &[Some(1), Some(2), Some(2)]);
        let right = side("b", &[Some(2), Some(1)]);
        let mut merge = MergeJoinStage::new(&context(), JoinType::Inner, &condition, left, right).unwrap();
        assert_eq!(merge.execute().unwrap().len(), 3);

        let sorts: Vec<String> = merge.children().iter().map(|c| c.detail()).collect();
        assert!(sorts[0].ends_with("(input already ordered)"));
        assert!(!sorts[1].contains("already ordered"));
    }

    #[test]
    fn test_descendant_condition_is_rejected() {
        let condition = JoinCondition::DescendantNode {
            ancestor_selector: "a".into(),
            descendant_selector: "b".into(),
        };
        let result = MergeJoinStage::new(&context(), JoinType::Inner, &condition, side("a", &[]), side("b", &[]));
        assert!(matches!(result, Err(Error::Plan(_))));
    }
}

//! Nested loop join: every left tuple against every right tuple

use super::{JoinMatcher, TupleMerger, joined_layout, pad_unmatched};
use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::{JoinCondition, JoinType};
use std::sync::Arc;

/// Join stage that evaluates the condition for all pairs
pub struct NestedLoopJoinStage {
    left: BoxedStage,
    right: BoxedStage,
    layout: Arc<ColumnLayout>,
    join_type: JoinType,
    matcher: JoinMatcher,
    merger: TupleMerger,
}

impl NestedLoopJoinStage {
    /// Join two delegates on `condition`
    pub fn new(
        ctx: &QueryContext,
        join_type: JoinType,
        condition: &JoinCondition,
        left: BoxedStage,
        right: BoxedStage,
    ) -> Result<Self> {
        let layout = joined_layout(left.layout(), right.layout())?;
        let matcher = JoinMatcher::new(ctx, join_type, condition, left.layout(), right.layout())?;
        let merger = TupleMerger::new(left.layout(), right.layout(), &layout);
        Ok(Self {
            left,
            right,
            layout,
            join_type,
            matcher,
            merger,
        })
    }

    /// Cross join, pairing every left tuple with every right tuple
    pub fn cross(left: BoxedStage, right: BoxedStage) -> Result<Self> {
        let layout = joined_layout(left.layout(), right.layout())?;
        let merger = TupleMerger::new(left.layout(), right.layout(), &layout);
        Ok(Self {
            left,
            right,
            layout,
            join_type: JoinType::Cross,
            matcher: JoinMatcher::cross(),
            merger,
        })
    }
}

impl Stage for NestedLoopJoinStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let left = self.left.execute()?;
        let right = self.right.execute()?;
        let mut left_matched = vec![false; left.len()];
        let mut right_matched = vec![false; right.len()];
        let mut out = Vec::new();

        for (i, l) in left.iter().enumerate() {
            for (j, r) in right.iter().enumerate() {
                if self.matcher.matches(l, r) {
                    left_matched[i] = true;
                    right_matched[j] = true;
                    out.push(self.merger.merge(Some(l.as_slice()), Some(r.as_slice())));
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
            "Nested loop join of {}x{} tuples produced {}",
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
        "NestedLoopJoin"
    }

    fn detail(&self) -> String {
        if self.join_type == JoinType::Cross {
            self.join_type.to_string()
        } else {
            format!("{} ON {}", self.join_type, self.matcher.description())
        }
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::stage::TupleStage;
    use crate::model::Column;
    use crate::schema::{ImmutableSchemata, StandardTypeSystem};
    use crate::value::{Location, Value};

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
                let key = k.map(Value::Long).unwrap_or_default();
                let path = format!("/{}/{}", selector, i);
                vec![key, Value::Location(Location::parse(&path).unwrap())]
            })
            .collect();
        Box::new(TupleStage::new(layout, tuples).unwrap())
    }

    fn join(join_type: JoinType, left: &[Option<i64>], right: &[Option<i64>]) -> Vec<Tuple> {
        let mut stage = NestedLoopJoinStage::new(
            &context(),
            join_type,
            &JoinCondition::equi("a", "k", "b", "k"),
            side("a", left),
            side("b", right),
        )
        .unwrap();
        stage.execute().unwrap()
    }

    #[test]
    fn test_inner_join_pairs() {
        let out = join(JoinType::Inner, &[Some(1), Some(2)], &[Some(2), Some(2), Some(3)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|t| t[0] == Value::Long(2) && t[1] == Value::Long(2)));
    }

    #[test]
    fn test_outer_joins_pad_with_nulls() {
        let left = [Some(1), None];
        let right = [Some(1), Some(5)];
        assert_eq!(join(JoinType::Inner, &left, &right).len(), 1);

        let left_outer = join(JoinType::LeftOuter, &left, &right);
        assert_eq!(left_outer.len(), 2);
        assert_eq!(left_outer[1][1], Value::Null);
        assert_eq!(left_outer[1][3], Value::Null);

        let right_outer = join(JoinType::RightOuter, &left, &right);
        assert_eq!(right_outer.len(), 2);
        assert_eq!(right_outer[1][0], Value::Null);
        assert_eq!(right_outer[1][1], Value::Long(5));

        assert_eq!(join(JoinType::FullOuter, &left, &right).len(), 3);
    }

    #[test]
    fn test_cross_join_ignores_condition() {
        let out = join(JoinType::Cross, &[Some(1), Some(2)], &[Some(7), None, Some(9)]);
        assert_eq!(out.len(), 6);
    }
}

//! Select stage: filter tuples by a constraint

use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::constraint::{create_checker, BoxedChecker};
use crate::execution::context::QueryContext;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::Constraint;
use std::sync::Arc;

/// Keeps the delegate's tuples that satisfy a constraint, in order
pub struct SelectStage {
    delegate: BoxedStage,
    checker: BoxedChecker,
    constraint: Constraint,
}

impl SelectStage {
    /// Compile the constraint against the delegate's layout
    pub fn new(ctx: &QueryContext, delegate: BoxedStage, constraint: &Constraint) -> Result<Self> {
        let checker = create_checker(ctx, delegate.layout(), constraint)?;
        Ok(Self {
            delegate,
            checker,
            constraint: constraint.clone(),
        })
    }
}

impl Stage for SelectStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        self.delegate.layout()
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let mut tuples = self.delegate.execute()?;
        let before = tuples.len();
        tuples.retain_mut(|tuple| self.checker.satisfies(tuple.as_mut_slice()));
        tracing::trace!("Select kept {} of {} tuples", tuples.len(), before);
        Ok(tuples)
    }

    fn close(&mut self) {
        self.delegate.close();
    }

    fn name(&self) -> &'static str {
        "Select"
    }

    fn detail(&self) -> String {
        self.constraint.to_string()
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.delegate.as_ref()]
    }

    fn is_sorted_by_location(&self) -> bool {
        self.delegate.is_sorted_by_location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::stage::TupleStage;
    use crate::model::{Column, DynamicOperand, Operator};
    use crate::schema::{ImmutableSchemata, StandardTypeSystem};
    use crate::value::{Location, Value};

    #[test]
    fn test_select_filters_in_order() {
        let ctx = QueryContext::new(
            Arc::new(StandardTypeSystem::new()),
            Arc::new(ImmutableSchemata::new()),
        );
        let layout = Arc::new(
            ColumnLayout::new(vec![Column::new("a", "n")], vec!["LONG".into()], false).unwrap(),
        );
        let tuples = (1..=5)
            .map(|n| {
                vec![
                    Value::Long(n),
                    Value::Location(Location::parse(&format!("/n{}", n)).unwrap()),
                ]
            })
            .collect();
        let source = TupleStage::new(layout, tuples).unwrap();
        let constraint = Constraint::compare(
            DynamicOperand::property("a", "n"),
            Operator::GreaterThanOrEqualTo,
            3i64,
        );
        let mut stage = SelectStage::new(&ctx, Box::new(source), &constraint).unwrap();
        let kept: Vec<Value> = stage.execute().unwrap().into_iter().map(|t| t[0].clone()).collect();
        assert_eq!(kept, vec![Value::Long(3), Value::Long(4), Value::Long(5)]);
        assert_eq!(stage.detail(), "a.n >= 3");
    }
}

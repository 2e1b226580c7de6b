//! Dependent query: run the left branch, publish its values, run the right

use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::value::Value;
use std::sync::Arc;

/// Executes two branches in order; the right one sees the left one's first
/// column as a list-valued variable
pub struct DependentQueryStage {
    ctx: QueryContext,
    left: BoxedStage,
    right: BoxedStage,
    left_variable: Option<String>,
    right_variable: Option<String>,
}

impl DependentQueryStage {
    /// Chain `left` into `right` through the named variables
    pub fn new(
        ctx: &QueryContext,
        left: BoxedStage,
        left_variable: Option<String>,
        right: BoxedStage,
        right_variable: Option<String>,
    ) -> Self {
        Self {
            ctx: ctx.clone(),
            left,
            right,
            left_variable,
            right_variable,
        }
    }

    fn publish(&self, variable: &Option<String>, layout: &ColumnLayout, tuples: &[Tuple]) {
        let Some(name) = variable else {
            return;
        };
        if layout.column_count() == 0 {
            return;
        }
        let values: Vec<Value> = tuples.iter().map(|t| t[0].clone()).collect();
        tracing::debug!("Binding ${} to {} values", name, values.len());
        self.ctx.set_variable(name.clone(), Value::List(values));
    }
}

impl Stage for DependentQueryStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        self.right.layout()
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let left = self.left.execute()?;
        self.publish(&self.left_variable, self.left.layout(), &left);
        let right = self.right.execute()?;
        self.publish(&self.right_variable, self.right.layout(), &right);
        Ok(right)
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
    }

    fn name(&self) -> &'static str {
        "DependentQuery"
    }

    fn detail(&self) -> String {
        let name = |v: &Option<String>| v.as_deref().map(|n| format!("${}", n)).unwrap_or_else(|| "-".into());
        format!("{} -> {}", name(&self.left_variable), name(&self.right_variable))
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.left.as_ref(), self.right.as_ref()]
    }

    fn is_sorted_by_location(&self) -> bool {
        self.right.is_sorted_by_location()
    }
}

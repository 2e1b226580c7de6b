//! Stage trait and shared helpers

use crate::error::{Error, Result};
use crate::execution::columns::ColumnLayout;
use crate::value::Value;
use std::sync::Arc;

/// One result record; its width always equals the layout's tuple width
pub type Tuple = Vec<Value>;

/// An executable unit of a compiled plan.
///
/// Stages form a strict tree owned by one execution. `execute` recomputes its
/// result on every call, and `close` may be called any number of times.
pub trait Stage: Send {
    /// Shape of the tuples this stage produces; fixed after construction
    fn layout(&self) -> &Arc<ColumnLayout>;

    /// Materialize all tuples
    fn execute(&mut self) -> Result<Vec<Tuple>>;

    /// Release resources held by this stage and its delegates
    fn close(&mut self) {}

    /// Stage kind, used in plan traces
    fn name(&self) -> &'static str;

    /// Whether the output is guaranteed sorted by the location zone
    fn is_sorted_by_location(&self) -> bool {
        false
    }

    /// One-line description of this stage's settings
    fn detail(&self) -> String {
        String::new()
    }

    /// Direct delegates, in order
    fn children(&self) -> Vec<&dyn Stage> {
        Vec::new()
    }
}

/// A boxed stage for dynamic dispatch
pub type BoxedStage = Box<dyn Stage>;

/// Indented description of a stage tree
pub fn describe(stage: &dyn Stage) -> String {
    let mut out = String::new();
    describe_into(stage, 0, &mut out);
    out
}

fn describe_into(stage: &dyn Stage, depth: usize, out: &mut String) {
    out.push_str(&"  ".repeat(depth));
    out.push_str(stage.name());
    let detail = stage.detail();
    if !detail.is_empty() {
        out.push(' ');
        out.push_str(&detail);
    }
    out.push('\n');
    for child in stage.children() {
        describe_into(child, depth + 1, out);
    }
}

/// Check that every tuple matches the layout width
pub(crate) fn check_widths(stage: &str, layout: &ColumnLayout, tuples: &[Tuple]) -> Result<()> {
    let width = layout.tuple_width();
    if let Some(bad) = tuples.iter().find(|t| t.len() != width) {
        return Err(Error::internal(format!(
            "{} produced a tuple of width {} for a layout of width {}",
            stage,
            bad.len(),
            width
        )));
    }
    Ok(())
}

/// Stage producing no tuples
pub struct EmptyStage {
    layout: Arc<ColumnLayout>,
}

impl EmptyStage {
    /// Create an empty stage with the given layout
    pub fn new(layout: Arc<ColumnLayout>) -> Self {
        Self { layout }
    }
}

impl Stage for EmptyStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "Empty"
    }
}

/// Stage returning a fixed set of tuples; used by access layers that
/// materialize eagerly and by tests
pub struct TupleStage {
    layout: Arc<ColumnLayout>,
    tuples: Vec<Tuple>,
}

impl TupleStage {
    /// Create a stage over prepared tuples; every tuple must fit the layout
    pub fn new(layout: Arc<ColumnLayout>, tuples: Vec<Tuple>) -> Result<Self> {
        check_widths("TupleStage", &layout, &tuples)?;
        Ok(Self { layout, tuples })
    }
}

impl Stage for TupleStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        Ok(self.tuples.clone())
    }

    fn name(&self) -> &'static str {
        "Tuples"
    }

    fn detail(&self) -> String {
        format!("rows={}", self.tuples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn layout() -> Arc<ColumnLayout> {
        Arc::new(ColumnLayout::new(vec![Column::new("a", "x")], vec!["STRING".into()], false).unwrap())
    }

    #[test]
    fn test_tuple_stage_rejects_wrong_width() {
        let result = TupleStage::new(layout(), vec![vec![Value::Null]]);
        assert!(matches!(result, Err(Error::Internal(_))));
    }

    #[test]
    fn test_execute_is_repeatable() {
        let mut stage = TupleStage::new(layout(), vec![vec![Value::from("v"), Value::Null]]).unwrap();
        assert_eq!(stage.execute().unwrap().len(), 1);
        assert_eq!(stage.execute().unwrap().len(), 1);
        stage.close();
        stage.close();
        assert!(EmptyStage::new(layout()).execute().unwrap().is_empty());
        assert_eq!(describe(&stage), "Tuples rows=1\n");
    }
}

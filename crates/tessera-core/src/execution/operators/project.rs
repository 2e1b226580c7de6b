//! Project stage: narrow tuples to a column subset

use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::Column;
use std::sync::Arc;

/// Copies just the requested columns (plus their locations and scores)
pub struct ProjectStage {
    delegate: BoxedStage,
    layout: Arc<ColumnLayout>,
    /// Source slot per output slot; `None` when the layouts coincide
    source_slots: Option<Vec<usize>>,
}

impl ProjectStage {
    /// Narrow the delegate's layout to `columns`
    pub fn new(delegate: BoxedStage, columns: &[Column]) -> Result<Self> {
        let (narrowed, slots) = delegate.layout().sub_select(columns)?;
        let identity = slots.len() == delegate.layout().tuple_width()
            && slots.iter().enumerate().all(|(i, s)| i == *s);
        let layout = if identity {
            Arc::clone(delegate.layout())
        } else {
            Arc::new(narrowed)
        };
        Ok(Self {
            delegate,
            layout,
            source_slots: (!identity).then_some(slots),
        })
    }
}

impl Stage for ProjectStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let tuples = self.delegate.execute()?;
        let Some(slots) = &self.source_slots else {
            return Ok(tuples);
        };
        Ok(tuples
            .into_iter()
            .map(|tuple| slots.iter().map(|&i| tuple[i].clone()).collect())
            .collect())
    }

    fn close(&mut self) {
        self.delegate.close();
    }

    fn name(&self) -> &'static str {
        "Project"
    }

    fn detail(&self) -> String {
        self.layout.column_names().join(", ")
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.delegate.as_ref()]
    }

    fn is_sorted_by_location(&self) -> bool {
        self.source_slots.is_none() && self.delegate.is_sorted_by_location()
    }
}

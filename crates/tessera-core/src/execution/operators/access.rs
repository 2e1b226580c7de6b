//! Access stage: the boundary to the backing store

use crate::error::{Error, Result};
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::stage::{check_widths, BoxedStage, Stage, Tuple};
use crate::plan::PlanNode;
use std::sync::Arc;

/// Builds the stages that fetch tuples from the backing store
pub trait AccessFactory: Send + Sync {
    /// Create a stage for an ACCESS node producing tuples in `layout`
    fn create_access(
        &self,
        ctx: &QueryContext,
        node: &PlanNode,
        layout: Arc<ColumnLayout>,
    ) -> Result<BoxedStage>;
}

/// Wraps the store-provided stage; empty when the plan proved the branch empty
pub struct AccessStage {
    layout: Arc<ColumnLayout>,
    delegate: Option<BoxedStage>,
    source: String,
}

impl AccessStage {
    /// Create the access stage for an ACCESS node
    pub fn new(
        ctx: &QueryContext,
        factory: &dyn AccessFactory,
        node: &PlanNode,
        layout: Arc<ColumnLayout>,
    ) -> Result<Self> {
        let source = node
            .selectors
            .iter()
            .map(|s| s.name())
            .collect::<Vec<_>>()
            .join(", ");
        if node.properties.access_no_results == Some(true) {
            tracing::debug!("Access to [{}] is provably empty, skipping the store", source);
            return Ok(Self {
                layout,
                delegate: None,
                source,
            });
        }
        let delegate = factory.create_access(ctx, node, Arc::clone(&layout))?;
        if delegate.layout().tuple_width() != layout.tuple_width() {
            return Err(Error::internal(format!(
                "access layer returned layout {} instead of {}",
                delegate.layout(),
                layout
            )));
        }
        Ok(Self {
            layout,
            delegate: Some(delegate),
            source,
        })
    }
}

impl Stage for AccessStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let Some(delegate) = self.delegate.as_mut() else {
            return Ok(Vec::new());
        };
        let tuples = delegate.execute()?;
        check_widths("Access", &self.layout, &tuples)?;
        tracing::trace!("Access [{}] fetched {} tuples", self.source, tuples.len());
        Ok(tuples)
    }

    fn close(&mut self) {
        if let Some(delegate) = self.delegate.as_mut() {
            delegate.close();
        }
    }

    fn name(&self) -> &'static str {
        "Access"
    }

    fn detail(&self) -> String {
        match self.delegate {
            Some(_) => format!("[{}]", self.source),
            None => format!("[{}] no results", self.source),
        }
    }

    fn children(&self) -> Vec<&dyn Stage> {
        self.delegate.iter().map(|d| d.as_ref()).collect()
    }

    fn is_sorted_by_location(&self) -> bool {
        match &self.delegate {
            Some(delegate) => delegate.is_sorted_by_location(),
            None => true,
        }
    }
}

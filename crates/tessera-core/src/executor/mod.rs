//! Query processor - compiles an optimized plan into a stage tree and runs it
//!
//! Plan node to stage mapping:
//! - ACCESS → [`AccessStage`] (empty when the plan proved the branch empty)
//! - DUP_REMOVE → [`DistinctStage`]
//! - JOIN → [`NestedLoopJoinStage`] or [`MergeJoinStage`], then one
//!   [`SelectStage`] per join constraint
//! - LIMIT, PROJECT, SELECT, SORT → the matching wrapping stage
//! - SET_OPERATION → [`SetOperationStage`], or [`EmptyStage`] without children
//! - DEPENDENT_QUERY → [`DependentQueryStage`]
//! - NULL → [`EmptyStage`]
//!
//! GROUP is not supported; a SOURCE outside an ACCESS is a malformed plan.

pub mod results;

pub use results::{Cursor, QueryResults, ResultRow, ResultSet, Row};

use crate::error::{Error, Result};
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::joins::{MergeJoinStage, NestedLoopJoinStage};
use crate::execution::operators::{
    AccessFactory, AccessStage, DependentQueryStage, DistinctStage, Limit, LimitStage, ProjectStage, SelectStage,
    SetOperationStage, SortLocationsStage, SortValuesStage,
};
use crate::execution::stage::{BoxedStage, EmptyStage, Stage, describe};
use crate::model::{Column, JoinAlgorithm, JoinCondition, JoinType, SelectorName, SetOperation};
use crate::plan::{PlanNode, PlanType, SortKeys};
use crate::schema::types;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Elapsed time per query phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    /// Time spent building the canonical plan
    pub planning: Duration,
    /// Time spent optimizing the plan
    pub optimization: Duration,
    /// Time spent compiling the plan into stages
    pub result_formulation: Duration,
    /// Time spent executing the stage tree
    pub execution: Duration,
}

impl Statistics {
    /// Statistics carrying the phases that ran before the processor
    pub fn new(planning: Duration, optimization: Duration) -> Self {
        Self {
            planning,
            optimization,
            ..Self::default()
        }
    }

    /// Sum of all phases
    pub fn total(&self) -> Duration {
        self.planning + self.optimization + self.result_formulation + self.execution
    }
}

fn readable(duration: Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.3}usec", nanos as f64 / 1e3)
    } else if nanos < 1_000_000_000 {
        format!("{:.3}ms", nanos as f64 / 1e6)
    } else {
        format!("{:.3}sec", duration.as_secs_f64())
    }
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "plan={}, opt={}, resultSetFormulation={}, execution={}",
            readable(self.planning),
            readable(self.optimization),
            readable(self.result_formulation),
            readable(self.execution)
        )
    }
}

/// Runs optimized plans against a backing store
#[derive(Clone)]
pub struct QueryProcessor {
    access: Arc<dyn AccessFactory>,
}

impl QueryProcessor {
    /// Processor fetching leaf tuples through `access`
    pub fn new(access: Arc<dyn AccessFactory>) -> Self {
        Self { access }
    }

    /// Compile and execute a plan
    pub fn execute(&self, ctx: &QueryContext, plan: &PlanNode) -> Result<QueryResults> {
        self.execute_with_statistics(ctx, plan, Statistics::default())
    }

    /// Compile and execute a plan, extending statistics from earlier phases
    pub fn execute_with_statistics(
        &self,
        ctx: &QueryContext,
        plan: &PlanNode,
        mut statistics: Statistics,
    ) -> Result<QueryResults> {
        let started = Instant::now();
        let mut stage = self.compile(ctx, plan)?;
        statistics.result_formulation = started.elapsed();

        let trace = ctx.config().trace_plan.then(|| describe(stage.as_ref()));
        if let Some(trace) = &trace {
            tracing::debug!("Executing stage tree:\n{}", trace);
        }

        let started = Instant::now();
        let outcome = stage.execute();
        stage.close();
        statistics.execution = started.elapsed();
        let tuples = outcome?;

        tracing::debug!("Query produced {} tuples ({})", tuples.len(), statistics);
        Ok(QueryResults::new(
            Arc::clone(stage.layout()),
            tuples,
            ctx.problems(),
            statistics,
            trace,
        ))
    }

    /// Describe the stage tree a plan compiles to, without executing it
    pub fn explain(&self, ctx: &QueryContext, plan: &PlanNode) -> Result<String> {
        let mut stage = self.compile(ctx, plan)?;
        let description = describe(stage.as_ref());
        stage.close();
        Ok(description)
    }

    /// Build the stage tree for a plan
    pub fn compile(&self, ctx: &QueryContext, plan: &PlanNode) -> Result<BoxedStage> {
        let sources = source_aliases(plan);
        let compiler = Compiler {
            ctx,
            access: self.access.as_ref(),
            sources,
        };
        compiler.compile(plan, plan.produces_scores())
    }
}

impl fmt::Debug for QueryProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryProcessor").finish_non_exhaustive()
    }
}

/// Selector to table name, from every SOURCE node in the plan
fn source_aliases(plan: &PlanNode) -> HashMap<SelectorName, SelectorName> {
    plan.find_all_at_or_below(PlanType::Source)
        .into_iter()
        .filter_map(|node| {
            let table = node.properties.source_name.clone()?;
            let selector = node
                .properties
                .source_alias
                .clone()
                .unwrap_or_else(|| table.clone());
            Some((selector, table))
        })
        .collect()
}

struct Compiler<'a> {
    ctx: &'a QueryContext,
    access: &'a dyn AccessFactory,
    sources: HashMap<SelectorName, SelectorName>,
}

impl Compiler<'_> {
    fn compile(&self, node: &PlanNode, scores: bool) -> Result<BoxedStage> {
        let scores = scores || node.produces_scores();
        let stage: BoxedStage = match node.node_type {
            PlanType::Access => {
                let layout = Arc::new(self.columns_for(node, scores)?);
                Box::new(AccessStage::new(self.ctx, self.access, node, layout)?)
            }
            PlanType::DupRemove => Box::new(DistinctStage::new(self.only_child(node, scores)?)),
            PlanType::Join => self.compile_join(node, scores)?,
            PlanType::Limit => {
                let limit = Limit {
                    row_limit: node.properties.limit_count,
                    offset: node.properties.limit_offset.unwrap_or(0),
                };
                Box::new(LimitStage::new(self.only_child(node, scores)?, limit))
            }
            PlanType::Project => {
                let columns = node
                    .properties
                    .project_columns
                    .as_ref()
                    .ok_or_else(|| Error::plan("PROJECT node without columns"))?;
                Box::new(ProjectStage::new(self.only_child(node, scores)?, columns)?)
            }
            PlanType::Select => {
                let criteria = node
                    .properties
                    .select_criteria
                    .as_ref()
                    .ok_or_else(|| Error::plan("SELECT node without criteria"))?;
                Box::new(SelectStage::new(self.ctx, self.only_child(node, scores)?, criteria)?)
            }
            PlanType::Sort => {
                let child = self.only_child(node, scores)?;
                match &node.properties.sort_order_by {
                    Some(SortKeys::Orderings(orderings)) => {
                        Box::new(SortValuesStage::new(self.ctx, child, orderings)?)
                    }
                    Some(SortKeys::Selectors(selectors)) if !selectors.is_empty() => {
                        Box::new(SortLocationsStage::for_selectors(child, selectors)?)
                    }
                    _ => Box::new(SortLocationsStage::new(child)),
                }
            }
            PlanType::SetOperation if node.children.is_empty() => {
                Box::new(EmptyStage::new(Arc::new(self.columns_for(node, scores)?)))
            }
            PlanType::SetOperation => {
                let operation = node.properties.set_operation.unwrap_or(SetOperation::Union);
                let use_all = node.properties.set_use_all.unwrap_or(false);
                let sources = node
                    .children
                    .iter()
                    .map(|child| self.compile(child, scores))
                    .collect::<Result<Vec<_>>>()?;
                Box::new(SetOperationStage::new(self.ctx, operation, use_all, sources)?)
            }
            PlanType::DependentQuery => {
                let [left, right] = node.children.as_slice() else {
                    return Err(Error::plan(format!(
                        "DEPENDENT_QUERY needs 2 children, found {}",
                        node.children.len()
                    )));
                };
                Box::new(DependentQueryStage::new(
                    self.ctx,
                    self.compile(left, scores)?,
                    left.properties.variable_name.clone(),
                    self.compile(right, scores)?,
                    right.properties.variable_name.clone(),
                ))
            }
            PlanType::Null => Box::new(EmptyStage::new(Arc::new(self.columns_for(node, scores)?))),
            PlanType::Group => return Err(Error::unsupported("GROUP plan nodes")),
            PlanType::Source => {
                return Err(Error::internal(
                    "SOURCE node reached the processor outside of an ACCESS node",
                ));
            }
        };
        Ok(stage)
    }

    fn only_child(&self, node: &PlanNode, scores: bool) -> Result<BoxedStage> {
        let child = node
            .first_child()
            .ok_or_else(|| Error::plan(format!("{} node without a child", node.node_type)))?;
        self.compile(child, scores)
    }

    fn compile_join(&self, node: &PlanNode, scores: bool) -> Result<BoxedStage> {
        let [left, right] = node.children.as_slice() else {
            return Err(Error::plan(format!("JOIN needs 2 children, found {}", node.children.len())));
        };
        let left = self.compile(left, scores)?;
        let right = self.compile(right, scores)?;
        let join_type = node.properties.join_type.unwrap_or_default();
        let algorithm = node.properties.join_algorithm.unwrap_or_default();

        let mut stage: BoxedStage = match (&node.properties.join_condition, join_type) {
            (_, JoinType::Cross) => Box::new(NestedLoopJoinStage::cross(left, right)?),
            (None, _) => return Err(Error::plan("JOIN node without a condition")),
            (Some(condition), _) => {
                let merge = algorithm == JoinAlgorithm::Merge;
                if merge && matches!(condition, JoinCondition::DescendantNode { .. }) {
                    tracing::debug!("{} has no total order, using nested loop join", condition);
                }
                if merge && !matches!(condition, JoinCondition::DescendantNode { .. }) {
                    Box::new(MergeJoinStage::new(self.ctx, join_type, condition, left, right)?)
                } else {
                    Box::new(NestedLoopJoinStage::new(self.ctx, join_type, condition, left, right)?)
                }
            }
        };
        for constraint in node.properties.join_constraints.iter().flatten() {
            stage = Box::new(SelectStage::new(self.ctx, stage, constraint)?);
        }
        Ok(stage)
    }

    /// Layout for a leaf: the first PROJECT at or below the node, else every
    /// declared column of the node's selectors
    fn columns_for(&self, node: &PlanNode, scores: bool) -> Result<ColumnLayout> {
        if let Some(project) = node.find_at_or_below(PlanType::Project) {
            if let Some(columns) = &project.properties.project_columns {
                let types = match &project.properties.project_column_types {
                    Some(types) => types.clone(),
                    None => columns
                        .iter()
                        .map(|c| self.declared_type(&c.selector, &c.property))
                        .collect(),
                };
                return ColumnLayout::with_selectors(columns.clone(), types, node.selectors.clone(), scores);
            }
        }

        let mut columns = Vec::new();
        let mut types = Vec::new();
        for selector in &node.selectors {
            let table_name = self.sources.get(selector).unwrap_or(selector);
            let Some(table) = self.ctx.schemata().table(table_name) else {
                if node.node_type == PlanType::Null {
                    continue;
                }
                return Err(Error::plan(format!(
                    "no table '{}' declared for selector '{}'",
                    table_name, selector
                )));
            };
            for column in &table.columns {
                columns.push(Column::new(selector.clone(), column.name.clone()));
                types.push(column.type_name.clone());
            }
        }
        ColumnLayout::with_selectors(columns, types, node.selectors.clone(), scores)
    }

    fn declared_type(&self, selector: &SelectorName, property: &str) -> String {
        let table_name = self.sources.get(selector).unwrap_or(selector);
        self.ctx
            .schemata()
            .table(table_name)
            .and_then(|table| table.column(property))
            .map(|column| column.type_name.clone())
            .unwrap_or_else(|| types::STRING.to_string())
    }
}

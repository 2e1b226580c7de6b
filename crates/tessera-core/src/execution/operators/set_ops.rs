//! Union, intersect and except over location-sorted sources
//!
//! Tuples are compared by their location zone only. Sources that do not
//! report location order are wrapped in a [`SortLocationsStage`]; sources
//! that do are trusted unless `verify_sorted_inputs` is set.

use super::sort::{SortLocationsStage, compare_locations, is_sorted_by_locations, sort_by_locations};
use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::SetOperation;
use std::cmp::Ordering;
use std::sync::Arc;

/// Combines N union-compatible sources
pub struct SetOperationStage {
    ctx: QueryContext,
    operation: SetOperation,
    use_all: bool,
    sources: Vec<BoxedStage>,
    layout: Arc<ColumnLayout>,
    compatible: bool,
    indexes: Vec<usize>,
}

impl SetOperationStage {
    /// Combine `sources` with `operation`; `use_all` keeps duplicates
    pub fn new(
        ctx: &QueryContext,
        operation: SetOperation,
        use_all: bool,
        sources: Vec<BoxedStage>,
    ) -> Result<Self> {
        let layout = match sources.first() {
            Some(first) => Arc::clone(first.layout()),
            None => {
                tracing::debug!("{} without sources produces no tuples", operation);
                Arc::new(ColumnLayout::new(Vec::new(), Vec::new(), false)?)
            }
        };
        let compatible = sources.iter().all(|s| layout.is_union_compatible(s.layout()));
        if !compatible {
            ctx.add_warning(format!(
                "{} sources are not union-compatible; the result is empty",
                operation
            ));
        }
        let sources = sources
            .into_iter()
            .map(|source| -> BoxedStage {
                if source.is_sorted_by_location() {
                    source
                } else {
                    tracing::debug!("Sorting {} source {} by location", operation, source.name());
                    Box::new(SortLocationsStage::new(source))
                }
            })
            .collect();
        let indexes = layout.location_indexes().collect();
        Ok(Self {
            ctx: ctx.clone(),
            operation,
            use_all,
            sources,
            layout,
            compatible,
            indexes,
        })
    }

    fn execute_sources(&mut self) -> Result<Vec<Vec<Tuple>>> {
        let verify = self.ctx.config().verify_sorted_inputs;
        let mut results = Vec::with_capacity(self.sources.len());
        for source in &mut self.sources {
            let mut tuples = source.execute()?;
            if verify && !is_sorted_by_locations(source.layout(), &tuples) {
                self.ctx.add_warning(format!(
                    "{} source {} was not sorted by location; re-sorting",
                    self.operation,
                    source.name()
                ));
                sort_by_locations(source.layout(), &mut tuples);
            }
            results.push(tuples);
        }
        Ok(results)
    }

    fn union(&self, results: Vec<Vec<Tuple>>) -> Vec<Tuple> {
        let mut tuples: Vec<Tuple> = results.into_iter().flatten().collect();
        if !self.use_all {
            tuples.sort_by(|a, b| compare_locations(&self.indexes, a, b));
            self.dedup(&mut tuples);
        }
        tuples
    }

    fn intersect(&self, mut results: Vec<Vec<Tuple>>) -> Vec<Tuple> {
        if results.iter().any(Vec::is_empty) {
            return Vec::new();
        }
        results.sort_by_key(Vec::len);
        let mut results = results.into_iter();
        let mut acc = results.next().unwrap_or_default();
        for next in results {
            acc = self.merge_scan(acc, &next, true);
            if acc.is_empty() {
                break;
            }
        }
        acc
    }

    fn except(&self, results: Vec<Vec<Tuple>>) -> Vec<Tuple> {
        let mut results = results.into_iter();
        let mut acc = results.next().unwrap_or_default();
        if acc.is_empty() {
            return acc;
        }
        let mut subtrahends: Vec<Vec<Tuple>> = results.filter(|r| !r.is_empty()).collect();
        subtrahends.sort_by_key(Vec::len);
        for next in &subtrahends {
            acc = self.merge_scan(acc, next, false);
            if acc.is_empty() {
                break;
            }
        }
        acc
    }

    /// Walk two sorted tuple lists; `retain` keeps matches (intersect),
    /// otherwise matches are dropped (except)
    fn merge_scan(&self, acc: Vec<Tuple>, other: &[Tuple], retain: bool) -> Vec<Tuple> {
        let mut out = Vec::with_capacity(acc.len());
        let mut j = 0;
        let mut acc = acc.into_iter().peekable();
        while let Some(tuple) = acc.peek() {
            let Some(candidate) = other.get(j) else {
                break;
            };
            match compare_locations(&self.indexes, tuple, candidate) {
                Ordering::Less => {
                    let tuple = acc.next().unwrap_or_default();
                    if !retain {
                        out.push(tuple);
                    }
                }
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    let tuple = acc.next().unwrap_or_default();
                    if retain {
                        out.push(tuple);
                        j += 1;
                    } else if self.use_all {
                        j += 1;
                    }
                }
            }
        }
        if !retain {
            out.extend(acc);
        }
        out
    }

    fn dedup(&self, tuples: &mut Vec<Tuple>) {
        tuples.dedup_by(|a, b| compare_locations(&self.indexes, a, b) == Ordering::Equal);
    }
}

impl Stage for SetOperationStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        &self.layout
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        if !self.compatible {
            return Ok(Vec::new());
        }
        let results = self.execute_sources()?;
        let mut tuples = match self.operation {
            SetOperation::Union => self.union(results),
            SetOperation::Intersect => self.intersect(results),
            SetOperation::Except => self.except(results),
        };
        if !self.use_all && self.operation != SetOperation::Union {
            self.dedup(&mut tuples);
        }
        tracing::trace!("{} produced {} tuples", self.operation, tuples.len());
        Ok(tuples)
    }

    fn close(&mut self) {
        for source in &mut self.sources {
            source.close();
        }
    }

    fn name(&self) -> &'static str {
        match self.operation {
            SetOperation::Union => "Union",
            SetOperation::Intersect => "Intersect",
            SetOperation::Except => "Except",
        }
    }

    fn detail(&self) -> String {
        if self.use_all {
            "ALL".to_string()
        } else {
            String::new()
        }
    }

    fn children(&self) -> Vec<&dyn Stage> {
        self.sources.iter().map(|s| s.as_ref()).collect()
    }

    fn is_sorted_by_location(&self) -> bool {
        !(self.operation == SetOperation::Union && self.use_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;
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

    fn source(paths: &[&str]) -> BoxedStage {
        let layout = Arc::new(
            ColumnLayout::new(vec![Column::new("a", "p")], vec!["STRING".into()], false).unwrap(),
        );
        let tuples = paths
            .iter()
            .map(|p| vec![Value::from(*p), Value::Location(Location::parse(p).unwrap())])
            .collect();
        Box::new(TupleStage::new(layout, tuples).unwrap())
    }

    fn run(op: SetOperation, use_all: bool, sources: Vec<BoxedStage>) -> Vec<String> {
        let mut stage = SetOperationStage::new(&context(), op, use_all, sources).unwrap();
        stage.execute().unwrap().iter().map(|t| t[0].to_string()).collect()
    }

    #[test]
    fn test_union_distinct_and_all() {
        let sources = || vec![source(&["/b", "/a"]), source(&["/a", "/c"])];
        assert_eq!(run(SetOperation::Union, false, sources()), vec!["/a", "/b", "/c"]);
        assert_eq!(run(SetOperation::Union, true, sources()).len(), 4);
    }

    #[test]
    fn test_intersect_across_three_sources() {
        let sources = vec![
            source(&["/a", "/b", "/c", "/d"]),
            source(&["/d", "/b"]),
            source(&["/b", "/c", "/d"]),
        ];
        assert_eq!(run(SetOperation::Intersect, false, sources), vec!["/b", "/d"]);
        let with_empty = vec![source(&["/a"]), source(&[])];
        assert!(run(SetOperation::Intersect, false, with_empty).is_empty());
    }

    #[test]
    fn test_except_bag_and_set_semantics() {
        let sources = || vec![source(&["/a", "/a", "/b", "/c"]), source(&["/a", "/c"])];
        assert_eq!(run(SetOperation::Except, true, sources()), vec!["/a", "/b"]);
        assert_eq!(run(SetOperation::Except, false, sources()), vec!["/b"]);
        assert!(run(SetOperation::Except, false, vec![source(&[]), source(&["/a"])]).is_empty());
        assert_eq!(
            run(SetOperation::Except, true, vec![source(&["/a", "/b"]), source(&[])]),
            vec!["/a", "/b"]
        );
    }

    #[test]
    fn test_incompatible_sources_yield_empty_with_warning() {
        let ctx = context();
        let other = Arc::new(ColumnLayout::locations_only(vec!["a".into()], false).unwrap());
        let odd: BoxedStage = Box::new(TupleStage::new(other, Vec::new()).unwrap());
        let mut stage =
            SetOperationStage::new(&ctx, SetOperation::Union, false, vec![source(&["/a"]), odd]).unwrap();
        assert!(stage.execute().unwrap().is_empty());
        assert!(ctx.problems().has_warnings());
    }

    #[test]
    fn test_no_sources_yield_empty() {
        for op in [SetOperation::Union, SetOperation::Intersect, SetOperation::Except] {
            let mut stage = SetOperationStage::new(&context(), op, false, Vec::new()).unwrap();
            assert!(stage.execute().unwrap().is_empty());
        }
    }

    #[test]
    fn test_union_treats_identified_and_plain_locations_as_one_node() {
        let layout = Arc::clone(source(&[]).layout());
        let identified = vec![
            Value::from("/x"),
            Value::Location(Location::with_id(crate::value::Path::parse("/x").unwrap(), uuid::Uuid::new_v4())),
        ];
        let with_id: BoxedStage = Box::new(TupleStage::new(layout, vec![identified]).unwrap());
        assert_eq!(run(SetOperation::Union, false, vec![with_id, source(&["/x"])]), vec!["/x"]);
    }

    #[test]
    fn test_verification_resorts_trusted_sources() {
        struct Lying(TupleStage);
        impl Stage for Lying {
            fn layout(&self) -> &Arc<ColumnLayout> {
                self.0.layout()
            }
            fn execute(&mut self) -> Result<Vec<Tuple>> {
                self.0.execute()
            }
            fn name(&self) -> &'static str {
                "Lying"
            }
            fn is_sorted_by_location(&self) -> bool {
                true
            }
        }
        let layout = Arc::clone(source(&[]).layout());
        let tuples = ["/c", "/a"]
            .iter()
            .map(|p| vec![Value::from(*p), Value::Location(Location::parse(p).unwrap())])
            .collect();
        let lying: BoxedStage = Box::new(Lying(TupleStage::new(layout, tuples).unwrap()));

        let config = ProcessorConfig::default().with_verify_sorted_inputs(true);
        let ctx = context().with_config(config);
        let mut stage =
            SetOperationStage::new(&ctx, SetOperation::Intersect, false, vec![lying, source(&["/a", "/c"])])
                .unwrap();
        assert_eq!(stage.execute().unwrap().len(), 2);
        assert!(ctx.problems().has_warnings());
    }
}

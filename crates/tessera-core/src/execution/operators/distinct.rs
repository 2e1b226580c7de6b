//! Distinct stage: drop tuples whose locations were already seen

use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::value::{Location, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Removes duplicates by location, keeping the first occurrence
pub struct DistinctStage {
    delegate: BoxedStage,
}

impl DistinctStage {
    /// Wrap a delegate
    pub fn new(delegate: BoxedStage) -> Self {
        Self { delegate }
    }
}

/// Remove tuples whose location zone repeats an earlier tuple's
pub fn distinct(layout: &ColumnLayout, tuples: Vec<Tuple>) -> Vec<Tuple> {
    let zone = layout.location_indexes();
    if zone.len() == 1 {
        let index = zone.start;
        let mut seen: HashSet<Option<Location>> = HashSet::with_capacity(tuples.len());
        tuples
            .into_iter()
            .filter(|tuple| seen.insert(tuple.get(index).and_then(Value::as_location).cloned()))
            .collect()
    } else {
        let mut seen: HashSet<Vec<Option<Location>>> = HashSet::with_capacity(tuples.len());
        tuples
            .into_iter()
            .filter(|tuple| {
                let key = tuple[zone.clone()]
                    .iter()
                    .map(|v| v.as_location().cloned())
                    .collect();
                seen.insert(key)
            })
            .collect()
    }
}

impl Stage for DistinctStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        self.delegate.layout()
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let tuples = self.delegate.execute()?;
        let before = tuples.len();
        let unique = distinct(self.delegate.layout(), tuples);
        tracing::trace!("Distinct removed {} duplicates", before - unique.len());
        Ok(unique)
    }

    fn close(&mut self) {
        self.delegate.close();
    }

    fn name(&self) -> &'static str {
        "Distinct"
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
    use crate::model::Column;

    fn loc(path: &str) -> Value {
        Value::Location(Location::parse(path).unwrap())
    }

    #[test]
    fn test_single_selector_keeps_first_occurrence() {
        let layout = ColumnLayout::new(vec![Column::new("a", "v")], vec!["LONG".into()], false).unwrap();
        let tuples = vec![
            vec![Value::Long(1), loc("/b")],
            vec![Value::Long(2), loc("/a")],
            vec![Value::Long(3), loc("/b")],
        ];
        let unique = distinct(&layout, tuples);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0][0], Value::Long(1));
        assert_eq!(unique[1][0], Value::Long(2));
    }

    #[test]
    fn test_identifier_does_not_split_a_path() {
        let layout = ColumnLayout::new(vec![Column::new("a", "v")], vec!["LONG".into()], false).unwrap();
        let path = crate::value::Path::parse("/x").unwrap();
        let tuples = vec![
            vec![Value::Long(1), Value::Location(Location::with_id(path, uuid::Uuid::new_v4()))],
            vec![Value::Long(2), loc("/x")],
        ];
        let unique = distinct(&layout, tuples);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0][0], Value::Long(1));
    }

    #[test]
    fn test_multi_selector_uses_whole_zone() {
        let layout = ColumnLayout::locations_only(vec!["a".into(), "b".into()], false).unwrap();
        let tuples = vec![
            vec![loc("/x"), loc("/y")],
            vec![loc("/x"), loc("/z")],
            vec![loc("/x"), loc("/y")],
            vec![loc("/x"), Value::Null],
        ];
        assert_eq!(distinct(&layout, tuples).len(), 3);
    }
}

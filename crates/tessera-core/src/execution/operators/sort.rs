//! Sort stages: by dynamic-operand values and by location

use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::context::QueryContext;
use crate::execution::operand::create_dynamic_operation;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use crate::model::{Order, OrderBy, SelectorName};
use crate::value::Value;
use std::cmp::Ordering;
use std::sync::Arc;

/// Extracts a sort or join key from a tuple
pub type KeyFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// Total order over extracted keys
pub type CompareFn = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// One link of a comparator chain
#[derive(Clone)]
pub struct SortKey {
    extract: KeyFn,
    compare: CompareFn,
    descending: bool,
}

impl SortKey {
    /// Key from an extractor and a comparator
    pub fn new(extract: KeyFn, compare: CompareFn, descending: bool) -> Self {
        Self {
            extract,
            compare,
            descending,
        }
    }

    /// Compile an ordering into a key, comparing with the operand type's comparator
    pub fn from_ordering(ctx: &QueryContext, layout: &ColumnLayout, ordering: &OrderBy) -> Result<Self> {
        let operation = Arc::new(create_dynamic_operation(ctx, layout, &ordering.operand)?);
        let types = Arc::clone(ctx.type_system());
        let type_name = operation.expected_type().to_string();
        Ok(Self {
            extract: Arc::new(move |tuple: &[Value]| operation.evaluate(tuple)),
            compare: Arc::new(move |a: &Value, b: &Value| {
                types.factory_or_default(&type_name).compare(a, b)
            }),
            descending: ordering.order == Order::Descending,
        })
    }
}

fn compare_chain(keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    for (i, key) in keys.iter().enumerate() {
        let ordering = (key.compare)(&a[i], &b[i]);
        let ordering = if key.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Stable sort by a chain of keys
///
/// Input that already arrives in key order is passed through unsorted.
pub struct SortValuesStage {
    delegate: BoxedStage,
    keys: Vec<SortKey>,
    description: String,
    presorted: bool,
}

impl SortValuesStage {
    /// Sort by plan orderings
    pub fn new(ctx: &QueryContext, delegate: BoxedStage, orderings: &[OrderBy]) -> Result<Self> {
        let keys = orderings
            .iter()
            .map(|ordering| SortKey::from_ordering(ctx, delegate.layout(), ordering))
            .collect::<Result<Vec<_>>>()?;
        let description = orderings
            .iter()
            .map(|o| match o.order {
                Order::Ascending => o.operand.to_string(),
                Order::Descending => format!("{} DESC", o.operand),
            })
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Self {
            delegate,
            keys,
            description,
            presorted: false,
        })
    }

    /// Sort by prepared keys
    pub fn with_keys(delegate: BoxedStage, keys: Vec<SortKey>, description: impl Into<String>) -> Self {
        Self {
            delegate,
            keys,
            description: description.into(),
            presorted: false,
        }
    }
}

impl Stage for SortValuesStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        self.delegate.layout()
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let tuples = self.delegate.execute()?;
        let mut keyed: Vec<(Vec<Value>, Tuple)> = tuples
            .into_iter()
            .map(|tuple| {
                let key = self.keys.iter().map(|k| (k.extract)(tuple.as_slice())).collect();
                (key, tuple)
            })
            .collect();
        self.presorted = keyed
            .windows(2)
            .all(|pair| compare_chain(&self.keys, &pair[0].0, &pair[1].0) != Ordering::Greater);
        if self.presorted {
            tracing::trace!("{} tuples already ordered by {}", keyed.len(), self.description);
        } else {
            keyed.sort_by(|(a, _), (b, _)| compare_chain(&self.keys, a, b));
        }
        Ok(keyed.into_iter().map(|(_, tuple)| tuple).collect())
    }

    fn close(&mut self) {
        self.delegate.close();
    }

    fn name(&self) -> &'static str {
        "SortValues"
    }

    fn detail(&self) -> String {
        if self.presorted {
            format!("{} (input already ordered)", self.description)
        } else {
            self.description.clone()
        }
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.delegate.as_ref()]
    }
}

/// Compare two tuples by the values in the given location slots
pub fn compare_locations(indexes: &[usize], a: &[Value], b: &[Value]) -> Ordering {
    for &i in indexes {
        let ordering = a[i].total_cmp(&b[i]);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sort tuples by their location zone
pub fn sort_by_locations(layout: &ColumnLayout, tuples: &mut [Tuple]) {
    let indexes: Vec<usize> = layout.location_indexes().collect();
    tuples.sort_by(|a, b| compare_locations(&indexes, a, b));
}

/// Whether tuples are already in location order
pub fn is_sorted_by_locations(layout: &ColumnLayout, tuples: &[Tuple]) -> bool {
    let indexes: Vec<usize> = layout.location_indexes().collect();
    tuples
        .windows(2)
        .all(|pair| compare_locations(&indexes, &pair[0], &pair[1]) != Ordering::Greater)
}

/// Stable sort by the locations of some (or all) selectors
pub struct SortLocationsStage {
    delegate: BoxedStage,
    indexes: Vec<usize>,
    selectors: Vec<SelectorName>,
}

impl SortLocationsStage {
    /// Sort by every location of the delegate's layout, in selector order
    pub fn new(delegate: BoxedStage) -> Self {
        let indexes = delegate.layout().location_indexes().collect();
        let selectors = delegate.layout().selectors().to_vec();
        Self {
            delegate,
            indexes,
            selectors,
        }
    }

    /// Sort by the locations of the named selectors
    pub fn for_selectors(delegate: BoxedStage, selectors: &[SelectorName]) -> Result<Self> {
        let indexes = selectors
            .iter()
            .map(|s| delegate.layout().location_index(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            delegate,
            indexes,
            selectors: selectors.to_vec(),
        })
    }
}

impl Stage for SortLocationsStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        self.delegate.layout()
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        let mut tuples = self.delegate.execute()?;
        tuples.sort_by(|a, b| compare_locations(&self.indexes, a, b));
        Ok(tuples)
    }

    fn close(&mut self) {
        self.delegate.close();
    }

    fn name(&self) -> &'static str {
        "SortLocations"
    }

    fn detail(&self) -> String {
        self.selectors
            .iter()
            .map(SelectorName::name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn children(&self) -> Vec<&dyn Stage> {
        vec![self.delegate.as_ref()]
    }

    fn is_sorted_by_location(&self) -> bool {
        let zone: Vec<usize> = self.delegate.layout().location_indexes().collect();
        self.indexes.starts_with(&zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::stage::TupleStage;
    use crate::model::{Column, DynamicOperand};
    use crate::schema::{ImmutableSchemata, StandardTypeSystem};
    use crate::value::Location;

    fn context() -> QueryContext {
        QueryContext::new(
            Arc::new(StandardTypeSystem::new()),
            Arc::new(ImmutableSchemata::new()),
        )
    }

    fn source(rows: &[(i64, &str, &str)]) -> BoxedStage {
        let layout = Arc::new(
            ColumnLayout::new(
                vec![Column::new("a", "n"), Column::new("a", "tag")],
                vec!["LONG".into(), "STRING".into()],
                false,
            )
            .unwrap(),
        );
        let tuples = rows
            .iter()
            .map(|(n, tag, path)| {
                vec![
                    Value::Long(*n),
                    Value::from(*tag),
                    Value::Location(Location::parse(path).unwrap()),
                ]
            })
            .collect();
        Box::new(TupleStage::new(layout, tuples).unwrap())
    }

    fn tags(tuples: &[Tuple]) -> Vec<String> {
        tuples.iter().map(|t| t[1].to_string()).collect()
    }

    #[test]
    fn test_sort_values_is_stable() {
        let rows = [(2, "a", "/1"), (1, "b", "/2"), (2, "c", "/3"), (1, "d", "/4")];
        let orderings = [OrderBy::ascending(DynamicOperand::property("a", "n"))];
        let mut stage = SortValuesStage::new(&context(), source(&rows), &orderings).unwrap();
        assert_eq!(tags(&stage.execute().unwrap()), vec!["b", "d", "a", "c"]);
        assert!(!stage.detail().contains("already ordered"));
    }

    #[test]
    fn test_sort_values_passes_ordered_input_through() {
        let rows = [(1, "a", "/1"), (1, "b", "/2"), (2, "c", "/3")];
        let orderings = [OrderBy::ascending(DynamicOperand::property("a", "n"))];
        let mut stage = SortValuesStage::new(&context(), source(&rows), &orderings).unwrap();
        assert_eq!(tags(&stage.execute().unwrap()), vec!["a", "b", "c"]);
        assert_eq!(stage.detail(), "a.n (input already ordered)");
    }

    #[test]
    fn test_sort_values_descending_chain() {
        let rows = [(1, "a", "/1"), (2, "b", "/2"), (1, "c", "/3")];
        let orderings = [
            OrderBy::descending(DynamicOperand::property("a", "n")),
            OrderBy::descending(DynamicOperand::property("a", "tag")),
        ];
        let mut stage = SortValuesStage::new(&context(), source(&rows), &orderings).unwrap();
        assert_eq!(tags(&stage.execute().unwrap()), vec!["b", "c", "a"]);
        assert_eq!(stage.detail(), "a.n DESC, a.tag DESC");
    }

    #[test]
    fn test_sort_by_locations() {
        let rows = [(1, "a", "/c"), (2, "b", "/a/x"), (3, "c", "/a")];
        let mut stage = SortLocationsStage::new(source(&rows));
        assert!(stage.is_sorted_by_location());
        let tuples = stage.execute().unwrap();
        assert_eq!(tags(&tuples), vec!["c", "b", "a"]);
        assert!(is_sorted_by_locations(stage.layout(), &tuples));
    }
}

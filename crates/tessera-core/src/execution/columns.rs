//! Column layout: the fixed shape of every tuple a stage produces
//!
//! A tuple is split into three contiguous zones:
//!
//! ```text
//! [ column values ... | one location per selector ... | one score per selector ... ]
//!   0..columns          columns..columns+selectors      (only when scoring)
//! ```
//!
//! Selectors keep their first-seen order and the zone boundaries never move
//! once a layout exists.

use crate::error::{Error, Result};
use crate::model::{Column, SelectorName};
use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

/// Selector used when a layout has no column to derive a selector from
pub const DEFAULT_SELECTOR: &str = "Results";

/// Immutable tuple-shape metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLayout {
    columns: Vec<Column>,
    column_types: Vec<String>,
    selectors: Vec<SelectorName>,
    include_scores: bool,
    column_names: Vec<String>,
    tuple_value_names: Vec<String>,
    column_index_by_name: HashMap<String, usize>,
    column_index_by_property: HashMap<SelectorName, HashMap<String, usize>>,
    location_index_by_selector: HashMap<SelectorName, usize>,
}

impl ColumnLayout {
    /// Layout whose selectors are derived from the columns in first-seen order
    pub fn new(columns: Vec<Column>, column_types: Vec<String>, include_scores: bool) -> Result<Self> {
        let mut selectors: Vec<SelectorName> = Vec::new();
        for column in &columns {
            if !selectors.contains(&column.selector) {
                selectors.push(column.selector.clone());
            }
        }
        if selectors.is_empty() {
            selectors.push(SelectorName::new(DEFAULT_SELECTOR));
        }
        Self::with_selectors(columns, column_types, selectors, include_scores)
    }

    /// Layout with an explicit selector list; every column's selector must be in it
    pub fn with_selectors(
        columns: Vec<Column>,
        column_types: Vec<String>,
        selectors: Vec<SelectorName>,
        include_scores: bool,
    ) -> Result<Self> {
        if columns.len() != column_types.len() {
            return Err(Error::layout(format!(
                "{} columns but {} column types",
                columns.len(),
                column_types.len()
            )));
        }

        let mut location_index_by_selector = HashMap::with_capacity(selectors.len());
        for (i, selector) in selectors.iter().enumerate() {
            if location_index_by_selector
                .insert(selector.clone(), columns.len() + i)
                .is_some()
            {
                return Err(Error::layout(format!("selector '{}' listed twice", selector)));
            }
        }

        let mut column_index_by_property: HashMap<SelectorName, HashMap<String, usize>> =
            HashMap::new();
        for (i, column) in columns.iter().enumerate() {
            if !location_index_by_selector.contains_key(&column.selector) {
                return Err(Error::layout(format!(
                    "column {} refers to selector '{}' which is not in the layout",
                    column, column.selector
                )));
            }
            column_index_by_property
                .entry(column.selector.clone())
                .or_default()
                .entry(column.property.clone())
                .or_insert(i);
        }

        // Names shared by several columns are qualified with the selector
        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for column in &columns {
            *name_counts.entry(column.display_name()).or_insert(0) += 1;
        }
        let column_names: Vec<String> = columns
            .iter()
            .map(|c| {
                if name_counts.get(c.display_name()).copied().unwrap_or(0) > 1 {
                    format!("{}.{}", c.selector, c.display_name())
                } else {
                    c.display_name().to_string()
                }
            })
            .collect();

        let mut column_index_by_name = HashMap::with_capacity(columns.len() * 2);
        for (i, (column, name)) in columns.iter().zip(&column_names).enumerate() {
            column_index_by_name.entry(name.clone()).or_insert(i);
            column_index_by_name
                .entry(format!("{}.{}", column.selector, column.display_name()))
                .or_insert(i);
        }

        let mut tuple_value_names = column_names.clone();
        tuple_value_names.extend(selectors.iter().map(|s| format!("Location({})", s)));
        if include_scores {
            tuple_value_names.extend(selectors.iter().map(|s| format!("Score({})", s)));
        }

        Ok(Self {
            columns,
            column_types,
            selectors,
            include_scores,
            column_names,
            tuple_value_names,
            column_index_by_name,
            column_index_by_property,
            location_index_by_selector,
        })
    }

    /// Layout carrying only locations for the given selectors
    pub fn locations_only(selectors: Vec<SelectorName>, include_scores: bool) -> Result<Self> {
        Self::with_selectors(Vec::new(), Vec::new(), selectors, include_scores)
    }

    /// Projected columns in order
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Type name per projected column
    pub fn column_types(&self) -> &[String] {
        &self.column_types
    }

    /// Number of projected columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Selectors in first-seen order
    pub fn selectors(&self) -> &[SelectorName] {
        &self.selectors
    }

    /// Number of location slots
    pub fn location_count(&self) -> usize {
        self.selectors.len()
    }

    /// Whether the tuples carry score slots
    pub fn has_scores(&self) -> bool {
        self.include_scores
    }

    /// Total number of slots per tuple
    pub fn tuple_width(&self) -> usize {
        let per_selector = if self.include_scores { 2 } else { 1 };
        self.columns.len() + per_selector * self.selectors.len()
    }

    /// Display names of the columns, qualified where ambiguous
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Names of every tuple slot: columns, `Location(sel)`, `Score(sel)`
    pub fn tuple_value_names(&self) -> &[String] {
        &self.tuple_value_names
    }

    /// Type name of the column at `index`
    pub fn column_type(&self, index: usize) -> Result<&str> {
        self.column_types
            .get(index)
            .map(String::as_str)
            .ok_or(Error::IndexOutOfRange {
                index,
                size: self.column_types.len(),
            })
    }

    /// Index of a column by display name or `selector.name`
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.column_index_by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::NoSuchColumn(name.to_string()))
    }

    /// Index of the column projecting `selector.property`, if projected
    pub fn column_index_for_property(&self, selector: &SelectorName, property: &str) -> Option<usize> {
        self.column_index_by_property
            .get(selector)
            .and_then(|by_property| by_property.get(property))
            .copied()
    }

    /// Whether the layout knows the selector
    pub fn has_selector(&self, selector: &SelectorName) -> bool {
        self.location_index_by_selector.contains_key(selector)
    }

    /// Slot holding the selector's location
    pub fn location_index(&self, selector: &SelectorName) -> Result<usize> {
        self.location_index_by_selector
            .get(selector)
            .copied()
            .ok_or_else(|| Error::NoSuchSelector(selector.to_string()))
    }

    /// Slot holding the selector's score, when scoring is enabled
    pub fn score_index(&self, selector: &SelectorName) -> Option<usize> {
        if !self.include_scores {
            return None;
        }
        self.location_index_by_selector
            .get(selector)
            .map(|location| location + self.selectors.len())
    }

    /// Slots of the location zone
    pub fn location_indexes(&self) -> Range<usize> {
        self.columns.len()..self.columns.len() + self.selectors.len()
    }

    /// Slots of the score zone (empty without scoring)
    pub fn score_indexes(&self) -> Range<usize> {
        let start = self.columns.len() + self.selectors.len();
        if self.include_scores {
            start..start + self.selectors.len()
        } else {
            start..start
        }
    }

    /// Narrow to a subset of this layout's columns.
    ///
    /// Returns the narrowed layout plus, for each of its slots, the slot of
    /// this layout the value is copied from.
    pub fn sub_select(&self, columns: &[Column]) -> Result<(ColumnLayout, Vec<usize>)> {
        let mut source_slots = Vec::with_capacity(columns.len());
        let mut types = Vec::with_capacity(columns.len());
        for column in columns {
            let index = self
                .column_index_for_property(&column.selector, &column.property)
                .ok_or_else(|| Error::NoSuchColumn(column.to_string()))?;
            source_slots.push(index);
            types.push(self.column_types[index].clone());
        }

        let mut selectors: Vec<SelectorName> = Vec::new();
        for column in columns {
            if !selectors.contains(&column.selector) {
                selectors.push(column.selector.clone());
            }
        }
        if selectors.is_empty() {
            selectors = self.selectors.clone();
        }

        let narrowed =
            Self::with_selectors(columns.to_vec(), types, selectors, self.include_scores)?;
        for selector in narrowed.selectors() {
            source_slots.push(self.location_index(selector)?);
        }
        if narrowed.include_scores {
            for selector in narrowed.selectors() {
                let score = self
                    .score_index(selector)
                    .ok_or_else(|| Error::NoSuchSelector(selector.to_string()))?;
                source_slots.push(score);
            }
        }
        Ok((narrowed, source_slots))
    }

    /// Concatenation of this (left) layout with `right`
    pub fn join_with(&self, right: &ColumnLayout) -> Result<ColumnLayout> {
        let mut columns = self.columns.clone();
        columns.extend(right.columns.iter().cloned());
        let mut types = self.column_types.clone();
        types.extend(right.column_types.iter().cloned());
        let mut selectors = self.selectors.clone();
        for selector in &right.selectors {
            if selectors.contains(selector) {
                return Err(Error::layout(format!(
                    "selector '{}' appears on both sides of a join",
                    selector
                )));
            }
            selectors.push(selector.clone());
        }
        Self::with_selectors(
            columns,
            types,
            selectors,
            self.include_scores || right.include_scores,
        )
    }

    /// Whether tuples of both layouts can be mixed by set operations
    pub fn is_union_compatible(&self, other: &ColumnLayout) -> bool {
        self.column_count() == other.column_count()
            && self.include_scores == other.include_scores
            && self.location_count() == other.location_count()
    }
}

impl fmt::Display for ColumnLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.tuple_value_names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::{LONG, STRING};

    fn layout(columns: &[(&str, &str)], scores: bool) -> ColumnLayout {
        let cols: Vec<Column> = columns.iter().map(|(s, p)| Column::new(*s, *p)).collect();
        let types = vec![STRING.to_string(); cols.len()];
        ColumnLayout::new(cols, types, scores).unwrap()
    }

    #[test]
    fn test_zone_boundaries() {
        let layout = layout(&[("a", "x"), ("b", "y"), ("a", "z")], true);
        assert_eq!(layout.selectors(), &[SelectorName::from("a"), SelectorName::from("b")]);
        assert_eq!(layout.tuple_width(), 3 + 2 + 2);
        assert_eq!(layout.location_index(&"a".into()).unwrap(), 3);
        assert_eq!(layout.location_index(&"b".into()).unwrap(), 4);
        assert_eq!(layout.score_index(&"b".into()), Some(6));
        assert_eq!(layout.location_indexes(), 3..5);
        assert_eq!(layout.score_indexes(), 5..7);
        assert_eq!(
            layout.tuple_value_names(),
            &["x", "y", "z", "Location(a)", "Location(b)", "Score(a)", "Score(b)"]
        );
    }

    #[test]
    fn test_default_selector_when_no_columns() {
        let layout = layout(&[], false);
        assert_eq!(layout.selectors(), &[SelectorName::new(DEFAULT_SELECTOR)]);
        assert_eq!(layout.tuple_width(), 1);
    }

    #[test]
    fn test_duplicate_names_are_qualified() {
        let layout = layout(&[("a", "title"), ("b", "title"), ("b", "rank")], false);
        assert_eq!(layout.column_names(), &["a.title", "b.title", "rank"]);
        assert_eq!(layout.column_index("b.title").unwrap(), 1);
        assert_eq!(layout.column_index("rank").unwrap(), 2);
        assert_eq!(layout.column_index("b.rank").unwrap(), 2);
        assert!(matches!(layout.column_index("title"), Err(Error::NoSuchColumn(_))));
    }

    #[test]
    fn test_column_selector_must_be_listed() {
        let err = ColumnLayout::with_selectors(
            vec![Column::new("a", "x")],
            vec![STRING.to_string()],
            vec!["b".into()],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Layout(_)));
    }

    #[test]
    fn test_sub_select_maps_source_slots() {
        let source = layout(&[("a", "x"), ("b", "y"), ("a", "z")], true);
        let (narrowed, slots) = source
            .sub_select(&[Column::new("a", "z"), Column::new("a", "x")])
            .unwrap();
        assert_eq!(narrowed.selectors(), &[SelectorName::from("a")]);
        assert_eq!(narrowed.tuple_width(), 4);
        // z, x, Location(a), Score(a)
        assert_eq!(slots, vec![2, 0, 3, 5]);
        assert!(source.sub_select(&[Column::new("c", "q")]).is_err());
    }

    #[test]
    fn test_join_with_concatenates_zones() {
        let left = layout(&[("a", "x")], false);
        let right = ColumnLayout::new(
            vec![Column::new("b", "y"), Column::new("b", "n")],
            vec![STRING.to_string(), LONG.to_string()],
            true,
        )
        .unwrap();
        let joined = left.join_with(&right).unwrap();
        assert_eq!(joined.column_count(), 3);
        assert!(joined.has_scores());
        assert_eq!(joined.tuple_width(), 3 + 2 + 2);
        assert_eq!(joined.location_index(&"b".into()).unwrap(), 4);
        assert_eq!(joined.column_type(2).unwrap(), LONG);
        assert!(left.join_with(&left).is_err());
    }

    #[test]
    fn test_union_compatibility() {
        let a = layout(&[("a", "x")], false);
        let b = layout(&[("b", "y")], false);
        let c = layout(&[("b", "y")], true);
        assert!(a.is_union_compatible(&b));
        assert!(!a.is_union_compatible(&c));
    }
}

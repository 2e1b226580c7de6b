//! Query results, row cursor and table rendering

use super::Statistics;
use crate::config::ProcessorConfig;
use crate::error::{Error, Problems, Result};
use crate::execution::columns::ColumnLayout;
use crate::execution::stage::Tuple;
use crate::model::SelectorName;
use crate::value::{Location, Value};
use comfy_table::{Table, presets::UTF8_FULL};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Query result row
#[derive(Debug, Clone, Serialize)]
pub struct Row {
    /// Column values
    pub values: Vec<serde_json::Value>,
}

/// Query result set
#[derive(Debug, Clone, Serialize)]
pub struct ResultSet {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
}

/// Everything a query execution produced
#[derive(Debug, Clone)]
pub struct QueryResults {
    layout: Arc<ColumnLayout>,
    tuples: Vec<Tuple>,
    problems: Problems,
    statistics: Statistics,
    plan_trace: Option<String>,
}

impl QueryResults {
    /// Assemble results
    pub fn new(
        layout: Arc<ColumnLayout>,
        tuples: Vec<Tuple>,
        problems: Problems,
        statistics: Statistics,
        plan_trace: Option<String>,
    ) -> Self {
        Self {
            layout,
            tuples,
            problems,
            statistics,
            plan_trace,
        }
    }

    /// Final layout
    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    /// Raw tuples
    pub fn tuples(&self) -> &[Tuple] {
        &self.tuples
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.tuples.len()
    }

    /// Whether no row was produced
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Display names of the value columns
    pub fn column_names(&self) -> &[String] {
        self.layout.column_names()
    }

    /// Problems recorded while compiling and executing
    pub fn problems(&self) -> &Problems {
        &self.problems
    }

    /// Phase timings
    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }

    /// Stage tree description, when tracing was enabled
    pub fn plan_trace(&self) -> Option<&str> {
        self.plan_trace.as_deref()
    }

    /// Forward-only cursor over the rows
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            results: self,
            next: 0,
        }
    }

    /// Value columns as JSON rows
    pub fn to_result_set(&self) -> ResultSet {
        let width = self.layout.column_count();
        ResultSet {
            columns: self.layout.column_names().to_vec(),
            rows: self
                .tuples
                .iter()
                .map(|tuple| Row {
                    values: tuple[..width].iter().map(Value::to_json).collect(),
                })
                .collect(),
        }
    }

    /// Fixed-width table with row numbers
    pub fn render_table(&self, config: &ProcessorConfig) -> String {
        let names: &[String] = if config.render_locations {
            self.layout.tuple_value_names()
        } else {
            self.layout.column_names()
        };
        let width = names.len();

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        let mut header = vec!["#".to_string()];
        header.extend(names.iter().cloned());
        table.set_header(header);

        let shown = config.max_render_rows.unwrap_or(usize::MAX).min(self.tuples.len());
        for (i, tuple) in self.tuples.iter().take(shown).enumerate() {
            let mut cells = vec![(i + 1).to_string()];
            cells.extend(tuple[..width].iter().map(|v| v.to_string()));
            table.add_row(cells);
        }

        let mut out = table.to_string();
        if shown < self.tuples.len() {
            out.push_str(&format!("\n... {} more rows", self.tuples.len() - shown));
        }
        out
    }
}

impl fmt::Display for QueryResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_table(&ProcessorConfig::default()))
    }
}

/// Forward-only iterator over result rows
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    results: &'a QueryResults,
    next: usize,
}

impl<'a> Iterator for Cursor<'a> {
    type Item = ResultRow<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tuple = self.results.tuples.get(self.next)?;
        let row = ResultRow {
            layout: &self.results.layout,
            tuple,
            index: self.next,
        };
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.results.tuples.len().saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Cursor<'_> {}

/// One row seen through the result layout
#[derive(Debug, Clone, Copy)]
pub struct ResultRow<'a> {
    layout: &'a ColumnLayout,
    tuple: &'a [Value],
    index: usize,
}

impl<'a> ResultRow<'a> {
    /// Zero-based position of the row
    pub fn row_index(&self) -> usize {
        self.index
    }

    /// Value of the column at `index`
    pub fn value(&self, index: usize) -> Result<&'a Value> {
        let size = self.layout.column_count();
        if index >= size {
            return Err(Error::IndexOutOfRange { index, size });
        }
        Ok(&self.tuple[index])
    }

    /// Value of the column with the given display name
    pub fn value_by_name(&self, name: &str) -> Result<&'a Value> {
        let index = self.layout.column_index(name)?;
        Ok(&self.tuple[index])
    }

    /// Location of the selector at `index`; `None` for outer-join padding
    pub fn location(&self, index: usize) -> Result<Option<&'a Location>> {
        let zone = self.layout.location_indexes();
        if index >= zone.len() {
            return Err(Error::IndexOutOfRange {
                index,
                size: zone.len(),
            });
        }
        Ok(self.tuple[zone.start + index].as_location())
    }

    /// Location of the named selector
    pub fn location_for_selector(&self, selector: &SelectorName) -> Result<Option<&'a Location>> {
        let index = self.layout.location_index(selector)?;
        Ok(self.tuple[index].as_location())
    }

    /// Full-text score of the named selector, when scores are carried
    pub fn score_for_selector(&self, selector: &SelectorName) -> Option<f64> {
        self.layout
            .score_index(selector)
            .and_then(|i| self.tuple[i].as_f64())
    }
}

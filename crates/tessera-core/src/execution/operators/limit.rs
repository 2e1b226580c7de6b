//! Limit stage: offset and row cap

use crate::error::Result;
use crate::execution::columns::ColumnLayout;
use crate::execution::stage::{BoxedStage, Stage, Tuple};
use std::sync::Arc;

/// Row window applied to a tuple set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Limit {
    /// Maximum number of rows; `None` means unlimited
    pub row_limit: Option<usize>,
    /// Rows skipped before the window starts
    pub offset: usize,
}

impl Limit {
    /// Whether the window keeps every row
    pub fn is_unlimited(&self) -> bool {
        self.row_limit.is_none() && self.offset == 0
    }

    /// Apply the window
    pub fn apply(&self, mut tuples: Vec<Tuple>) -> Vec<Tuple> {
        if self.row_limit == Some(0) {
            return Vec::new();
        }
        if self.is_unlimited() {
            return tuples;
        }
        let size = tuples.len();
        if self.offset >= size {
            return Vec::new();
        }
        let end = match self.row_limit {
            Some(limit) => size.min(self.offset.saturating_add(limit)),
            None => size,
        };
        tuples.truncate(end);
        tuples.drain(..self.offset);
        tuples
    }
}

/// Applies a [`Limit`] to the delegate's tuples
pub struct LimitStage {
    delegate: BoxedStage,
    limit: Limit,
}

impl LimitStage {
    /// Wrap a delegate
    pub fn new(delegate: BoxedStage, limit: Limit) -> Self {
        Self { delegate, limit }
    }
}

impl Stage for LimitStage {
    fn layout(&self) -> &Arc<ColumnLayout> {
        self.delegate.layout()
    }

    fn execute(&mut self) -> Result<Vec<Tuple>> {
        if self.limit.row_limit == Some(0) {
            return Ok(Vec::new());
        }
        let tuples = self.delegate.execute()?;
        Ok(self.limit.apply(tuples))
    }

    fn close(&mut self) {
        self.delegate.close();
    }

    fn name(&self) -> &'static str {
        "Limit"
    }

    fn detail(&self) -> String {
        match self.limit.row_limit {
            Some(count) => format!("offset={} count={}", self.limit.offset, count),
            None => format!("offset={}", self.limit.offset),
        }
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
    use crate::value::Value;

    fn rows(n: i64) -> Vec<Tuple> {
        (0..n).map(|i| vec![Value::Long(i)]).collect()
    }

    fn limit(row_limit: Option<usize>, offset: usize) -> Limit {
        Limit { row_limit, offset }
    }

    #[test]
    fn test_limit_windows() {
        assert_eq!(limit(None, 0).apply(rows(5)), rows(5));
        assert_eq!(limit(Some(0), 0).apply(rows(5)), Vec::<Tuple>::new());
        assert_eq!(limit(Some(0), 2).apply(rows(5)), Vec::<Tuple>::new());
        assert_eq!(limit(None, 5).apply(rows(5)), Vec::<Tuple>::new());
        assert_eq!(limit(Some(2), 1).apply(rows(5)), vec![vec![Value::Long(1)], vec![Value::Long(2)]]);
        assert_eq!(limit(Some(10), 3).apply(rows(5)).len(), 2);
        assert_eq!(limit(None, 3).apply(rows(5)).len(), 2);
        assert_eq!(limit(Some(usize::MAX), 1).apply(rows(5)).len(), 4);
    }
}

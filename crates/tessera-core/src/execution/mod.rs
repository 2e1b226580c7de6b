//! Execution layer
//!
//! A compiled query is a tree of [`Stage`]s. Every stage fully materializes
//! its tuples before its parent consumes them; a tuple is laid out as
//! described by its stage's [`ColumnLayout`]: values, then one location per
//! selector, then (optionally) one full-text score per selector.

pub mod analyzer;
pub mod columns;
pub mod constraint;
pub mod context;
pub mod joins;
pub mod operand;
pub mod operators;
pub mod stage;

pub use analyzer::Analyzer;
pub use columns::ColumnLayout;
pub use constraint::{BoxedChecker, ConstraintChecker, create_checker};
pub use context::QueryContext;
pub use joins::{MergeJoinStage, NestedLoopJoinStage};
pub use operand::{DynamicOperation, create_dynamic_operation};
pub use stage::{BoxedStage, EmptyStage, Stage, Tuple, TupleStage, describe};

//! Tessera Core - Tuple-Processing Query Engine
//!
//! This crate executes optimized query plans over a node store:
//! - Column layouts describing fixed-width tuples (values, locations, scores)
//! - Dynamic operands and constraints compiled once into per-tuple closures
//! - Stages for access, select, project, limit, distinct and sort
//! - Nested loop and merge joins (inner, outer and cross)
//! - Union, intersect and except with set or bag semantics
//! - Dependent queries binding one branch's values for the other
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              Query Processor                │
//! │    (plan → stage tree, execute, results)    │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │               Stage Tree                    │
//! │ (Select, Project, Join, Set Ops, Sort, ...) │
//! └──────────────┬──────────────────────────────┘
//!                │
//! ┌──────────────┴──────────────────────────────┐
//! │      Access Factory  /  Analyzer            │
//! │    (backing store, e.g. InMemoryStore)      │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod execution;
pub mod executor;
pub mod memory;
pub mod model;
pub mod plan;
pub mod schema;
pub mod value;

pub use config::ProcessorConfig;
pub use error::{Error, Problem, Problems, Result, Severity};
pub use execution::QueryContext;
pub use executor::{QueryProcessor, QueryResults, Statistics};
pub use memory::InMemoryStore;
pub use plan::{PlanNode, PlanType};
pub use value::{Location, Path, Value};

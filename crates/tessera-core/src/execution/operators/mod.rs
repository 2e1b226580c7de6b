//! Stage implementations wrapping one or more delegates

pub mod access;
pub mod dependent;
pub mod distinct;
pub mod limit;
pub mod project;
pub mod select;
pub mod set_ops;
pub mod sort;

pub use access::{AccessFactory, AccessStage};
pub use dependent::DependentQueryStage;
pub use distinct::{DistinctStage, distinct};
pub use limit::{Limit, LimitStage};
pub use project::ProjectStage;
pub use select::SelectStage;
pub use set_ops::SetOperationStage;
pub use sort::{SortKey, SortLocationsStage, SortValuesStage};

//! Query construction: builder, predicates, values, ordering.

pub mod builder;
pub mod predicate;
pub mod sort;
pub mod value;

pub use builder::SelectQuery;
pub use predicate::Predicate;
pub use sort::{SortDirection, SortMap};
pub use value::SqlValue;

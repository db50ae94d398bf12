//! Declarative entity services over sqlx.
//!
//! Entities declare their relations once; services compose the full join
//! tree, default filtering, sorting, and pagination for every query. Aliases
//! are composed deterministically from the declaration, so the same relation
//! graph always renders the same SQL.
//!
//! A service is registered per entity and connection:
//!
//! ```ignore
//! let service: EntityService<Post> = EntityService::register(
//!     "default",
//!     ServiceSpec::builder()
//!         .default_sort("$alias.title", SortDirection::Asc)
//!         .parent(ParentRelation::new("author", "Author", "author", author_service))
//!         .build(),
//! )?;
//!
//! let posts = service.list("post", |_| {}, &ServiceOptions::new(), None).await?;
//! ```
//!
//! Reads exclude soft-deleted rows by default, parents are joined eagerly,
//! and children are opted in per request through
//! [ServiceOptions::subitems](crate::ServiceOptions).

pub mod db;
pub mod entity;
pub mod error;
pub mod options;
pub mod query;
pub mod registry;
pub mod relations;
pub mod service;

pub use db::{ConnectConfig, ConnectionManager, Database};
pub use entity::Entity;
pub use error::{Error, Result};
pub use options::{AndWhereMap, Page, Paginator, ServiceOptions, TraversalContext};
pub use query::{Predicate, SelectQuery, SortDirection, SortMap, SqlValue};
pub use registry::ServiceRegistry;
pub use relations::{ChildRelation, InnerRelation, JoinKind, ParentRelation, ServiceResolver};
pub use service::{EntityService, ServiceCore, ServiceSpec, ServiceSpecBuilder};

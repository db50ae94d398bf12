//! The entity contract implemented by persisted types.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;

use crate::query::SqlValue;

/// Metadata and row mapping for a database entity.
///
/// Rows arrive with columns aliased as `{alias}_{column}` (the builder's
/// SELECT naming), so decoding is alias-aware: the same entity type can be
/// decoded from any position in a join tree.
pub trait Entity: Send + Sync + Unpin + Sized {
    /// The SQL table name (e.g. "Test").
    const TABLE: &'static str;

    /// All column names of the table, in SELECT order.
    fn columns() -> &'static [&'static str];

    /// Decode this entity from a row whose columns are prefixed by `alias`.
    fn from_aliased_row(row: &SqliteRow, alias: &str) -> Result<Self, sqlx::Error>;

    /// The current value of a column on this instance. Used by persistence
    /// to bind INSERT/UPDATE values and to test id presence.
    fn value_of(&self, column: &str) -> SqlValue;

    /// Stamp a bookkeeping timestamp column (created/updated/deleted at).
    fn set_timestamp(&mut self, column: &str, at: DateTime<Utc>);

    /// Receive the row id generated by an INSERT. Entities with
    /// non-generated keys can keep the default no-op.
    fn set_generated_id(&mut self, _id: i64) {}
}

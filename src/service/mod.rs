//! Entity services: typed data access over the query builder.
//!
//! An [EntityService] pairs an entity type with a connection-scoped
//! [ServiceCore] holding its configuration and relation graph. Cores are
//! cached per (key, connection) so relation descriptors can resolve related
//! services cheaply during traversal.

mod core;
mod spec;
mod walk;

pub use self::core::ServiceCore;
pub use self::spec::{ServiceSpec, ServiceSpecBuilder};

use std::collections::HashSet;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use sqlx::sqlite::{SqliteQueryResult, SqliteRow};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::db::Database;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::options::{ServiceOptions, TraversalContext};
use crate::query::builder::flatten_params;
use crate::query::{SelectQuery, SortMap, SqlValue};
use crate::registry::ServiceRegistry;

/// Typed data-access service for one entity on one connection.
///
/// Cloning is cheap; all state lives in the shared core. Read operations
/// accept an optional open transaction, falling back to the service's pool.
pub struct EntityService<E: Entity> {
    core: Arc<ServiceCore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityService<E> {
    /// Get or create the service for `connection`, keyed by the entity table.
    pub fn register(connection: &str, spec: ServiceSpec) -> Result<Self> {
        Self::register_as(E::TABLE, connection, spec)
    }

    /// Get or create the service under an explicit key, for entities served
    /// by more than one configuration.
    pub fn register_as(key: &'static str, connection: &str, spec: ServiceSpec) -> Result<Self> {
        let core = ServiceRegistry::get_or_create(key, connection, || {
            ServiceCore::new(key, E::TABLE, E::columns(), connection, spec)
        })?;
        Ok(Self::from_core(core))
    }

    pub fn from_core(core: Arc<ServiceCore>) -> Self {
        Self {
            core,
            _entity: PhantomData,
        }
    }

    pub fn core(&self) -> Arc<ServiceCore> {
        self.core.clone()
    }

    /// The pool this service executes against.
    pub fn repository(&self) -> Result<Database> {
        self.core.pool()
    }

    /// A fresh SELECT over the entity table under `alias`.
    pub fn query(&self, alias: &str) -> SelectQuery {
        self.core.query(alias)
    }

    pub fn set_joins(
        &self,
        alias: &str,
        qb: &mut SelectQuery,
        options: &ServiceOptions,
        ctx: &mut TraversalContext,
    ) -> Result<()> {
        self.core.set_joins(alias, qb, options, ctx)
    }

    pub fn set_default_query(
        &self,
        alias: &str,
        qb: &mut SelectQuery,
        options: &ServiceOptions,
    ) -> Result<()> {
        self.core.set_default_query(alias, qb, options)
    }

    pub fn get_sorting(&self, alias: &str, options: &ServiceOptions) -> Result<SortMap> {
        self.core.get_sorting(alias, options)
    }

    pub fn set_pagination(&self, qb: &mut SelectQuery, options: &ServiceOptions) {
        self.core.set_pagination(qb, options)
    }

    pub fn translate_params(&self, param: &str) -> Option<String> {
        self.core.translate_params(param, None)
    }

    /// List entities; `refine` may add conditions before defaults apply.
    pub async fn list(
        &self,
        alias: &str,
        refine: impl FnOnce(&mut SelectQuery),
        options: &ServiceOptions,
        mut tx: Option<&mut SqliteConnection>,
    ) -> Result<Vec<E>> {
        let (qb, in_memory) = self.prepare_list_query(alias, refine, options)?;
        let rows = self.fetch_rows(&qb, tx.as_deref_mut()).await?;
        let mut items = self.decode_rows(&rows, alias)?;
        if in_memory {
            if let Some(page) = &options.paginate {
                items = paginate_in_memory(items, page.skip(), page.limit());
            }
        }
        Ok(items)
    }

    /// Count entities matching the same composition a list would use.
    pub async fn count(
        &self,
        alias: &str,
        refine: impl FnOnce(&mut SelectQuery),
        options: &ServiceOptions,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<i64> {
        let (qb, _) = self.prepare_list_query(alias, refine, options)?;
        let distinct = self.distinct_column(alias, &qb);
        self.fetch_count(&qb, distinct.as_deref(), tx).await
    }

    /// One result set plus the unpaginated total, from one composition.
    pub async fn list_and_count(
        &self,
        alias: &str,
        refine: impl FnOnce(&mut SelectQuery),
        options: &ServiceOptions,
        mut tx: Option<&mut SqliteConnection>,
    ) -> Result<(Vec<E>, i64)> {
        let (qb, in_memory) = self.prepare_list_query(alias, refine, options)?;
        let distinct = self.distinct_column(alias, &qb);

        let rows = self.fetch_rows(&qb, tx.as_deref_mut()).await?;
        let mut items = self.decode_rows(&rows, alias)?;
        let total = self.fetch_count(&qb, distinct.as_deref(), tx).await?;

        if in_memory {
            if let Some(page) = &options.paginate {
                items = paginate_in_memory(items, page.skip(), page.limit());
            }
        }
        Ok((items, total))
    }

    /// List entities with `field = value`.
    pub async fn list_by(
        &self,
        alias: &str,
        field: &str,
        value: impl Into<SqlValue>,
        options: &ServiceOptions,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Vec<E>> {
        if field.is_empty() {
            return Err(Error::precondition("Field name was not provided."));
        }
        let clause = format!("{alias}.{field} = :{field}");
        let param = field.to_string();
        let value = value.into();
        self.list(
            alias,
            move |qb| {
                qb.and_where(clause).bind(param, value);
            },
            options,
            tx,
        )
        .await
    }

    /// The first entity matching `refine`, under resolved sorting.
    pub async fn find(
        &self,
        alias: &str,
        refine: impl FnOnce(&mut SelectQuery),
        options: &ServiceOptions,
        mut tx: Option<&mut SqliteConnection>,
    ) -> Result<Option<E>> {
        let mut qb = self.prepare_query(alias, refine, options)?;
        qb.order_by(self.resolved_order(alias, options)?);
        let rows = self.fetch_rows(&qb, tx.as_deref_mut()).await?;
        let mut items = self.decode_rows(&rows, alias)?;
        if items.is_empty() {
            Ok(None)
        } else {
            Ok(Some(items.remove(0)))
        }
    }

    pub async fn find_by_id(
        &self,
        alias: &str,
        id: i64,
        options: &ServiceOptions,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Option<E>> {
        if id == 0 {
            return Err(Error::precondition("ID was not provided."));
        }
        let id_field = self.core.spec().id_field;
        let clause = format!("{alias}.{id_field} = :{id_field}");
        self.find(
            alias,
            move |qb| {
                qb.and_where(clause).bind(id_field, id);
            },
            options,
            tx,
        )
        .await
    }

    pub async fn find_by(
        &self,
        alias: &str,
        field: &str,
        value: impl Into<SqlValue>,
        options: &ServiceOptions,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Option<E>> {
        if field.is_empty() {
            return Err(Error::precondition("Field name was not provided."));
        }
        let clause = format!("{alias}.{field} = :{field}");
        let param = field.to_string();
        let value = value.into();
        self.find(
            alias,
            move |qb| {
                qb.and_where(clause).bind(param, value);
            },
            options,
            tx,
        )
        .await
    }

    /// Persist an entity: insert when its id is unset (stamping created-at),
    /// update otherwise (stamping updated-at). `None` passes through.
    pub async fn save(
        &self,
        entity: Option<E>,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Option<E>> {
        let Some(mut entity) = entity else {
            return Ok(None);
        };
        let spec = self.core.spec();
        let now = Utc::now();

        if entity.value_of(spec.id_field).is_null() {
            entity.set_timestamp(spec.created_at_field, now);
            self.insert(&mut entity, tx).await?;
        } else {
            entity.set_timestamp(spec.updated_at_field, now);
            self.update(&entity, tx).await?;
        }
        Ok(Some(entity))
    }

    /// Soft-delete an entity by stamping its deleted-at column.
    pub async fn remove(&self, mut entity: E, tx: Option<&mut SqliteConnection>) -> Result<E> {
        let spec = self.core.spec();
        let deleted_at = spec
            .deleted_at_field
            .ok_or_else(|| Error::configuration("Soft deletion is not configured for this service"))?;
        if entity.value_of(spec.id_field).is_null() {
            return Err(Error::precondition("ID was not provided."));
        }

        let now = Utc::now();
        entity.set_timestamp(deleted_at, now);
        entity.set_timestamp(spec.updated_at_field, now);
        self.update(&entity, tx).await?;
        Ok(entity)
    }

    fn prepare_query(
        &self,
        alias: &str,
        refine: impl FnOnce(&mut SelectQuery),
        options: &ServiceOptions,
    ) -> Result<SelectQuery> {
        if alias.is_empty() {
            return Err(Error::precondition("Alias was not provided."));
        }
        let mut qb = self.core.query(alias);
        let mut ctx = TraversalContext::seeded(&options.ignore);
        self.core.set_joins(alias, &mut qb, options, &mut ctx)?;
        refine(&mut qb);
        self.core.set_default_query(alias, &mut qb, options)?;
        Ok(qb)
    }

    /// Prepare a list query: joins, refinement, defaults, ordering, and
    /// pagination. Returns the query and whether pagination must be applied
    /// in memory because a selecting to-many join would distort LIMIT.
    fn prepare_list_query(
        &self,
        alias: &str,
        refine: impl FnOnce(&mut SelectQuery),
        options: &ServiceOptions,
    ) -> Result<(SelectQuery, bool)> {
        let mut qb = self.prepare_query(alias, refine, options)?;
        qb.add_order_by(self.resolved_order(alias, options)?);

        let in_memory = qb.has_collection_join() && options.paginate.is_some();
        if !in_memory {
            self.core.set_pagination(&mut qb, options);
        }
        Ok((qb, in_memory))
    }

    fn resolved_order(&self, alias: &str, options: &ServiceOptions) -> Result<SortMap> {
        let mut order = SortMap::new();
        if let Some((key, direction)) = &options.additional_sort {
            order.insert(key.clone(), *direction);
        }
        order.merge_if_absent(self.core.get_sorting(alias, options)?);
        Ok(order)
    }

    fn distinct_column(&self, alias: &str, qb: &SelectQuery) -> Option<String> {
        qb.has_collection_join()
            .then(|| format!("{alias}.{}", self.core.spec().id_field))
    }

    async fn fetch_rows(
        &self,
        qb: &SelectQuery,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<Vec<SqliteRow>> {
        let (sql, values) = qb.to_parts()?;
        debug!(sql = %sql, "Executing entity query");

        let mut query = sqlx::query(&sql);
        for value in &values {
            query = value.bind_to_query(query);
        }
        match tx {
            Some(conn) => Ok(query.fetch_all(&mut *conn).await?),
            None => {
                let pool = self.core.pool()?;
                Ok(query.fetch_all(&pool).await?)
            }
        }
    }

    async fn fetch_count(
        &self,
        qb: &SelectQuery,
        distinct: Option<&str>,
        tx: Option<&mut SqliteConnection>,
    ) -> Result<i64> {
        let (sql, values) = qb.count_parts(distinct)?;
        debug!(sql = %sql, "Executing count query");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for value in &values {
            query = value.bind_to_scalar(query);
        }
        match tx {
            Some(conn) => Ok(query.fetch_one(&mut *conn).await?),
            None => {
                let pool = self.core.pool()?;
                Ok(query.fetch_one(&pool).await?)
            }
        }
    }

    async fn execute_write(
        &self,
        sql: &str,
        values: &[SqlValue],
        tx: Option<&mut SqliteConnection>,
    ) -> Result<SqliteQueryResult> {
        debug!(sql = %sql, "Executing write");

        let mut query = sqlx::query(sql);
        for value in values {
            query = value.bind_to_query(query);
        }
        match tx {
            Some(conn) => Ok(query.execute(&mut *conn).await?),
            None => {
                let pool = self.core.pool()?;
                Ok(query.execute(&pool).await?)
            }
        }
    }

    async fn insert(&self, entity: &mut E, tx: Option<&mut SqliteConnection>) -> Result<()> {
        let spec = self.core.spec();
        let columns: Vec<&str> = E::columns()
            .iter()
            .copied()
            .filter(|column| *column != spec.id_field)
            .collect();
        let placeholders: Vec<String> = columns.iter().map(|column| format!(":{column}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.core.table(),
            columns.join(", "),
            placeholders.join(", ")
        );

        let params: Vec<(String, SqlValue)> = columns
            .iter()
            .map(|column| ((*column).to_string(), entity.value_of(column)))
            .collect();
        let (sql, values) = flatten_params(&sql, &params)?;

        let result = self.execute_write(&sql, &values, tx).await?;
        entity.set_generated_id(result.last_insert_rowid());
        Ok(())
    }

    async fn update(&self, entity: &E, tx: Option<&mut SqliteConnection>) -> Result<()> {
        let spec = self.core.spec();
        let assignments: Vec<String> = E::columns()
            .iter()
            .filter(|column| **column != spec.id_field)
            .map(|column| format!("{column} = :{column}"))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {id} = :{id}",
            self.core.table(),
            assignments.join(", "),
            id = spec.id_field
        );

        let params: Vec<(String, SqlValue)> = E::columns()
            .iter()
            .map(|column| ((*column).to_string(), entity.value_of(column)))
            .collect();
        let (sql, values) = flatten_params(&sql, &params)?;

        self.execute_write(&sql, &values, tx).await?;
        Ok(())
    }

    /// Decode rows into entities, dropping duplicate root rows produced by
    /// selecting to-many joins. Identity is the aliased id column.
    fn decode_rows(&self, rows: &[SqliteRow], alias: &str) -> Result<Vec<E>> {
        let id_column = format!("{alias}_{}", self.core.spec().id_field);
        let mut seen: HashSet<String> = HashSet::new();
        let mut items = Vec::new();
        for row in rows {
            if let Some(identity) = row_identity(row, &id_column) {
                if !seen.insert(identity) {
                    continue;
                }
            }
            items.push(E::from_aliased_row(row, alias)?);
        }
        Ok(items)
    }
}

fn row_identity(row: &SqliteRow, column: &str) -> Option<String> {
    if let Ok(id) = row.try_get::<i64, _>(column) {
        return Some(id.to_string());
    }
    if let Ok(id) = row.try_get::<String, _>(column) {
        return Some(id);
    }
    None
}

fn paginate_in_memory<T>(items: Vec<T>, skip: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(skip.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pagination_clamps_bounds() {
        let items = vec![1, 2, 3, 4, 5];
        assert_eq!(paginate_in_memory(items.clone(), 2, 2), vec![3, 4]);
        assert_eq!(paginate_in_memory(items.clone(), 4, 10), vec![5]);
        assert_eq!(paginate_in_memory(items.clone(), -1, 2), vec![1, 2]);
        assert_eq!(paginate_in_memory(items, 10, 2), Vec::<i32>::new());
    }
}

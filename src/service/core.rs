//! The connection-scoped core of an entity service.
//!
//! Holds the static configuration and implements everything that is
//! independent of the concrete entity type: query construction, recursive
//! join composition, default filtering, sort resolution, and dotted-path
//! translation. The typed façade in [super] delegates here, which is also
//! what lets relation descriptors resolve related services without knowing
//! their entity types.

use tracing::debug;

use crate::db::{ConnectionManager, Database};
use crate::error::{Error, Result};
use crate::options::{ServiceOptions, TraversalContext};
use crate::query::{Predicate, SelectQuery, SortMap};
use crate::relations::JoinKind;

use super::spec::ServiceSpec;
use super::walk::{breaks_only, compose_alias, returns_to_origin, template_alias};

pub struct ServiceCore {
    key: &'static str,
    table: &'static str,
    columns: &'static [&'static str],
    connection: String,
    spec: ServiceSpec,
}

impl ServiceCore {
    pub fn new(
        key: &'static str,
        table: &'static str,
        columns: &'static [&'static str],
        connection: &str,
        spec: ServiceSpec,
    ) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::precondition("Table was not provided."));
        }
        if connection.is_empty() {
            return Err(Error::precondition("Connection name was not provided."));
        }
        Ok(Self {
            key,
            table,
            columns,
            connection: connection.to_string(),
            spec,
        })
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn columns(&self) -> &'static [&'static str] {
        self.columns
    }

    pub fn connection(&self) -> &str {
        &self.connection
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// The pool this service executes against.
    pub fn pool(&self) -> Result<Database> {
        ConnectionManager::get(&self.connection).ok_or(Error::RepositoryNotFound)
    }

    /// A fresh SELECT over this entity's table under the given alias.
    pub fn query(&self, alias: &str) -> SelectQuery {
        SelectQuery::new(self.table, self.columns, alias)
    }

    /// Recursively attach this entity's relations to `qb`.
    ///
    /// Parents are walked eagerly; children only when named in
    /// `options.subitems`. Exclusions accumulated in `ctx` are shared with
    /// sibling branches and with the sort pass of the same request.
    pub fn set_joins(
        &self,
        alias: &str,
        qb: &mut SelectQuery,
        options: &ServiceOptions,
        ctx: &mut TraversalContext,
    ) -> Result<()> {
        if alias.is_empty() {
            return Err(Error::precondition("Alias was not provided."));
        }

        ctx.enter()?;
        let composed = self.compose_joins(alias, qb, options, ctx);
        ctx.leave();
        composed
    }

    fn compose_joins(
        &self,
        alias: &str,
        qb: &mut SelectQuery,
        options: &ServiceOptions,
        ctx: &mut TraversalContext,
    ) -> Result<()> {
        for parent in &self.spec.parents {
            if breaks_only(options.only.as_deref(), parent.name) {
                break;
            }
            let joined = compose_alias(alias, parent.alias);
            if ctx.is_ignored(&joined)
                || returns_to_origin(options.origin.as_deref(), parent.name, parent.alias)
            {
                continue;
            }

            let related = (parent.service)(&self.connection)?;

            let mut join_type = parent.join_type.unwrap_or(JoinKind::InnerJoinAndSelect);
            let drop_select = !join_type.selects()
                || options.join_type.map_or(false, |kind| !kind.selects());
            if join_type.is_inner() {
                if let Some(kind) = options.join_type {
                    join_type = kind;
                }
            }
            if drop_select {
                join_type = join_type.without_select();
            }

            // Outer joins carry the parent's default filter inside the ON
            // condition so missing parents stay NULL instead of dropping the
            // owning row. Dependent inner joins enforce it as an outer WHERE
            // after the subtree is composed.
            let mut sub = related.query(&joined);
            if !parent.dependent && join_type.is_left() {
                related.apply_default_query(&joined, &mut sub, false);
            }
            if let Some(fixed) = &parent.and_where {
                sub.and_where_predicate(Predicate {
                    clause: template_alias(&fixed.clause, &joined),
                    params: fixed.params.clone(),
                });
            }
            if let Some(caller) = options.predicate_for(alias, parent.name) {
                sub.and_where_predicate(caller);
            }

            let base = format!(
                "{joined}.{id} = {alias}.{column}",
                id = related.spec.id_field,
                column = parent.join_column
            );
            qb.join(
                join_type,
                related.table,
                &joined,
                related.columns,
                base,
                sub.where_fragment(),
                false,
            );
            debug!(alias = %joined, kind = join_type.sql_keyword(), "Joined parent relation");

            let next = ServiceOptions {
                and_where: options.and_where.clone(),
                join_type: Some(join_type),
                only: parent.only.map(str::to_string),
                origin: Some(alias.to_string()),
                subitems: parent.subitems.iter().map(|s| s.to_string()).collect(),
                parent: true,
                ..ServiceOptions::default()
            };
            related.set_joins(&joined, qb, &next, ctx)?;

            if parent.dependent && join_type.is_inner() {
                related.apply_default_query(&joined, qb, false);
            }
        }

        if options.subitems.is_empty() {
            return Ok(());
        }

        for subitem in &options.subitems {
            for child in &self.spec.children {
                if breaks_only(options.only.as_deref(), child.name) {
                    break;
                }
                let joined = compose_alias(alias, child.alias);
                if ctx.is_ignored(&joined) || child.name != subitem {
                    continue;
                }

                let related = (child.service)(&self.connection)?;

                let mut join_type = child.join_type.unwrap_or(JoinKind::LeftJoinAndSelect);
                if !options.parent {
                    if let Some(kind) = options.join_type {
                        join_type = kind;
                    }
                }

                let mut sub = related.query(&joined);
                if !child.dependent && join_type.is_left() {
                    related.apply_default_query(&joined, &mut sub, false);
                }
                if let Some(fixed) = &child.and_where {
                    sub.and_where_predicate(Predicate {
                        clause: template_alias(&fixed.clause, &joined),
                        params: fixed.params.clone(),
                    });
                }
                if let Some(caller) = options.predicate_for(alias, child.name) {
                    sub.and_where_predicate(caller);
                }

                let base = format!(
                    "{joined}.{column} = {alias}.{id}",
                    column = child.join_column,
                    id = self.spec.id_field
                );
                qb.join(
                    join_type,
                    related.table,
                    &joined,
                    related.columns,
                    base,
                    sub.where_fragment(),
                    true,
                );
                debug!(alias = %joined, kind = join_type.sql_keyword(), "Joined child relation");

                // Children of children never inherit an inner override.
                let next = ServiceOptions {
                    and_where: options.and_where.clone(),
                    join_type: Some(if join_type.is_left() {
                        join_type
                    } else {
                        JoinKind::LeftJoinAndSelect
                    }),
                    only: child.only.map(str::to_string),
                    origin: Some(alias.to_string()),
                    subitems: child.subitems.iter().map(|s| s.to_string()).collect(),
                    parent: options.parent,
                    ..ServiceOptions::default()
                };
                related.set_joins(&joined, qb, &next, ctx)?;

                if child.dependent && join_type.is_inner() {
                    related.apply_default_query(&joined, qb, false);
                }

                // Registered after the subtree so the branch's own
                // descendants are composed, while later siblings and the
                // sort pass see the exclusion.
                ctx.ignore_branch(&joined);
            }
        }

        Ok(())
    }

    /// Apply this entity's default conditions (soft-delete filter and the
    /// declared default filter) under `alias`.
    pub fn set_default_query(
        &self,
        alias: &str,
        qb: &mut SelectQuery,
        options: &ServiceOptions,
    ) -> Result<()> {
        if alias.is_empty() {
            return Err(Error::precondition("Alias was not provided."));
        }
        self.apply_default_query(alias, qb, options.parent);
        Ok(())
    }

    pub(crate) fn apply_default_query(
        &self,
        alias: &str,
        qb: &mut SelectQuery,
        suppress_soft_delete: bool,
    ) {
        if !suppress_soft_delete {
            if let Some(column) = self.spec.deleted_at_field {
                qb.and_where(format!("{alias}.{column} IS NULL"));
            }
        }
        if let Some(filter) = &self.spec.default_filter {
            qb.and_where_predicate(Predicate {
                clause: template_alias(&filter.clause, alias),
                params: filter.params.clone(),
            });
        }
    }

    /// Resolve the effective ORDER BY map for a request.
    ///
    /// An explicit `options.sort` wins outright; each of its keys is run
    /// through [translate_params](Self::translate_params) and keys that
    /// resolve to nothing are dropped. Otherwise the default sorting applies,
    /// merged with the defaults of every included child branch.
    pub fn get_sorting(&self, alias: &str, options: &ServiceOptions) -> Result<SortMap> {
        if alias.is_empty() {
            return Err(Error::precondition("Alias was not provided."));
        }
        let mut ctx = TraversalContext::seeded(&options.ignore);
        self.compose_sorting(alias, options, &mut ctx)
    }

    pub(crate) fn compose_sorting(
        &self,
        alias: &str,
        options: &ServiceOptions,
        ctx: &mut TraversalContext,
    ) -> Result<SortMap> {
        if !options.sort.is_empty() {
            let mut translated = SortMap::new();
            for (key, direction) in options.sort.iter() {
                match self.translate_params(key, None) {
                    Some(resolved) if !resolved.is_empty() => {
                        translated.insert(resolved, direction);
                    }
                    _ => debug!(key, "Discarding sort key that resolves to no column"),
                }
            }
            return Ok(translated);
        }

        let mut sorting = SortMap::new();
        for (key, direction) in &self.spec.default_sorting {
            if !key.starts_with("$alias") {
                return Err(Error::configuration("Sort keys must start with '$alias.'"));
            }
            let qualified = key.replacen("$alias", alias, 1);
            if let Some(origin) = options.origin.as_deref() {
                // Sorting by a column of the branch we came from reorders
                // nothing useful; drop it.
                let owner = qualified.split('.').next().unwrap_or("");
                if owner.to_lowercase().ends_with(&origin.to_lowercase()) {
                    continue;
                }
            }
            sorting.insert(qualified, *direction);
        }

        for subitem in &options.subitems {
            for child in &self.spec.children {
                if breaks_only(options.only.as_deref(), child.name) {
                    break;
                }
                let joined = compose_alias(alias, child.alias);
                if ctx.is_ignored(&joined) || child.name != subitem {
                    continue;
                }

                let related = (child.service)(&self.connection)?;
                let next = ServiceOptions {
                    only: child.only.map(str::to_string),
                    origin: Some(alias.to_string()),
                    subitems: child.subitems.iter().map(|s| s.to_string()).collect(),
                    ..ServiceOptions::default()
                };
                let nested = related.compose_sorting(&joined, &next, ctx)?;
                sorting.merge(nested);
                ctx.ignore_branch(&joined);
            }
        }

        Ok(sorting)
    }

    /// Apply the caller's pagination to the query, when provided.
    pub fn set_pagination(&self, qb: &mut SelectQuery, options: &ServiceOptions) {
        if let Some(page) = &options.paginate {
            qb.take(page.limit());
            qb.skip(page.skip());
        }
    }

    /// Translate a dotted entity path (`alias.relation.column`) into a
    /// qualified column reference using the composed join aliases.
    ///
    /// Returns `None` when an intermediate segment names no known relation.
    /// A bare name passes through unchanged; a terminal `id` segment is
    /// rewritten when `id_column_alias` is configured.
    pub fn translate_params(&self, param: &str, alias_override: Option<&str>) -> Option<String> {
        if param.is_empty() {
            return Some(String::new());
        }
        let Some((field, rest)) = param.split_once('.') else {
            return Some(param.to_string());
        };

        let mut rest = rest.to_string();
        if rest == "id" {
            if let Some(id_alias) = self.spec.id_column_alias {
                rest = id_alias.to_string();
            }
        }
        let alias = alias_override.unwrap_or(field);

        let Some((subfield, _)) = rest.split_once('.') else {
            return Some(format!("{alias}.{rest}"));
        };

        for inner in &self.spec.inners {
            if inner.name == subfield {
                let embedded = ServiceCore {
                    key: self.key,
                    table: self.table,
                    columns: self.columns,
                    connection: self.connection.clone(),
                    spec: ServiceSpec {
                        id_column_alias: self.spec.id_column_alias,
                        parents: inner.parents.clone(),
                        children: inner.children.clone(),
                        ..ServiceSpec::default()
                    },
                };
                let resolved = embedded.translate_params(&rest, Some(inner.alias))?;
                return Some(format!("{alias}.{resolved}"));
            }
        }
        for parent in &self.spec.parents {
            if parent.name == subfield {
                let related = (parent.service)(&self.connection).ok()?;
                let resolved = related.translate_params(&rest, Some(parent.alias))?;
                return Some(format!("{alias}{resolved}"));
            }
        }
        for child in &self.spec.children {
            if child.name == subfield {
                let related = (child.service)(&self.connection).ok()?;
                let resolved = related.translate_params(&rest, Some(child.alias))?;
                return Some(format!("{alias}{resolved}"));
            }
        }

        None
    }
}

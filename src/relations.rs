//! Static relationship declarations between entity services.
//!
//! Relations are declared once, at service construction, and never mutated at
//! runtime. Declaration order matters: relations are joined in order, and the
//! ignore-glob pushed for a composed child branch only affects relations
//! visited afterwards in the same traversal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::Predicate;
use crate::service::ServiceCore;

/// How a related entity is attached to the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    InnerJoin,
    InnerJoinAndSelect,
    LeftJoin,
    LeftJoinAndSelect,
}

impl JoinKind {
    pub fn is_inner(&self) -> bool {
        matches!(self, JoinKind::InnerJoin | JoinKind::InnerJoinAndSelect)
    }

    pub fn is_left(&self) -> bool {
        !self.is_inner()
    }

    /// Whether the joined entity's columns are added to the SELECT list.
    pub fn selects(&self) -> bool {
        matches!(
            self,
            JoinKind::InnerJoinAndSelect | JoinKind::LeftJoinAndSelect
        )
    }

    pub fn sql_keyword(&self) -> &'static str {
        if self.is_inner() {
            "INNER JOIN"
        } else {
            "LEFT JOIN"
        }
    }

    pub fn without_select(&self) -> JoinKind {
        if self.is_inner() {
            JoinKind::InnerJoin
        } else {
            JoinKind::LeftJoin
        }
    }
}

/// Resolves the related entity's own service for a connection name.
///
/// A plain function keyed by connection name, so descriptors stay `'static`
/// data; implementations go through [ServiceRegistry](crate::registry::ServiceRegistry)
/// for connection-scoped singletons.
pub type ServiceResolver = fn(&str) -> Result<Arc<ServiceCore>>;

/// A many-to-one link: the owning table carries the foreign key.
///
/// Parents are joined eagerly (subject to only/ignore/origin filtering) with
/// `innerJoinAndSelect` as the default join type. The ON base condition is
/// `joined.<target id> = owner.<join_column>`.
#[derive(Clone)]
pub struct ParentRelation {
    /// Relation field name on the owning entity.
    pub name: &'static str,
    /// Alias suffix; the joined alias is `owner_alias + alias`.
    pub alias: &'static str,
    /// Foreign-key column on the owning table.
    pub join_column: &'static str,
    pub service: ServiceResolver,
    pub join_type: Option<JoinKind>,
    /// When true the parent's default filter is enforced as an outer WHERE
    /// for inner joins: the parent must exist and pass its own filter.
    pub dependent: bool,
    /// Nested relation names to also join when this parent is included.
    pub subitems: Vec<&'static str>,
    /// Restricts the parent's own relation walk to a single named relation.
    pub only: Option<&'static str>,
    /// Fixed predicate always applied to this relation's join condition.
    pub and_where: Option<Predicate>,
}

impl ParentRelation {
    pub fn new(
        name: &'static str,
        alias: &'static str,
        join_column: &'static str,
        service: ServiceResolver,
    ) -> Self {
        Self {
            name,
            alias,
            join_column,
            service,
            join_type: None,
            dependent: false,
            subitems: Vec::new(),
            only: None,
            and_where: None,
        }
    }

    pub fn join_type(mut self, join_type: JoinKind) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    pub fn subitems(mut self, subitems: Vec<&'static str>) -> Self {
        self.subitems = subitems;
        self
    }

    pub fn only(mut self, only: &'static str) -> Self {
        self.only = Some(only);
        self
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.and_where = Some(predicate);
        self
    }
}

/// A one-to-many link: the child table carries the foreign key.
///
/// Children are opt-in per request (via `subitems`), defaulting to
/// `leftJoinAndSelect`. The ON base condition is
/// `joined.<join_column> = owner.<owner id>`.
#[derive(Clone)]
pub struct ChildRelation {
    pub name: &'static str,
    pub alias: &'static str,
    /// Foreign-key column on the child table, referencing the owner's id.
    pub join_column: &'static str,
    pub service: ServiceResolver,
    pub join_type: Option<JoinKind>,
    pub dependent: bool,
    pub subitems: Vec<&'static str>,
    pub only: Option<&'static str>,
    pub and_where: Option<Predicate>,
}

impl ChildRelation {
    pub fn new(
        name: &'static str,
        alias: &'static str,
        join_column: &'static str,
        service: ServiceResolver,
    ) -> Self {
        Self {
            name,
            alias,
            join_column,
            service,
            join_type: None,
            dependent: false,
            subitems: Vec::new(),
            only: None,
            and_where: None,
        }
    }

    pub fn join_type(mut self, join_type: JoinKind) -> Self {
        self.join_type = Some(join_type);
        self
    }

    pub fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    pub fn subitems(mut self, subitems: Vec<&'static str>) -> Self {
        self.subitems = subitems;
        self
    }

    pub fn only(mut self, only: &'static str) -> Self {
        self.only = Some(only);
        self
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.and_where = Some(predicate);
        self
    }
}

/// An embedded-field declaration: columns of the same table addressed through
/// a nested name, with their own parent/child links. Consumed by
/// `translate_params` when resolving dotted paths; inner relations are not
/// joined (they live on the owning table).
#[derive(Clone, Default)]
pub struct InnerRelation {
    pub name: &'static str,
    pub alias: &'static str,
    pub parents: Vec<ParentRelation>,
    pub children: Vec<ChildRelation>,
}

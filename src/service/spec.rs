//! Per-service configuration: bookkeeping columns, default filtering and
//! sorting, and the relation graph.

use crate::query::{Predicate, SortDirection};
use crate::relations::{ChildRelation, InnerRelation, ParentRelation};

/// Static configuration of an entity service.
///
/// Built once at registration and never mutated afterwards; every traversal
/// reads the same descriptors. Default-filter clauses and default-sort keys
/// reference the entity through the `$alias` placeholder so they apply at any
/// position in a join tree.
#[derive(Clone)]
pub struct ServiceSpec {
    pub id_field: &'static str,
    pub created_at_field: &'static str,
    pub updated_at_field: &'static str,
    /// Soft-delete column. `None` disables soft deletion entirely: no default
    /// `IS NULL` filter, and `remove` becomes a configuration error.
    pub deleted_at_field: Option<&'static str>,
    /// Always-on filter applied wherever this entity appears, `$alias`
    /// templated (e.g. `$alias.id > 0`).
    pub default_filter: Option<Predicate>,
    /// Fallback ORDER BY entries; keys must start with `$alias.`.
    pub default_sorting: Vec<(String, SortDirection)>,
    /// Rewrite target for a terminal `id` segment in dotted sort paths, for
    /// schemas whose exposed `id` maps to a differently named column.
    pub id_column_alias: Option<&'static str>,
    pub parents: Vec<ParentRelation>,
    pub children: Vec<ChildRelation>,
    pub inners: Vec<InnerRelation>,
}

impl Default for ServiceSpec {
    fn default() -> Self {
        Self {
            id_field: "id",
            created_at_field: "created_at",
            updated_at_field: "updated_at",
            deleted_at_field: Some("deleted_at"),
            default_filter: None,
            default_sorting: Vec::new(),
            id_column_alias: None,
            parents: Vec::new(),
            children: Vec::new(),
            inners: Vec::new(),
        }
    }
}

impl ServiceSpec {
    pub fn builder() -> ServiceSpecBuilder {
        ServiceSpecBuilder {
            spec: ServiceSpec::default(),
        }
    }
}

/// Builder for [ServiceSpec].
pub struct ServiceSpecBuilder {
    spec: ServiceSpec,
}

impl ServiceSpecBuilder {
    pub fn id_field(mut self, column: &'static str) -> Self {
        self.spec.id_field = column;
        self
    }

    pub fn created_at_field(mut self, column: &'static str) -> Self {
        self.spec.created_at_field = column;
        self
    }

    pub fn updated_at_field(mut self, column: &'static str) -> Self {
        self.spec.updated_at_field = column;
        self
    }

    pub fn deleted_at_field(mut self, column: &'static str) -> Self {
        self.spec.deleted_at_field = Some(column);
        self
    }

    /// Disable soft deletion for this entity.
    pub fn no_soft_delete(mut self) -> Self {
        self.spec.deleted_at_field = None;
        self
    }

    pub fn default_filter(mut self, predicate: Predicate) -> Self {
        self.spec.default_filter = Some(predicate);
        self
    }

    /// Append a default-sort entry; `key` must start with `$alias.`.
    pub fn default_sort(mut self, key: impl Into<String>, direction: SortDirection) -> Self {
        self.spec.default_sorting.push((key.into(), direction));
        self
    }

    pub fn id_column_alias(mut self, column: &'static str) -> Self {
        self.spec.id_column_alias = Some(column);
        self
    }

    pub fn parent(mut self, relation: ParentRelation) -> Self {
        self.spec.parents.push(relation);
        self
    }

    pub fn child(mut self, relation: ChildRelation) -> Self {
        self.spec.children.push(relation);
        self
    }

    pub fn inner(mut self, relation: InnerRelation) -> Self {
        self.spec.inners.push(relation);
        self
    }

    pub fn build(self) -> ServiceSpec {
        self.spec
    }
}

//! Request-scoped options and the shared traversal context.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::query::{Predicate, SortMap};
use crate::relations::JoinKind;

/// Opaque limit/offset provider supplied by the caller.
pub trait Paginator: Send + Sync {
    fn limit(&self) -> i64;
    fn skip(&self) -> i64;
}

/// Plain limit/offset pagination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: i64,
    pub skip: i64,
}

impl Page {
    pub fn new(limit: i64, skip: i64) -> Self {
        Self { limit, skip }
    }
}

impl Paginator for Page {
    fn limit(&self) -> i64 {
        self.limit
    }

    fn skip(&self) -> i64 {
        self.skip
    }
}

/// Caller-supplied predicates keyed by `"ownerAlias.relationName"`.
pub type AndWhereMap = HashMap<String, Predicate>;

/// Per-request options threaded through the whole recursive composition.
///
/// Construct a fresh value per request; the composition narrows and rebuilds
/// it as recursion descends. The shared mutable state of a traversal (the
/// ignore accumulator) lives in [TraversalContext], not here.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    /// Per-relation join predicates, shared across the whole traversal.
    pub and_where: Option<Arc<AndWhereMap>>,
    /// Seed ignore-globs: aliases matching any of these are never joined.
    pub ignore: Vec<String>,
    /// Join-type override; only relations declared (or defaulting to) inner
    /// accept it for parents, see the join composer.
    pub join_type: Option<JoinKind>,
    pub paginate: Option<Arc<dyn Paginator>>,
    /// Restrict the relation walk to a single named relation.
    pub only: Option<String>,
    /// Alias of the entity that triggered this traversal; parents relating
    /// back to it are not re-joined.
    pub origin: Option<String>,
    /// Explicit sort; when non-empty it wins outright over default sorting.
    pub sort: SortMap,
    /// Extra ORDER BY entry taking precedence over computed sorting.
    pub additional_sort: Option<(String, crate::query::SortDirection)>,
    /// Child relations to include, by relation name.
    pub subitems: Vec<String>,
    /// Set while traversing into a parent relation: suppresses the entity's
    /// own default query and keeps join-type overrides from leaking into
    /// parent-of-child branches.
    pub parent: bool,
}

impl ServiceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subitems<I, S>(subitems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subitems: subitems.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Look up the caller predicate for `owner_alias.relation_name`.
    pub(crate) fn predicate_for(&self, owner_alias: &str, name: &str) -> Option<Predicate> {
        let key = format!("{owner_alias}.{name}");
        self.and_where
            .as_ref()
            .and_then(|map| map.get(&key))
            .cloned()
    }
}

/// Relation graphs deeper than this are rejected as a likely cycle.
pub(crate) const MAX_JOIN_DEPTH: usize = 16;

/// Mutable state shared across one recursive composition pass.
///
/// Exclusions registered while composing one branch are observed by sibling
/// branches visited later and by the sort pass of the same request; the
/// explicit `&mut` threading makes that sharing visible at every call site.
#[derive(Debug, Clone, Default)]
pub struct TraversalContext {
    ignored: Vec<String>,
    depth: usize,
}

impl TraversalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the accumulator from the caller's ignore globs.
    pub fn seeded(globs: &[String]) -> Self {
        Self {
            ignored: globs.to_vec(),
            depth: 0,
        }
    }

    /// Glob match: a pattern ending in `*` prefix-matches the alias (the
    /// branch root and everything beneath it); otherwise exact match.
    pub fn is_ignored(&self, alias: &str) -> bool {
        self.ignored.iter().any(|pattern| {
            match pattern.strip_suffix('*') {
                Some(stem) => alias.starts_with(stem),
                None => alias == pattern,
            }
        })
    }

    /// Exclude a composed branch (and all its sub-relations) from the rest
    /// of this traversal.
    pub fn ignore_branch(&mut self, alias: &str) {
        self.ignored.push(format!("{alias}*"));
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    pub(crate) fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_JOIN_DEPTH {
            return Err(Error::configuration(format!(
                "Relation graph exceeds depth {MAX_JOIN_DEPTH}; check for cyclic declarations"
            )));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_branch_and_descendants() {
        let mut ctx = TraversalContext::new();
        ctx.ignore_branch("testTest2");

        assert!(ctx.is_ignored("testTest2"));
        assert!(ctx.is_ignored("testTest2TestB"));
        assert!(!ctx.is_ignored("testTest"));
    }

    #[test]
    fn exact_pattern_matches_only_itself() {
        let ctx = TraversalContext::seeded(&["test2Test".to_string()]);
        assert!(ctx.is_ignored("test2Test"));
        assert!(!ctx.is_ignored("test2TestB"));
    }

    #[test]
    fn depth_cap_rejects_runaway_recursion() {
        let mut ctx = TraversalContext::new();
        for _ in 0..MAX_JOIN_DEPTH {
            ctx.enter().unwrap();
        }
        assert!(ctx.enter().is_err());
    }
}

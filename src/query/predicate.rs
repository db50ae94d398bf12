//! Predicate fragments: SQL text plus named bound parameters.

use super::value::SqlValue;

/// A WHERE/ON fragment with its named parameters.
///
/// The clause text references parameters as `:name`; the builder rewrites
/// them to positional placeholders when the query is executed. Clause text is
/// embedded verbatim, so column references must already be alias-qualified
/// (e.g. `testTest2.id > 0`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<(String, SqlValue)>,
}

impl Predicate {
    pub fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            params: Vec::new(),
        }
    }

    /// Attach a named parameter value.
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.clause.trim().is_empty()
    }
}

impl From<&str> for Predicate {
    fn from(clause: &str) -> Self {
        Predicate::new(clause)
    }
}

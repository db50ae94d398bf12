//! SQL query builder for entity services.
//!
//! Builds parameterized SELECT queries with joins, filtering, sorting, and
//! pagination. The generated SQL is deterministic: aliases are composed by the
//! join composer and rendered in attachment order, so identical declarations
//! always produce byte-identical statements.

use crate::error::{Error, Result};
use crate::relations::JoinKind;

use super::predicate::Predicate;
use super::sort::SortMap;
use super::value::SqlValue;

#[derive(Debug, Clone)]
struct SelectItem {
    alias: String,
    columns: &'static [&'static str],
}

#[derive(Debug, Clone)]
struct JoinClause {
    kind: JoinKind,
    table: &'static str,
    alias: String,
    condition: String,
    /// True when the join targets a to-many (child) relation.
    collection: bool,
}

/// A SELECT query under construction.
///
/// Columns are selected per alias as `alias.col AS alias_col`, which is also
/// how [Entity::from_aliased_row](crate::entity::Entity::from_aliased_row)
/// finds them when rows are decoded.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    table: &'static str,
    alias: String,
    selects: Vec<SelectItem>,
    joins: Vec<JoinClause>,
    wheres: Vec<String>,
    params: Vec<(String, SqlValue)>,
    order: SortMap,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl SelectQuery {
    pub fn new(table: &'static str, columns: &'static [&'static str], alias: &str) -> Self {
        Self {
            table,
            alias: alias.to_string(),
            selects: vec![SelectItem {
                alias: alias.to_string(),
                columns,
            }],
            joins: Vec::new(),
            wheres: Vec::new(),
            params: Vec::new(),
            order: SortMap::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Attach a join. `base_on` is the structural ON condition; `extra` is an
    /// optional harvested fragment appended as `AND (...)`, its parameters
    /// absorbed into this query. When the join kind selects, the joined
    /// columns are added to the SELECT list.
    pub fn join(
        &mut self,
        kind: JoinKind,
        table: &'static str,
        alias: &str,
        columns: &'static [&'static str],
        base_on: String,
        extra: Option<Predicate>,
        collection: bool,
    ) {
        let condition = match extra {
            Some(fragment) if !fragment.is_empty() => {
                self.params.extend(fragment.params);
                format!("{base_on} AND ({})", fragment.clause)
            }
            Some(fragment) => {
                self.params.extend(fragment.params);
                base_on
            }
            None => base_on,
        };

        if kind.selects() {
            self.selects.push(SelectItem {
                alias: alias.to_string(),
                columns,
            });
        }
        self.joins.push(JoinClause {
            kind,
            table,
            alias: alias.to_string(),
            condition,
            collection,
        });
    }

    /// Add a WHERE condition, AND-combined with any existing conditions.
    pub fn and_where(&mut self, clause: impl Into<String>) -> &mut Self {
        let clause = clause.into();
        if !clause.trim().is_empty() {
            self.wheres.push(clause);
        }
        self
    }

    /// Add a predicate fragment together with its named parameters.
    pub fn and_where_predicate(&mut self, predicate: Predicate) -> &mut Self {
        if !predicate.is_empty() {
            self.wheres.push(predicate.clause);
        }
        self.params.extend(predicate.params);
        self
    }

    /// Bind a named parameter directly.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Replace the ORDER BY clause.
    pub fn order_by(&mut self, order: SortMap) -> &mut Self {
        self.order = order;
        self
    }

    /// Append ORDER BY entries, keeping existing keys.
    pub fn add_order_by(&mut self, order: SortMap) -> &mut Self {
        self.order.merge_if_absent(order);
        self
    }

    pub fn take(&mut self, limit: i64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(&mut self, offset: i64) -> &mut Self {
        self.offset = Some(offset);
        self
    }

    /// True when any join targets a to-many relation. Such joins multiply
    /// result rows whether or not they select, so row-count based
    /// LIMIT/OFFSET would be distorted either way.
    pub fn has_collection_join(&self) -> bool {
        self.joins.iter().any(|j| j.collection)
    }

    /// The composed WHERE conditions of this query as an embeddable fragment,
    /// used to fold a related entity's default filter into a join condition.
    pub fn where_fragment(&self) -> Option<Predicate> {
        if self.wheres.is_empty() {
            return None;
        }
        Some(Predicate {
            clause: self.wheres.join(" AND "),
            params: self.params.clone(),
        })
    }

    /// Render the SELECT statement with named parameters left in place.
    pub fn sql(&self) -> String {
        let mut sql = String::from("SELECT ");

        let mut items: Vec<String> = Vec::new();
        for select in &self.selects {
            for col in select.columns {
                items.push(format!(
                    "{alias}.{col} AS {alias}_{col}",
                    alias = select.alias
                ));
            }
        }
        sql.push_str(&items.join(", "));

        sql.push_str(&format!(" FROM {} {}", self.table, self.alias));

        for join in &self.joins {
            sql.push_str(&format!(
                " {} {} {} ON {}",
                join.kind.sql_keyword(),
                join.table,
                join.alias,
                join.condition
            ));
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }

        if !self.order.is_empty() {
            let terms: Vec<String> = self
                .order
                .iter()
                .map(|(key, dir)| format!("{} {}", key, dir.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            if offset > 0 {
                sql.push_str(&format!(" OFFSET {}", offset));
            }
        }

        sql
    }

    /// Render a COUNT statement over the same joins and conditions. With
    /// `distinct`, counts distinct values of the given qualified column
    /// (used when collection joins would multiply root rows).
    pub fn count_sql(&self, distinct: Option<&str>) -> String {
        let mut sql = match distinct {
            Some(column) => format!("SELECT COUNT(DISTINCT {})", column),
            None => String::from("SELECT COUNT(*)"),
        };

        sql.push_str(&format!(" FROM {} {}", self.table, self.alias));

        for join in &self.joins {
            sql.push_str(&format!(
                " {} {} {} ON {}",
                join.kind.sql_keyword(),
                join.table,
                join.alias,
                join.condition
            ));
        }

        if !self.wheres.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.wheres.join(" AND "));
        }

        sql
    }

    /// Flatten named parameters to positional placeholders.
    ///
    /// Scans the rendered SQL for `:name` tokens in order and pairs each with
    /// its bound value; an unbound name is a configuration error. When the
    /// same name was bound more than once the last binding wins.
    pub fn to_parts(&self) -> Result<(String, Vec<SqlValue>)> {
        flatten_params(&self.sql(), &self.params)
    }

    pub fn count_parts(&self, distinct: Option<&str>) -> Result<(String, Vec<SqlValue>)> {
        flatten_params(&self.count_sql(distinct), &self.params)
    }
}

/// Rewrite `:name` tokens to `?` placeholders, collecting values in order.
/// Everything between tokens is copied through verbatim, so non-ASCII text in
/// literals or identifiers survives untouched.
pub(crate) fn flatten_params(
    sql: &str,
    params: &[(String, SqlValue)],
) -> Result<(String, Vec<SqlValue>)> {
    let mut out = String::with_capacity(sql.len());
    let mut values = Vec::new();
    let mut rest = sql;

    while let Some(pos) = rest.find(':') {
        let (head, tail) = rest.split_at(pos);
        out.push_str(head);
        let after = &tail[1..];

        let starts_ident = after
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_');
        if !starts_ident {
            out.push(':');
            rest = after;
            continue;
        }

        let end = after
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .unwrap_or(after.len());
        let name = &after[..end];
        let value = params
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::configuration(format!("No value bound for parameter :{name}")))?;
        values.push(value);
        out.push('?');
        rest = &after[end..];
    }
    out.push_str(rest);

    Ok((out, values))
}

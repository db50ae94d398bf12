//! Ordering primitives: sort direction and the ordered sort map.

use serde::{Deserialize, Serialize};

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// An ordered mapping of fully-qualified column → direction.
///
/// Insertion order is the ORDER BY order. `insert` replaces an existing key in
/// place (last write wins among defaults); `insert_if_absent` preserves
/// earlier entries, which is how caller-supplied keys keep precedence over
/// merged defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortMap {
    entries: Vec<(String, SortDirection)>,
}

impl SortMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<SortDirection> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, d)| *d)
    }

    /// Insert or overwrite, keeping the original position on overwrite.
    pub fn insert(&mut self, key: impl Into<String>, direction: SortDirection) {
        let key = key.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = direction;
        } else {
            self.entries.push((key, direction));
        }
    }

    /// Insert only when the key is not yet present.
    pub fn insert_if_absent(&mut self, key: impl Into<String>, direction: SortDirection) {
        let key = key.into();
        if self.entries.iter().all(|(k, _)| *k != key) {
            self.entries.push((key, direction));
        }
    }

    /// Merge another map, overwriting duplicate keys (default-merge order).
    pub fn merge(&mut self, other: SortMap) {
        for (key, direction) in other.entries {
            self.insert(key, direction);
        }
    }

    /// Merge another map without overwriting existing keys.
    pub fn merge_if_absent(&mut self, other: SortMap) {
        for (key, direction) in other.entries {
            self.insert_if_absent(key, direction);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortDirection)> {
        self.entries.iter().map(|(k, d)| (k.as_str(), *d))
    }
}

impl<K: Into<String>> FromIterator<(K, SortDirection)> for SortMap {
    fn from_iter<I: IntoIterator<Item = (K, SortDirection)>>(iter: I) -> Self {
        let mut map = SortMap::new();
        for (key, direction) in iter {
            map.insert(key, direction);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_in_place() {
        let mut map = SortMap::new();
        map.insert("a.name", SortDirection::Asc);
        map.insert("a.id", SortDirection::Asc);
        map.insert("a.name", SortDirection::Desc);

        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a.name", "a.id"]);
        assert_eq!(map.get("a.name"), Some(SortDirection::Desc));
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let mut map = SortMap::new();
        map.insert("a.name", SortDirection::Desc);
        map.insert_if_absent("a.name", SortDirection::Asc);
        assert_eq!(map.get("a.name"), Some(SortDirection::Desc));
    }
}

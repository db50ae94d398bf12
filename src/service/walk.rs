//! Shared traversal predicates for the join and sort composers.

/// Aliases compose by concatenation: `owner` + the relation's alias suffix.
/// The same declaration therefore always lands on the same alias, wherever
/// it appears in the join tree.
pub(crate) fn compose_alias(owner: &str, suffix: &str) -> String {
    format!("{owner}{suffix}")
}

/// True when an `only` restriction is set and does not name this relation.
/// The walk stops at the first non-matching relation; declarations after the
/// named one are never reached.
pub(crate) fn breaks_only(only: Option<&str>, name: &str) -> bool {
    matches!(only, Some(only) if only != name)
}

/// True when a parent relation points back at the entity that initiated the
/// current traversal step and must not be re-joined.
pub(crate) fn returns_to_origin(origin: Option<&str>, name: &str, alias_suffix: &str) -> bool {
    match origin {
        Some(origin) => name == origin || alias_suffix.ends_with(origin),
        None => false,
    }
}

/// Substitute the `$alias` placeholder in a declared fragment with the
/// composed runtime alias.
pub(crate) fn template_alias(fragment: &str, alias: &str) -> String {
    fragment.replace("$alias", alias)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_breaks_on_other_names() {
        assert!(!breaks_only(None, "tests"));
        assert!(!breaks_only(Some("tests"), "tests"));
        assert!(breaks_only(Some("other"), "tests"));
    }

    #[test]
    fn origin_matches_name_or_alias_suffix() {
        assert!(returns_to_origin(Some("test"), "test", "Test2"));
        assert!(returns_to_origin(Some("Test"), "owner", "SomeTest"));
        assert!(!returns_to_origin(Some("test"), "testB", "TestB"));
        assert!(!returns_to_origin(None, "test", "Test"));
    }

    #[test]
    fn templates_every_placeholder() {
        assert_eq!(
            template_alias("$alias.id > 0 AND $alias.kind = :kind", "testTest2"),
            "testTest2.id > 0 AND testTest2.kind = :kind"
        );
    }
}

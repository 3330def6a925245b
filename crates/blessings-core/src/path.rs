//! Resource paths.
//!
//! Paths are `/`-delimited segment lists such as `docs/1/title`. The empty
//! string is the root path. Paths never begin with `/`, never contain empty
//! segments, and never contain segments starting with `_` (those are
//! metadata keys in stored rule snapshots).
//!
//! Request-listener patterns additionally accept a trailing `*` segment:
//! `a/b/*` matches `a/b` and everything below it, `*` alone matches all.

use crate::error::{CoreError, Result};

/// The hierarchy delimiter.
pub const DELIMITER: char = '/';

/// The root path.
pub const ROOT: &str = "";

/// The wildcard segment used by request-listener patterns.
pub const WILDCARD: &str = "*";

/// Prefix marking metadata keys in stored snapshots.
pub const METADATA_PREFIX: char = '_';

/// Validate a permission path.
pub fn validate(path: &str) -> Result<()> {
    if path.is_empty() {
        return Ok(());
    }
    if path.starts_with(DELIMITER) {
        return Err(CoreError::invalid_path(path, "path can't start with /"));
    }
    for segment in path.split(DELIMITER) {
        validate_segment(path, segment)?;
    }
    Ok(())
}

/// Validate a request-listener pattern (a path, optionally ending in `*`).
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern == WILDCARD {
        return Ok(());
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) if !prefix.is_empty() => validate(prefix),
        Some(_) => Err(CoreError::invalid_path(pattern, "path can't start with /")),
        None => validate(pattern),
    }
}

fn validate_segment(path: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(CoreError::invalid_path(path, "empty path segment"));
    }
    if segment.starts_with(METADATA_PREFIX) {
        return Err(CoreError::invalid_path(path, "segment uses reserved '_' prefix"));
    }
    if segment == WILDCARD {
        return Err(CoreError::invalid_path(path, "wildcard is only valid in patterns"));
    }
    Ok(())
}

/// Iterate over the segments of a path. The root path has none.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(DELIMITER).filter(|s| !s.is_empty())
}

/// The parent of a path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    match path.rfind(DELIMITER) {
        Some(index) => Some(&path[..index]),
        None => Some(ROOT),
    }
}

/// Join a child segment onto a parent path.
pub fn join(parent: &str, segment: &str) -> String {
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}{}{}", parent, DELIMITER, segment)
    }
}

/// Iterate from `path` itself up through each ancestor to the root.
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |p| parent(p))
}

/// True if `ancestor` is `path` or one of its ancestors.
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    if ancestor.is_empty() || ancestor == path {
        return true;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path[ancestor.len()..].starts_with(DELIMITER)
}

/// Resolve the nearest ancestor of `path` (inclusive) for which `known`
/// returns true.
pub fn nearest_ancestor<'a>(path: &'a str, known: impl Fn(&str) -> bool) -> Option<&'a str> {
    ancestors(path).find(|p| known(p))
}

/// True if a listener `pattern` matches a request at `path`.
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    if pattern == WILDCARD || pattern == path {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => is_ancestor_or_self(prefix, path),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(validate("").is_ok());
        assert!(validate("docs/1").is_ok());
        assert!(validate("/docs").is_err());
        assert!(validate("docs//1").is_err());
        assert!(validate("docs/").is_err());
        assert!(validate("docs/_permissions").is_err());
        assert!(validate("docs/*").is_err());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("*").is_ok());
        assert!(validate_pattern("docs/*").is_ok());
        assert!(validate_pattern("docs/1").is_ok());
        assert!(validate_pattern("/*").is_err());
        assert!(validate_pattern("docs/*/1").is_err());
    }

    #[test]
    fn test_parent_and_ancestors() {
        assert_eq!(parent("a/b/c"), Some("a/b"));
        assert_eq!(parent("a"), Some(""));
        assert_eq!(parent(""), None);

        let chain: Vec<_> = ancestors("a/b/c").collect();
        assert_eq!(chain, vec!["a/b/c", "a/b", "a", ""]);
    }

    #[test]
    fn test_is_ancestor_or_self() {
        assert!(is_ancestor_or_self("", "a/b"));
        assert!(is_ancestor_or_self("a", "a/b"));
        assert!(is_ancestor_or_self("a/b", "a/b"));
        assert!(!is_ancestor_or_self("a/b", "a/bc"));
        assert!(!is_ancestor_or_self("a/b/c", "a/b"));
    }

    #[test]
    fn test_nearest_ancestor() {
        let known = ["", "a", "a/b"];
        let lookup = |p: &str| known.contains(&p);

        assert_eq!(nearest_ancestor("a/b/c", lookup), Some("a/b"));
        assert_eq!(nearest_ancestor("a/x", lookup), Some("a"));
        assert_eq!(nearest_ancestor("z", lookup), Some(""));
        assert_eq!(nearest_ancestor("z", |_| false), None);
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("*", "anything/here"));
        assert!(matches_pattern("a/b/*", "a/b"));
        assert!(matches_pattern("a/b/*", "a/b/c/d"));
        assert!(!matches_pattern("a/b/*", "a/bc"));
        assert!(!matches_pattern("a/b", "a/b/c"));

        for pattern in ["x/y/z", "x/y/z/*", "x/y/*", "x/*", "*"] {
            assert!(matches_pattern(pattern, "x/y/z"));
        }
    }
}

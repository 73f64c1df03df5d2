//! Segment-wise path matching for rule patterns.
//!
//! A pattern segment `*` matches exactly one path segment. Every other
//! segment must match literally, so patterns only ever match paths with the
//! same number of segments.

/// The wildcard segment.
pub const WILDCARD: &str = "*";

/// Number of `/`-separated segments. `""` and `"/"` have none.
pub fn count_segments(path: &str) -> usize {
    if path.is_empty() || path == "/" {
        return 0;
    }
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    trimmed.matches('/').count() + 1
}

/// Whether any segment of `path` is the wildcard.
pub fn has_wildcard(path: &str) -> bool {
    path.split('/').any(|segment| segment == WILDCARD)
}

/// Compare `path` against `pattern` segment by segment. A wildcard never
/// matches an empty segment.
pub fn segments_match(pattern: &str, path: &str) -> bool {
    if count_segments(pattern) != count_segments(path) {
        return false;
    }
    let pattern = pattern.strip_prefix('/').unwrap_or(pattern);
    let path = path.strip_prefix('/').unwrap_or(path);
    pattern
        .split('/')
        .zip(path.split('/'))
        .all(|(p, s)| (p == WILDCARD && !s.is_empty()) || p == s)
}

//! Path label cardinality control.

use tracing::debug;

/// Truncates `path` to its first `depth` segments.
///
/// A depth below 1 keeps the path as is. A missing leading `/` is added
/// before counting separators.
///
/// ```
/// use monitor_metrics::filter::truncate;
///
/// assert_eq!(truncate("/api/v1/users/123/orders/456", 3), "/api/v1/users");
/// assert_eq!(truncate("/a", 5), "/a");
/// ```
pub fn truncate(path: &str, depth: i64) -> String {
    if depth < 1 {
        return path.to_string();
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    // The (depth + 1)-th separator ends the kept prefix.
    let cut = path
        .match_indices('/')
        .map(|(index, _)| index)
        .nth(usize::try_from(depth).unwrap_or(usize::MAX));
    match cut {
        Some(index) => path[..index].to_string(),
        None => path,
    }
}

/// Returns true when the path, without `context_path`, starts with any exclusion.
pub fn is_excluded(path: &str, context_path: &str, exclusions: &[String]) -> bool {
    let remainder = path.strip_prefix(context_path).unwrap_or(path);
    match exclusions
        .iter()
        .find(|exclusion| remainder.starts_with(exclusion.as_str()))
    {
        Some(exclusion) => {
            debug!("Path '{}' excluded by '{}'", path, exclusion);
            true
        }
        None => false,
    }
}

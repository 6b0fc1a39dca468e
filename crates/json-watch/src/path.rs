use std::fmt;

/// One segment of a path from the tracked root to a nested location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl From<&str> for PathStep {
    fn from(key: &str) -> Self {
        PathStep::Key(key.to_owned())
    }
}

impl From<String> for PathStep {
    fn from(key: String) -> Self {
        PathStep::Key(key)
    }
}

impl From<usize> for PathStep {
    fn from(index: usize) -> Self {
        PathStep::Index(index)
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => f.write_str(key),
            PathStep::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Parses a dotted path string such as `"a.b.2.c"` into segments.
///
/// All-digit segments become [`PathStep::Index`], everything else becomes
/// [`PathStep::Key`]. Parsing is permissive: no structural validation is
/// performed, and a string that never matches a produced path simply never
/// receives deliveries. The empty string parses to the root (empty) path.
pub fn parse_dotted_path(path: &str) -> Vec<PathStep> {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('.')
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PathStep::Index(index),
            Err(_) => PathStep::Key(segment.to_owned()),
        })
        .collect()
}

/// Formats a segment path back into dotted notation.
pub fn format_path(path: &[PathStep]) -> String {
    let mut out = String::new();
    for (i, step) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        match step {
            PathStep::Key(key) => out.push_str(key),
            PathStep::Index(index) => out.push_str(&index.to_string()),
        }
    }
    out
}

/// Returns `true` when `path` starts with every segment of `prefix`.
///
/// Comparison is segment-wise, so `a.bc` is not under `a.b`.
pub fn has_prefix(path: &[PathStep], prefix: &[PathStep]) -> bool {
    path.len() >= prefix.len() && path.iter().zip(prefix).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keys_and_indices() {
        assert_eq!(
            parse_dotted_path("a.b.2.c"),
            vec![
                PathStep::Key("a".into()),
                PathStep::Key("b".into()),
                PathStep::Index(2),
                PathStep::Key("c".into()),
            ]
        );
    }

    #[test]
    fn parse_empty_is_root() {
        assert!(parse_dotted_path("").is_empty());
    }

    #[test]
    fn parse_is_permissive() {
        // Odd segments are accepted verbatim; they just never match.
        let parsed = parse_dotted_path("a..b");
        assert_eq!(parsed[1], PathStep::Key(String::new()));
    }

    #[test]
    fn format_round_trips_dotted_notation() {
        let path = parse_dotted_path("users.3.name");
        assert_eq!(format_path(&path), "users.3.name");
    }

    #[test]
    fn prefix_is_segment_wise() {
        let ab = parse_dotted_path("a.b");
        let abc = parse_dotted_path("a.b.c");
        let abc_sibling = parse_dotted_path("a.bc");
        assert!(has_prefix(&abc, &ab));
        assert!(has_prefix(&ab, &ab));
        assert!(!has_prefix(&abc_sibling, &ab));
        assert!(!has_prefix(&ab, &abc));
    }

    #[test]
    fn empty_prefix_matches_everything() {
        assert!(has_prefix(&parse_dotted_path("a.b"), &[]));
    }
}

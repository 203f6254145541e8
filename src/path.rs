//! URI path addressing
//!
//! Every tree lookup addresses nodes with slash-delimited URIs of the form
//! `type_id/instance_id/node/path`. A leading slash is optional and stripped.

/// Split a URI into its segments
///
/// `"Foo/Bar/Baz"` becomes `["Foo", "Bar", "Baz"]`. A single leading `/` is
/// ignored and a trailing `/` does not produce an empty last segment.
pub fn split_path(uri: &str) -> Vec<String> {
    let trimmed = strip_leading_slash(uri);
    if trimmed.is_empty() {
        return Vec::new();
    }
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    trimmed.split('/').map(String::from).collect()
}

/// Split a URI at its first separator into `(head, rest)`
///
/// `rest` is empty when the URI has a single segment.
pub fn split_first(uri: &str) -> (&str, &str) {
    let trimmed = strip_leading_slash(uri);
    match trimmed.split_once('/') {
        Some((head, rest)) => (head, rest),
        None => (trimmed, ""),
    }
}

/// Join segments back into a relative path
pub fn join_path<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join("/")
}

fn strip_leading_slash(uri: &str) -> &str {
    uri.strip_prefix('/').unwrap_or(uri)
}

//! Filesystem-safe label normalization.
//!
//! Subject and session labels show up both as directory names on the
//! processing side and as keys in analysis info maps, so they have to be
//! normalized here exactly the way the processing gear normalized them.

/// Replace every character that is not ASCII alphanumeric, `.`, `-`, or `_`
/// with an underscore.
pub fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

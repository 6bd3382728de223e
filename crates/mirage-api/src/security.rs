//! Filename sanitization and validation.

use unicode_normalization::UnicodeNormalization;

/// Longest filename accepted in a path segment.
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Reduce a client-supplied filename to a safe flat name.
///
/// The name is NFKD-decomposed so accented letters fold to their ASCII
/// base, remaining non-ASCII characters are dropped, path separators become spaces,
/// whitespace runs become a single `_`, anything outside `[A-Za-z0-9_.-]`
/// is removed, and leading/trailing `.` and `_` are stripped. The result
/// may be empty.
pub fn secure_filename(name: &str) -> String {
    let ascii: String = name
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    kept.trim_matches(|c| c == '.' || c == '_')
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .collect()
}

/// Whether a filename taken from a URL path is safe to join onto a storage
/// directory.
pub fn is_valid_filename(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_FILENAME_LENGTH
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

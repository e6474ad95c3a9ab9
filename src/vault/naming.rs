//! Note identifiers: timestamped, filesystem-safe file names.
//!
//! An identifier looks like `20240101_093000_[Meeting_Notes].md`. The
//! timestamp prefix keeps lexical order equal to chronological order.

use chrono::{DateTime, Local};

/// Extension used for every note in the vault
pub const NOTE_EXTENSION: &str = "md";

/// Maximum number of characters kept from a sanitized title
pub const MAX_TITLE_CHARS: usize = 50;

/// Characters that are not allowed in a note file name
const ILLEGAL_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|', ' '];

/// Make a title safe for use in a file name.
///
/// Illegal characters and spaces become `_`, and the result is cut to
/// [`MAX_TITLE_CHARS`] characters (not bytes, so multi-byte titles stay valid).
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Format the sortable timestamp prefix (`YYYYMMDD_HHMMSS`)
pub fn timestamp_prefix(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Compose an identifier from a timestamp prefix and a sanitized title.
///
/// `attempt` 0 and 1 give the plain form; higher attempts add a `_<n>`
/// suffix used when the plain name is already taken.
pub fn compose_identifier(prefix: &str, safe_title: &str, attempt: u32) -> String {
    if attempt <= 1 {
        format!("{}_[{}].{}", prefix, safe_title, NOTE_EXTENSION)
    } else {
        format!("{}_[{}]_{}.{}", prefix, safe_title, attempt, NOTE_EXTENSION)
    }
}

/// Identifier without its `.md` extension (the text used inside links)
pub fn stem(identifier: &str) -> &str {
    identifier
        .strip_suffix(".md")
        .filter(|s| !s.is_empty())
        .unwrap_or(identifier)
}

/// Whether a file name looks like a note managed by the vault
pub fn is_note_file(file_name: &str) -> bool {
    !file_name.starts_with('.')
        && file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext == NOTE_EXTENSION)
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize_title("Meeting Notes"), "Meeting_Notes");
        assert_eq!(sanitize_title(r#"a\b/c*d?e:f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_truncates_by_characters() {
        let long = "あ".repeat(80);
        let safe = sanitize_title(&long);
        assert_eq!(safe.chars().count(), MAX_TITLE_CHARS);

        let ascii = "x".repeat(51);
        assert_eq!(sanitize_title(&ascii).len(), 50);
    }

    #[test]
    fn test_identifier_format() {
        let at = Local.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let prefix = timestamp_prefix(at);
        assert_eq!(prefix, "20240102_030405");
        assert_eq!(
            compose_identifier(&prefix, "Meeting_Notes", 1),
            "20240102_030405_[Meeting_Notes].md"
        );
        assert_eq!(
            compose_identifier(&prefix, "Meeting_Notes", 2),
            "20240102_030405_[Meeting_Notes]_2.md"
        );
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("20240101_1[A].md"), "20240101_1[A]");
        assert_eq!(stem("20240101_1[A]"), "20240101_1[A]");
        assert_eq!(stem("20240101_1[v1.2].md"), "20240101_1[v1.2]");
        assert_eq!(stem("20240101_1[v1.2]"), "20240101_1[v1.2]");
        assert_eq!(stem("20240101_1[notes.txt]"), "20240101_1[notes.txt]");
    }

    #[test]
    fn test_is_note_file() {
        assert!(is_note_file("20240101_000000_[x].md"));
        assert!(!is_note_file(".voxnote.lock"));
        assert!(!is_note_file("image.png"));
        assert!(!is_note_file("README"));
    }
}

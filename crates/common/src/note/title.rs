// Title rules: first non-blank line, trimmed, at most 50 characters.

use crate::APP_NAME;

pub const MAX_TITLE_LEN: usize = 50;
pub const DEFAULT_NOTE_TITLE: &str = "Empty Note";

/// Truncate to at most [`MAX_TITLE_LEN`] characters.
pub fn truncate_title(title: &str) -> &str {
    match title.char_indices().nth(MAX_TITLE_LEN) {
        Some((byte_idx, _)) => &title[..byte_idx],
        None => title,
    }
}

/// Title of a note whose decoded text is `text`.
pub fn title_from_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| truncate_title(line).to_string())
        .unwrap_or_else(|| DEFAULT_NOTE_TITLE.to_string())
}

/// Text shown in a note window's title bar.
pub fn window_title(title: &str) -> String {
    format!("{APP_NAME}: {title}")
}

/// Compare a stored title with a lookup query. The query is truncated the
/// same way titles are.
pub fn titles_match(title: &str, query: &str, case_sensitive: bool) -> bool {
    let query = truncate_title(query);
    if case_sensitive {
        title == query
    } else {
        title.to_lowercase() == query.to_lowercase()
    }
}

// Note identity: ids, file names, URIs and titles.

pub mod title;
pub mod uri;

use std::fmt;
use std::path::Path;

use uuid::Uuid;

pub use uri::{NoteUri, UriError};

/// File suffix of every note file.
pub const NOTE_SUFFIX: &str = ".note";
/// Length of the textual form of a v4 UUID.
pub const NOTE_ID_LEN: usize = 36;
/// Length of a valid note file name (`<uuid>.note`).
pub const NOTE_FILENAME_LEN: usize = NOTE_ID_LEN + NOTE_SUFFIX.len();

/// Identifier of a note: the file stem of `<id>.note`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NoteId(String);

impl NoteId {
    /// A fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<id>.note`
    pub fn file_name(&self) -> String {
        format!("{}{NOTE_SUFFIX}", self.0)
    }

    /// Extract the id from a note file path. Only the suffix is checked.
    pub fn from_note_path(path: &Path) -> Result<Self, UriError> {
        let not_a_note = || UriError::NotANoteFile(path.to_path_buf());
        let file_name = path.file_name().and_then(|name| name.to_str()).ok_or_else(not_a_note)?;
        let stem = file_name.strip_suffix(NOTE_SUFFIX).ok_or_else(not_a_note)?;
        if stem.is_empty() {
            return Err(not_a_note());
        }
        Ok(Self(stem.to_string()))
    }

    pub(crate) fn from_segment(segment: &str) -> Self {
        Self(segment.to_string())
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Note URI codec: `note://kzrnote/<id>` ⇄ `<notes_dir>/<id>.note`.
//
// Pure mapping. Existence on disk is checked by callers.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use super::NoteId;
use crate::APP_NAME;

pub const URI_SCHEME: &str = "note";
pub const URI_AUTHORITY: &str = APP_NAME;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("malformed URI `{uri}`: {reason}")]
    Malformed { uri: String, reason: String },

    #[error("not a note://kzrnote/.. URI: `{0}`")]
    Foreign(String),

    #[error("invalid path in `{0}`")]
    InvalidPath(String),

    #[error("`{}` is not a note file name", .0.display())]
    NotANoteFile(PathBuf),
}

/// A validated note URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NoteUri {
    id: NoteId,
}

impl NoteUri {
    pub fn for_id(id: NoteId) -> Self {
        Self { id }
    }

    /// Parse and validate a URI string.
    ///
    /// The scheme must be `note`, the authority exactly `kzrnote` (no port or
    /// credentials) and the path a single non-empty segment.
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let parsed = Url::parse(uri)
            .map_err(|error| UriError::Malformed { uri: uri.to_string(), reason: error.to_string() })?;

        if parsed.scheme() != URI_SCHEME
            || parsed.host_str() != Some(URI_AUTHORITY)
            || parsed.port().is_some()
            || !parsed.username().is_empty()
            || parsed.password().is_some()
        {
            return Err(UriError::Foreign(uri.to_string()));
        }

        let path = parsed.path();
        if path.len() < 2 {
            return Err(UriError::InvalidPath(uri.to_string()));
        }
        let segment = &path[1..];
        if segment.is_empty() || segment.contains('/') {
            return Err(UriError::InvalidPath(uri.to_string()));
        }

        Ok(Self { id: NoteId::from_segment(segment) })
    }

    /// URI of the note stored at `path`.
    pub fn from_note_path(path: &Path) -> Result<Self, UriError> {
        NoteId::from_note_path(path).map(Self::for_id)
    }

    pub fn id(&self) -> &NoteId {
        &self.id
    }

    /// Backing file of this note under `notes_dir`.
    pub fn note_path(&self, notes_dir: &Path) -> PathBuf {
        notes_dir.join(self.id.file_name())
    }
}

impl fmt::Display for NoteUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{URI_SCHEME}://{URI_AUTHORITY}/{}", self.id)
    }
}

impl FromStr for NoteUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Encode a note file path as its URI string.
pub fn encode(path: &Path) -> Result<String, UriError> {
    NoteUri::from_note_path(path).map(|uri| uri.to_string())
}

/// Decode a URI string to the backing file path under `notes_dir`.
pub fn decode(uri: &str, notes_dir: &Path) -> Result<PathBuf, UriError> {
    NoteUri::parse(uri).map(|uri| uri.note_path(notes_dir))
}

// Filesystem note store: one `<uuid>.note` file per note under the notes
// directory; deletion moves the file into `attic/`.

pub mod encoding;
pub mod metadata;

use std::cmp::Reverse;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use kzrnote_common::note::{NoteId, NOTE_FILENAME_LEN, NOTE_SUFFIX};
use thiserror::Error;
use tracing::debug;

use self::encoding::{EncodingError, NoteEncoding};

/// Attempts at finding an unused id before giving up.
pub const MAX_CREATE_ATTEMPTS: usize = 1000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{}` is not a note", .0.display())]
    NotFound(PathBuf),

    #[error("no unused note id after {attempts} attempts")]
    ResourceExhausted { attempts: usize },

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("I/O error on `{}`: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}

#[derive(Debug, Clone)]
pub struct NoteStore {
    notes_dir: PathBuf,
    attic_dir: PathBuf,
    encoding: NoteEncoding,
}

impl NoteStore {
    pub fn new(notes_dir: impl Into<PathBuf>, attic_dir: impl Into<PathBuf>) -> Self {
        Self::with_encoding(notes_dir, attic_dir, NoteEncoding::from_locale())
    }

    pub fn with_encoding(
        notes_dir: impl Into<PathBuf>,
        attic_dir: impl Into<PathBuf>,
        encoding: NoteEncoding,
    ) -> Self {
        Self { notes_dir: notes_dir.into(), attic_dir: attic_dir.into(), encoding }
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }

    pub fn attic_dir(&self) -> &Path {
        &self.attic_dir
    }

    pub fn encoding(&self) -> NoteEncoding {
        self.encoding
    }

    /// Directly under the notes directory, `<36 chars>.note`. Pure.
    pub fn is_valid_note_filename(&self, path: &Path) -> bool {
        if path.parent() != Some(self.notes_dir.as_path()) {
            return false;
        }
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.len() == NOTE_FILENAME_LEN && name.ends_with(NOTE_SUFFIX))
    }

    /// Valid note file name and present on disk.
    pub fn is_note(&self, path: &Path) -> bool {
        self.is_valid_note_filename(path) && path.exists()
    }

    /// Every note in the notes directory. With `sort_by_recency` the most
    /// recently modified note comes first; otherwise directory order.
    pub fn list(&self, sort_by_recency: bool) -> Result<Vec<PathBuf>, StoreError> {
        let entries =
            fs::read_dir(&self.notes_dir).map_err(|error| StoreError::io(&self.notes_dir, error))?;

        let mut notes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| StoreError::io(&self.notes_dir, error))?;
            let path = entry.path();
            if self.is_valid_note_filename(&path) && entry.file_type().is_ok_and(|t| !t.is_dir()) {
                notes.push(path);
            }
        }

        if sort_by_recency {
            notes.sort_by_cached_key(|path| Reverse(modified_time(path)));
        }
        Ok(notes)
    }

    /// Create a note holding `initial` under a fresh random id.
    pub fn create(&self, initial: &str) -> Result<PathBuf, StoreError> {
        self.create_with_ids(initial, NoteId::generate)
    }

    /// Like [`create`](Self::create) with a caller-supplied id source.
    pub fn create_with_ids(
        &self,
        initial: &str,
        mut next_id: impl FnMut() -> NoteId,
    ) -> Result<PathBuf, StoreError> {
        let bytes = self.encoding.encode(initial)?;

        for _ in 0..MAX_CREATE_ATTEMPTS {
            let path = self.notes_dir.join(next_id().file_name());
            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(path = %path.display(), "note id collision, retrying");
                    continue;
                }
                Err(error) => return Err(StoreError::io(&path, error)),
            };
            file.write_all(&bytes).map_err(|error| StoreError::io(&path, error))?;
            debug!(path = %path.display(), "created note");
            return Ok(path);
        }

        Err(StoreError::ResourceExhausted { attempts: MAX_CREATE_ATTEMPTS })
    }

    pub fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        if !self.is_note(path) {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        fs::read(path).map_err(|error| match error.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::io(path, error),
        })
    }

    /// Decoded contents of a note.
    pub fn read(&self, path: &Path) -> Result<String, StoreError> {
        let bytes = self.read_bytes(path)?;
        Ok(self.encoding.decode(&bytes)?)
    }

    /// Replace the contents of an existing note. The new contents land
    /// through a sibling temp file and a rename.
    pub fn write(&self, path: &Path, text: &str) -> Result<(), StoreError> {
        if !self.is_note(path) {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let bytes = self.encoding.encode(text)?;
        write_atomic(path, &bytes).map_err(|error| StoreError::io(path, error))
    }

    /// Soft delete: move the note into the attic.
    pub fn delete(&self, path: &Path) -> Result<PathBuf, StoreError> {
        if !self.is_note(path) {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        fs::create_dir_all(&self.attic_dir)
            .map_err(|error| StoreError::io(&self.attic_dir, error))?;

        let file_name = path.file_name().ok_or_else(|| StoreError::NotFound(path.to_path_buf()))?;
        let target = self.attic_dir.join(file_name);
        fs::rename(path, &target).map_err(|error| StoreError::io(path, error))?;
        debug!(from = %path.display(), to = %target.display(), "moved note to attic");
        Ok(target)
    }

    /// Last modification, whole seconds since the epoch; `None` unless the
    /// path is a note.
    pub fn change_date(&self, path: &Path) -> Option<u32> {
        if !self.is_note(path) {
            return None;
        }
        let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
        let secs = modified.duration_since(UNIX_EPOCH).ok()?.as_secs();
        Some(u32::try_from(secs).unwrap_or(u32::MAX))
    }
}

fn modified_time(path: &Path) -> SystemTime {
    fs::metadata(path).and_then(|meta| meta.modified()).unwrap_or(UNIX_EPOCH)
}

/// Write `bytes` to `path` via `.<name>.tmp` in the same directory and a
/// rename, so readers see the old or the new contents, never a mix.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_data()?;
        drop(file);
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

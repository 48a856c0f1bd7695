// In-memory title cache: note path -> display title.
//
// Populated lazily, dropped on content changes, rebuilt every start.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kzrnote_common::note::title::{title_from_text, titles_match};
use tracing::{debug, warn};

use crate::events::{EventQueue, NoteEvent};
use crate::store::{NoteStore, StoreError};

#[derive(Debug, Default)]
pub struct TitleCache {
    titles: HashMap<PathBuf, String>,
    /// Set whenever a title is computed or dropped; cleared once the title
    /// list file has been rewritten.
    list_stale: bool,
}

impl TitleCache {
    /// Title of the note at `path`, computing and announcing it on a miss.
    /// `None` when the path is not a note. Text that does not decode in the
    /// note encoding titles like an empty note.
    pub fn title_for(
        &mut self,
        store: &NoteStore,
        path: &Path,
        events: &mut EventQueue,
    ) -> Option<String> {
        if let Some(title) = self.titles.get(path) {
            return Some(title.clone());
        }

        let text = match store.read(path) {
            Ok(text) => text,
            Err(StoreError::Encoding(error)) => {
                debug!(path = %path.display(), %error, "undecodable note, titled as empty");
                String::new()
            }
            Err(error) => {
                debug!(path = %path.display(), %error, "no title for note");
                return None;
            }
        };
        let title = title_from_text(&text);
        self.titles.insert(path.to_path_buf(), title.clone());
        self.list_stale = true;
        events.push(NoteEvent::TitleUpdated { path: path.to_path_buf(), title: title.clone() });
        Some(title)
    }

    pub fn cached(&self, path: &Path) -> Option<&str> {
        self.titles.get(path).map(String::as_str)
    }

    /// Forget the title of `path`; the next lookup recomputes it.
    pub fn invalidate(&mut self, path: &Path) {
        if self.titles.remove(path).is_some() {
            self.list_stale = true;
        }
    }

    /// Drop a note that no longer exists.
    pub fn remove(&mut self, path: &Path) {
        self.titles.remove(path);
        self.list_stale = true;
    }

    /// First note whose title equals `query` (truncated like titles are).
    /// Which note wins among several with the same title is unspecified.
    pub fn lookup_by_title(
        &mut self,
        store: &NoteStore,
        query: &str,
        case_sensitive: bool,
        events: &mut EventQueue,
    ) -> Option<PathBuf> {
        let notes = match store.list(false) {
            Ok(notes) => notes,
            Err(error) => {
                warn!(%error, "failed to list notes for title lookup");
                return None;
            }
        };
        notes.into_iter().find(|path| {
            self.title_for(store, path, events)
                .is_some_and(|title| titles_match(&title, query, case_sensitive))
        })
    }

    /// Titles of every note, in directory order.
    pub fn all_titles(&mut self, store: &NoteStore, events: &mut EventQueue) -> Vec<String> {
        let notes = match store.list(false) {
            Ok(notes) => notes,
            Err(error) => {
                warn!(%error, "failed to list notes for title list");
                return Vec::new();
            }
        };
        notes.iter().filter_map(|path| self.title_for(store, path, events)).collect()
    }

    pub fn list_stale(&self) -> bool {
        self.list_stale
    }

    pub fn mark_list_written(&mut self) {
        self.list_stale = false;
    }
}

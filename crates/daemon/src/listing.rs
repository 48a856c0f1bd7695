// Most-recent-first list of note paths backing the shell's note list.

use std::path::{Path, PathBuf};

#[derive(Debug, Default, Clone)]
pub struct NoteList {
    entries: Vec<PathBuf>,
}

impl NoteList {
    /// From paths already ordered newest first.
    pub fn from_recent(entries: Vec<PathBuf>) -> Self {
        Self { entries }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry == path)
    }

    /// Add a new note at the top. Returns false if it was already listed.
    pub fn insert_top(&mut self, path: &Path) -> bool {
        if self.contains(path) {
            return false;
        }
        self.entries.insert(0, path.to_path_buf());
        true
    }

    /// Move a changed note to the top, inserting it if absent.
    pub fn move_top(&mut self, path: &Path) {
        self.remove(path);
        self.entries.insert(0, path.to_path_buf());
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry != path);
        self.entries.len() != before
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn list(names: &[&str]) -> NoteList {
        NoteList::from_recent(names.iter().map(PathBuf::from).collect())
    }

    #[test]
    fn insert_puts_new_note_first() {
        let mut notes = list(&["/n/b", "/n/c"]);
        assert!(notes.insert_top(Path::new("/n/a")));
        assert!(!notes.insert_top(Path::new("/n/c")));
        assert_eq!(notes.paths(), list(&["/n/a", "/n/b", "/n/c"]).paths());
    }

    #[test]
    fn move_top_repositions_without_duplicates() {
        let mut notes = list(&["/n/a", "/n/b", "/n/c"]);
        notes.move_top(Path::new("/n/c"));
        assert_eq!(notes.paths(), list(&["/n/c", "/n/a", "/n/b"]).paths());
        assert_eq!(notes.len(), 3);
    }

    #[test]
    fn remove_reports_presence() {
        let mut notes = list(&["/n/a"]);
        assert!(notes.remove(Path::new("/n/a")));
        assert!(!notes.remove(Path::new("/n/a")));
        assert_eq!(notes.len(), 0);
    }

    proptest! {
        #[test]
        fn operations_never_duplicate_entries(ops in prop::collection::vec((0u8..3, 0u8..6), 0..40)) {
            let mut notes = NoteList::default();
            for (op, n) in ops {
                let path = PathBuf::from(format!("/n/{n}"));
                match op {
                    0 => { notes.insert_top(&path); }
                    1 => notes.move_top(&path),
                    _ => { notes.remove(&path); }
                }
                match op {
                    0 => prop_assert!(notes.contains(&path)),
                    1 => prop_assert_eq!(&notes.paths()[0], &path),
                    _ => prop_assert!(!notes.contains(&path)),
                }
            }
            let mut seen = notes.paths().to_vec();
            seen.sort();
            seen.dedup();
            prop_assert_eq!(seen.len(), notes.len());
        }
    }
}

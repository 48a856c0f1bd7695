// Notes directory watcher: inotify/fsevents -> note file events.
//
// Only direct children named like notes are reported. Temp files, the attic
// and anything else in the directory are filtered out here.

pub mod debounce;
pub mod pipeline;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kzrnote_common::note::{NOTE_FILENAME_LEN, NOTE_SUFFIX};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Create,
    Modify,
    Remove,
}

/// A filesystem event for one note file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

const EVENT_CHANNEL_CAPACITY: usize = 512;

/// Watches the notes directory (non-recursively) until dropped.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    notes_dir: PathBuf,
}

impl FileWatcher {
    /// Start watching `notes_dir`. Reported paths are `notes_dir` joined
    /// with the file name, whatever form the backend reports them in.
    pub fn start(notes_dir: &Path) -> Result<(Self, mpsc::Receiver<RawFsEvent>)> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let dir = notes_dir.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for raw in translate_event(&event, &dir) {
                    if tx.blocking_send(raw).is_err() {
                        debug!("event channel closed, stopping event dispatch");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "file watcher error");
            }
        })
        .context("failed to create file watcher")?;

        watcher
            .watch(notes_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch directory: {}", notes_dir.display()))?;

        debug!(path = %notes_dir.display(), "file watcher started");
        Ok((Self { _watcher: watcher, notes_dir: notes_dir.to_path_buf() }, rx))
    }

    pub fn notes_dir(&self) -> &Path {
        &self.notes_dir
    }
}

/// `<36 chars>.note`
fn is_note_file_name(name: &str) -> bool {
    name.len() == NOTE_FILENAME_LEN && name.ends_with(NOTE_SUFFIX)
}

fn translate_event(event: &Event, notes_dir: &Path) -> Vec<RawFsEvent> {
    use notify::event::{ModifyKind, RenameMode};

    let kind = match &event.kind {
        EventKind::Create(_) => FsEventKind::Create,
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            trace!("skipping metadata-only modify event");
            return Vec::new();
        }
        // Renamed away (e.g. into the attic).
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => FsEventKind::Remove,
        EventKind::Modify(_) => FsEventKind::Modify,
        EventKind::Remove(_) => FsEventKind::Remove,
        _ => {
            trace!(kind = ?event.kind, "skipping non-content event");
            return Vec::new();
        }
    };

    // `RenameMode::Both` carries [from, to]; whether each side still exists
    // is settled when the event is reconciled against the disk.
    event
        .paths
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .filter(|name| is_note_file_name(name))
        .map(|name| RawFsEvent { kind, path: notes_dir.join(name) })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    const ID: &str = "0b7f4f36-6a4f-4d3c-9a53-1f1d1b1c1d1e";

    fn make_event(kind: EventKind, paths: Vec<PathBuf>) -> Event {
        Event { kind, paths, attrs: Default::default() }
    }

    fn note(dir: &str) -> PathBuf {
        Path::new(dir).join(format!("{ID}.note"))
    }

    #[test]
    fn create_of_note_file() {
        let event = make_event(EventKind::Create(CreateKind::File), vec![note("/notes")]);
        let result = translate_event(&event, Path::new("/notes"));
        assert_eq!(result, vec![RawFsEvent { kind: FsEventKind::Create, path: note("/notes") }]);
    }

    #[test]
    fn paths_are_rebased_on_notes_dir() {
        let event = make_event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            vec![note("/private/var/notes")],
        );
        let result = translate_event(&event, Path::new("/var/notes"));
        assert_eq!(result[0].path, note("/var/notes"));
        assert_eq!(result[0].kind, FsEventKind::Modify);
    }

    #[test]
    fn remove_and_rename_away() {
        let removed = make_event(EventKind::Remove(RemoveKind::File), vec![note("/notes")]);
        assert_eq!(translate_event(&removed, Path::new("/notes"))[0].kind, FsEventKind::Remove);

        let renamed =
            make_event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), vec![note("/notes")]);
        assert_eq!(translate_event(&renamed, Path::new("/notes"))[0].kind, FsEventKind::Remove);
    }

    #[test]
    fn atomic_save_rename_reports_target() {
        let event = make_event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![PathBuf::from(format!("/notes/.{ID}.note.tmp")), note("/notes")],
        );
        let result = translate_event(&event, Path::new("/notes"));
        assert_eq!(result, vec![RawFsEvent { kind: FsEventKind::Modify, path: note("/notes") }]);
    }

    #[test]
    fn interrupted_save_temp_file_is_invisible() {
        let tmp = TempDir::new().unwrap();
        let leftover = tmp.path().join(format!(".{ID}.note.tmp"));
        fs::write(&leftover, "trunc").unwrap();

        for kind in [
            EventKind::Create(CreateKind::File),
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            EventKind::Remove(RemoveKind::File),
        ] {
            let event = make_event(kind, vec![leftover.clone()]);
            assert!(translate_event(&event, tmp.path()).is_empty(), "{:?} leaked", event.kind);
        }
    }

    #[test]
    fn foreign_files_are_filtered() {
        let event = make_event(
            EventKind::Create(CreateKind::File),
            vec![
                PathBuf::from("/notes/README"),
                PathBuf::from("/notes/short.note"),
                PathBuf::from(format!("/notes/{ID}.note~")),
            ],
        );
        assert!(translate_event(&event, Path::new("/notes")).is_empty());
    }

    #[test]
    fn metadata_changes_are_skipped() {
        let event = make_event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            vec![note("/notes")],
        );
        assert!(translate_event(&event, Path::new("/notes")).is_empty());
    }

    #[tokio::test]
    async fn watcher_reports_new_note() {
        let tmp = TempDir::new().unwrap();
        let (watcher, mut rx) = FileWatcher::start(tmp.path()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(tmp.path().join("ignored.txt"), "x").unwrap();
        let path = tmp.path().join(format!("{ID}.note"));
        fs::write(&path, "Hello").unwrap();

        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for note event")
            .expect("channel closed");
        assert_eq!(event.path, path);
        assert!(matches!(event.kind, FsEventKind::Create | FsEventKind::Modify));

        drop(watcher);
    }

    #[tokio::test]
    async fn watcher_ignores_subdirectories() {
        let tmp = TempDir::new().unwrap();
        let attic = tmp.path().join("attic");
        fs::create_dir_all(&attic).unwrap();
        let (watcher, mut rx) = FileWatcher::start(tmp.path()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(attic.join(format!("{ID}.note")), "old").unwrap();
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());

        drop(watcher);
    }

    #[test]
    fn watcher_rejects_missing_dir() {
        assert!(FileWatcher::start(Path::new("/nonexistent/path/kzrnote-notes")).is_err());
    }
}

// Note events. Everything that happens to a note is queued here and handled
// at a single dispatch point in the event loop.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteEvent {
    NoteCreated { path: PathBuf },
    /// `user_initiated` is false when the file vanished behind our back.
    NoteDeleted { path: PathBuf, user_initiated: bool },
    TitleUpdated { path: PathBuf, title: String },
    ContentsChanged { path: PathBuf },
    NoteOpened { path: PathBuf },
}

impl NoteEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::NoteCreated { path }
            | Self::NoteDeleted { path, .. }
            | Self::TitleUpdated { path, .. }
            | Self::ContentsChanged { path }
            | Self::NoteOpened { path } => path,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::NoteCreated { .. } => "note-created",
            Self::NoteDeleted { .. } => "note-deleted",
            Self::TitleUpdated { .. } => "title-updated",
            Self::ContentsChanged { .. } => "contents-changed",
            Self::NoteOpened { .. } => "note-opened",
        }
    }
}

/// FIFO of events raised while handling one input.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: VecDeque<NoteEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: NoteEvent) {
        self.pending.push_back(event);
    }

    pub fn pop(&mut self) -> Option<NoteEvent> {
        self.pending.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

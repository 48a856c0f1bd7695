// Editor process pool: bookkeeping for editor children and their windows.
//
// A slot goes Spawning -> Ready -> Claimed -> Closing -> Exited. Preloaded
// slots are keyed by their server id until claimed; claimed slots are keyed
// by the note path they edit. Process I/O lives in `launcher`; this module
// never blocks and never touches a process.

pub mod launcher;

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::shell::WindowId;

pub type SlotId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Started, readiness not yet confirmed.
    Spawning,
    /// Idle in the preload pool.
    Ready,
    /// Bound to a note path.
    Claimed,
    /// Asked to terminate; the window stays until the child exits or a
    /// second close request arrives.
    Closing,
    Exited,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub id: SlotId,
    pub server_id: String,
    pub state: SlotState,
    pub path: Option<PathBuf>,
    /// `None` once the window is destroyed.
    pub window: Option<WindowId>,
    pub pid: Option<u32>,
}

/// What to do with a slot the user asked to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Ask the child to terminate, keep the window.
    Terminate,
    /// Destroy the window and kill whatever is left of the child.
    Destroy,
}

#[derive(Debug, Default)]
pub struct EditorPool {
    next_id: SlotId,
    slots: HashMap<SlotId, Slot>,
    ready: VecDeque<SlotId>,
    open: HashMap<PathBuf, SlotId>,
    by_server: HashMap<String, SlotId>,
}

impl EditorPool {
    fn insert(&mut self, server_id: &str, state: SlotState, window: WindowId) -> SlotId {
        self.next_id += 1;
        let id = self.next_id;
        self.slots.insert(
            id,
            Slot {
                id,
                server_id: server_id.to_string(),
                state,
                path: None,
                window: Some(window),
                pid: None,
            },
        );
        id
    }

    /// A hidden editor was started for the preload pool. It is not
    /// claimable until [`mark_ready`](Self::mark_ready).
    pub fn register_preload(&mut self, server_id: &str, window: WindowId) -> SlotId {
        let id = self.insert(server_id, SlotState::Spawning, window);
        self.by_server.insert(server_id.to_string(), id);
        debug!(slot = id, server_id, "preload slot spawning");
        id
    }

    /// An editor was started directly on `path`.
    pub fn register_bound(&mut self, server_id: &str, path: &Path, window: WindowId) -> SlotId {
        let id = self.insert(server_id, SlotState::Claimed, window);
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.path = Some(path.to_path_buf());
        }
        self.open.insert(path.to_path_buf(), id);
        debug!(slot = id, server_id, path = %path.display(), "editor spawned on note");
        id
    }

    pub fn set_pid(&mut self, slot: SlotId, pid: Option<u32>) {
        if let Some(slot) = self.slots.get_mut(&slot) {
            slot.pid = pid;
        }
    }

    /// Second phase of preload registration. Returns the slot when it moved
    /// from Spawning to Ready.
    pub fn mark_ready(&mut self, server_id: &str) -> Option<SlotId> {
        let id = *self.by_server.get(server_id)?;
        let slot = self.slots.get_mut(&id)?;
        if slot.state != SlotState::Spawning {
            return None;
        }
        slot.state = SlotState::Ready;
        self.ready.push_back(id);
        debug!(slot = id, server_id, "preload slot ready");
        Some(id)
    }

    /// Take a ready slot out of the pool and bind it to `path`. A slot is
    /// claimed at most once.
    pub fn claim(&mut self, path: &Path) -> Option<SlotId> {
        while let Some(id) = self.ready.pop_front() {
            let Some(slot) = self.slots.get_mut(&id) else {
                continue;
            };
            if slot.state != SlotState::Ready {
                continue;
            }
            slot.state = SlotState::Claimed;
            slot.path = Some(path.to_path_buf());
            self.by_server.remove(&slot.server_id);
            self.open.insert(path.to_path_buf(), id);
            debug!(slot = id, path = %path.display(), "claimed preloaded editor");
            return Some(id);
        }
        None
    }

    /// Advance a slot through the two-phase close.
    pub fn request_close(&mut self, id: SlotId) -> Option<CloseAction> {
        let slot = self.slots.get_mut(&id)?;
        let action = match slot.state {
            SlotState::Spawning | SlotState::Ready | SlotState::Claimed => {
                slot.state = SlotState::Closing;
                self.ready.retain(|ready| *ready != id);
                CloseAction::Terminate
            }
            SlotState::Closing | SlotState::Exited => CloseAction::Destroy,
        };
        Some(action)
    }

    /// A preload whose readiness never arrived. Moves it to Closing so it
    /// stops counting toward the pool; the child exit retires it.
    pub fn abandon_spawning(&mut self, server_id: &str) -> Option<&Slot> {
        let id = *self.by_server.get(server_id)?;
        let slot = self.slots.get_mut(&id)?;
        if slot.state != SlotState::Spawning {
            return None;
        }
        slot.state = SlotState::Closing;
        debug!(slot = id, server_id, "preload slot abandoned");
        self.slots.get(&id)
    }

    /// Close without the graceful phase (e.g. the note was deleted).
    pub fn force_close(&mut self, id: SlotId) -> Option<&Slot> {
        let slot = self.slots.get_mut(&id)?;
        slot.state = SlotState::Closing;
        self.ready.retain(|ready| *ready != id);
        self.slots.get(&id)
    }

    /// The window of a slot was destroyed.
    pub fn forget_window(&mut self, id: SlotId) -> Option<WindowId> {
        self.slots.get_mut(&id).and_then(|slot| slot.window.take())
    }

    /// Reconcile a child exit. Returns the removed slot; `None` (logged) if
    /// no table knew the slot.
    pub fn on_exit(&mut self, id: SlotId) -> Option<Slot> {
        let Some(mut slot) = self.slots.remove(&id) else {
            warn!(slot = id, "editor exited but no slot is registered for it");
            return None;
        };
        slot.state = SlotState::Exited;
        self.ready.retain(|ready| *ready != id);
        if self.by_server.get(&slot.server_id) == Some(&id) {
            self.by_server.remove(&slot.server_id);
        }
        if let Some(path) = &slot.path {
            if self.open.get(path) == Some(&id) {
                self.open.remove(path);
            }
        }
        debug!(slot = id, server_id = %slot.server_id, "editor slot removed");
        Some(slot)
    }

    /// Remove every slot (shutdown).
    pub fn drain(&mut self) -> Vec<Slot> {
        self.ready.clear();
        self.open.clear();
        self.by_server.clear();
        let mut slots: Vec<Slot> = self.slots.drain().map(|(_, slot)| slot).collect();
        slots.sort_by_key(|slot| slot.id);
        slots
    }

    pub fn get(&self, id: SlotId) -> Option<&Slot> {
        self.slots.get(&id)
    }

    pub fn slot_for_path(&self, path: &Path) -> Option<&Slot> {
        self.open.get(path).and_then(|id| self.slots.get(id))
    }

    pub fn slot_for_window(&self, window: WindowId) -> Option<&Slot> {
        self.slots.values().find(|slot| slot.window == Some(window))
    }

    /// Slots that are or will become claimable.
    pub fn preloaded_count(&self) -> usize {
        self.slots
            .values()
            .filter(|slot| matches!(slot.state, SlotState::Spawning | SlotState::Ready))
            .count()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn open_paths(&self) -> impl Iterator<Item = &Path> {
        self.open.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

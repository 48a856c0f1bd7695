// Editor windows: display, preloading, closing and child exits.
//
// Processes are started here but never waited on inline. Each child gets a
// watcher task that reports its exit back to the loop, and readiness of a
// preloaded editor is polled from a separate task.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use kzrnote_common::note::title::{window_title, DEFAULT_NOTE_TITLE};
use kzrnote_common::note::uri;
use tokio::process::Child;
use tracing::{debug, info, warn};

use super::{App, LoopEvent};
use crate::editor::launcher::{new_server_id, send_signal, server_listed, spawn_child, Signal};
use crate::editor::{CloseAction, SlotId, SlotState};
use crate::events::NoteEvent;
use crate::shell::{ShellEvent, WindowId};

impl App {
    /// Show the editor for a note, reusing an open window, a preloaded
    /// editor, or starting a new one. False when `path` is not a note.
    /// Before startup finishes the request is queued.
    pub fn display_note(&mut self, path: &Path, timestamp: u32) -> bool {
        if !self.store.is_note(path) {
            return false;
        }
        if !self.ready {
            debug!(path = %path.display(), "display deferred until startup finishes");
            self.deferred.push((path.to_path_buf(), timestamp));
            return true;
        }
        self.show_note(path, timestamp);
        true
    }

    pub(super) fn show_note(&mut self, path: &Path, timestamp: u32) {
        if let Some(window) = self.pool.slot_for_path(path).and_then(|slot| slot.window) {
            self.present_note(window, path, timestamp);
            return;
        }

        let title = self
            .titles
            .title_for(&self.store, path, &mut self.events)
            .unwrap_or_else(|| DEFAULT_NOTE_TITLE.to_string());

        if let Some(slot) = self.pool.claim(path) {
            let Some((server_id, window)) =
                self.pool.get(slot).map(|slot| (slot.server_id.clone(), slot.window))
            else {
                return;
            };
            self.remote_open(slot, &server_id, path);
            if let Some(window) = window {
                self.host.set_title(window, &window_title(&title));
                self.present_note(window, path, timestamp);
            }
            self.schedule_preload(self.settings.preload.replenish_delay());
            return;
        }

        self.cold_spawn(path, &title, timestamp);
    }

    fn cold_spawn(&mut self, path: &Path, title: &str, timestamp: u32) {
        if let Err(error) = self.launcher.prepare() {
            warn!(%error, "failed to write editor runtime files");
        }
        let window = self.host.create_window();
        self.host.set_title(window, &window_title(title));

        let server_id = new_server_id();
        let command =
            self.launcher.spawn_command(&server_id, self.host.embed_socket(window), Some(path));
        let child = match spawn_child(command) {
            Ok(child) => child,
            Err(error) => {
                warn!(%error, path = %path.display(), "failed to start editor");
                self.host.destroy(window);
                return;
            }
        };

        let slot = self.pool.register_bound(&server_id, path, window);
        self.pool.set_pid(slot, child.id());
        self.watch_child(slot, child);
        self.present_note(window, path, timestamp);
    }

    /// Restore recorded geometry, show the window, announce the note.
    fn present_note(&mut self, window: WindowId, path: &Path, timestamp: u32) {
        if let Some(geometry) =
            uri::encode(path).ok().and_then(|uri| self.metadata.geometry_for(&uri))
        {
            self.host.apply_geometry(window, geometry);
        }
        self.host.present(window, timestamp);
        self.events.push(NoteEvent::NoteOpened { path: path.to_path_buf() });
    }

    fn remote_open(&self, slot: SlotId, server_id: &str, path: &Path) {
        let command = self.launcher.remote_open_command(server_id, path);
        match spawn_child(command) {
            Ok(mut child) => {
                let loop_tx = self.loop_tx.clone();
                tokio::spawn(async move {
                    let status = child.wait().await.ok().and_then(|status| status.code());
                    let _ = loop_tx.send(LoopEvent::RemoteOpenExited { slot, status });
                });
            }
            Err(error) => warn!(%error, slot, "failed to start remote open"),
        }
    }

    // ── Preloading ─────────────────────────────────────────────────

    /// Top the preload pool up to the configured size.
    pub(super) fn replenish(&mut self) {
        while self.pool.preloaded_count() < self.settings.preload.slots {
            if !self.preload_one() {
                break;
            }
        }
    }

    /// Start one hidden editor. It joins the pool once it reports ready.
    fn preload_one(&mut self) -> bool {
        if let Err(error) = self.launcher.prepare() {
            warn!(%error, "failed to write editor runtime files");
        }
        let window = self.host.create_window();
        let server_id = new_server_id();
        let command = self.launcher.spawn_command(&server_id, self.host.embed_socket(window), None);
        let child = match spawn_child(command) {
            Ok(child) => child,
            Err(error) => {
                warn!(%error, "failed to preload editor");
                self.host.destroy(window);
                return false;
            }
        };

        let slot = self.pool.register_preload(&server_id, window);
        self.pool.set_pid(slot, child.id());
        self.watch_child(slot, child);
        self.watch_readiness(server_id);
        true
    }

    fn schedule_preload(&self, delay: Duration) {
        let loop_tx = self.loop_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = loop_tx.send(LoopEvent::PreloadTick);
        });
    }

    /// Poll the editor server list until `server_id` appears.
    fn watch_readiness(&self, server_id: String) {
        let launcher = self.launcher.clone();
        let loop_tx = self.loop_tx.clone();
        let poll = self.settings.preload.readiness_poll();
        let attempts = self.settings.preload.readiness_attempts;
        tokio::spawn(async move {
            for _ in 0..attempts {
                tokio::time::sleep(poll).await;
                let mut command = launcher.server_list_command();
                command.stdin(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);
                let listing = match command.output().await {
                    Ok(output) => output.stdout,
                    Err(error) => {
                        warn!(%error, server_id, "failed to list editor servers");
                        let _ = loop_tx.send(LoopEvent::SlotFailed { server_id });
                        return;
                    }
                };
                if server_listed(&String::from_utf8_lossy(&listing), &server_id) {
                    let _ = loop_tx.send(LoopEvent::SlotAttached { server_id });
                    return;
                }
            }
            warn!(server_id, attempts, "preloaded editor never became ready");
            let _ = loop_tx.send(LoopEvent::SlotFailed { server_id });
        });
    }

    /// Give up on a preload: kill it, drop its window, and try again after
    /// the replenish delay. The slot itself is retired by its exit.
    pub(super) fn on_slot_failed(&mut self, server_id: &str) {
        let Some((slot, pid)) = self.pool.abandon_spawning(server_id).map(|slot| (slot.id, slot.pid))
        else {
            debug!(server_id, "failure for an unknown or settled slot");
            return;
        };
        if let Some(window) = self.pool.forget_window(slot) {
            self.host.destroy(window);
        }
        // Never attached, so there is nothing unsaved to lose.
        if let Some(pid) = pid {
            send_signal(pid, Signal::Kill);
        }
        self.schedule_preload(self.settings.preload.replenish_delay());
    }

    fn watch_child(&self, slot: SlotId, mut child: Child) {
        let loop_tx = self.loop_tx.clone();
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => status.code(),
                Err(error) => {
                    warn!(%error, slot, "failed to wait for editor");
                    None
                }
            };
            let _ = loop_tx.send(LoopEvent::EditorExited { slot, status });
        });
    }

    // ── Closing ────────────────────────────────────────────────────

    pub(super) fn on_shell_event(&mut self, event: ShellEvent) {
        match event {
            ShellEvent::Configured { window, geometry } => {
                let Some(path) = self.pool.slot_for_window(window).and_then(|slot| slot.path.clone())
                else {
                    return;
                };
                if let Ok(uri) = uri::encode(&path) {
                    self.metadata.record_geometry(&uri, geometry);
                }
            }
            ShellEvent::CloseRequested { window } => self.close_window(window),
            ShellEvent::EmbedAttached { window } => {
                let Some(slot) = self.pool.slot_for_window(window) else {
                    return;
                };
                if slot.state == SlotState::Spawning {
                    let server_id = slot.server_id.clone();
                    self.pool.mark_ready(&server_id);
                }
            }
        }
    }

    /// First request: terminate the editor, keep the window. Second request
    /// (or an editor already gone): destroy the window.
    fn close_window(&mut self, window: WindowId) {
        let Some((slot, pid)) = self.pool.slot_for_window(window).map(|slot| (slot.id, slot.pid))
        else {
            self.host.destroy(window);
            return;
        };
        match self.pool.request_close(slot) {
            Some(CloseAction::Terminate) => {
                debug!(slot, window, "asking editor to terminate");
                if let Some(pid) = pid {
                    send_signal(pid, Signal::Terminate);
                }
            }
            Some(CloseAction::Destroy) => {
                debug!(slot, window, "destroying editor window");
                self.host.destroy(window);
                self.pool.forget_window(slot);
                if let Some(pid) = pid {
                    send_signal(pid, Signal::Kill);
                }
            }
            None => {}
        }
    }

    /// The user deleted a note that may be open: close its window now.
    pub(super) fn close_deleted_note(&mut self, path: &Path) {
        let Some(slot) = self.pool.slot_for_path(path).map(|slot| slot.id) else {
            return;
        };
        let pid = self.pool.force_close(slot).and_then(|slot| slot.pid);
        if let Some(window) = self.pool.forget_window(slot) {
            self.host.destroy(window);
        }
        if let Some(pid) = pid {
            send_signal(pid, Signal::Kill);
        }
    }

    pub(super) fn on_editor_exit(&mut self, slot: SlotId, status: Option<i32>) {
        let Some(slot) = self.pool.on_exit(slot) else {
            return;
        };
        info!(slot = slot.id, server_id = %slot.server_id, ?status, "editor exited");
        if let Some(window) = slot.window {
            self.host.destroy(window);
        }
    }

    /// Terminate every editor and destroy its window.
    pub(crate) fn close_all_editors(&mut self) {
        for slot in self.pool.drain() {
            debug!(slot = slot.id, "closing editor");
            if let Some(pid) = slot.pid {
                send_signal(pid, Signal::Terminate);
            }
            if let Some(window) = slot.window {
                self.host.destroy(window);
            }
        }
    }
}

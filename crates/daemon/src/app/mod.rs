// Coordinator state and its event loop.
//
// Everything mutable lives in `App` and is touched only from the loop task.
// Inputs (RPC calls, watcher events, child exits, toolkit events, timers)
// arrive as `LoopEvent`s; each is handled to completion, then the note
// events it raised are dispatched in order.

mod editors;

use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kzrnote_common::note::title::window_title;
use kzrnote_common::note::uri::{self, UriError};
use kzrnote_common::protocol::jsonrpc::{Request, Response};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cmdline::{self, Parsed};
use crate::config::Settings;
use crate::editor::launcher::EditorLauncher;
use crate::editor::{EditorPool, SlotId};
use crate::events::{EventQueue, NoteEvent};
use crate::listing::NoteList;
use crate::paths::AppPaths;
use crate::shell::{ShellEvent, WindowHost};
use crate::store::metadata::MetadataStore;
use crate::store::{write_atomic, NoteStore, StoreError};
use crate::titles::TitleCache;
use crate::watcher::RawFsEvent;

const EVENT_BROADCAST_CAPACITY: usize = 256;

const NEW_NOTE_TEMPLATE: &str = "Note ";

const WELCOME_NOTE: &str = "\
Welcome to kzrnote
..................

Every note is a plain file edited in its own editor window, and every
window remembers its size and position.

Mentioning the title of another note links to it; open the link with `gf`.

Two editor commands are available:

 :Note        create a new note, or with an argument, open the note
              with that title
 :DeleteNote  move the current note to the attic

See the note \"Configuring kzrnote\" for settings.
";

const ABOUT_NOTE: &str = "\
Configuring kzrnote
...................

Editor settings for notes go in ~/.config/kzrnote/user.vim, which is
sourced after the generated kzrnote.vim.

Coordinator settings (editor binary, number of preloaded editors, search
program) go in ~/.config/kzrnote/settings.toml.

Deleted notes are moved to ~/.local/share/kzrnote/attic.

Scripts can drive a running kzrnote with kzrnote-ctl.
";

/// Input to the event loop.
#[derive(Debug)]
pub enum LoopEvent {
    Rpc { request: Request, reply: oneshot::Sender<Response> },
    Fs(RawFsEvent),
    EditorExited { slot: SlotId, status: Option<i32> },
    RemoteOpenExited { slot: SlotId, status: Option<i32> },
    /// A spawning editor showed up in the server list.
    SlotAttached { server_id: String },
    /// A spawning editor never showed up, or its readiness could not be
    /// checked.
    SlotFailed { server_id: String },
    Shell(ShellEvent),
    PreloadTick,
    Shutdown,
}

pub type LoopSender = mpsc::UnboundedSender<LoopEvent>;
pub type LoopReceiver = mpsc::UnboundedReceiver<LoopEvent>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error(transparent)]
    ResourceExhausted(StoreError),
}

impl From<UriError> for AppError {
    fn from(error: UriError) -> Self {
        Self::InvalidArgument(error.to_string())
    }
}

pub struct App {
    paths: AppPaths,
    settings: Settings,
    store: NoteStore,
    titles: TitleCache,
    notes: NoteList,
    metadata: MetadataStore,
    pool: EditorPool,
    launcher: Arc<dyn EditorLauncher>,
    host: Box<dyn WindowHost>,
    events: EventQueue,
    broadcast: broadcast::Sender<NoteEvent>,
    loop_tx: LoopSender,
    /// Set once startup finished; display requests wait until then.
    ready: bool,
    deferred: Vec<(PathBuf, u32)>,
    shutting_down: bool,
}

impl App {
    pub fn new(
        paths: AppPaths,
        settings: Settings,
        launcher: Arc<dyn EditorLauncher>,
        host: Box<dyn WindowHost>,
    ) -> (Self, LoopReceiver) {
        let store = NoteStore::new(&paths.notes_dir, &paths.attic_dir);
        Self::with_store(paths, settings, store, launcher, host)
    }

    pub fn with_store(
        paths: AppPaths,
        settings: Settings,
        store: NoteStore,
        launcher: Arc<dyn EditorLauncher>,
        host: Box<dyn WindowHost>,
    ) -> (Self, LoopReceiver) {
        let (loop_tx, loop_rx) = mpsc::unbounded_channel();
        let (broadcast, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        let notes = match store.list(true) {
            Ok(paths) => NoteList::from_recent(paths),
            Err(error) => {
                warn!(%error, "failed to list notes at startup");
                NoteList::default()
            }
        };
        debug!(count = notes.len(), encoding = %store.encoding(), "note store opened");

        let app = Self {
            metadata: MetadataStore::empty(&paths.metadata_file),
            paths,
            settings,
            store,
            titles: TitleCache::default(),
            notes,
            pool: EditorPool::default(),
            launcher,
            host,
            events: EventQueue::default(),
            broadcast,
            loop_tx,
            ready: false,
            deferred: Vec::new(),
            shutting_down: false,
        };
        (app, loop_rx)
    }

    pub fn loop_sender(&self) -> LoopSender {
        self.loop_tx.clone()
    }

    /// Dispatched note events, after the loop has reacted to them.
    pub fn subscribe(&self) -> broadcast::Receiver<NoteEvent> {
        self.broadcast.subscribe()
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn pool(&self) -> &EditorPool {
        &self.pool
    }

    pub fn notes(&self) -> &NoteList {
        &self.notes
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Load metadata, open the display gate, and start preloading.
    pub fn finish_startup(&mut self) {
        self.metadata = MetadataStore::load(&self.paths.metadata_file);
        self.ready = true;
        self.replenish();
        self.first_run();
        for (path, timestamp) in mem::take(&mut self.deferred) {
            if self.store.is_note(&path) {
                self.show_note(&path, timestamp);
            }
        }
        self.flush_events();
        info!(notes = self.notes.len(), "coordinator ready");
    }

    /// Drive the loop until shutdown is requested or every sender is gone.
    pub async fn run(&mut self, mut rx: LoopReceiver) {
        while let Some(event) = rx.recv().await {
            self.handle(event);
            if self.shutting_down {
                break;
            }
        }
    }

    pub fn handle(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Rpc { request, reply } => {
                let response = crate::rpc::methods::dispatch(self, request);
                if reply.send(response).is_err() {
                    debug!("rpc client went away before the reply");
                }
            }
            LoopEvent::Fs(event) => {
                debug!(kind = ?event.kind, path = %event.path.display(), "notes directory changed");
                self.reconcile(&event.path);
            }
            LoopEvent::EditorExited { slot, status } => self.on_editor_exit(slot, status),
            LoopEvent::RemoteOpenExited { slot, status } => {
                if status == Some(0) {
                    debug!(slot, "remote open finished");
                } else {
                    warn!(slot, ?status, "remote open failed; not retrying");
                }
            }
            LoopEvent::SlotAttached { server_id } => {
                if self.pool.mark_ready(&server_id).is_none() {
                    debug!(server_id, "readiness for an unknown or settled slot");
                }
            }
            LoopEvent::SlotFailed { server_id } => self.on_slot_failed(&server_id),
            LoopEvent::Shell(event) => self.on_shell_event(event),
            LoopEvent::PreloadTick => self.replenish(),
            LoopEvent::Shutdown => self.shutting_down = true,
        }
        self.flush_events();
    }

    /// Ask the loop to stop after the current event.
    pub fn request_shutdown(&mut self) {
        self.shutting_down = true;
    }

    /// Save metadata and tear down every editor. The session name must
    /// already be released.
    pub fn shutdown(&mut self) {
        if let Err(error) = self.metadata.save() {
            warn!(?error, "failed to save window metadata");
        }
        self.close_all_editors();
        info!("coordinator stopped");
    }

    // ── Notes ──────────────────────────────────────────────────────

    /// Decode a URI into a note path. Existence is not checked.
    pub fn note_path(&self, uri: &str) -> Result<PathBuf, AppError> {
        Ok(uri::decode(uri, self.store.notes_dir())?)
    }

    pub fn create_note(&mut self, initial: &str) -> Result<PathBuf, AppError> {
        let path = self.store.create(initial).map_err(|error| match error {
            StoreError::ResourceExhausted { .. } => AppError::ResourceExhausted(error),
            other => AppError::InvalidArgument(other.to_string()),
        })?;
        self.reconcile(&path);
        Ok(path)
    }

    /// A note titled by a local timestamp, opened right away.
    pub fn create_open_note(&mut self, timestamp: u32) -> Result<PathBuf, AppError> {
        let now = chrono::Local::now().format("%c");
        let path = self.create_note(&format!("{NEW_NOTE_TEMPLATE}{now}"))?;
        self.display_note(&path, timestamp);
        Ok(path)
    }

    /// Soft-delete a note. False when it is not a note or the move failed.
    pub fn delete_note(&mut self, path: &Path) -> bool {
        match self.store.delete(path) {
            Ok(_) => {
                self.notes.remove(path);
                self.titles.remove(path);
                self.events
                    .push(NoteEvent::NoteDeleted { path: path.to_path_buf(), user_initiated: true });
                true
            }
            Err(StoreError::NotFound(_)) => false,
            Err(error) => {
                warn!(%error, "failed to delete note");
                false
            }
        }
    }

    pub fn set_contents(&mut self, path: &Path, text: &str) -> bool {
        match self.store.write(path, text) {
            Ok(()) => {
                self.reconcile(path);
                true
            }
            Err(StoreError::NotFound(_)) => false,
            Err(error) => {
                warn!(%error, "failed to write note");
                false
            }
        }
    }

    pub fn contents(&self, path: &Path) -> String {
        self.store.read(path).unwrap_or_default()
    }

    pub fn title(&mut self, path: &Path) -> Option<String> {
        if !self.store.is_note(path) {
            return None;
        }
        self.titles.title_for(&self.store, path, &mut self.events)
    }

    pub fn find_by_title(&mut self, title: &str, case_sensitive: bool) -> Option<PathBuf> {
        self.titles.lookup_by_title(&self.store, title, case_sensitive, &mut self.events)
    }

    /// URIs of all notes, most recently changed first.
    pub fn list_uris(&self) -> Vec<String> {
        match self.store.list(true) {
            Ok(paths) => paths.iter().filter_map(|path| uri::encode(path).ok()).collect(),
            Err(error) => {
                warn!(%error, "failed to list notes");
                Vec::new()
            }
        }
    }

    /// Bring the list model and the title cache in line with what is on
    /// disk at `path`.
    fn reconcile(&mut self, path: &Path) {
        if !self.store.is_valid_note_filename(path) {
            return;
        }
        let listed = self.notes.contains(path);
        let exists = self.store.is_note(path);
        match (listed, exists) {
            (false, true) => {
                self.notes.insert_top(path);
                self.titles.invalidate(path);
                self.titles.title_for(&self.store, path, &mut self.events);
                self.events.push(NoteEvent::NoteCreated { path: path.to_path_buf() });
            }
            (true, true) => {
                self.titles.invalidate(path);
                self.notes.move_top(path);
                self.titles.title_for(&self.store, path, &mut self.events);
                self.events.push(NoteEvent::ContentsChanged { path: path.to_path_buf() });
            }
            (true, false) => {
                self.notes.remove(path);
                self.titles.remove(path);
                self.events
                    .push(NoteEvent::NoteDeleted { path: path.to_path_buf(), user_initiated: false });
            }
            (false, false) => debug!(path = %path.display(), "changed file is not a note"),
        }
    }

    fn first_run(&mut self) {
        match self.store.list(false) {
            Ok(notes) if notes.is_empty() => {}
            Ok(_) => return,
            Err(error) => {
                warn!(%error, "cannot tell whether this is the first run");
                return;
            }
        }
        info!("no notes yet, creating the welcome notes");
        let welcome = self.create_note(WELCOME_NOTE);
        if let Err(error) = self.create_note(ABOUT_NOTE) {
            warn!(%error, "failed to create the about note");
        }
        match welcome {
            Ok(path) => {
                self.display_note(&path, 0);
            }
            Err(error) => warn!(%error, "failed to create the welcome note"),
        }
    }

    // ── Command line and editor commands ───────────────────────────

    /// Open the notes named on a command line; with none, present the main
    /// window unless `--no-show`. Returns text for the invoking terminal.
    pub fn handle_commandline(
        &mut self,
        argv: &[String],
        display_name: &str,
        startup_id: &str,
    ) -> Result<String, AppError> {
        debug!(?argv, display = display_name, startup_id, "handling command line");
        let timestamp = cmdline::startup_timestamp(startup_id);
        let commandline = match cmdline::parse(argv) {
            Ok(Parsed::Run(commandline)) => commandline,
            Ok(Parsed::Output(text)) => return Ok(text),
            Err(text) => return Err(AppError::InvalidArgument(text)),
        };
        for warning in &commandline.warnings {
            warn!("{warning}");
        }

        let paths = commandline
            .targets
            .iter()
            .map(|target| cmdline::resolve_target(target, &self.store))
            .collect::<Result<Vec<_>, _>>()?;

        if paths.is_empty() && !commandline.no_show {
            self.host.present_main(timestamp);
        }
        for path in &paths {
            if !self.display_note(path, timestamp) {
                warn!(path = %path.display(), "no such note");
            }
        }

        let mut output = commandline.warnings.join("\n");
        if !output.is_empty() {
            output.push('\n');
        }
        Ok(output)
    }

    pub fn display_search(&mut self, startup_id: &str) -> String {
        self.host.present_main(cmdline::startup_timestamp(startup_id));
        String::new()
    }

    /// Commands issued from inside an editor on behalf of its note
    /// (`sender`, a note path or URI).
    pub fn run_command(
        &mut self,
        command: &str,
        argument: &str,
        sender: &str,
    ) -> Result<bool, AppError> {
        debug!(command, argument, sender, "editor command");
        let sender_path = if sender.starts_with(cmdline::URI_PREFIX) {
            self.note_path(sender)?
        } else {
            PathBuf::from(sender)
        };
        if !self.store.is_note(&sender_path) {
            return Err(AppError::InvalidArgument(format!("`{sender}` is not a valid sender note")));
        }

        match command {
            "New" => {
                self.create_open_note(0)?;
                Ok(true)
            }
            "Delete" => Ok(self.delete_note(&sender_path)),
            "Open" => match self.find_by_title(argument, false) {
                Some(path) => Ok(self.display_note(&path, 0)),
                None => Ok(false),
            },
            other => Err(AppError::InvalidArgument(format!("`{other}` is not a supported command"))),
        }
    }

    // ── Event dispatch ─────────────────────────────────────────────

    /// The single dispatch point for note events.
    fn flush_events(&mut self) {
        loop {
            while let Some(event) = self.events.pop() {
                debug!(event = event.name(), path = %event.path().display(), "note event");
                self.react(&event);
                // No subscribers is fine.
                let _ = self.broadcast.send(event);
            }
            if self.titles.list_stale() {
                self.write_title_list();
            }
            if self.events.is_empty() {
                break;
            }
        }
    }

    fn react(&mut self, event: &NoteEvent) {
        match event {
            NoteEvent::NoteDeleted { path, user_initiated: true } => self.close_deleted_note(path),
            NoteEvent::TitleUpdated { path, title } => {
                if let Some(window) = self.pool.slot_for_path(path).and_then(|slot| slot.window) {
                    self.host.set_title(window, &window_title(title));
                }
            }
            _ => {}
        }
    }

    /// Rewrite the title list file read by editors for completion.
    fn write_title_list(&mut self) {
        let titles = self.titles.all_titles(&self.store, &mut self.events);
        self.titles.mark_list_written();

        let text: String = titles.iter().map(|title| format!("{title}\n")).collect();
        let bytes = self.store.encoding().encode_lossy(&text);
        if let Err(error) = write_atomic(&self.paths.title_list_file, &bytes) {
            warn!(path = %self.paths.title_list_file.display(), %error, "failed to write title list");
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio::process::Command;
    use tokio::time::timeout;

    use super::*;
    use crate::shell::testing::RecordingHost;
    use crate::store::encoding::NoteEncoding;

    /// Shell-script editors: a spawned "editor" registers itself by creating
    /// a file named after its server id, and remote opens are recorded in
    /// `<server id>.opened`. With `attaches` off the editor never registers.
    pub struct ScriptLauncher {
        pub servers: PathBuf,
        pub attaches: bool,
    }

    impl EditorLauncher for ScriptLauncher {
        fn spawn_command(&self, server_id: &str, _: Option<u64>, _: Option<&Path>) -> Command {
            let script = if self.attaches {
                "touch \"$0/$1\"; exec sleep 600"
            } else {
                "exec sleep 600"
            };
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(script)
                .arg(&self.servers)
                .arg(server_id);
            command
        }

        fn remote_open_command(&self, server_id: &str, path: &Path) -> Command {
            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg("echo \"$2\" > \"$0/$1.opened\"")
                .arg(&self.servers)
                .arg(server_id)
                .arg(path);
            command
        }

        fn server_list_command(&self) -> Command {
            let mut command = Command::new("ls");
            command.arg(&self.servers);
            command
        }
    }

    pub struct Harness {
        pub tmp: TempDir,
        pub paths: AppPaths,
        pub host: RecordingHost,
        pub app: App,
        pub rx: LoopReceiver,
    }

    pub fn harness(preload_slots: usize) -> Harness {
        harness_with(preload_slots, true)
    }

    /// Editors that never show up in the server list.
    pub fn harness_with_silent_editors(preload_slots: usize) -> Harness {
        harness_with(preload_slots, false)
    }

    fn harness_with(preload_slots: usize, attaches: bool) -> Harness {
        let tmp = TempDir::new().unwrap();
        let paths = AppPaths::under(tmp.path());
        paths.ensure_data_dirs().unwrap();
        let servers = tmp.path().join("servers");
        std::fs::create_dir_all(&servers).unwrap();

        let mut settings = Settings::default();
        settings.preload.slots = preload_slots;
        settings.preload.replenish_delay_ms = 20;
        settings.preload.readiness_poll_ms = 20;
        if !attaches {
            settings.preload.readiness_attempts = 3;
        }

        let host = RecordingHost::default();
        let store = NoteStore::with_encoding(&paths.notes_dir, &paths.attic_dir, NoteEncoding::Utf8);
        let (app, rx) = App::with_store(
            paths.clone(),
            settings,
            store,
            Arc::new(ScriptLauncher { servers, attaches }),
            Box::new(host.clone()),
        );
        Harness { tmp, paths, host, app, rx }
    }

    impl Harness {
        /// Feed loop events to the app until `done` holds.
        pub async fn pump_until(&mut self, mut done: impl FnMut(&App) -> bool) {
            let deadline = Duration::from_secs(10);
            timeout(deadline, async {
                while !done(&self.app) {
                    let Some(event) = self.rx.recv().await else {
                        panic!("loop channel closed");
                    };
                    self.app.handle(event);
                }
            })
            .await
            .expect("condition not reached in time");
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.app.close_all_editors();
        }
    }
}

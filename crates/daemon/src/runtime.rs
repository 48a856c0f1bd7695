// Process lifecycle: claim the session name or forward to whoever has it,
// and as owner run the coordinator until asked to quit.

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::{App, LoopEvent, LoopSender};
use crate::cmdline::{self, Parsed, STARTUP_ID_ENV};
use crate::config::Settings;
use crate::editor::launcher::{EditorLauncher, VimLauncher};
use crate::instance::{self, Claim, InstanceLock};
use crate::paths::AppPaths;
use crate::rpc::methods::RpcServerState;
use crate::rpc::unix::{bind_socket, serve_unix_until_shutdown};
use crate::search::NoteSearch;
use crate::shell::{HeadlessHost, WindowHost};
use crate::watcher::pipeline::{run_pipeline, PipelineConfig};
use crate::watcher::FileWatcher;

const DISPLAY_ENV: &str = "DISPLAY";

/// What this process was started with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Arguments after the program name, relative paths made absolute.
    pub argv: Vec<String>,
    pub display: String,
    pub startup_id: String,
}

impl Invocation {
    pub fn from_env() -> Self {
        let argv: Vec<String> = std::env::args().skip(1).collect();
        let argv = match std::env::current_dir() {
            Ok(cwd) => cmdline::absolutize_paths(&argv, &cwd),
            Err(_) => argv,
        };
        Self {
            argv,
            display: std::env::var(DISPLAY_ENV).unwrap_or_default(),
            startup_id: std::env::var(STARTUP_ID_ENV).unwrap_or_default(),
        }
    }
}

/// Entry point of the `kzrnote` binary.
pub async fn run(invocation: Invocation) -> ExitCode {
    // --help, --version and usage errors never reach an owner.
    match cmdline::parse(&invocation.argv) {
        Ok(Parsed::Output(text)) => {
            print!("{text}");
            return ExitCode::SUCCESS;
        }
        Err(text) => {
            eprint!("{text}");
            return ExitCode::FAILURE;
        }
        Ok(Parsed::Run(_)) => {}
    }

    match claim_or_forward(invocation).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            eprintln!("kzrnote: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn claim_or_forward(invocation: Invocation) -> Result<()> {
    let paths = AppPaths::resolve()?;
    paths.ensure_runtime_dir()?;

    match instance::try_claim(&paths.lock_path)? {
        Claim::Taken => {
            info!("another instance owns the session, forwarding");
            let output = instance::forward_commandline(
                &paths.socket_path,
                &invocation.argv,
                &invocation.display,
                &invocation.startup_id,
            )
            .await?;
            relay_output(&output);
            Ok(())
        }
        Claim::Owner(lock) => {
            let settings = Settings::load(&paths.settings_file);
            let launcher = Arc::new(VimLauncher::new(settings.editor.clone(), &paths));
            run_owner(paths, lock, settings, launcher, Box::new(HeadlessHost::default()), invocation)
                .await
        }
    }
}

/// Run the coordinator until `app.quit`, a signal, or every input closing.
///
/// The command line of this process is handled as if it had been forwarded.
pub async fn run_owner(
    paths: AppPaths,
    lock: InstanceLock,
    settings: Settings,
    launcher: Arc<dyn EditorLauncher>,
    host: Box<dyn WindowHost>,
    invocation: Invocation,
) -> Result<()> {
    paths.ensure_data_dirs().context("failed to create kzrnote directories")?;
    let socket_path = paths.socket_path.clone();
    let search_program = settings.search.program.clone();

    let (mut app, rx) = App::new(paths, settings, launcher, host);
    let services = Services::start(&app, &socket_path, search_program)?;

    app.finish_startup();
    match app.handle_commandline(&invocation.argv, &invocation.display, &invocation.startup_id) {
        Ok(output) => relay_output(&output),
        Err(error) => eprintln!("kzrnote: {error}"),
    }

    info!(socket_path = %socket_path.display(), pid = std::process::id(), "coordinator running");
    app.run(rx).await;

    // Release the name before saving metadata and closing editors.
    services.stop().await;
    remove_socket(&socket_path);
    lock.release();
    app.shutdown();
    Ok(())
}

/// Tasks feeding the event loop from outside.
struct Services {
    shutdown_tx: broadcast::Sender<()>,
    server: JoinHandle<()>,
    pipeline: JoinHandle<()>,
    _watcher: FileWatcher,
}

impl Services {
    fn start(app: &App, socket_path: &Path, search_program: String) -> Result<Self> {
        let loop_tx = app.loop_sender();
        let (shutdown_tx, _) = broadcast::channel(4);

        let listener = bind_socket(socket_path)?;
        let state = RpcServerState::new(
            loop_tx.clone(),
            NoteSearch::new(app.store().clone(), search_program),
        );
        let server_shutdown = shutdown_tx.subscribe();
        let server = tokio::spawn(async move {
            if let Err(error) = serve_unix_until_shutdown(listener, state, server_shutdown).await {
                warn!(?error, "rpc server terminated unexpectedly");
            }
        });

        let (watcher, raw_rx) = FileWatcher::start(app.store().notes_dir())?;
        let pipeline = tokio::spawn(run_pipeline(
            raw_rx,
            loop_tx.clone(),
            PipelineConfig::default(),
            shutdown_tx.subscribe(),
        ));

        spawn_signal_handler(loop_tx);
        Ok(Self { shutdown_tx, server, pipeline, _watcher: watcher })
    }

    async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.server.await;
        let _ = self.pipeline.await;
    }
}

fn spawn_signal_handler(loop_tx: LoopSender) {
    tokio::spawn(async move {
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(error) => {
                    warn!(?error, "cannot listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("interrupted"),
            _ = terminate => info!("terminated"),
        }
        let _ = loop_tx.send(LoopEvent::Shutdown);
    });
}

fn remove_socket(socket_path: &Path) {
    if let Err(error) = std::fs::remove_file(socket_path) {
        if error.kind() != std::io::ErrorKind::NotFound {
            warn!(?error, path = %socket_path.display(), "failed to remove socket");
        }
    }
}

fn relay_output(output: &str) {
    if output.is_empty() {
        return;
    }
    let mut stdout = std::io::stdout().lock();
    let _ = stdout.write_all(output.as_bytes());
    let _ = stdout.flush();
}

// Editor processes: command lines, runtime files, signals.
//
// The editor is driven only through its command line and its remote-control
// protocol (`--servername`, `--remote-send`, `--serverlist`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::process::{Child, Command};
use tracing::debug;

use crate::cmdline::STARTUP_ID_ENV;
use crate::config::EditorConfig;
use crate::paths::{create_private_dir, AppPaths};

/// Builds the commands that start and steer editors.
pub trait EditorLauncher: Send + Sync {
    /// Write whatever runtime files a spawn needs. Called before every spawn.
    fn prepare(&self) -> io::Result<()> {
        Ok(())
    }

    /// Start an editor serving `server_id`, embedded into `socket_id` if the
    /// shell provides one, editing `path` if given.
    fn spawn_command(&self, server_id: &str, socket_id: Option<u64>, path: Option<&Path>)
        -> Command;

    /// Make the editor serving `server_id` open `path`.
    fn remote_open_command(&self, server_id: &str, path: &Path) -> Command;

    /// Print the names of running editor servers, one per line.
    fn server_list_command(&self) -> Command;
}

/// Vim (GUI flavour) launcher.
#[derive(Debug, Clone)]
pub struct VimLauncher {
    config: EditorConfig,
    swap_dir: PathBuf,
    user_rc_file: PathBuf,
    editor_rc_file: PathBuf,
    title_list_file: PathBuf,
}

impl VimLauncher {
    pub fn new(config: EditorConfig, paths: &AppPaths) -> Self {
        Self {
            config,
            swap_dir: paths.editor_swap_dir.clone(),
            user_rc_file: paths.user_rc_file.clone(),
            editor_rc_file: paths.editor_rc_file.clone(),
            title_list_file: paths.title_list_file.clone(),
        }
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.config.program);
        if !self.config.gui_flag.is_empty() {
            command.arg(&self.config.gui_flag);
        }
        command.arg("-f");
        command
    }

    fn rc_text(&self) -> String {
        let swap = vim_escape(&self.swap_dir);
        let user = vim_escape(&self.user_rc_file);
        let titles = vim_escape(&self.title_list_file);
        format!(
            "\" Written by kzrnote before every editor start. Local changes are lost;\n\
             \" put them in {user} instead.\n\
             set directory^={swap}//\n\
             set backupdir^={swap}//\n\
             set undodir^={swap}//\n\
             let g:kzrnote_title_list = '{titles}'\n\
             if filereadable('{user}')\n\
             \x20 execute 'source' fnameescape('{user}')\n\
             endif\n"
        )
    }
}

impl EditorLauncher for VimLauncher {
    fn prepare(&self) -> io::Result<()> {
        create_private_dir(&self.swap_dir).map_err(|error| io::Error::other(error.to_string()))?;
        if let Some(config_dir) = self.user_rc_file.parent() {
            create_private_dir(config_dir).map_err(|error| io::Error::other(error.to_string()))?;
        }
        fs::OpenOptions::new().create(true).append(true).open(&self.user_rc_file)?;
        fs::write(&self.editor_rc_file, self.rc_text())
    }

    fn spawn_command(
        &self,
        server_id: &str,
        socket_id: Option<u64>,
        path: Option<&Path>,
    ) -> Command {
        let mut command = self.base_command();
        if let Some(socket_id) = socket_id {
            command.arg("--socketid").arg(socket_id.to_string());
        }
        command.arg("--servername").arg(server_id);
        command.args(&self.config.extra_args);
        command.arg("-c").arg(format!("so {}", self.editor_rc_file.display()));
        if let Some(path) = path {
            command.arg("-c").arg(format!("e {}", path.display()));
        }
        command
    }

    fn remote_open_command(&self, server_id: &str, path: &Path) -> Command {
        let mut command = self.base_command();
        command
            .arg("--servername")
            .arg(server_id)
            .arg("--remote-send")
            .arg(format!("<ESC>:e {}<CR><CR>", path.display()));
        command
    }

    fn server_list_command(&self) -> Command {
        let mut command = Command::new(&self.config.program);
        command.arg("--serverlist");
        command
    }
}

static NEXT_SERVER: AtomicU64 = AtomicU64::new(1);

/// A server name no other editor of this session uses. Upper case, since
/// the editor reports server names upper-cased.
pub fn new_server_id() -> String {
    let n = NEXT_SERVER.fetch_add(1, Ordering::Relaxed);
    format!("KZRNOTE_{}_{n}", std::process::id())
}

/// Whether `server_id` appears in `--serverlist` output.
pub fn server_listed(listing: &str, server_id: &str) -> bool {
    listing.lines().any(|line| line.trim().eq_ignore_ascii_case(server_id))
}

/// Spawn an editor child. It gets no stdin and dies with us where the
/// platform allows.
pub fn spawn_child(mut command: Command) -> io::Result<Child> {
    command.stdin(Stdio::null()).env_remove(STARTUP_ID_ENV).kill_on_drop(false);
    set_parent_death_signal(&mut command);
    command.spawn()
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal(command: &mut Command) {
    // SAFETY: prctl is async-signal-safe and only affects the child.
    unsafe {
        command.pre_exec(|| {
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGHUP);
            Ok(())
        });
    }
}

#[cfg(not(target_os = "linux"))]
fn set_parent_death_signal(_command: &mut Command) {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Kill,
}

/// Send `signal` to `pid`. Failures (already gone) are only logged.
pub fn send_signal(pid: u32, signal: Signal) {
    #[cfg(unix)]
    {
        let signo = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        let Ok(pid) = i32::try_from(pid) else {
            return;
        };
        // SAFETY: kill has no memory-safety preconditions.
        if unsafe { libc::kill(pid, signo) } != 0 {
            debug!(pid, ?signal, error = %io::Error::last_os_error(), "signal not delivered");
        }
    }

    #[cfg(not(unix))]
    {
        debug!(pid, ?signal, "signals are not supported on this platform");
    }
}

/// Single-quote-safe path for a Vim script string literal.
fn vim_escape(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn launcher(tmp: &TempDir) -> VimLauncher {
        VimLauncher::new(EditorConfig::default(), &AppPaths::under(tmp.path()))
    }

    fn argv(command: &Command) -> Vec<String> {
        let std = command.as_std();
        std::iter::once(std.get_program())
            .chain(std.get_args())
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn preload_command_line() {
        let tmp = TempDir::new().unwrap();
        let launcher = launcher(&tmp);
        let args = argv(&launcher.spawn_command("KZRNOTE_1", Some(77), None));
        let rc = AppPaths::under(tmp.path()).editor_rc_file;
        assert_eq!(
            args,
            vec![
                "vim".to_string(),
                "-g".into(),
                "-f".into(),
                "--socketid".into(),
                "77".into(),
                "--servername".into(),
                "KZRNOTE_1".into(),
                "-c".into(),
                format!("so {}", rc.display()),
            ]
        );
    }

    #[test]
    fn cold_spawn_opens_the_note() {
        let tmp = TempDir::new().unwrap();
        let args = argv(&launcher(&tmp).spawn_command("S", None, Some(Path::new("/n/a.note"))));
        assert!(!args.contains(&"--socketid".to_string()));
        assert_eq!(args[args.len() - 2..], ["-c".to_string(), "e /n/a.note".to_string()]);
    }

    #[test]
    fn remote_open_sends_edit_keys() {
        let tmp = TempDir::new().unwrap();
        let args = argv(&launcher(&tmp).remote_open_command("S", Path::new("/n/a.note")));
        assert_eq!(args[3..], [
            "--servername".to_string(),
            "S".into(),
            "--remote-send".into(),
            "<ESC>:e /n/a.note<CR><CR>".into(),
        ]);
    }

    #[test]
    fn prepare_writes_runtime_files() {
        let tmp = TempDir::new().unwrap();
        let paths = AppPaths::under(tmp.path());
        let launcher = launcher(&tmp);
        launcher.prepare().unwrap();

        assert!(paths.editor_swap_dir.is_dir());
        assert!(paths.user_rc_file.exists());
        let rc = fs::read_to_string(&paths.editor_rc_file).unwrap();
        assert!(rc.contains("set directory^="));
        assert!(rc.contains(&paths.user_rc_file.display().to_string()));

        // The user file is never truncated.
        fs::write(&paths.user_rc_file, "set number\n").unwrap();
        launcher.prepare().unwrap();
        assert_eq!(fs::read_to_string(&paths.user_rc_file).unwrap(), "set number\n");
    }

    #[test]
    fn server_ids_are_unique_and_upper_case() {
        let a = new_server_id();
        let b = new_server_id();
        assert_ne!(a, b);
        assert_eq!(a, a.to_uppercase());
    }

    #[test]
    fn server_list_match_ignores_case() {
        let listing = "GVIM\nkzrnote_1_2\n";
        assert!(server_listed(listing, "KZRNOTE_1_2"));
        assert!(!server_listed(listing, "KZRNOTE_1_3"));
    }

    #[tokio::test]
    async fn spawned_child_can_be_terminated() {
        let mut command = Command::new("sleep");
        command.arg("30");
        let mut child = spawn_child(command).unwrap();
        send_signal(child.id().unwrap(), Signal::Terminate);
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }
}

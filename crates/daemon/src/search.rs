// Full-text note search through an external `grep`.
//
// The notes directory is searched recursively for `*.note` files, skipping
// the attic and the editor cache. Only paths that are notes are reported,
// as URIs. The query goes to grep in the same encoding the notes are stored
// in, so non-ASCII text matches byte for byte.

use std::error::Error;
use std::ffi::{OsStr, OsString};
use std::fmt::{Display, Formatter};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::process::Command;

use kzrnote_common::note::uri;
use kzrnote_common::note::NOTE_SUFFIX;
use tracing::{debug, warn};

use crate::store::NoteStore;

const ATTIC_DIR: &str = "attic";
const CACHE_DIR: &str = "cache";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

pub trait CommandExecutor: Send + Sync {
    fn execute(&self, program: &str, args: &[OsString], cwd: &Path)
        -> Result<CommandResult, std::io::Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandExecutor;

impl CommandExecutor for ProcessCommandExecutor {
    fn execute(
        &self,
        program: &str,
        args: &[OsString],
        cwd: &Path,
    ) -> Result<CommandResult, std::io::Error> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        Ok(CommandResult {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    SpawnFailed { program: String, message: String },
    CommandFailed { program: String, code: Option<i32>, stderr: String },
}

impl Display for SearchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SearchError::SpawnFailed { program, message } => {
                write!(f, "failed to run `{program}`: {message}")
            }
            SearchError::CommandFailed { program, code, stderr } => {
                write!(f, "`{program}` failed with code {code:?}: {}", stderr.trim())
            }
        }
    }
}

impl Error for SearchError {}

#[derive(Debug, Clone)]
pub struct NoteSearch<E = ProcessCommandExecutor> {
    store: NoteStore,
    program: String,
    executor: E,
}

impl NoteSearch<ProcessCommandExecutor> {
    pub fn new(store: NoteStore, program: impl Into<String>) -> Self {
        Self::with_executor(store, program, ProcessCommandExecutor)
    }
}

impl<E: CommandExecutor> NoteSearch<E> {
    pub fn with_executor(store: NoteStore, program: impl Into<String>, executor: E) -> Self {
        Self { store, program: program.into(), executor }
    }

    /// URIs of the notes whose contents match `query`. Failures are logged
    /// and yield no results.
    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<String> {
        match self.try_search(query, case_sensitive) {
            Ok(uris) => uris,
            Err(error) => {
                warn!(%error, "note search failed");
                Vec::new()
            }
        }
    }

    pub fn try_search(&self, query: &str, case_sensitive: bool) -> Result<Vec<String>, SearchError> {
        let notes_dir = self.store.notes_dir();
        let pattern = match self.store.encoding().encode(query) {
            Ok(pattern) => pattern,
            Err(error) => {
                // No stored note can contain the query.
                debug!(%error, "query not representable in the note encoding");
                return Ok(Vec::new());
            }
        };
        let args = grep_args(pattern, case_sensitive, notes_dir);
        debug!(program = %self.program, ?args, "searching notes");

        let result = self.executor.execute(&self.program, &args, notes_dir).map_err(|error| {
            SearchError::SpawnFailed { program: self.program.clone(), message: error.to_string() }
        })?;

        match result.code {
            Some(0) => Ok(self.parse_matches(&result.stdout)),
            // No line selected.
            Some(1) => Ok(Vec::new()),
            code => Err(SearchError::CommandFailed {
                program: self.program.clone(),
                code,
                stderr: result.stderr,
            }),
        }
    }

    fn parse_matches(&self, stdout: &[u8]) -> Vec<String> {
        stdout
            .split(|&byte| byte == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| PathBuf::from(OsStr::from_bytes(line)))
            .filter(|path| self.store.is_note(path))
            .filter_map(|path| uri::encode(&path).ok())
            .collect()
    }
}

fn grep_args(pattern: Vec<u8>, case_sensitive: bool, notes_dir: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-l".into(), "-r".into()];
    if !case_sensitive {
        args.push("-i".into());
    }
    args.push(format!("--include=*{NOTE_SUFFIX}").into());
    args.push(format!("--exclude-dir={ATTIC_DIR}").into());
    args.push(format!("--exclude-dir={CACHE_DIR}").into());
    args.push("-e".into());
    args.push(OsString::from_vec(pattern));
    args.push(notes_dir.into());
    args
}

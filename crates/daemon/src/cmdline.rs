// The `kzrnote` command line, parsed by the owning instance whether it came
// from its own argv or was forwarded by a second instance.

use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::Parser;
use kzrnote_common::note::uri::{self, UriError};
use kzrnote_common::APP_NAME;

use crate::store::NoteStore;

pub const URI_PREFIX: &str = "note:";
/// Startup-notification id handed over by the launcher.
pub const STARTUP_ID_ENV: &str = "DESKTOP_STARTUP_ID";

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about = "Notes, each edited in its own editor window")]
struct Cli {
    /// Do not present the note list window when no note is given.
    #[arg(long)]
    no_show: bool,

    /// Note URIs (`note://kzrnote/<id>`) or note file paths to open.
    notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub no_show: bool,
    pub targets: Vec<String>,
    /// Options that were not recognised and are ignored.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Run(CommandLine),
    /// `--help` / `--version`: print this and do nothing else.
    Output(String),
}

/// Parse forwarded arguments (program name excluded). Unknown options
/// become warnings rather than errors.
pub fn parse(argv: &[String]) -> Result<Parsed, String> {
    let mut kept = vec![APP_NAME.to_string()];
    let mut warnings = Vec::new();
    let mut options_done = false;
    for arg in argv {
        if !options_done && arg == "--" {
            options_done = true;
        } else if !options_done && arg.starts_with('-') && arg != "-" && !is_known_option(arg) {
            warnings.push(format!("{APP_NAME}: ignoring unknown option `{arg}`"));
            continue;
        }
        kept.push(arg.clone());
    }

    match Cli::try_parse_from(kept) {
        Ok(cli) => {
            Ok(Parsed::Run(CommandLine { no_show: cli.no_show, targets: cli.notes, warnings }))
        }
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            Ok(Parsed::Output(error.render().to_string()))
        }
        Err(error) => Err(error.render().to_string()),
    }
}

fn is_known_option(arg: &str) -> bool {
    matches!(arg, "--no-show" | "-h" | "--help" | "-V" | "--version")
}

/// Note file behind a command-line target: a note URI, or a path that must
/// name a note file in the notes directory.
pub fn resolve_target(target: &str, store: &NoteStore) -> Result<PathBuf, UriError> {
    if target.starts_with(URI_PREFIX) {
        return uri::decode(target, store.notes_dir());
    }
    let path = PathBuf::from(target);
    if store.is_valid_note_filename(&path) {
        Ok(path)
    } else {
        Err(UriError::NotANoteFile(path))
    }
}

/// Make relative path arguments absolute against `cwd`, so the owning
/// instance can resolve them from its own working directory.
pub fn absolutize_paths(argv: &[String], cwd: &Path) -> Vec<String> {
    argv.iter()
        .map(|arg| {
            if arg.starts_with('-') || arg.starts_with(URI_PREFIX) || Path::new(arg).is_absolute() {
                arg.clone()
            } else {
                cwd.join(arg).display().to_string()
            }
        })
        .collect()
}

/// Startup-notification time carried in the `_TIME<n>` suffix of
/// `DESKTOP_STARTUP_ID`; 0 when absent or unparsable.
pub fn startup_timestamp(startup_id: &str) -> u32 {
    startup_id
        .split("_TIME")
        .nth(1)
        .and_then(|time| time.parse::<i64>().ok())
        .and_then(|time| u32::try_from(time.unsigned_abs()).ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::store::encoding::NoteEncoding;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|arg| arg.to_string()).collect()
    }

    fn run(list: &[&str]) -> CommandLine {
        match parse(&args(list)).unwrap() {
            Parsed::Run(commandline) => commandline,
            Parsed::Output(text) => panic!("unexpected output: {text}"),
        }
    }

    #[test]
    fn empty_command_line() {
        let commandline = run(&[]);
        assert!(!commandline.no_show);
        assert!(commandline.targets.is_empty());
        assert!(commandline.warnings.is_empty());
    }

    #[test]
    fn targets_and_no_show() {
        let commandline = run(&["--no-show", "note://kzrnote/a", "/tmp/b.note"]);
        assert!(commandline.no_show);
        assert_eq!(commandline.targets, args(&["note://kzrnote/a", "/tmp/b.note"]));
    }

    #[test]
    fn unknown_options_are_warnings() {
        let commandline = run(&["--sm-client-id", "note://kzrnote/a", "-x"]);
        assert_eq!(commandline.targets, args(&["note://kzrnote/a"]));
        assert_eq!(commandline.warnings.len(), 2);
        assert!(commandline.warnings[0].contains("--sm-client-id"));
    }

    #[test]
    fn double_dash_ends_options() {
        let commandline = run(&["--", "--odd-name.note"]);
        assert_eq!(commandline.targets, args(&["--odd-name.note"]));
        assert!(commandline.warnings.is_empty());
    }

    #[test]
    fn help_and_version_produce_output() {
        let Parsed::Output(help) = parse(&args(&["--help"])).unwrap() else {
            panic!("expected help output");
        };
        assert!(help.contains("--no-show"));

        let Parsed::Output(version) = parse(&args(&["--version"])).unwrap() else {
            panic!("expected version output");
        };
        assert!(version.starts_with("kzrnote "));
    }

    #[test]
    fn targets_resolve_from_uris_and_paths() {
        let tmp = TempDir::new().unwrap();
        let notes = tmp.path().join("notes");
        fs::create_dir_all(&notes).unwrap();
        let store = NoteStore::with_encoding(&notes, notes.join("attic"), NoteEncoding::Utf8);
        let id = "0b7f4f36-6a4f-4d3c-9a53-1f1d1b1c1d1e";
        let path = notes.join(format!("{id}.note"));

        assert_eq!(resolve_target(&format!("note://kzrnote/{id}"), &store).unwrap(), path);
        assert_eq!(resolve_target(&path.display().to_string(), &store).unwrap(), path);
        assert!(resolve_target("note://other/x", &store).is_err());
        assert!(resolve_target("/etc/passwd", &store).is_err());
    }

    #[test]
    fn relative_paths_are_absolutized() {
        let out = absolutize_paths(
            &args(&["a.note", "/abs/b.note", "note://kzrnote/c", "--no-show"]),
            Path::new("/home/u"),
        );
        assert_eq!(out, args(&["/home/u/a.note", "/abs/b.note", "note://kzrnote/c", "--no-show"]));
    }

    #[test]
    fn startup_timestamp_from_id() {
        assert_eq!(startup_timestamp("kzrnote-123_TIME4567"), 4567);
        assert_eq!(startup_timestamp("x_TIME-42"), 42);
        assert_eq!(startup_timestamp("x_TIMEsoon"), 0);
        assert_eq!(startup_timestamp(""), 0);
        assert_eq!(startup_timestamp("x_TIME99999999999"), 0);
    }
}

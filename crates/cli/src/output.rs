// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use std::io::{self, IsTerminal, Write};

use kzrnote_common::protocol::jsonrpc::{INVALID_ARGUMENT, RESOURCE_EXHAUSTED};
use serde::Serialize;

use crate::client::coordinator_unavailable;
use crate::exit_code::RpcError;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_RESET: &str = "\x1b[0m";

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Human,
    /// Machine-readable JSON (one value per response).
    Json,
}

impl OutputFormat {
    /// Auto-detect format: JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    /// Testable variant that takes an explicit `is_tty` flag.
    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Write a value to stdout in the selected format.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

/// Write a value to a provided writer (useful for testing).
///
/// Human output that is empty prints nothing rather than a blank line.
pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            let text = human_fn(value);
            if text.is_empty() {
                return Ok(());
            }
            writeln!(writer, "{text}")
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Write an error to stderr in the selected format.
pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let line =
                render_human_stderr_line("error", message, io::stderr().is_terminal(), ANSI_RED);
            let _ = writeln!(err, "{line}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                "error": {
                    "code": code,
                    "message": message,
                }
            });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    let message = format!("{error:#}");

    if coordinator_unavailable(error) {
        return ("NOT_RUNNING", format!("{message}. Start it with: kzrnote --no-show"));
    }

    if let Some(rpc) = error.chain().find_map(|cause| cause.downcast_ref::<RpcError>()) {
        return match rpc.code {
            INVALID_ARGUMENT => ("INVALID_ARGUMENT", rpc.message.clone()),
            RESOURCE_EXHAUSTED => ("RESOURCE_EXHAUSTED", rpc.message.clone()),
            _ => ("RPC_ERROR", message),
        };
    }

    if message.to_ascii_lowercase().contains("timed out") {
        return ("TIMEOUT", format!("{message}. The coordinator may be busy or hung."));
    }

    ("ERROR", message)
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use kzrnote_common::protocol::jsonrpc;

    use super::*;

    #[test]
    fn detect_tty_returns_human() {
        assert_eq!(OutputFormat::detect_from_terminal(true), OutputFormat::Human);
    }

    #[test]
    fn detect_pipe_returns_json() {
        assert_eq!(OutputFormat::detect_from_terminal(false), OutputFormat::Json);
    }

    #[test]
    fn detect_json_flag_overrides_tty() {
        assert_eq!(OutputFormat::detect(true), OutputFormat::Json);
    }

    #[test]
    fn write_output_human_format() {
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &"Groceries", |title| format!("Title: {title}"))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Title: Groceries\n");
    }

    #[test]
    fn write_output_empty_human_prints_nothing() {
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &Vec::<String>::new(), |_| String::new())
            .unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn write_output_json_does_not_call_human_fn() {
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Json, &vec!["note://kzrnote/a"], |_| {
            panic!("should not be called");
        })
        .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "[\"note://kzrnote/a\"]\n");
    }

    #[test]
    fn render_human_error_uses_color_for_tty() {
        let line = render_human_stderr_line("error", "boom", true, ANSI_RED);
        assert!(line.contains(ANSI_RED));
        assert!(line.contains(ANSI_RESET));
        assert!(line.contains("boom"));
    }

    #[test]
    fn render_human_error_without_tty_is_plain() {
        let line = render_human_stderr_line("error", "careful", false, ANSI_RED);
        assert_eq!(line, "error: careful");
    }

    #[test]
    fn actionable_error_invalid_argument() {
        let err = anyhow::Error::new(RpcError::from(jsonrpc::RpcError::invalid_argument(
            "not a note://kzrnote/.. URI: `x`",
        )));
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "INVALID_ARGUMENT");
        assert_eq!(message, "Invalid argument: not a note://kzrnote/.. URI: `x`");
    }

    #[test]
    fn actionable_error_timeout_message() {
        let err = anyhow::anyhow!("timed out waiting for json-rpc response");
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "TIMEOUT");
        assert!(message.contains("busy"));
    }

    #[test]
    fn actionable_error_fallback_keeps_message() {
        let err = anyhow::anyhow!("no such note");
        assert_eq!(actionable_error(&err), ("ERROR", "no such note".to_string()));
    }
}

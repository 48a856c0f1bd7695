// Per-session single instance: whoever holds an exclusive `flock` on the lock
// file owns the coordinator name and serves the socket. Everybody else
// forwards its command line to the owner and exits.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use kzrnote_common::protocol::jsonrpc::{Request, RequestId, Response};
use kzrnote_common::protocol::rpc_methods::APP_COMMANDLINE;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::{debug, info};

const CONNECT_RETRIES: usize = 50;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Held for the lifetime of the owning instance. Dropping it (or dying)
/// releases the name.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Give the name up explicitly, before the slower parts of shutdown.
    pub fn release(self) {
        // SAFETY: the descriptor is owned by `self.file` and still open.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        info!(path = %self.path.display(), "released instance lock");
    }
}

#[derive(Debug)]
pub enum Claim {
    Owner(InstanceLock),
    /// Another process owns the name.
    Taken,
}

/// Try to become the owning instance without blocking.
pub fn try_claim(lock_path: &Path) -> Result<Claim> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .with_context(|| format!("failed to open lock file `{}`", lock_path.display()))?;

    // SAFETY: `file` keeps the descriptor open for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        debug!(path = %lock_path.display(), "claimed instance lock");
        return Ok(Claim::Owner(InstanceLock { file, path: lock_path.to_path_buf() }));
    }

    let error = io::Error::last_os_error();
    if error.kind() == io::ErrorKind::WouldBlock {
        Ok(Claim::Taken)
    } else {
        Err(error).with_context(|| format!("failed to lock `{}`", lock_path.display()))
    }
}

/// Hand a command line to the owner. Returns the text the owner wants shown
/// on this terminal; an `Err` carries the owner's error message.
pub async fn forward_commandline(
    socket_path: &Path,
    argv: &[String],
    display: &str,
    startup_id: &str,
) -> Result<String> {
    let request = Request::new(
        APP_COMMANDLINE,
        Some(json!({ "argv": argv, "display": display, "startup_id": startup_id })),
        RequestId::Number(1),
    );

    let response = call(socket_path, &request).await?;
    if let Some(error) = response.error {
        bail!("{}", error.describe());
    }
    Ok(response.result.and_then(|value| value.as_str().map(str::to_string)).unwrap_or_default())
}

async fn call(socket_path: &Path, request: &Request) -> Result<Response> {
    let stream = connect_with_retry(socket_path).await?;
    let mut encoded = serde_json::to_vec(request).context("failed to serialize request")?;
    encoded.push(b'\n');

    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(&encoded).await.context("failed to send request")?;
    write_half.flush().await.context("failed to flush request")?;

    let mut reader = BufReader::new(read_half);
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await.context("failed to read response")?;
    if bytes_read == 0 {
        return Err(anyhow!("coordinator closed the connection without answering"));
    }
    serde_json::from_str(line.trim()).context("failed to decode response")
}

/// The lock can be held before the owner has bound its socket, so refused
/// or missing sockets are retried for a while.
async fn connect_with_retry(socket_path: &Path) -> Result<UnixStream> {
    let mut last_error = None;
    for attempt in 0..CONNECT_RETRIES {
        match UnixStream::connect(socket_path).await {
            Ok(stream) => return Ok(stream),
            Err(error)
                if matches!(
                    error.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                debug!(attempt, %error, "coordinator socket not ready");
                last_error = Some(error);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(error) => {
                return Err(error).with_context(|| {
                    format!("failed to connect to `{}`", socket_path.display())
                });
            }
        }
    }
    Err(anyhow!(
        "coordinator at `{}` is not accepting connections: {}",
        socket_path.display(),
        last_error.map(|error| error.to_string()).unwrap_or_default()
    ))
}

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use kzrnote_common::paths::default_socket_path;
use kzrnote_common::protocol::jsonrpc::{Request, RequestId, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::exit_code::RpcError;

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// No coordinator is listening on the socket.
#[derive(Debug)]
pub struct CoordinatorUnavailable {
    socket_path: PathBuf,
    source: io::Error,
}

impl fmt::Display for CoordinatorUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "kzrnote is not running (socket `{}`)", self.socket_path.display())
    }
}

impl std::error::Error for CoordinatorUnavailable {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug)]
pub struct CoordinatorClient {
    socket_path: PathBuf,
    timeout: Duration,
    next_request_id: AtomicI64,
}

impl CoordinatorClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            next_request_id: AtomicI64::new(1),
        }
    }

    /// Client for `--socket`, else `$KZRNOTE_SOCKET`, else the session default.
    pub fn for_session(socket_override: Option<PathBuf>) -> Result<Self> {
        let socket_path = socket_override
            .or_else(default_socket_path)
            .context("no session runtime directory (XDG_RUNTIME_DIR is unset)")?;
        Ok(Self::new(socket_path))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// One request, one response. Requests are never resent: only the
    /// connection attempt is retried.
    pub async fn call<R>(&self, method: &str, params: Option<Value>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(method, params, RequestId::Number(id));
        let mut payload =
            serde_json::to_vec(&request).context("failed to serialize json-rpc request")?;
        payload.push(b'\n');

        let stream = self.connect().await?;
        let (read_half, mut write_half) = stream.into_split();
        timeout(self.timeout, write_half.write_all(&payload))
            .await
            .context("timed out writing json-rpc request")?
            .context("failed writing json-rpc request to coordinator socket")?;
        timeout(self.timeout, write_half.flush())
            .await
            .context("timed out flushing json-rpc request")?
            .context("failed flushing json-rpc request to coordinator socket")?;

        let mut reader = BufReader::new(read_half);
        let mut response_line = Vec::new();
        timeout(self.timeout, reader.read_until(b'\n', &mut response_line))
            .await
            .context("timed out waiting for json-rpc response")?
            .context("failed reading json-rpc response from coordinator socket")?;

        if response_line.is_empty() {
            anyhow::bail!("coordinator returned an empty json-rpc response");
        }

        let response: Response = serde_json::from_slice(&response_line)
            .context("failed to decode coordinator json-rpc response")?;

        if let Some(error) = response.error {
            return Err(anyhow!(RpcError::from(error)));
        }

        let result = response.result.context("json-rpc response missing `result` field")?;
        serde_json::from_value(result)
            .with_context(|| format!("unexpected result shape for `{method}`"))
    }

    async fn connect(&self) -> Result<UnixStream> {
        match self.connect_once().await {
            Ok(stream) => Ok(stream),
            Err(first_error) if is_unavailable_kind(first_error.kind()) => {
                debug!(%first_error, "coordinator socket not ready, retrying once");
                sleep(CONNECT_RETRY_DELAY).await;
                self.connect_once().await.map_err(|error| {
                    if is_unavailable_kind(error.kind()) {
                        anyhow!(CoordinatorUnavailable {
                            socket_path: self.socket_path.clone(),
                            source: error,
                        })
                    } else {
                        anyhow!(error)
                    }
                })
            }
            Err(error) => Err(anyhow!(error)).with_context(|| {
                format!("failed to connect to coordinator socket `{}`", self.socket_path.display())
            }),
        }
    }

    async fn connect_once(&self) -> io::Result<UnixStream> {
        match timeout(self.timeout, UnixStream::connect(&self.socket_path)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out connecting")),
        }
    }
}

pub fn coordinator_unavailable(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.downcast_ref::<CoordinatorUnavailable>().is_some())
}

fn is_unavailable_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused)
}

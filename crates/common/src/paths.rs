// Well-known per-session endpoint of the coordinator.

use std::path::{Path, PathBuf};

use crate::APP_NAME;

/// JSON-RPC endpoint of the owning instance.
pub const SOCKET_NAME: &str = "kzrnote.sock";
/// Holding an exclusive lock on this file is owning the service name.
pub const LOCK_NAME: &str = "kzrnote.lock";
/// Overrides the socket location (the lock file sits next to it).
pub const SOCKET_ENV: &str = "KZRNOTE_SOCKET";

/// `$XDG_RUNTIME_DIR/kzrnote`, if the session has a runtime directory.
pub fn runtime_dir() -> Option<PathBuf> {
    dirs::runtime_dir().map(|dir| dir.join(APP_NAME))
}

/// Socket path clients connect to: `$KZRNOTE_SOCKET`, else the runtime dir.
pub fn default_socket_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(SOCKET_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    runtime_dir().map(|dir| dir.join(SOCKET_NAME))
}

/// Lock file guarding the endpoint at `socket_path`.
pub fn lock_path_for(socket_path: &Path) -> PathBuf {
    socket_path.with_file_name(LOCK_NAME)
}

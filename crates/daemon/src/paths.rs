// On-disk layout: notes, attic, caches, user config and the session endpoint.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use kzrnote_common::paths::{default_socket_path, lock_path_for, SOCKET_NAME};
use kzrnote_common::APP_NAME;

const ATTIC_DIR: &str = "attic";
const EDITOR_SWAP_DIR: &str = "cache";
const TITLE_LIST_FILE: &str = "notetitles";
const METADATA_FILE: &str = "metadata";
const SETTINGS_FILE: &str = "settings.toml";
const USER_RC_FILE: &str = "user.vim";
const EDITOR_RC_FILE: &str = "kzrnote.vim";

/// Every path the coordinator reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    /// `<data>/kzrnote`: one `<uuid>.note` per note.
    pub notes_dir: PathBuf,
    /// `<notes>/attic`: soft-deleted notes.
    pub attic_dir: PathBuf,
    /// `<cache>/kzrnote`
    pub cache_dir: PathBuf,
    /// Swap/backup directory handed to editors.
    pub editor_swap_dir: PathBuf,
    /// One title per line, read by the editor for completion and links.
    pub title_list_file: PathBuf,
    /// Window geometry records.
    pub metadata_file: PathBuf,
    /// `<config>/kzrnote`
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    /// User editor customisations, sourced after the generated rc file.
    pub user_rc_file: PathBuf,
    /// Editor rc file regenerated before every spawn.
    pub editor_rc_file: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
}

impl AppPaths {
    /// Resolve from the XDG base directories of the current user.
    pub fn resolve() -> Result<Self> {
        let data = dirs::data_dir().context("could not determine the user data directory")?;
        let cache = dirs::cache_dir().context("could not determine the user cache directory")?;
        let config = dirs::config_dir().context("could not determine the user config directory")?;
        let socket_path = default_socket_path()
            .ok_or_else(|| anyhow!("no session runtime directory (XDG_RUNTIME_DIR is unset)"))?;
        Ok(Self::from_roots(&data, &cache, &config, socket_path))
    }

    /// Layout below explicit XDG roots.
    pub fn from_roots(data: &Path, cache: &Path, config: &Path, socket_path: PathBuf) -> Self {
        let notes_dir = data.join(APP_NAME);
        let cache_dir = cache.join(APP_NAME);
        let config_dir = config.join(APP_NAME);
        Self {
            attic_dir: notes_dir.join(ATTIC_DIR),
            editor_swap_dir: cache_dir.join(EDITOR_SWAP_DIR),
            title_list_file: cache_dir.join(TITLE_LIST_FILE),
            metadata_file: cache_dir.join(METADATA_FILE),
            settings_file: config_dir.join(SETTINGS_FILE),
            user_rc_file: config_dir.join(USER_RC_FILE),
            editor_rc_file: config_dir.join(EDITOR_RC_FILE),
            lock_path: lock_path_for(&socket_path),
            socket_path,
            notes_dir,
            cache_dir,
            config_dir,
        }
    }

    /// Self-contained layout under one directory (tests, portable installs).
    pub fn under(root: &Path) -> Self {
        Self::from_roots(
            &root.join("data"),
            &root.join("cache"),
            &root.join("config"),
            root.join("run").join(SOCKET_NAME),
        )
    }

    /// Directory holding the socket and the lock file.
    pub fn runtime_dir(&self) -> &Path {
        self.socket_path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Create the runtime directory, owner-only.
    pub fn ensure_runtime_dir(&self) -> Result<()> {
        let dir = self.runtime_dir();
        create_private_dir(dir)?;
        ensure_owner_only_dir(dir)
    }

    /// Create the notes, cache and config directories.
    pub fn ensure_data_dirs(&self) -> Result<()> {
        for dir in [&self.notes_dir, &self.cache_dir, &self.config_dir] {
            create_private_dir(dir)?;
        }
        Ok(())
    }
}

/// `mkdir -p` with mode 0700. An existing directory is fine; anything else
/// is an error.
pub fn create_private_dir(path: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    match builder.create(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
        Err(error) => {
            Err(error).with_context(|| format!("failed to create directory `{}`", path.display()))
        }
    }
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o700 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

//! Process-wide paths and tunables, gathered into a struct so both binaries
//! can be constructed against a temporary directory in tests instead of the
//! real `/run/fstokend` and `~/.fskeys` locations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::identity::IdentityStore;

/// Default broker-owned runtime directory.
pub const DEFAULT_RUNTIME_DIR: &str = "/run/fstokend";
const CATALOG_FILENAME: &str = "keystore.db";
const SOCKET_FILENAME: &str = "fstokend.sock";

/// Per-frame size cap, enforced before a frame body is read off the socket.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Idle timeout for the Invoke editor round-trip.
pub const DEFAULT_EDITOR_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    pub identity_dir: PathBuf,
    pub catalog_path: PathBuf,
    pub socket_path: PathBuf,
    pub max_frame_bytes: u32,
    pub editor_timeout: Duration,
}

impl Config {
    /// Build a config rooted at the standard system locations
    /// (`~/.fskeys`, `/run/fstokend/keystore.db`, `/run/fstokend/fstokend.sock`).
    pub fn standard() -> Result<Self> {
        Ok(Config {
            identity_dir: IdentityStore::default_dir()?,
            catalog_path: Path::new(DEFAULT_RUNTIME_DIR).join(CATALOG_FILENAME),
            socket_path: Path::new(DEFAULT_RUNTIME_DIR).join(SOCKET_FILENAME),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            editor_timeout: DEFAULT_EDITOR_TIMEOUT,
        })
    }

    /// Build a config rooted entirely under `dir`, for tests and for
    /// `--identity-dir`/`--catalog`/`--socket` overrides.
    pub fn rooted_at(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Config {
            identity_dir: dir.join(".fskeys"),
            catalog_path: dir.join(CATALOG_FILENAME),
            socket_path: dir.join(SOCKET_FILENAME),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            editor_timeout: DEFAULT_EDITOR_TIMEOUT,
        }
    }

    pub fn identity_store(&self) -> IdentityStore {
        IdentityStore::new(self.identity_dir.clone())
    }
}

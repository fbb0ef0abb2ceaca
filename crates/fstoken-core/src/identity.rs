//! Per-user long-lived Ed25519 identity keypair.
//!
//! Persisted under `~/.fskeys` (mode `0700`) as two base64, one-line text
//! files: `x25519.prv` and `x25519.pub` (mode `0600`). The names are kept
//! for compatibility with the original layout; the content is an Ed25519
//! signing seed and its verifying key, not an X25519 keypair — the protocol
//! only needs signatures (§4.1 of the design).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use zeroize::Zeroize;

use crate::crypto::ed25519_keygen;
use crate::error::{FsTokenError, Result};

const DIR_NAME: &str = ".fskeys";
const KEY_NAME: &str = "x25519";

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Manages the per-user identity directory.
pub struct IdentityStore {
    dir: PathBuf,
}

impl IdentityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        IdentityStore { dir: dir.into() }
    }

    /// The default `~/.fskeys` location.
    pub fn default_dir() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| FsTokenError::wrap_unexpected("cannot determine home directory"))?;
        Ok(home.join(DIR_NAME))
    }

    fn prv_path(&self) -> PathBuf {
        self.dir.join(format!("{KEY_NAME}.prv"))
    }

    fn pub_path(&self) -> PathBuf {
        self.dir.join(format!("{KEY_NAME}.pub"))
    }

    fn log(message: &str, verbose: bool) {
        if verbose {
            println!("{message}");
        }
    }

    /// Ensure the identity directory and both key files exist, generating a
    /// fresh keypair only if either file is missing or empty. Idempotent.
    pub fn init(&self, verbose: bool) -> Result<()> {
        Self::log(&format!("checking for {DIR_NAME} existence"), verbose);
        if !self.dir.exists() {
            Self::log(&format!("creating {DIR_NAME}"), verbose);
            fs::create_dir_all(&self.dir)?;
            set_mode(&self.dir, 0o700)?;
        }

        Self::log("checking for key existence", verbose);
        let need_keygen = !file_nonempty(&self.prv_path()) || !file_nonempty(&self.pub_path());

        if need_keygen {
            Self::log("generating keys", verbose);
            let seed = ed25519_keygen();
            let verify_key = ed25519_dalek::SigningKey::from_bytes(&seed).verifying_key();

            write_key_file(&self.prv_path(), &seed)?;
            write_key_file(&self.pub_path(), verify_key.as_bytes())?;
        }

        Ok(())
    }

    /// Verify the identity directory and both key files exist and are
    /// non-empty. Fails with `NotInitialized` otherwise.
    pub fn check(&self) -> Result<()> {
        if !self.dir.exists() {
            return Err(FsTokenError::NotInitialized);
        }
        if !file_nonempty(&self.prv_path()) || !file_nonempty(&self.pub_path()) {
            return Err(FsTokenError::NotInitialized);
        }
        Ok(())
    }

    /// Load the raw 32-byte signing seed and 32-byte verifying key.
    pub fn load(&self) -> Result<([u8; 32], [u8; 32])> {
        self.check()?;
        let seed = read_key_file(&self.prv_path())?;
        let public = read_key_file(&self.pub_path())?;
        Ok((seed, public))
    }
}

fn file_nonempty(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

fn write_key_file(path: &Path, raw: &[u8]) -> Result<()> {
    // Touch with restrictive permissions before writing content so the key
    // is never briefly world/group readable under a default umask.
    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        set_mode(path, 0o600)?;
        file.write_all(B64.encode(raw).as_bytes())?;
    }
    Ok(())
}

fn read_key_file(path: &Path) -> Result<[u8; 32]> {
    let content = fs::read_to_string(path)?;
    let line = content.lines().next().unwrap_or("").trim();
    let mut decoded = B64
        .decode(line)
        .map_err(|e| FsTokenError::wrap_unexpected(format!("invalid base64 key file: {e}")))?;
    let key: Result<[u8; 32]> = decoded
        .as_slice()
        .try_into()
        .map_err(|_| FsTokenError::wrap_unexpected("key file did not contain 32 bytes"));
    // The decode buffer momentarily holds both keys (signing seed and
    // verifying key) as it's read; scrub it regardless of which one this
    // was so a seed never lingers in a reused allocation.
    decoded.zeroize();
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join(".fskeys"));
        store.init(false).unwrap();
        let (seed1, pub1) = store.load().unwrap();

        store.init(false).unwrap();
        let (seed2, pub2) = store.load().unwrap();

        assert_eq!(seed1, seed2);
        assert_eq!(pub1, pub2);
    }

    #[test]
    fn check_fails_before_init() {
        let dir = tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join(".fskeys"));
        assert!(matches!(store.check(), Err(FsTokenError::NotInitialized)));
    }

    #[cfg(unix)]
    #[test]
    fn key_files_get_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join(".fskeys"));
        store.init(false).unwrap();
        let mode = fs::metadata(store.prv_path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let dir_mode = fs::metadata(&store.dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);
    }
}

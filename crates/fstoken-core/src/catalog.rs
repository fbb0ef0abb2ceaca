//! The broker's table of tracked files: absolute path, whether it is
//! currently encrypted at rest, and its 32-byte symmetric key.
//!
//! Persisted as a flat TSV file (`path \t enc_flag \t base64_key \n`), read
//! whole into memory once at startup and rewritten whole on every mutation
//! — there is no append log or incremental update. This mirrors
//! `Keystore.create`/`Keystore.load` in the original implementation's
//! `fskeys.py`, which took the same "small table, rewrite on write" shortcut
//! rather than reaching for an embedded database.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use tempfile::NamedTempFile;

use crate::crypto::secretbox_keygen;
use crate::error::{FsTokenError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub encrypted: bool,
    pub key: [u8; 32],
}

/// The in-memory catalog, guarded by the broker behind a `tokio::sync::Mutex`
/// (see `fstoken-broker`'s connection handler) since every mutation rewrites
/// the backing file and must not interleave with a concurrent mutation.
pub struct Catalog {
    path: PathBuf,
    entries: HashMap<String, CatalogEntry>,
}

impl Catalog {
    /// Load the catalog from `path`, creating an empty one (mode `0600`) if
    /// it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, b"")?;
            set_mode(&path, 0o600)?;
        }

        let raw = fs::read_to_string(&path)?;
        let mut entries = HashMap::new();
        for line in raw.lines() {
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                // Can't correspond to any valid entry; drop it rather than
                // refuse to start the broker over one bad or legacy line.
                continue;
            }
            let encrypted = match fields[1] {
                "1" => true,
                "0" => false,
                _ => continue,
            };
            let Ok(key_bytes) = B64.decode(fields[2]) else {
                continue;
            };
            let Ok(key) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
                continue;
            };
            entries.insert(fields[0].to_string(), CatalogEntry { encrypted, key });
        }

        Ok(Catalog { path, entries })
    }

    fn persist(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| FsTokenError::wrap_unexpected("catalog path has no parent"))?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        for (path, entry) in &self.entries {
            writeln!(
                tmp,
                "{}\t{}\t{}",
                path,
                if entry.encrypted { 1 } else { 0 },
                B64.encode(entry.key),
            )?;
        }
        tmp.flush()?;
        tmp.persist(&self.path)
            .map_err(|e| FsTokenError::wrap_unexpected(e.to_string()))?;
        set_mode(&self.path, 0o600)?;
        Ok(())
    }

    pub fn lookup(&self, path: &str) -> Option<CatalogEntry> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Register a new file under a freshly generated key. Fails if `path`
    /// is already tracked — callers should `lookup` first.
    pub fn add(&mut self, path: &str, encrypt: bool) -> Result<CatalogEntry> {
        if self.entries.contains_key(path) {
            return Err(FsTokenError::wrap_unexpected(format!(
                "{path} is already tracked"
            )));
        }
        let entry = CatalogEntry {
            encrypted: encrypt,
            key: secretbox_keygen(),
        };
        self.entries.insert(path.to_string(), entry);
        self.persist()?;
        Ok(entry)
    }

    /// Replace `path`'s key with a freshly generated one, implicitly
    /// revoking every token minted against the old key. The file's
    /// encrypted-at-rest flag is left unchanged; the caller is responsible
    /// for re-enciphering the file content under the new key if needed.
    pub fn rotate(&mut self, path: &str) -> Result<CatalogEntry> {
        let existing = self
            .entries
            .get(path)
            .copied()
            .ok_or_else(|| FsTokenError::NotFound(path.to_string()))?;
        let entry = CatalogEntry {
            encrypted: existing.encrypted,
            key: secretbox_keygen(),
        };
        self.entries.insert(path.to_string(), entry);
        self.persist()?;
        Ok(entry)
    }

    /// Update `path`'s encrypted-at-rest flag in place, leaving the key
    /// untouched. Callers are responsible for actually enciphering or
    /// deciphering the file content to match before calling this.
    pub fn set_encrypted(&mut self, path: &str, encrypted: bool) -> Result<CatalogEntry> {
        let existing = self
            .entries
            .get(path)
            .copied()
            .ok_or_else(|| FsTokenError::NotFound(path.to_string()))?;
        let entry = CatalogEntry {
            encrypted,
            key: existing.key,
        };
        self.entries.insert(path.to_string(), entry);
        self.persist()?;
        Ok(entry)
    }

    /// Remove `path` from the catalog entirely.
    pub fn delete(&mut self, path: &str) -> Result<()> {
        if self.entries.remove(path).is_none() {
            return Err(FsTokenError::NotFound(path.to_string()));
        }
        self.persist()
    }
}

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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_then_lookup_round_trips() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path().join("keystore.db")).unwrap();
        let entry = cat.add("/tmp/a", true).unwrap();
        assert_eq!(cat.lookup("/tmp/a"), Some(entry));
    }

    #[test]
    fn add_duplicate_path_fails() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path().join("keystore.db")).unwrap();
        cat.add("/tmp/a", false).unwrap();
        assert!(cat.add("/tmp/a", false).is_err());
    }

    #[test]
    fn rotate_changes_key_but_not_encrypted_flag() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path().join("keystore.db")).unwrap();
        let before = cat.add("/tmp/a", true).unwrap();
        let after = cat.rotate("/tmp/a").unwrap();
        assert_ne!(before.key, after.key);
        assert_eq!(after.encrypted, true);
    }

    #[test]
    fn delete_removes_entry() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path().join("keystore.db")).unwrap();
        cat.add("/tmp/a", false).unwrap();
        cat.delete("/tmp/a").unwrap();
        assert!(cat.lookup("/tmp/a").is_none());
    }

    #[test]
    fn delete_missing_path_fails() {
        let dir = tempdir().unwrap();
        let mut cat = Catalog::open(dir.path().join("keystore.db")).unwrap();
        assert!(matches!(cat.delete("/tmp/nope"), Err(FsTokenError::NotFound(_))));
    }

    #[test]
    fn reopen_reloads_persisted_entries() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("keystore.db");
        {
            let mut cat = Catalog::open(&db_path).unwrap();
            cat.add("/tmp/a", true).unwrap();
        }
        let cat2 = Catalog::open(&db_path).unwrap();
        assert!(cat2.contains("/tmp/a"));
    }

    #[test]
    fn open_skips_malformed_lines_instead_of_failing() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("keystore.db");
        let good_key = B64.encode(secretbox_keygen());
        fs::write(
            &db_path,
            format!(
                "/tmp/only-two-fields\t1\n\
                 /tmp/bad-flag\t9\t{good_key}\n\
                 /tmp/bad-base64\t0\tnot-base64!!\n\
                 /tmp/short-key\t0\t{}\n\
                 /tmp/a\t0\t{good_key}\n",
                B64.encode([1u8; 16]),
            ),
        )
        .unwrap();

        let cat = Catalog::open(&db_path).unwrap();
        assert!(cat.contains("/tmp/a"));
        assert!(!cat.contains("/tmp/only-two-fields"));
        assert!(!cat.contains("/tmp/bad-flag"));
        assert!(!cat.contains("/tmp/bad-base64"));
        assert!(!cat.contains("/tmp/short-key"));
    }
}

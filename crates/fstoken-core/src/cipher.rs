//! Whole-file symmetric encryption for catalog-tracked files.
//!
//! Files are treated as single blobs (no chunking): the broker reads the
//! entire file, seals or opens it in memory, then rewrites it in place.
//! This mirrors the read/truncate/write idiom of the original
//! implementation's `File._rewrite_file` helper.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::crypto::{secretbox_open, secretbox_seal};
use crate::error::Result;

fn rewrite_file(path: &Path, transform: impl FnOnce(&[u8]) -> Result<Vec<u8>>) -> Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;

    let rewritten = transform(&content)?;

    file.seek(SeekFrom::Start(0))?;
    file.set_len(0)?;
    file.write_all(&rewritten)?;
    file.sync_all()?;
    Ok(())
}

/// Encrypt `path` in place under `key`. The file's plaintext bytes are
/// replaced with `secretbox_seal(key, plaintext)`.
pub fn encrypt_in_place(path: &Path, key: &[u8; 32]) -> Result<()> {
    rewrite_file(path, |plaintext| secretbox_seal(key, plaintext))
}

/// Decrypt `path` in place under `key`. Fails with `AuthFailed` if the
/// file's content is not valid ciphertext under `key`.
pub fn decrypt_in_place(path: &Path, key: &[u8; 32]) -> Result<()> {
    rewrite_file(path, |ciphertext| secretbox_open(key, ciphertext))
}

/// Decrypt `path` to memory without touching the on-disk ciphertext, for
/// delivering content to Invoke.
pub fn decrypt_to_memory(path: &Path, key: &[u8; 32]) -> Result<Vec<u8>> {
    let mut file = OpenOptions::new().read(true).open(path)?;
    let mut ciphertext = Vec::new();
    file.read_to_end(&mut ciphertext)?;
    secretbox_open(key, &ciphertext)
}

/// Read `path` as plaintext (no decryption), for Invoke on unencrypted
/// catalog entries.
pub fn read_plain(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}

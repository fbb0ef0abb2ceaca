//! Narrow cryptographic capability set consumed by the rest of the crate.
//!
//! Nothing outside this module touches `ed25519_dalek`, `xsalsa20poly1305`
//! or `sha2` directly — every other module goes through the functions here,
//! so the primitive stack can be swapped without touching the token codec,
//! the catalog, or the file cipher.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use xsalsa20poly1305::{
    aead::{Aead, KeyInit},
    Nonce, XSalsa20Poly1305,
};

use crate::error::{FsTokenError, Result};

pub const SECRETBOX_KEY_LEN: usize = 32;
const SECRETBOX_NONCE_LEN: usize = 24;

/// Sign `msg` with the Ed25519 key derived from `seed` (32 raw bytes).
///
/// Returns `(verify_key, msg, signature)` — `msg` is returned unchanged so
/// that call sites can build the dot-joined token string without holding
/// onto a separate copy of the payload bytes.
pub fn ed25519_sign(seed: &[u8; 32], msg: &[u8]) -> ([u8; 32], Vec<u8>, [u8; 64]) {
    let signing_key = SigningKey::from_bytes(seed);
    let verify_key = signing_key.verifying_key();
    let sig: Signature = signing_key.sign(msg);
    (verify_key.to_bytes(), msg.to_vec(), sig.to_bytes())
}

/// Verify an Ed25519 signature produced by [`ed25519_sign`].
pub fn ed25519_verify(vk: &[u8], msg: &[u8], sig: &[u8]) -> Result<()> {
    let vk: [u8; 32] = vk
        .try_into()
        .map_err(|_| FsTokenError::SignatureInvalid)?;
    let sig: [u8; 64] = sig
        .try_into()
        .map_err(|_| FsTokenError::SignatureInvalid)?;
    let verify_key =
        VerifyingKey::from_bytes(&vk).map_err(|_| FsTokenError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&sig);
    verify_key
        .verify(msg, &signature)
        .map_err(|_| FsTokenError::SignatureInvalid)
}

/// Generate a random signing seed for a fresh identity keypair.
pub fn ed25519_keygen() -> [u8; 32] {
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}

/// Generate a fresh 32-byte symmetric catalog key.
pub fn secretbox_keygen() -> [u8; SECRETBOX_KEY_LEN] {
    let mut key = [0u8; SECRETBOX_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

/// Authenticated-encrypt `plaintext` under `key`. The returned ciphertext is
/// nonce-prefixed: the first 24 bytes are a random nonce, the rest is the
/// XSalsa20-Poly1305 sealed box.
pub fn secretbox_seal(key: &[u8; SECRETBOX_KEY_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new_from_slice(key)
        .map_err(|_| FsTokenError::wrap_unexpected("invalid secretbox key length"))?;
    let mut nonce_bytes = [0u8; SECRETBOX_NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut sealed = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| FsTokenError::wrap_unexpected("secretbox seal failed"))?;
    let mut out = Vec::with_capacity(SECRETBOX_NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce_bytes);
    out.append(&mut sealed);
    Ok(out)
}

/// Inverse of [`secretbox_seal`]. Fails with `AuthFailed` if `ciphertext` is
/// not valid, nonce-prefixed ciphertext under `key`.
pub fn secretbox_open(key: &[u8; SECRETBOX_KEY_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < SECRETBOX_NONCE_LEN {
        return Err(FsTokenError::AuthFailed);
    }
    let cipher = XSalsa20Poly1305::new_from_slice(key)
        .map_err(|_| FsTokenError::wrap_unexpected("invalid secretbox key length"))?;
    let (nonce_bytes, sealed) = ciphertext.split_at(SECRETBOX_NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    cipher
        .decrypt(nonce, sealed)
        .map_err(|_| FsTokenError::AuthFailed)
}

/// SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let seed = ed25519_keygen();
        let (vk, msg, sig) = ed25519_sign(&seed, b"hello fstoken");
        assert!(ed25519_verify(&vk, &msg, &sig).is_ok());
    }

    #[test]
    fn tampered_signature_fails() {
        let seed = ed25519_keygen();
        let (vk, msg, mut sig) = ed25519_sign(&seed, b"hello fstoken");
        sig[0] ^= 0x80;
        assert!(matches!(
            ed25519_verify(&vk, &msg, &sig),
            Err(FsTokenError::SignatureInvalid)
        ));
    }

    #[test]
    fn secretbox_round_trips() {
        let key = secretbox_keygen();
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        let ciphertext = secretbox_seal(&key, plaintext).unwrap();
        let opened = secretbox_open(&key, &ciphertext).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn secretbox_wrong_key_fails() {
        let key = secretbox_keygen();
        let other = secretbox_keygen();
        let ciphertext = secretbox_seal(&key, b"secret").unwrap();
        assert!(matches!(
            secretbox_open(&other, &ciphertext),
            Err(FsTokenError::AuthFailed)
        ));
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"abc"), sha256(b"abc"));
        assert_ne!(sha256(b"abc"), sha256(b"abd"));
    }
}

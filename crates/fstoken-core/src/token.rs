//! Capability token format, signing, and delegation-chain validation.
//!
//! A token is three dot-joined base64 segments: `issuer_verify_key .
//! payload . signature`. The payload binds the token to the *current*
//! value of a file's symmetric key through a designator hash, so rotating
//! the key revokes every token issued against the old one — there is no
//! separate revocation list.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::crypto::{ed25519_sign, ed25519_verify, sha256};
use crate::error::{FsTokenError, Result};
use crate::grant::Grant;

/// Delegation chains are bounded to prevent unbounded recursion (and thus
/// denial-of-service) via a crafted `proof` list.
pub const MAX_PROOF_DEPTH: usize = 16;

/// The signed payload of a token, as it travels over the wire (inside the
/// base64 middle segment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    pub file_designator: String,
    pub subject: String,
    pub proof: Vec<String>,
}

/// The inputs needed to mint a new token, before normalization/hashing.
pub struct RawPayload {
    pub file_key: [u8; 32],
    pub grant: String,
    pub subject: String,
    pub proof: Vec<String>,
}

fn designator_for(file_key: &[u8; 32], grant: Grant) -> String {
    let mut preimage = Vec::with_capacity(32 + 1 + grant.repr().len());
    preimage.extend_from_slice(file_key);
    preimage.push(b'.');
    preimage.extend_from_slice(grant.repr().as_bytes());
    B64.encode(sha256(&preimage))
}

/// Mint a token: sign `raw` (after grant normalization and designator
/// derivation) with the issuer's Ed25519 seed.
pub fn encode(signer_seed: &[u8; 32], raw: RawPayload) -> Result<String> {
    let grant = Grant::parse(&raw.grant)?;
    let file_designator = designator_for(&raw.file_key, grant);

    let payload = TokenPayload {
        file_designator,
        subject: raw.subject,
        proof: raw.proof,
    };

    let payload_bytes = postcard::to_allocvec(&payload)
        .map_err(|e| FsTokenError::MalformedPayload(e.to_string()))?;

    let (verify_key, message, signature) = ed25519_sign(signer_seed, &payload_bytes);

    Ok(format!(
        "{}.{}.{}",
        B64.encode(verify_key),
        B64.encode(message),
        B64.encode(signature),
    ))
}

/// Split a token string into its three raw (base64-decoded) segments
/// without verifying the signature. Fails with `MalformedToken` unless the
/// string has exactly three dot-separated segments that are all valid
/// base64 of the expected lengths.
fn decode_raw(token: &str) -> Result<([u8; 32], Vec<u8>, [u8; 64])> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(FsTokenError::MalformedToken(format!(
            "expected 3 segments, got {}",
            parts.len()
        )));
    }

    let vk_bytes = B64
        .decode(parts[0])
        .map_err(|e| FsTokenError::MalformedToken(e.to_string()))?;
    let payload_bytes = B64
        .decode(parts[1])
        .map_err(|e| FsTokenError::MalformedToken(e.to_string()))?;
    let sig_bytes = B64
        .decode(parts[2])
        .map_err(|e| FsTokenError::MalformedToken(e.to_string()))?;

    let vk: [u8; 32] = vk_bytes
        .try_into()
        .map_err(|_| FsTokenError::MalformedToken("verify key is not 32 bytes".into()))?;
    let sig: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| FsTokenError::MalformedToken("signature is not 64 bytes".into()))?;

    Ok((vk, payload_bytes, sig))
}

/// Decode a token into its verify key, parsed payload, and signature,
/// without checking the signature or doing any grant matching.
pub fn decode(token: &str) -> Result<([u8; 32], TokenPayload, [u8; 64])> {
    let (vk, payload_bytes, sig) = decode_raw(token)?;
    let payload: TokenPayload = postcard::from_bytes(&payload_bytes)
        .map_err(|e| FsTokenError::MalformedPayload(e.to_string()))?;
    Ok((vk, payload, sig))
}

/// Validate `token` against the current `file_key`, returning the
/// authorized grant.
///
/// `carried_grant` is the grant the caller already holds, used only for
/// the degenerate case where `token` itself is the empty string (no token
/// supplied) — a root invocation passes `None` here, which fails unless a
/// token was actually provided.
pub fn validate(token: &str, carried_grant: Option<Grant>, file_key: &[u8; 32]) -> Result<Grant> {
    let mut seen = HashSet::new();
    validate_inner(token, carried_grant, file_key, 0, &mut seen)
}

fn validate_inner(
    token: &str,
    carried_grant: Option<Grant>,
    file_key: &[u8; 32],
    depth: usize,
    seen: &mut HashSet<[u8; 32]>,
) -> Result<Grant> {
    if token.is_empty() {
        return carried_grant
            .ok_or_else(|| FsTokenError::MalformedToken("no token provided".into()));
    }

    if depth >= MAX_PROOF_DEPTH {
        return Err(FsTokenError::ProofTooDeep);
    }

    let digest = sha256(token.as_bytes());
    if !seen.insert(digest) {
        // A token that reappears in its own proof chain (directly or via a
        // cycle) can never terminate the walk legitimately.
        return Err(FsTokenError::ProofTooDeep);
    }

    let (vk, payload_bytes, sig) = decode_raw(token)?;
    ed25519_verify(&vk, &payload_bytes, &sig)?;

    let payload: TokenPayload = postcard::from_bytes(&payload_bytes)
        .map_err(|e| FsTokenError::MalformedPayload(e.to_string()))?;

    let authorized_grant = Grant::ALL
        .into_iter()
        .find(|g| designator_for(file_key, *g) == payload.file_designator)
        .ok_or(FsTokenError::GrantMismatch)?;

    // Walk the proof chain purely to confirm every ancestor is itself
    // legitimate; the grant this call reports is always this token's own
    // authorized grant, not an ancestor's — a delegation narrows, it never
    // widens, and the token actually being presented is the authority.
    if let Some(next) = payload.proof.iter().find(|t| t.as_str() != token) {
        validate_inner(next, Some(authorized_grant), file_key, depth + 1, seen)?;
    }

    Ok(authorized_grant)
}

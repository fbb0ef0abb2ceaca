//! The four operations, each split into an unprivileged `prepare` step (run
//! by the client, in its own security context) and a privileged `execute`
//! step (run by the broker, which owns the catalog and the identity seed
//! used for signing).
//!
//! Wire serialization is this tagged enum plus a `broker_may_access` flag
//! carried alongside it — never a pickled closure or anything
//! code-bearing; `execute` rejects any request whose flag is false before
//! looking at the variant at all.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::acl::BrokerAcl;
use crate::catalog::Catalog;
use crate::cipher;
use crate::error::{FsTokenError, Result};
use crate::message::Payload;
use crate::token::{self, RawPayload};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    Add {
        path: String,
        encrypt: bool,
        rotate: bool,
    },
    Delete {
        path: String,
    },
    Delegate {
        path: String,
        encrypt: bool,
        rotate: bool,
        grant: String,
        subject: String,
        token: String,
    },
    Invoke {
        path: String,
        token: String,
    },
}

/// The request as it travels over the wire: the operation itself, plus the
/// outcome of the client's unprivileged `prepare` step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: Operation,
    pub broker_may_access: bool,
}

impl Operation {
    pub fn path(&self) -> &str {
        match self {
            Operation::Add { path, .. }
            | Operation::Delete { path }
            | Operation::Delegate { path, .. }
            | Operation::Invoke { path, .. } => path,
        }
    }

    /// Unprivileged step: grant or revoke the broker's host ACL on the
    /// target path. Invoke requires no host ACL change, since it performs
    /// no new filesystem access beyond what the catalog already tracks.
    ///
    /// Delete revokes *before* returning so that even if the privileged
    /// step that follows fails, the ACL is never left stuck granted.
    pub fn prepare(&self, acl: &dyn BrokerAcl) -> Result<bool> {
        match self {
            Operation::Add { path, .. } | Operation::Delegate { path, .. } => {
                acl.grant(path)?;
                Ok(true)
            }
            Operation::Delete { path } => {
                acl.revoke(path)?;
                Ok(true)
            }
            Operation::Invoke { .. } => Ok(true),
        }
    }

    pub fn into_request(self, broker_may_access: bool) -> OperationRequest {
        OperationRequest {
            operation: self,
            broker_may_access,
        }
    }

    /// Privileged step, run inside the broker with exclusive access to the
    /// catalog. `identity_seed` is the broker-held signing seed used to
    /// mint Delegate tokens.
    pub fn execute(
        &self,
        broker_may_access: bool,
        catalog: &mut Catalog,
        identity_seed: &[u8; 32],
    ) -> Result<Payload> {
        if !broker_may_access {
            return Err(FsTokenError::NotAllowed);
        }
        match self {
            Operation::Add { path, encrypt, rotate } => {
                let key = execute_add(catalog, path, *encrypt, *rotate)?;
                Ok(Payload::Key(key))
            }
            Operation::Delete { path } => {
                execute_delete(catalog, path)?;
                Ok(Payload::Empty)
            }
            Operation::Delegate {
                path,
                encrypt,
                rotate,
                grant,
                subject,
                token,
            } => {
                let minted = execute_delegate(
                    catalog,
                    identity_seed,
                    path,
                    *encrypt,
                    *rotate,
                    grant,
                    subject,
                    token,
                )?;
                Ok(Payload::Token(minted))
            }
            Operation::Invoke { path, token } => execute_invoke(catalog, path, token),
        }
    }
}

/// Shared by `Add` and `Delegate`: reconcile the catalog entry for `path`
/// against the requested `encrypt`/`rotate` flags and return the resulting
/// (possibly freshly rotated) key. Any prior ciphertext is decrypted
/// before the key changes under it; any requested encryption is applied
/// with the final key, after rotation.
fn execute_add(catalog: &mut Catalog, path: &str, encrypt: bool, rotate: bool) -> Result<[u8; 32]> {
    let existing = catalog.lookup(path);
    let target = Path::new(path);

    if let Some(entry) = existing {
        if entry.encrypted {
            cipher::decrypt_in_place(target, &entry.key)?;
        }
    }

    let entry = match existing {
        Some(_) if rotate => catalog.rotate(path)?,
        Some(entry) => entry,
        None => catalog.add(path, encrypt)?,
    };

    if encrypt {
        cipher::encrypt_in_place(target, &entry.key)?;
    }

    if existing.is_some() {
        catalog.set_encrypted(path, encrypt)?;
    }

    Ok(entry.key)
}

fn execute_delete(catalog: &mut Catalog, path: &str) -> Result<()> {
    let entry = catalog
        .lookup(path)
        .ok_or_else(|| FsTokenError::NotFound(path.to_string()))?;
    if entry.encrypted {
        cipher::decrypt_in_place(Path::new(path), &entry.key)?;
    }
    catalog.delete(path)
}

#[allow(clippy::too_many_arguments)]
fn execute_delegate(
    catalog: &mut Catalog,
    identity_seed: &[u8; 32],
    path: &str,
    encrypt: bool,
    rotate: bool,
    grant: &str,
    subject: &str,
    proof_token: &str,
) -> Result<String> {
    let file_key = execute_add(catalog, path, encrypt, rotate)?;
    let proof = if proof_token.is_empty() {
        vec![]
    } else {
        vec![proof_token.to_string()]
    };
    token::encode(
        identity_seed,
        RawPayload {
            file_key,
            grant: grant.to_string(),
            subject: subject.to_string(),
            proof,
        },
    )
}

fn execute_invoke(catalog: &Catalog, path: &str, proof_token: &str) -> Result<Payload> {
    let entry = catalog
        .lookup(path)
        .ok_or_else(|| FsTokenError::NotFound(path.to_string()))?;
    let grant = token::validate(proof_token, None, &entry.key)?;

    let content = if entry.encrypted {
        cipher::decrypt_to_memory(Path::new(path), &entry.key)?
    } else {
        cipher::read_plain(Path::new(path))?
    };

    Ok(Payload::FileContent {
        path: path.to_string(),
        content,
        grant: grant.to_string(),
    })
}

/// Apply the Invoke follow-up: the client's edited content, written back
/// under the same key, re-encrypting if the entry is encrypted.
pub fn apply_invoke_followup(catalog: &Catalog, path: &str, new_content: &[u8]) -> Result<()> {
    let entry = catalog
        .lookup(path)
        .ok_or_else(|| FsTokenError::NotFound(path.to_string()))?;
    if entry.encrypted {
        let ciphertext = crate::crypto::secretbox_seal(&entry.key, new_content)?;
        std::fs::write(path, ciphertext)?;
    } else {
        std::fs::write(path, new_content)?;
    }
    Ok(())
}

//! Pure selection of the operation variant from parsed CLI inputs. No I/O
//! happens here — this is the part of the client that's cheap to unit
//! test without a broker or a filesystem.

use fstoken_core::error::{FsTokenError, Result};
use fstoken_core::operation::Operation;

#[derive(Debug, Clone, Default)]
pub struct OpInputs {
    pub path: String,
    pub encrypt: bool,
    pub rotate: bool,
    pub delete: bool,
    pub grant: Option<String>,
    pub subject: Option<String>,
    pub token: Option<String>,
}

/// `delete` wins the delete/delegate tie-break; `grant && subject` ⇒
/// Delegate; a bare `token` ⇒ Invoke; anything else ⇒ Add.
pub fn select(inputs: OpInputs) -> Operation {
    if inputs.delete {
        return Operation::Delete { path: inputs.path };
    }
    if let (Some(grant), Some(subject)) = (&inputs.grant, &inputs.subject) {
        return Operation::Delegate {
            path: inputs.path,
            encrypt: inputs.encrypt,
            rotate: inputs.rotate,
            grant: grant.clone(),
            subject: subject.clone(),
            token: inputs.token.clone().unwrap_or_default(),
        };
    }
    if let Some(token) = inputs.token {
        return Operation::Invoke {
            path: inputs.path,
            token,
        };
    }
    Operation::Add {
        path: inputs.path,
        encrypt: inputs.encrypt,
        rotate: inputs.rotate,
    }
}

/// Resolve `raw_path` to an absolute, symlink-followed form.
pub fn resolve_path(raw_path: &str) -> Result<String> {
    let canonical = std::fs::canonicalize(raw_path)
        .map_err(|_| FsTokenError::FileNotFound(raw_path.to_string()))?;
    canonical
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| FsTokenError::FileNotFound(raw_path.to_string()))
}

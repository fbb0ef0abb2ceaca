//! Host filesystem ACL manipulation, consumed as a small opaque interface.
//!
//! Granting or revoking the broker's access to a target file is the one
//! piece of the unprivileged step that genuinely requires touching
//! host-specific state outside this crate's own files and sockets. It is
//! modeled as a trait so tests can swap in a recording stub instead of
//! shelling out to `setfacl`.

use std::process::Command;

use crate::error::{FsTokenError, Result};

/// Grants or revokes the broker principal's access to a path.
pub trait BrokerAcl: Send + Sync {
    fn grant(&self, path: &str) -> Result<()>;
    fn revoke(&self, path: &str) -> Result<()>;
}

/// Shells out to `setfacl` to grant/revoke read-write access for a named
/// group (typically the group the broker daemon runs as).
pub struct SetfaclAcl {
    pub broker_group: String,
}

impl SetfaclAcl {
    pub fn new(broker_group: impl Into<String>) -> Self {
        SetfaclAcl {
            broker_group: broker_group.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<()> {
        let status = Command::new("setfacl")
            .args(args)
            .status()
            .map_err(|e| FsTokenError::PermissionDenied(format!("setfacl: {e}")))?;
        if !status.success() {
            return Err(FsTokenError::PermissionDenied(format!(
                "setfacl exited with {status}"
            )));
        }
        Ok(())
    }
}

impl BrokerAcl for SetfaclAcl {
    fn grant(&self, path: &str) -> Result<()> {
        self.run(&["-m", &format!("g:{}:rw", self.broker_group), path])
    }

    fn revoke(&self, path: &str) -> Result<()> {
        self.run(&["-x", &format!("g:{}", self.broker_group), path])
    }
}

/// Always succeeds and does nothing, for broker-side execution (which
/// never runs `prepare` itself) and for single-user test environments
/// where there is no ACL to manipulate.
pub struct NoopAcl;

impl BrokerAcl for NoopAcl {
    fn grant(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    fn revoke(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

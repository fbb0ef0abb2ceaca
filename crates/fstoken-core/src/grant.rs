use serde::{Deserialize, Serialize};

use crate::error::{FsTokenError, Result};

/// A capability grant level. Comparison and hashing always go through the
/// canonical representation ([`Grant::repr`]), never the user-facing
/// spelling a caller typed on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grant {
    Read,
    ReadWrite,
}

impl Grant {
    /// The complete enumeration, in the order designator candidates are
    /// tried during validation.
    pub const ALL: [Grant; 2] = [Grant::Read, Grant::ReadWrite];

    /// Normalize a user-supplied grant string into a [`Grant`].
    ///
    /// Accepts (case-insensitively): `r`, `read` for [`Grant::Read`]; `rw`,
    /// `read/write`, `write` for [`Grant::ReadWrite`]. Anything else is
    /// rejected with `BadGrant` — this MUST stay in sync with the original
    /// enumeration, since the designator hash binds to `repr()`, not to the
    /// spelling a caller used.
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "r" | "read" => Ok(Grant::Read),
            "rw" | "read/write" | "write" => Ok(Grant::ReadWrite),
            other => Err(FsTokenError::BadGrant(other.to_string())),
        }
    }

    /// The canonical representation fed into the designator hash. Stable
    /// across versions by contract — never change these strings.
    pub fn repr(&self) -> &'static str {
        match self {
            Grant::Read => "r",
            Grant::ReadWrite => "a",
        }
    }
}

impl std::fmt::Display for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.repr())
    }
}

use thiserror::Error;

/// Stable error taxonomy shared by the client and the broker.
///
/// Every variant here is part of the wire contract: the broker formats one
/// of these into `Message::err` and the client matches on the string it
/// gets back only for display, never for control flow — control flow stays
/// local to whichever side raised the error.
#[derive(Debug, Error)]
pub enum FsTokenError {
    #[error("identity directory or keys missing/empty; run `fstoken init` first")]
    NotInitialized,

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("no catalog entry for: {0}")]
    NotFound(String),

    #[error("operation not allowed (unprivileged precondition not met)")]
    NotAllowed,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame truncated before the advertised length was read")]
    IoTruncated,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown grant: {0}")]
    BadGrant(String),

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("authenticated decryption failed")]
    AuthFailed,

    #[error("designator does not match the current key under any grant")]
    GrantMismatch,

    #[error("delegation chain exceeds the maximum proof depth")]
    ProofTooDeep,

    #[error("could not connect to the fstoken broker")]
    ConnectRefused,

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl FsTokenError {
    /// Collapse any error into the `Unexpected` variant with a formatted
    /// trace, the way the broker must never let an exception escape to the
    /// client as anything but a `Message.err` string.
    pub fn wrap_unexpected(err: impl std::fmt::Display) -> Self {
        FsTokenError::Unexpected(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FsTokenError>;

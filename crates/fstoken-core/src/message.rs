//! Wire format for the client-broker Unix socket protocol: a 4-byte
//! big-endian length prefix followed by a postcard-serialized [`Message`].
//!
//! Postcard was picked (matching the rest of the crate's wire encoding) for
//! its compact, self-describing `derive(Serialize, Deserialize)` encoding
//! with no schema negotiation required between the two binaries, which
//! always ship from the same workspace.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{FsTokenError, Result};

/// Every request/response exchanged over the socket. A single logical
/// operation may involve more than one `Message` in each direction — Invoke
/// sends a request, gets a response carrying file content, and then (for a
/// read/write grant) sends a follow-up `Message` carrying the edited
/// content back to the broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub payload: Payload,
    /// Set by the broker on failure; `payload` is meaningless when this is
    /// `Some`.
    pub err: Option<String>,
    /// When true, the client should not print `payload` to the terminal
    /// (used for the Invoke response, whose content the client writes to a
    /// temp file instead of stdout).
    pub hide_payload: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Payload {
    /// No meaningful content (Delete acknowledgement).
    Empty,
    /// A newly minted or echoed-back capability token.
    Token(String),
    /// A raw symmetric file key, returned by Add but hidden from the user
    /// by default (`Message::hide_payload`).
    Key([u8; 32]),
    /// A client's operation request, carried over the wire as the first
    /// message of a call.
    Request(crate::operation::OperationRequest),
    /// File content delivered to the client for editing (Invoke response).
    FileContent {
        path: String,
        #[serde(with = "serde_bytes")]
        content: Vec<u8>,
        grant: String,
    },
    /// Edited file content sent back to the broker (Invoke follow-up).
    InvokeFollowup {
        path: String,
        #[serde(with = "serde_bytes")]
        new_content: Vec<u8>,
    },
}

impl Message {
    pub fn ok(payload: Payload) -> Self {
        Message {
            payload,
            err: None,
            hide_payload: false,
        }
    }

    pub fn ok_hidden(payload: Payload) -> Self {
        Message {
            payload,
            err: None,
            hide_payload: true,
        }
    }

    pub fn error(err: impl std::fmt::Display) -> Self {
        Message {
            payload: Payload::Empty,
            err: Some(err.to_string()),
            hide_payload: false,
        }
    }

    pub fn into_result(self) -> Result<Payload> {
        match self.err {
            Some(msg) => Err(FsTokenError::Unexpected(msg)),
            None => Ok(self.payload),
        }
    }
}

/// Write `msg` to `writer` as a length-prefixed postcard frame. Fails with
/// `Unexpected` if the serialized frame exceeds `max_frame_bytes`.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    msg: &Message,
    max_frame_bytes: u32,
) -> Result<()> {
    let bytes = postcard::to_allocvec(msg)
        .map_err(|e| FsTokenError::MalformedPayload(e.to_string()))?;
    if bytes.len() as u64 > max_frame_bytes as u64 {
        return Err(FsTokenError::wrap_unexpected(format!(
            "frame of {} bytes exceeds the {max_frame_bytes} byte cap",
            bytes.len()
        )));
    }
    writer.write_all(&(bytes.len() as u32).to_be_bytes()).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed postcard frame from `reader`.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> Result<Message> {
    let mut len_buf = [0u8; 4];
    reader
        .read_exact(&mut len_buf)
        .await
        .map_err(|_| FsTokenError::IoTruncated)?;
    let len = u32::from_be_bytes(len_buf);
    if len > max_frame_bytes {
        return Err(FsTokenError::wrap_unexpected(format!(
            "advertised frame length {len} exceeds the {max_frame_bytes} byte cap"
        )));
    }

    let mut body = vec![0u8; len as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| FsTokenError::IoTruncated)?;

    postcard::from_bytes(&body).map_err(|e| FsTokenError::MalformedPayload(e.to_string()))
}

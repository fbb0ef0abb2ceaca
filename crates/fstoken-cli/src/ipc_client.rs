//! Thin client side of the framed IPC protocol: connect, send one
//! `OperationRequest`, read the response, and — for Invoke — carry out the
//! follow-up exchange.

use fstoken_core::error::{FsTokenError, Result};
use fstoken_core::message::{read_frame, write_frame, Message, Payload};
use fstoken_core::{Config, OperationRequest};
use tokio::net::UnixStream;

use crate::editor::ContentEditor;

/// Send `request`, print/return the result, and drive the Invoke
/// follow-up if the response is `FileContent`.
pub async fn call(
    config: &Config,
    request: OperationRequest,
    editor: &dyn ContentEditor,
) -> Result<Payload> {
    let mut stream = UnixStream::connect(&config.socket_path)
        .await
        .map_err(|_| FsTokenError::ConnectRefused)?;

    write_frame(
        &mut stream,
        &Message::ok(Payload::Request(request)),
        config.max_frame_bytes,
    )
    .await?;

    let response = read_frame(&mut stream, config.max_frame_bytes).await?;
    let payload = response.into_result()?;

    let Payload::FileContent {
        path,
        content,
        grant,
    } = &payload
    else {
        return Ok(payload);
    };

    let writable = grant == "a";
    let edited =
        editor
            .edit(content, writable)
            .map_err(|e| FsTokenError::wrap_unexpected(e.to_string()))?;

    write_frame(
        &mut stream,
        &Message::ok(Payload::InvokeFollowup {
            path: path.clone(),
            new_content: edited,
        }),
        config.max_frame_bytes,
    )
    .await?;

    let ack = read_frame(&mut stream, config.max_frame_bytes).await?;
    ack.into_result()?;

    Ok(payload)
}

//! Per-connection handling: read one `OperationRequest`, run its
//! privileged step, reply, and — for an `Invoke` — carry out the second
//! round-trip that ferries the (possibly edited) content back.

use std::sync::Arc;

use fstoken_core::config::Config;
use fstoken_core::error::{FsTokenError, Result};
use fstoken_core::message::{read_frame, write_frame, Message, Payload};
use fstoken_core::operation::apply_invoke_followup;
use fstoken_core::Catalog;
use secrecy::{ExposeSecret, Secret};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

pub struct Shared {
    pub catalog: Mutex<Catalog>,
    pub identity_seed: Secret<[u8; 32]>,
    pub config: Config,
}

/// Handle one accepted connection start to finish. Errors are caught here
/// and turned into an `err` message rather than ever being allowed to kill
/// the worker task silently — a panic inside would still be caught by the
/// `JoinHandle` in the accept loop, but an ordinary error must not crash
/// the broker process.
pub async fn handle_connection(mut stream: UnixStream, shared: Arc<Shared>) {
    if let Err(err) = handle_connection_inner(&mut stream, &shared).await {
        let msg = Message::error(err);
        let _ = write_frame(&mut stream, &msg, shared.config.max_frame_bytes).await;
    }
}

async fn handle_connection_inner(stream: &mut UnixStream, shared: &Shared) -> Result<()> {
    let request_msg = read_frame(stream, shared.config.max_frame_bytes).await?;
    let request = match request_msg.into_result()? {
        Payload::Request(req) => req,
        _ => {
            return Err(FsTokenError::MalformedPayload(
                "expected an operation request".into(),
            ))
        }
    };

    let response_payload = {
        let mut catalog = shared.catalog.lock().await;
        request.operation.execute(
            request.broker_may_access,
            &mut catalog,
            shared.identity_seed.expose_secret(),
        )
    };

    let response_payload = match response_payload {
        Ok(payload) => payload,
        Err(err) => {
            write_frame(stream, &Message::error(err), shared.config.max_frame_bytes).await?;
            return Ok(());
        }
    };

    let original_content = match &response_payload {
        Payload::FileContent { content, .. } => Some(content.clone()),
        _ => None,
    };

    let reply = match &response_payload {
        Payload::Key(_) => Message::ok_hidden(response_payload.clone()),
        _ => Message::ok(response_payload.clone()),
    };
    write_frame(stream, &reply, shared.config.max_frame_bytes).await?;

    let Some(original_content) = original_content else {
        return Ok(());
    };

    // Every Invoke gets a follow-up round-trip, read-only or not — the
    // client always sends the (possibly untouched) content back; only an
    // actual change triggers a rewrite.
    let followup = tokio::time::timeout(
        shared.config.editor_timeout,
        read_frame(stream, shared.config.max_frame_bytes),
    )
    .await
    .map_err(|_| FsTokenError::wrap_unexpected("timed out waiting for the invoke follow-up"))??;

    match followup.into_result()? {
        Payload::InvokeFollowup { path, new_content } => {
            if new_content == original_content {
                return write_frame(stream, &Message::ok(Payload::Empty), shared.config.max_frame_bytes)
                    .await;
            }
            let catalog = shared.catalog.lock().await;
            match apply_invoke_followup(&catalog, &path, &new_content) {
                Ok(()) => write_frame(stream, &Message::ok(Payload::Empty), shared.config.max_frame_bytes).await,
                Err(err) => {
                    write_frame(stream, &Message::error(err), shared.config.max_frame_bytes).await
                }
            }
        }
        _ => Err(FsTokenError::MalformedPayload(
            "expected an invoke follow-up".into(),
        )),
    }
}

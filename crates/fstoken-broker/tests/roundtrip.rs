//! End-to-end broker/client round-trip over a real `AF_UNIX` socket: binds
//! `fstokend`'s accept loop via the library crate, drives Add → Delegate →
//! Invoke → followup through it with a raw `UnixStream`, then exercises
//! the orderly-shutdown drain.

use std::sync::Arc;

use fstoken_core::acl::NoopAcl;
use fstoken_core::message::{read_frame, write_frame, Message, Payload};
use fstoken_core::operation::Operation;
use fstoken_core::Config;
use tempfile::{tempdir, NamedTempFile};
use tokio::net::UnixStream;

const MAX_FRAME: u32 = 16 * 1024 * 1024;

async fn call(socket: &std::path::Path, operation: Operation) -> Payload {
    let acl = NoopAcl;
    let broker_may_access = operation.prepare(&acl).unwrap();
    let request = operation.into_request(broker_may_access);

    let mut stream = UnixStream::connect(socket).await.unwrap();
    write_frame(&mut stream, &Message::ok(Payload::Request(request)), MAX_FRAME)
        .await
        .unwrap();
    let response = read_frame(&mut stream, MAX_FRAME).await.unwrap();
    let payload = response.into_result().unwrap();

    // Drive the Invoke followup ourselves (standing in for the CLI's
    // editor round-trip) so the worker's second read/write is exercised.
    if let Payload::FileContent { path, content, .. } = &payload {
        write_frame(
            &mut stream,
            &Message::ok(Payload::InvokeFollowup {
                path: path.clone(),
                new_content: content.clone(),
            }),
            MAX_FRAME,
        )
        .await
        .unwrap();
        read_frame(&mut stream, MAX_FRAME)
            .await
            .unwrap()
            .into_result()
            .unwrap();
    }

    payload
}

async fn invoke_with_edit(socket: &std::path::Path, path: &str, token: &str, new_content: &[u8]) {
    let operation = Operation::Invoke {
        path: path.to_string(),
        token: token.to_string(),
    };
    let acl = NoopAcl;
    let broker_may_access = operation.prepare(&acl).unwrap();
    let request = operation.into_request(broker_may_access);

    let mut stream = UnixStream::connect(socket).await.unwrap();
    write_frame(&mut stream, &Message::ok(Payload::Request(request)), MAX_FRAME)
        .await
        .unwrap();
    let response = read_frame(&mut stream, MAX_FRAME).await.unwrap();
    response.into_result().unwrap();

    write_frame(
        &mut stream,
        &Message::ok(Payload::InvokeFollowup {
            path: path.to_string(),
            new_content: new_content.to_vec(),
        }),
        MAX_FRAME,
    )
    .await
    .unwrap();
    read_frame(&mut stream, MAX_FRAME)
        .await
        .unwrap()
        .into_result()
        .unwrap();
}

#[tokio::test]
async fn add_delegate_invoke_followup_round_trip_over_real_socket() {
    let runtime_dir = tempdir().unwrap();
    let config = Config::rooted_at(runtime_dir.path());

    let shared = Arc::new(fstokend::init_shared(&config, false).unwrap());
    let listener = fstokend::bind_listener(&config).unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(fstokend::serve(listener, shared, shutdown_rx));

    let mut file = NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, b"hello from the round trip").unwrap();
    let path = file.path().to_str().unwrap().to_string();

    // Add.
    let add_payload = call(
        &config.socket_path,
        Operation::Add {
            path: path.clone(),
            encrypt: false,
            rotate: false,
        },
    )
    .await;
    assert!(matches!(add_payload, Payload::Key(_)));

    // Delegate a read/write grant to ourselves with an empty proof (root
    // capability).
    let delegate_payload = call(
        &config.socket_path,
        Operation::Delegate {
            path: path.clone(),
            encrypt: false,
            rotate: false,
            grant: "rw".into(),
            subject: "alice".into(),
            token: String::new(),
        },
    )
    .await;
    let token = match delegate_payload {
        Payload::Token(t) => t,
        other => panic!("expected a token, got {other:?}"),
    };

    // Invoke: read back the content under the minted token, then send
    // edited content through the followup round-trip.
    let invoke_payload = call(
        &config.socket_path,
        Operation::Invoke {
            path: path.clone(),
            token: token.clone(),
        },
    )
    .await;
    let (content, grant) = match invoke_payload {
        Payload::FileContent { content, grant, .. } => (content, grant),
        other => panic!("expected file content, got {other:?}"),
    };
    assert_eq!(content, b"hello from the round trip");
    assert_eq!(grant, "a");

    invoke_with_edit(&config.socket_path, &path, &token, b"edited over the wire").await;
    assert_eq!(
        std::fs::read(&path).unwrap(),
        b"edited over the wire",
        "worker should have written the followup content back to disk"
    );

    // A second Invoke with the same token should now see the edit.
    let second = call(
        &config.socket_path,
        Operation::Invoke {
            path: path.clone(),
            token,
        },
    )
    .await;
    match second {
        Payload::FileContent { content, .. } => assert_eq!(content, b"edited over the wire"),
        other => panic!("expected file content, got {other:?}"),
    }

    // Orderly shutdown: stop accepting, drain in-flight workers, and the
    // `serve` future should resolve once that drain completes.
    shutdown_tx.send(()).unwrap();
    server.await.unwrap();

    assert!(
        UnixStream::connect(&config.socket_path).await.is_err(),
        "broker should no longer be accepting connections after shutdown"
    );
}

#[tokio::test]
async fn delete_then_invoke_fails_not_found_over_real_socket() {
    let runtime_dir = tempdir().unwrap();
    let config = Config::rooted_at(runtime_dir.path());

    let shared = Arc::new(fstokend::init_shared(&config, false).unwrap());
    let listener = fstokend::bind_listener(&config).unwrap();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server = tokio::spawn(fstokend::serve(listener, shared, shutdown_rx));

    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();

    call(
        &config.socket_path,
        Operation::Add {
            path: path.clone(),
            encrypt: false,
            rotate: false,
        },
    )
    .await;

    let delete_acl = NoopAcl;
    let delete_op = Operation::Delete { path: path.clone() };
    let broker_may_access = delete_op.prepare(&delete_acl).unwrap();
    let request = delete_op.into_request(broker_may_access);
    let mut stream = UnixStream::connect(&config.socket_path).await.unwrap();
    write_frame(&mut stream, &Message::ok(Payload::Request(request)), MAX_FRAME)
        .await
        .unwrap();
    read_frame(&mut stream, MAX_FRAME)
        .await
        .unwrap()
        .into_result()
        .unwrap();

    let invoke_op = Operation::Invoke {
        path: path.clone(),
        token: "anything".into(),
    };
    let broker_may_access = invoke_op.prepare(&NoopAcl).unwrap();
    let request = invoke_op.into_request(broker_may_access);
    let mut stream = UnixStream::connect(&config.socket_path).await.unwrap();
    write_frame(&mut stream, &Message::ok(Payload::Request(request)), MAX_FRAME)
        .await
        .unwrap();
    let response = read_frame(&mut stream, MAX_FRAME).await.unwrap();
    assert!(response.into_result().is_err());

    shutdown_tx.send(()).unwrap();
    server.await.unwrap();
}

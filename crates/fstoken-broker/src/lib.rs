//! Library half of `fstokend`: everything the binary entry point needs
//! that is also worth driving from a test without spawning a real process
//! — socket setup, the shared broker state, and the accept loop with its
//! orderly-shutdown drain.
//!
//! `main.rs` is a thin wrapper around this crate that wires up real
//! signals; tests wire up a `oneshot` channel instead so they can trigger
//! the same shutdown path deterministically.

pub mod worker;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use fstoken_core::{Catalog, Config};
use secrecy::Secret;
use tokio::net::UnixListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

pub use worker::Shared;

/// Load (initializing if necessary) the broker's identity seed and open
/// the catalog, producing the state every connection handler shares.
pub fn init_shared(config: &Config, verbose: bool) -> Result<Shared> {
    let identity = config.identity_store();
    identity
        .init(verbose)
        .context("initializing broker identity")?;
    let (seed, _public) = identity.load().context("loading broker identity")?;

    let catalog = Catalog::open(&config.catalog_path).context("opening catalog")?;

    Ok(Shared {
        catalog: Mutex::new(catalog),
        identity_seed: Secret::new(seed),
        config: config.clone(),
    })
}

/// Remove any stale socket, bind a fresh one under a tightened umask, and
/// `chmod` it to `0660`.
pub fn bind_listener(config: &Config) -> Result<UnixListener> {
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path).context("removing stale socket")?;
    }
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent).context("creating runtime directory")?;
    }
    // Tighten the umask for the bind() call itself so the socket is never
    // briefly world-writable before the explicit chmod below lands.
    #[cfg(unix)]
    let old_umask = unsafe { libc::umask(0o117) };
    let listener = UnixListener::bind(&config.socket_path).context("binding socket")?;
    #[cfg(unix)]
    unsafe {
        libc::umask(old_umask);
    }
    set_socket_mode(&config.socket_path, 0o660)?;
    Ok(listener)
}

fn set_socket_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
            .context("setting socket permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Accept connections on `listener`, dispatching each to its own spawned
/// worker task, until `shutdown` resolves. On shutdown, stop accepting and
/// join every in-flight worker before returning — the caller is
/// responsible for removing the socket file afterwards.
pub async fn serve(
    listener: UnixListener,
    shared: Arc<Shared>,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) {
    let mut workers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let shared = Arc::clone(&shared);
                        workers.spawn(async move {
                            worker::handle_connection(stream, shared).await;
                        });
                    }
                    Err(err) => eprintln!("fstokend: accept failed: {err}"),
                }
            }
            _ = &mut shutdown => {
                break;
            }
        }
    }

    drop(listener);
    while let Some(result) = workers.join_next().await {
        if let Err(err) = result {
            eprintln!("fstokend: a worker task panicked: {err}");
        }
    }
}

//! `fstokend`: the privileged broker daemon. Owns the key catalog and the
//! `AF_UNIX` socket; never trusts anything the client says about its own
//! privilege level beyond the `broker_may_access` flag on each request,
//! which the client set by actually performing the unprivileged ACL step
//! before dialing in.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fstoken_core::Config;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser, Debug)]
#[command(name = "fstokend", about = "Privileged broker for fstoken capability tokens")]
struct Args {
    /// Override the runtime directory holding the catalog and socket
    /// (defaults to /run/fstokend).
    #[arg(long)]
    runtime_dir: Option<PathBuf>,

    /// Override the broker's own identity directory (defaults to ~/.fskeys
    /// of whichever user runs the daemon).
    #[arg(long)]
    identity_dir: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.runtime_dir {
        Some(dir) => Config::rooted_at(dir),
        None => Config::standard().context("building default broker configuration")?,
    };
    if let Some(dir) = &args.identity_dir {
        config.identity_dir = dir.clone();
    }

    let shared = Arc::new(fstokend::init_shared(&config, args.verbose)?);
    let listener = fstokend::bind_listener(&config)?;

    println!("fstokend listening on {}", config.socket_path.display());

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("fstokend: received interrupt, shutting down");
            }
            _ = sigterm.recv() => {
                println!("fstokend: received SIGTERM, shutting down");
            }
        }
        let _ = shutdown_tx.send(());
    });

    fstokend::serve(listener, shared, shutdown_rx).await;

    let _ = std::fs::remove_file(&config.socket_path);
    Ok(())
}

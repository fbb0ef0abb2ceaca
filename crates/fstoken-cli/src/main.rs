//! `fstoken`: the unprivileged client. Resolves the target path, selects
//! an operation from the flags given, runs its unprivileged step locally,
//! then hands off to the broker over the IPC socket.

mod dispatcher;
mod editor;
mod ipc_client;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fstoken_core::acl::SetfaclAcl;
use fstoken_core::message::Payload;
use fstoken_core::Config;

use dispatcher::OpInputs;
use editor::ExternalEditor;

#[derive(Parser, Debug)]
#[command(name = "fstoken", about = "Capability-token client for fstoken")]
struct Args {
    /// Target file, or the literal `init` to (re)initialize the local
    /// identity keypair.
    file: String,

    #[arg(short, long)]
    encrypt: bool,

    #[arg(short, long)]
    rotate: bool,

    #[arg(short, long)]
    delete: bool,

    #[arg(short = 'g', long)]
    grant: Option<String>,

    #[arg(short, long)]
    subject: Option<String>,

    #[arg(short, long)]
    token: Option<String>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(long)]
    socket: Option<PathBuf>,

    #[arg(long)]
    identity_dir: Option<PathBuf>,

    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Group name passed to `setfacl` when granting/revoking the broker's
    /// access to a target file.
    #[arg(long, default_value = "fstoken")]
    broker_group: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fstoken: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::standard()?;
    if let Some(dir) = &args.identity_dir {
        config.identity_dir = dir.clone();
    }
    if let Some(socket) = &args.socket {
        config.socket_path = socket.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.catalog_path = catalog.clone();
    }

    if args.file == "init" {
        let identity = config.identity_store();
        identity.init(args.verbose)?;
        println!("identity initialized under {}", config.identity_dir.display());
        return Ok(());
    }

    let path = dispatcher::resolve_path(&args.file)?;

    let operation = dispatcher::select(OpInputs {
        path,
        encrypt: args.encrypt,
        rotate: args.rotate,
        delete: args.delete,
        grant: args.grant,
        subject: args.subject,
        token: args.token,
    });

    let acl = SetfaclAcl::new(args.broker_group);
    let broker_may_access = operation.prepare(&acl)?;
    let request = operation.into_request(broker_may_access);

    let editor = ExternalEditor;
    let payload = ipc_client::call(&config, request, &editor).await?;

    match payload {
        Payload::Empty | Payload::Request(_) | Payload::InvokeFollowup { .. } => {}
        // The key itself is never printed; only its fingerprint, and only
        // with --verbose, so an operator can confirm a rotation actually
        // changed something without the key ever touching a terminal log.
        Payload::Key(key) => {
            if args.verbose {
                eprintln!("file key fingerprint: {}", hex::encode(fstoken_core::crypto::sha256(&key)));
            }
        }
        Payload::Token(token) => println!("{token}"),
        Payload::FileContent { path, grant, .. } => {
            if args.verbose {
                eprintln!("invoked {path} under grant {grant}");
            }
        }
    }

    Ok(())
}

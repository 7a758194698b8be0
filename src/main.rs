//! `depot` — a peer-to-peer inventory node.
//!
//! Each process owns a named inventory of goods and a set of neighbour
//! depots it has exchanged introductions with. Peers connect over TCP,
//! exchange an `IM` handshake, then issue line-oriented commands that move
//! quantities of goods between local and neighbour inventory, optionally
//! deferred until replayed by key. A `SIGHUP` triggers a sorted snapshot of
//! inventory and neighbours on stdout.

mod cli;
mod codec;
mod error;
mod listener;
mod registry;
mod session;
mod snapshot;

use std::process::ExitCode;
use std::sync::Arc;

use registry::Registry;
use session::Identity;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let startup = match cli::parse() {
        Ok(startup) => startup,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    let registry = Registry::new(startup.initial_inventory);
    let snapshot_task = tokio::spawn(snapshot::run(registry.clone()));

    let result = async {
        let (port, bound) = listener::bind().await?;
        let identity = Arc::new(Identity {
            name: startup.name,
            port: port as u32,
        });
        listener::serve(bound, identity, registry).await
    }
    .await;

    snapshot_task.abort();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "listener failed");
            ExitCode::FAILURE
        }
    }
}

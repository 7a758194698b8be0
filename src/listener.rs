//! Listener / Dialer: accepts inbound connections and,
//! on a `Connect` verb, opens outbound ones — each socket, either direction,
//! becomes a new [`session::run`].

use std::io::Write;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::registry::Registry;
use crate::session::{self, Identity};

/// Binds an ephemeral TCP listener on all interfaces and prints its port
/// followed by a newline to stdout, flushed. Returns the bound port and the
/// listener itself, so the caller can build this depot's [`Identity`] with
/// the real port before any session starts.
pub async fn bind() -> std::io::Result<(u16, TcpListener)> {
    let listener = TcpListener::bind(("0.0.0.0", 0)).await?;
    let port = listener.local_addr()?.port();

    println!("{port}");
    std::io::stdout().flush()?;
    tracing::info!(port, "listening");

    Ok((port, listener))
}

/// Accepts indefinitely on an already-bound listener. Each accepted socket
/// is handed to a freshly spawned peer session.
pub async fn serve(
    listener: TcpListener,
    identity: Arc<Identity>,
    registry: Registry,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "accepted connection");
        tokio::spawn(session::run(stream, identity.clone(), registry.clone()));
    }
}

/// Opens an outbound connection to `port` on loopback in response to a
/// `Connect` verb, and starts a peer session on it. Failed dials are
/// silently ignored.
pub fn dial(port: u32, identity: Arc<Identity>, registry: Registry) {
    tokio::spawn(async move {
        let Ok(port) = u16::try_from(port) else {
            return;
        };
        match TcpStream::connect(("127.0.0.1", port)).await {
            Ok(stream) => {
                tracing::debug!(port, "dialed neighbour");
                session::run(stream, identity, registry).await;
            }
            Err(err) => {
                tracing::debug!(port, error = %err, "dial failed, ignoring");
            }
        }
    });
}

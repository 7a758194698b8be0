//! Peer session: one per active TCP connection.
//!
//! Each session owns a read half and a write half of the same socket, split
//! so a `Transfer` on some *other* session can still push a `Deliver` line
//! onto this peer's outbound queue while this session is blocked reading.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::codec::{self, Command, MAX_LINE_LEN};
use crate::listener;
use crate::registry::{AddNeighbour, NeighbourSender, Registry};

/// This depot's fixed identity, set once at startup and shared by every
/// session.
pub struct Identity {
    pub name: String,
    pub port: u32,
}

/// A command stored by a `Defer`, owned by the session that received it.
struct DeferredCommand {
    key: i64,
    /// The inner command's wire line, without the `Defer:key:` prefix.
    inner_line: String,
    completed: bool,
}

/// Per-session state: handshake flags and the session-local deferred list.
/// Never shared outside this task — no locking required.
struct Session {
    identity: Arc<Identity>,
    registry: Registry,
    tx: NeighbourSender,
    im_sent: bool,
    im_received: bool,
    deferred: Vec<DeferredCommand>,
}

impl Session {
    /// Processes one freshly-parsed command, and anything it transitively
    /// queues up (an `Execute` re-running stored commands, which may
    /// themselves be `Defer`s or another `Execute`). A plain work queue is
    /// used instead of recursive `async fn` calls, which Rust does not
    /// support without boxing each call.
    async fn process(&mut self, cmd: Command) {
        let mut queue = VecDeque::new();
        queue.push_back(cmd);

        while let Some(cmd) = queue.pop_front() {
            match cmd {
                Command::Im { port, name } => {
                    if !self.im_received {
                        let outcome = self
                            .registry
                            .add_neighbour(&name, port, self.tx.clone())
                            .await;
                        if matches!(outcome, AddNeighbour::Added) {
                            tracing::info!(neighbour = %name, port, "neighbour added");
                        }
                        self.im_received = true;
                    }
                }
                Command::Connect { port } => {
                    if self.im_received {
                        listener::dial(port, self.identity.clone(), self.registry.clone());
                    }
                }
                Command::Deliver { qty, good } => {
                    self.registry.deliver(&good, qty).await;
                }
                Command::Withdraw { qty, good } => {
                    self.registry.withdraw(&good, qty).await;
                }
                Command::Transfer { qty, good, target } => {
                    if let Some(sender) = self.registry.neighbour_sender(&target).await {
                        self.registry.withdraw(&good, qty).await;
                        let _ = sender.send(codec::deliver_line(qty, &good));
                    }
                }
                Command::Defer { key, inner_line } => {
                    self.deferred.push(DeferredCommand {
                        key,
                        inner_line,
                        completed: false,
                    });
                }
                Command::Execute { key } => {
                    for deferred in self.deferred.iter_mut() {
                        if deferred.key == key && !deferred.completed {
                            deferred.completed = true;
                            if let Some(inner) = codec::parse_line(&deferred.inner_line) {
                                queue.push_back(inner);
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Runs a peer session to completion on `stream`. Drives the handshake,
/// the liveness gate, and the main read/dispatch loop, then cleans up on
/// EOF or a framing violation. Never panics and never removes anything from
/// the registry on the way out.
pub async fn run(stream: TcpStream, identity: Arc<Identity>, registry: Registry) {
    let peer_addr = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut write_half = write_half;
        while let Some(line) = rx.recv().await {
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    // Send our own introduction immediately, before reading anything.
    let _ = tx.send(codec::im_line(identity.port, &identity.name));

    let mut session = Session {
        identity,
        registry,
        tx,
        im_sent: true,
        im_received: false,
        deferred: Vec::new(),
    };

    let mut reader = BufReader::new(read_half);
    let mut msg_count: u32 = 0;
    let mut line = String::new();

    loop {
        line.clear();
        // Capped via `take` so a peer streaming bytes with no newline can't
        // grow `line` without bound; once the cap is hit with no `\n` found,
        // treat it the same as an overlong line.
        let read = (&mut reader)
            .take(MAX_LINE_LEN as u64)
            .read_line(&mut line)
            .await;
        match read {
            Ok(0) => {
                tracing::debug!(?peer_addr, "peer closed connection");
                break;
            }
            Ok(n) if n >= MAX_LINE_LEN && !line.ends_with('\n') => {
                tracing::debug!(?peer_addr, "line exceeded maximum length, closing session");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(?peer_addr, error = %err, "read error, closing session");
                break;
            }
        }

        // Liveness gate: from the third message onward,
        // both IMs must have been sent and received or the session closes.
        if msg_count > 1 && !(session.im_sent && session.im_received) {
            tracing::debug!(?peer_addr, "handshake incomplete, closing session");
            break;
        }

        if let Some(cmd) = codec::parse_line(&line) {
            session.process(cmd).await;
        }
        msg_count += 1;
    }

    // Dropping `session` drops this task's `tx`, but a registered neighbour
    // keeps its own clone in the registry forever (neighbours are never
    // removed), so the writer's `rx.recv()` would otherwise never return.
    // Abort it directly rather than waiting for the channel to close.
    drop(session);
    writer.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn spawn_depot(name: &str, initial: HashMap<String, i64>) -> (Registry, u32) {
        let listener_sock = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener_sock.local_addr().unwrap().port() as u32;
        let registry = Registry::new(initial);
        let identity = Arc::new(Identity {
            name: name.to_string(),
            port,
        });
        let reg = registry.clone();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener_sock.accept().await.unwrap();
                tokio::spawn(run(stream, identity.clone(), reg.clone()));
            }
        });
        (registry, port)
    }

    #[tokio::test]
    async fn handshake_then_deliver_updates_inventory() {
        let (registry, port) = spawn_depot("alpha", HashMap::new()).await;

        let mut harness = TcpStream::connect(("127.0.0.1", port as u16)).await.unwrap();
        // Drain alpha's IM line.
        let mut buf = [0u8; 256];
        let n = harness.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("IM:"));

        harness.write_all(b"IM:9999:beta\n").await.unwrap();
        harness.write_all(b"Deliver:3:widget\n").await.unwrap();
        harness.flush().await.unwrap();

        // Give the session task a moment to process.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snap = registry.snapshot().await;
        assert_eq!(snap.goods, vec![("widget".to_string(), 3)]);
        assert_eq!(snap.neighbours, vec!["beta".to_string()]);
    }

    #[tokio::test]
    async fn defer_and_execute_applies_net_effect() {
        let (registry, port) = spawn_depot("alpha", HashMap::new()).await;
        let mut harness = TcpStream::connect(("127.0.0.1", port as u16)).await.unwrap();
        let mut buf = [0u8; 256];
        let _ = harness.read(&mut buf).await.unwrap();

        harness.write_all(b"IM:9999:beta\n").await.unwrap();
        harness
            .write_all(b"Defer:7:Deliver:2:bolt\n")
            .await
            .unwrap();
        harness
            .write_all(b"Defer:7:Withdraw:1:bolt\n")
            .await
            .unwrap();
        harness.write_all(b"Execute:7\n").await.unwrap();
        harness.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snap = registry.snapshot().await;
        assert_eq!(snap.goods, vec![("bolt".to_string(), 1)]);

        // A second Execute of the same key is now a no-op.
        harness.write_all(b"Execute:7\n").await.unwrap();
        harness.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snap = registry.snapshot().await;
        assert_eq!(snap.goods, vec![("bolt".to_string(), 1)]);
    }

    #[tokio::test]
    async fn transfer_to_unknown_target_is_a_no_op() {
        let mut initial = HashMap::new();
        initial.insert("widget".to_string(), 10);
        let (registry, port) = spawn_depot("alpha", initial).await;
        let mut harness = TcpStream::connect(("127.0.0.1", port as u16)).await.unwrap();
        let mut buf = [0u8; 256];
        let _ = harness.read(&mut buf).await.unwrap();

        harness.write_all(b"IM:9999:beta\n").await.unwrap();
        harness.write_all(b"Transfer:4:widget:ghost\n").await.unwrap();
        harness.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snap = registry.snapshot().await;
        assert_eq!(
            snap.goods,
            vec![("widget".to_string(), 10)],
            "transfer to an unregistered neighbour must not withdraw"
        );
    }

    #[tokio::test]
    async fn transfer_to_known_target_withdraws_and_forwards_deliver() {
        let mut initial = HashMap::new();
        initial.insert("widget".to_string(), 10);
        let (registry, port) = spawn_depot("alpha", initial).await;
        let mut harness = TcpStream::connect(("127.0.0.1", port as u16)).await.unwrap();
        let mut buf = [0u8; 256];
        let _ = harness.read(&mut buf).await.unwrap();
        harness.write_all(b"IM:9999:beta\n").await.unwrap();

        // A second connection registers as the transfer's target neighbour.
        let mut neighbour = TcpStream::connect(("127.0.0.1", port as u16))
            .await
            .unwrap();
        let mut nbuf = [0u8; 256];
        let _ = neighbour.read(&mut nbuf).await.unwrap();
        neighbour.write_all(b"IM:8888:gamma\n").await.unwrap();
        neighbour.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        harness.write_all(b"Transfer:4:widget:gamma\n").await.unwrap();
        harness.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snap = registry.snapshot().await;
        assert_eq!(snap.goods, vec![("widget".to_string(), 6)]);

        let n = neighbour.read(&mut nbuf).await.unwrap();
        assert_eq!(&nbuf[..n], b"Deliver:4:widget\n");
    }

    #[tokio::test]
    async fn invalid_lines_are_ignored_and_session_stays_open() {
        let (registry, port) = spawn_depot("alpha", HashMap::new()).await;
        let mut harness = TcpStream::connect(("127.0.0.1", port as u16)).await.unwrap();
        let mut buf = [0u8; 256];
        let _ = harness.read(&mut buf).await.unwrap();

        harness.write_all(b"IM:9999:beta\n").await.unwrap();
        harness.write_all(b"Deliver:-5:widget\n").await.unwrap();
        harness.write_all(b"Deliver:5:wid get\n").await.unwrap();
        harness.write_all(b"Deliver:five:widget\n").await.unwrap();
        harness.write_all(b"Deliver:2:widget\n").await.unwrap();
        harness.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let snap = registry.snapshot().await;
        assert_eq!(snap.goods, vec![("widget".to_string(), 2)]);
    }
}

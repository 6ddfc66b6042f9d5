//! Connection pipeline
//!
//! One pipeline per accepted connection, made of two tasks: an inbound task
//! that reads, parses, and dispatches lines into the registry, and an
//! outbound task that drains the session's bounded queue to the socket.
//! The tasks rendezvous on a two-party barrier at startup, and coordinate
//! shutdown through a finished flag plus a sentinel queue entry so the
//! writer can never stay blocked on an empty queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Barrier};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::error::AppError;
use crate::registry::{JoinOutcome, Registry};
use crate::session::Outbound;
use crate::types::{ClientId, MAX_LINE_LENGTH, OUTBOUND_QUEUE_CAPACITY};

/// Drive one client connection to completion.
///
/// Splits the stream, wires up the session's outbound queue, and runs the
/// inbound and outbound tasks. Returns once both have finished; transport
/// errors terminate only this connection.
pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<Registry>,
) -> Result<(), AppError> {
    let id = ClientId::new(stream.peer_addr()?);
    info!("Client {} connected", id);

    let (read_half, write_half) = stream.into_split();
    let reader = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let finished = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(2));

    let outbound = tokio::spawn(run_outbound(
        write_half,
        outbound_rx,
        Arc::clone(&finished),
        Arc::clone(&barrier),
        id,
    ));
    let inbound = tokio::spawn(run_inbound(
        registry, reader, outbound_tx, finished, barrier, id,
    ));

    // The inbound task drives shutdown; the writer exits once the queue has
    // drained.
    let _ = inbound.await;
    let _ = outbound.await;

    info!("Client {} disconnected", id);
    Ok(())
}

/// Inbound task: register, then read/parse/dispatch until EOF or error.
async fn run_inbound(
    registry: Arc<Registry>,
    mut reader: FramedRead<OwnedReadHalf, LinesCodec>,
    outbound: mpsc::Sender<Outbound>,
    finished: Arc<AtomicBool>,
    barrier: Arc<Barrier>,
    id: ClientId,
) {
    debug!("Input task starting for {}", id);
    barrier.wait().await;
    registry.register(id, outbound.clone());

    let mut named = false;
    while let Some(next) = reader.next().await {
        let line = match next {
            Ok(line) => line,
            Err(e) => {
                warn!("Read error for {}: {}", id, e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("Received from {}: {}", id, line);

        if named {
            dispatch(&registry, id, line, &outbound);
        } else {
            named = try_naming(&registry, id, line, &outbound);
        }
    }

    // Closing: deregister, mark input finished, then wake the writer.
    registry.deregister(id);
    finished.store(true, Ordering::Release);
    let _ = outbound.try_send(Outbound::Shutdown);
    debug!("Input task for {} has finished", id);
}

/// Handle one line while the session is still unnamed.
///
/// A bare line is a naming attempt with the whole line as candidate; the
/// explicit naming command works too. Anything else draws a hint. Returns
/// whether the session is named afterwards.
fn try_naming(
    registry: &Registry,
    id: ClientId,
    line: &str,
    outbound: &mpsc::Sender<Outbound>,
) -> bool {
    let candidate = match Command::parse(line) {
        Ok(Command::Chat(text)) => text,
        Ok(Command::SetName(name)) => name,
        Ok(_) => {
            feedback(outbound, id, "set your name first".to_string());
            return false;
        }
        Err(usage) => {
            feedback(outbound, id, usage.to_string());
            return false;
        }
    };
    match registry.set_name(id, &candidate) {
        Ok(()) => true,
        Err(e) => {
            feedback(outbound, id, e.to_string());
            false
        }
    }
}

/// Dispatch one parsed line from a named session.
fn dispatch(registry: &Registry, id: ClientId, line: &str, outbound: &mpsc::Sender<Outbound>) {
    let command = match Command::parse(line) {
        Ok(command) => command,
        Err(usage) => {
            feedback(outbound, id, usage.to_string());
            return;
        }
    };

    match command {
        Command::SetName(name) => {
            if let Err(e) = registry.set_name(id, &name) {
                feedback(outbound, id, e.to_string());
            }
        }
        Command::Private { to, text } => {
            if let Err(e) = registry.send_private(id, &to, &text) {
                feedback(outbound, id, e.to_string());
            }
        }
        Command::Join(room) => match registry.join_room(id, &room) {
            Ok(JoinOutcome::Joined) => {}
            Ok(JoinOutcome::AlreadyMember) => {
                feedback(outbound, id, format!("already a member of '{}'", room));
            }
            Err(e) => feedback(outbound, id, e.to_string()),
        },
        Command::Leave(room) => registry.leave_room(id, &room),
        Command::Groups => feedback(outbound, id, registry.rooms_of(id).join(", ")),
        Command::Chat(text) => registry.broadcast(id, &text),
        Command::Unknown(keyword) => {
            feedback(outbound, id, format!("Unknown command: {}", keyword));
        }
    }
}

/// Queue a feedback line onto the session's own outbound queue.
///
/// Feedback shares the queue with relayed traffic so the client sees
/// responses in the order its lines were handled.
fn feedback(outbound: &mpsc::Sender<Outbound>, id: ClientId, line: String) {
    if outbound.try_send(Outbound::Line(line)).is_err() {
        warn!("Client {} outbound queue is full, dropping feedback", id);
    }
}

/// Outbound task: drain the queue to the socket, one CRLF line per entry.
async fn run_outbound(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::Receiver<Outbound>,
    finished: Arc<AtomicBool>,
    barrier: Arc<Barrier>,
    id: ClientId,
) {
    debug!("Output task starting for {}", id);
    barrier.wait().await;

    while let Some(item) = queue.recv().await {
        let line = match item {
            Outbound::Line(line) => line,
            // The sentinel is only enqueued after the finished flag is set;
            // real lines queued ahead of it have been written by now. If the
            // sentinel was dropped on a full queue, channel closure ends the
            // loop instead.
            Outbound::Shutdown => {
                debug_assert!(finished.load(Ordering::Acquire));
                break;
            }
        };
        if let Err(e) = write_line(&mut writer, &line).await {
            warn!("Write error for {}: {}", id, e);
            break;
        }
    }

    let _ = writer.shutdown().await;
    debug!("Output task for {} has finished", id);
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};

    async fn start_server() -> SocketAddr {
        let registry = Arc::new(Registry::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(handle_connection(stream, Arc::clone(&registry)));
            }
        });
        addr
    }

    struct TestClient {
        reader: BufReader<OwnedReadHalf>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, write_half) = stream.into_split();
            Self {
                reader: BufReader::new(read_half),
                writer: write_half,
            }
        }

        async fn send(&mut self, line: &str) {
            self.writer
                .write_all(format!("{}\r\n", line).as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> String {
            let mut line = String::new();
            timeout(Duration::from_secs(2), self.reader.read_line(&mut line))
                .await
                .expect("timed out waiting for a line")
                .expect("read failed");
            line.trim_end().to_string()
        }

        /// `#groups` round-trip; the reply proves every line sent before it
        /// has been fully handled by the server.
        async fn sync(&mut self) -> String {
            self.send("#groups").await;
            self.recv().await
        }

        /// Name this client and wait until the server has processed it.
        async fn name(&mut self, name: &str) {
            self.send(name).await;
            assert_eq!(self.sync().await, "public");
        }
    }

    #[tokio::test]
    async fn test_broadcast_between_sessions() {
        let addr = start_server().await;
        let mut alice = TestClient::connect(addr).await;
        alice.name("alice").await;
        let mut bob = TestClient::connect(addr).await;
        bob.name("bob").await;

        alice.send("hello").await;

        assert_eq!(bob.recv().await, "[alice] >> hello");
        // Alice never sees her own broadcast: the next line she receives is
        // the #groups reply, not an echo.
        assert_eq!(alice.sync().await, "public");
    }

    #[tokio::test]
    async fn test_overlapping_rooms_deliver_once() {
        let addr = start_server().await;
        let mut alice = TestClient::connect(addr).await;
        alice.name("alice").await;
        let mut bob = TestClient::connect(addr).await;
        bob.name("bob").await;

        alice.send("#join secret").await;
        assert_eq!(alice.sync().await, "public, secret");
        bob.send("#join secret").await;
        assert_eq!(bob.sync().await, "public, secret");

        alice.send("hi both").await;

        assert_eq!(bob.recv().await, "[alice] >> hi both");
        // Exactly once despite the shared rooms: the reply to the next
        // #groups arrives before any duplicate could.
        assert_eq!(bob.sync().await, "public, secret");
    }

    #[tokio::test]
    async fn test_name_collision_feedback() {
        let addr = start_server().await;
        let mut alice = TestClient::connect(addr).await;
        alice.name("alice").await;
        let mut bob = TestClient::connect(addr).await;

        bob.send("alice").await;
        assert_eq!(bob.recv().await, "name 'alice' is already taken");
        bob.send("#setMyName alice").await;
        assert_eq!(bob.recv().await, "name 'alice' is already taken");

        bob.name("bob").await;
        // Alice still owns the contested name
        bob.send("#sendPrivate alice hi").await;
        assert_eq!(alice.recv().await, "[PRIVATE from bob] >> hi");
    }

    #[tokio::test]
    async fn test_private_message_routing() {
        let addr = start_server().await;
        let mut alice = TestClient::connect(addr).await;
        alice.name("alice").await;
        let mut bob = TestClient::connect(addr).await;
        bob.name("bob").await;
        let mut carol = TestClient::connect(addr).await;
        carol.name("carol").await;

        alice.send("#sendPrivate bob hi").await;

        assert_eq!(bob.recv().await, "[PRIVATE from alice] >> hi");
        // Nobody else saw it
        assert_eq!(carol.sync().await, "public");
        assert_eq!(alice.sync().await, "public");
    }

    #[tokio::test]
    async fn test_unnamed_commands_get_hint() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;

        client.send("#join secret").await;
        assert_eq!(client.recv().await, "set your name first");
        client.send("#setMyName").await;
        assert_eq!(client.recv().await, "Usage: #setMyName <name>");
        client.send("not a name").await;
        assert_eq!(
            client.recv().await,
            "name must not be empty or contain spaces"
        );

        // Naming attempts repeat until one succeeds
        client.name("carol").await;
    }

    #[tokio::test]
    async fn test_usage_and_unknown_feedback() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;
        client.name("dave").await;

        client.send("#join").await;
        assert_eq!(client.recv().await, "Usage: #join <room>");
        client.send("#sendPrivate dave").await;
        assert_eq!(client.recv().await, "Usage: #sendPrivate <name> <message>");
        client.send("#bogus now").await;
        assert_eq!(client.recv().await, "Unknown command: #bogus");
    }

    #[tokio::test]
    async fn test_groups_empty_after_leaving_all_rooms() {
        let addr = start_server().await;
        let mut client = TestClient::connect(addr).await;
        client.name("erin").await;

        client.send("#leave public").await;
        assert_eq!(client.sync().await, "");
    }

    #[tokio::test]
    async fn test_disconnect_releases_name() {
        let addr = start_server().await;
        let mut alice = TestClient::connect(addr).await;
        alice.name("alice").await;
        let mut bob = TestClient::connect(addr).await;
        bob.name("bob").await;

        drop(alice);

        // Deregistration races the probe, so retry until the name is gone
        let mut released = false;
        for _ in 0..100 {
            bob.send("#sendPrivate alice ping").await;
            let reply = bob.sync().await;
            if reply == "no user named 'alice'" {
                // Drain the #groups reply behind the error line
                assert_eq!(bob.recv().await, "public");
                released = true;
                break;
            }
            assert_eq!(reply, "public");
            sleep(Duration::from_millis(10)).await;
        }
        assert!(released, "name was never released after disconnect");
    }

    #[tokio::test]
    async fn test_pipeline_completes_on_client_disconnect() {
        let registry = Arc::new(Registry::new());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let pipeline = tokio::spawn(handle_connection(stream, registry));

        client.write_all(b"alice\r\n").await.unwrap();
        drop(client);

        // The sentinel protocol must unblock the writer promptly
        timeout(Duration::from_secs(2), pipeline)
            .await
            .expect("pipeline hung after disconnect")
            .unwrap()
            .unwrap();
    }
}

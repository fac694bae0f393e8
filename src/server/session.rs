//! Control session
//!
//! One per accepted control connection. The session registers with the
//! hub, writes the snapshot lines, then runs a reader and a writer side by
//! side until either fails, the peer hangs up, or its close token fires.
//! Everything the peer receives goes through the session's bounded queue,
//! so replies and broadcasts share one ordered stream.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::config::ServerConfig;
use super::hub::{BroadcastHub, SessionHandle};
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::envelope::{decode_request, encode_line, take_line};
use crate::protocol::message::ServerMessage;
use crate::session::SessionState;

/// Reply to a line that is not JSON
pub const INVALID_JSON: &str = "Invalid JSON format.";

/// A control connection bound to the hub
pub struct ControlSession<S> {
    stream: S,
    state: SessionState,
    hub: Arc<BroadcastHub>,
    config: ServerConfig,
    closer: CancellationToken,
}

impl<S> ControlSession<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    /// `shutdown` is the server-wide token; the session closes with it
    pub fn new(
        id: u64,
        stream: S,
        peer_addr: SocketAddr,
        config: ServerConfig,
        hub: Arc<BroadcastHub>,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            stream,
            state: SessionState::new(id, peer_addr),
            hub,
            config,
            closer: shutdown.child_token(),
        }
    }

    /// Token that closes just this session
    pub fn closer(&self) -> CancellationToken {
        self.closer.clone()
    }

    /// Run the session to completion
    pub async fn run(self) -> Result<()> {
        let Self {
            stream,
            mut state,
            hub,
            config,
            closer,
        } = self;
        let id = state.id;
        let peer = state.peer_addr;

        let (tx, rx) = mpsc::channel(config.outbound_queue);
        let snapshot = hub
            .register(SessionHandle::new(id, peer, tx.clone(), closer.clone()))
            .await?;

        tracing::info!(session_id = id, peer = %peer, "Control session opened");

        let (mut reader, writer) = tokio::io::split(stream);

        let read = async {
            let result = read_loop(&mut reader, &mut state, &hub, tx, &closer, config.max_line_len).await;
            // Dropping the hub's sender lets the writer drain and finish
            hub.unregister(id).await;
            result
        };
        let write = async {
            let result = write_loop(writer, snapshot, rx, &closer, config.write_timeout).await;
            closer.cancel();
            result
        };

        let (read_result, write_result) = tokio::join!(read, write);
        closer.cancel();
        state.close();
        state.finish();

        tracing::info!(
            session_id = id,
            peer = %peer,
            lines = state.lines_received,
            rejected = state.requests_rejected,
            duration_ms = state.duration().as_millis() as u64,
            "Control session closed"
        );

        read_result.and(write_result)
    }
}

async fn read_loop<R>(
    reader: &mut R,
    state: &mut SessionState,
    hub: &BroadcastHub,
    outbound: mpsc::Sender<Bytes>,
    closer: &CancellationToken,
    max_line_len: usize,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        let n = tokio::select! {
            _ = closer.cancelled() => return Ok(()),
            read = reader.read_buf(&mut buf) => read?,
        };

        if n == 0 {
            tracing::debug!(session_id = state.id, "Peer closed the connection");
            return Ok(());
        }
        state.add_bytes_received(n);

        loop {
            let line = match take_line(&mut buf, max_line_len) {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(session_id = state.id, error = %e, "Closing session");
                    queue(&outbound, &ServerMessage::server_error("Message too long."));
                    return Err(e.into());
                }
            };
            state.on_line();

            if let Some(reply) = dispatch(&line, &state.peer_addr, hub).await {
                state.on_rejected();
                if !queue(&outbound, &reply) {
                    tracing::warn!(session_id = state.id, "Outbound queue full, closing session");
                    return Ok(());
                }
            }
        }
    }
}

/// Decode and handle one line; returns the reply owed to the sender
async fn dispatch(line: &[u8], peer: &SocketAddr, hub: &BroadcastHub) -> Option<ServerMessage> {
    if line.trim_ascii().is_empty() {
        return None;
    }

    match decode_request(line) {
        Ok(request) => {
            tracing::debug!(peer = %peer, kind = request.kind(), "Request received");
            hub.handle_request(peer, request).await
        }
        Err(ProtocolError::UnknownMessageType(kind)) => {
            tracing::warn!(peer = %peer, kind = %kind, "Unknown message type");
            Some(ServerMessage::server_error(format!(
                "Unknown message type: {}.",
                kind
            )))
        }
        Err(ProtocolError::MissingType) => {
            Some(ServerMessage::server_error("Message type is missing."))
        }
        Err(ProtocolError::InvalidPayload(e)) => {
            tracing::warn!(peer = %peer, error = %e, "Malformed payload");
            Some(ServerMessage::server_error(format!("Server error: {}", e)))
        }
        Err(e) => {
            tracing::warn!(peer = %peer, error = %e, "Invalid JSON");
            Some(ServerMessage::server_error(INVALID_JSON))
        }
    }
}

fn queue(outbound: &mpsc::Sender<Bytes>, message: &ServerMessage) -> bool {
    match encode_line(message) {
        Ok(line) => outbound.try_send(line).is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode reply");
            true
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    snapshot: Vec<Bytes>,
    mut outbound: mpsc::Receiver<Bytes>,
    closer: &CancellationToken,
    write_timeout: Duration,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for line in snapshot {
        write_line(&mut writer, &line, write_timeout).await?;
    }

    loop {
        let line = tokio::select! {
            _ = closer.cancelled() => break,
            line = outbound.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        write_line(&mut writer, &line, write_timeout).await?;
    }

    let _ = writer.shutdown().await;
    Ok(())
}

async fn write_line<W>(writer: &mut W, line: &[u8], write_timeout: Duration) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let write = async {
        writer.write_all(line).await?;
        writer.flush().await
    };

    match tokio::time::timeout(write_timeout, write).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "control write timed out",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::envelope::decode_server_message;
    use crate::server::auth::PrivilegedAddress;
    use crate::store::MemoryStore;
    use tokio::io::{AsyncBufReadExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
    use tokio::task::JoinHandle;

    struct Peer {
        lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn next(&mut self) -> ServerMessage {
            let line = self.lines.next_line().await.unwrap().unwrap();
            decode_server_message(line.as_bytes()).unwrap()
        }

        async fn send(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }
    }

    fn hub() -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(
            Arc::new(MemoryStore::new()),
            Arc::new(PrivilegedAddress("127.0.0.1".parse().unwrap())),
        ))
    }

    fn open(
        id: u64,
        peer: &str,
        hub: &Arc<BroadcastHub>,
        shutdown: &CancellationToken,
        config: ServerConfig,
    ) -> (Peer, JoinHandle<Result<()>>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = ControlSession::new(
            id,
            server,
            peer.parse().unwrap(),
            config,
            hub.clone(),
            shutdown,
        );
        let task = tokio::spawn(session.run());

        let (read, writer) = tokio::io::split(client);
        let peer = Peer {
            lines: BufReader::new(read).lines(),
            writer,
        };
        (peer, task)
    }

    #[tokio::test]
    async fn test_snapshots_sent_first() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let (mut peer, _task) = open(1, "10.0.0.9:4001", &hub, &shutdown, ServerConfig::default());

        assert_eq!(peer.next().await, ServerMessage::LoadOldAnnouncements(Vec::new()));
        assert_eq!(peer.next().await, ServerMessage::LoadOldChatMessages(Vec::new()));
    }

    #[tokio::test]
    async fn test_invalid_json_keeps_connection_open() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let (mut peer, _task) = open(1, "10.0.0.9:4001", &hub, &shutdown, ServerConfig::default());
        peer.next().await;
        peer.next().await;

        peer.send("{not json").await;
        assert_eq!(peer.next().await, ServerMessage::server_error(INVALID_JSON));

        peer.send(r#"{"type":"chatMessage","payload":{"sender_id":"ann","message":"still here"}}"#)
            .await;
        match peer.next().await {
            ServerMessage::ChatMessage(chat) => {
                assert_eq!(chat.sender, "ann");
                assert_eq!(chat.message, "still here");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_type_reply() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let (mut peer, _task) = open(1, "10.0.0.9:4001", &hub, &shutdown, ServerConfig::default());
        peer.next().await;
        peer.next().await;

        peer.send(r#"{"type":"deleteEverything","payload":{}}"#).await;
        assert_eq!(
            peer.next().await,
            ServerMessage::server_error("Unknown message type: deleteEverything.")
        );
    }

    #[tokio::test]
    async fn test_host_announcement_broadcast_to_all() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let (mut host, _host_task) =
            open(1, "127.0.0.1:4001", &hub, &shutdown, ServerConfig::default());
        let (mut guest, _guest_task) =
            open(2, "10.0.0.9:4002", &hub, &shutdown, ServerConfig::default());
        for _ in 0..2 {
            host.next().await;
            guest.next().await;
        }

        guest
            .send(r#"{"type":"createAnnouncement","payload":{"message":"hi"}}"#)
            .await;
        assert_eq!(
            guest.next().await,
            ServerMessage::announcement_error(crate::server::hub::ONLY_HOST)
        );

        host.send(r#"{"type":"createAnnouncement","payload":{"message":" Stream starts at 9 "}}"#)
            .await;
        for peer in [&mut host, &mut guest] {
            match peer.next().await {
                ServerMessage::NewAnnouncement(a) => assert_eq!(a.message, "Stream starts at 9"),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(hub.announcements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_session() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let (mut peer, task) = open(1, "10.0.0.9:4001", &hub, &shutdown, ServerConfig::default());
        peer.next().await;
        peer.next().await;

        shutdown.cancel();
        task.await.unwrap().unwrap();
        assert_eq!(hub.session_count().await, 0);
        assert!(peer.lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_peer_eof_unregisters() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let (mut peer, task) = open(1, "10.0.0.9:4001", &hub, &shutdown, ServerConfig::default());
        peer.next().await;
        peer.next().await;

        peer.writer.shutdown().await.unwrap();
        task.await.unwrap().unwrap();
        assert_eq!(hub.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_overlong_line_closes_session() {
        let hub = hub();
        let shutdown = CancellationToken::new();
        let config = ServerConfig::default().max_line_len(16);
        let (mut peer, task) = open(1, "10.0.0.9:4001", &hub, &shutdown, config);
        peer.next().await;
        peer.next().await;

        peer.send(&"x".repeat(64)).await;
        assert!(matches!(
            task.await.unwrap(),
            Err(Error::Protocol(ProtocolError::LineTooLong(_)))
        ));
        assert_eq!(hub.session_count().await, 0);
    }
}

//! Control channel client
//!
//! Connects to the server's control port, turns inbound lines into
//! [`ControlEvent`]s and sends chat and announcement requests.
//!
//! ```text
//!              connect ok               read error / EOF
//! Connecting ────────────▶ Connected ───────────────────▶ Disconnected
//!    ▲   │                                                     │
//!    │   │ connect failed                                      │
//!    │   ▼                                                     │
//!    └─ Disconnected ◀─────────────── retry_delay ─────────────┘
//!           │
//!           │ max_retries consecutive failures
//!           ▼
//!         GaveUp
//! ```
//!
//! Requests are only written while connected; otherwise they fail locally
//! with [`ClientError::NotConnected`] and are not queued.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;

use super::config::ClientConfig;
use crate::error::{ClientError, Error, ProtocolError, Result};
use crate::protocol::constants::MAX_CHAT_CHARS;
use crate::protocol::envelope::{decode_server_message, encode_line, take_line};
use crate::protocol::message::{
    Announcement, AnnouncementRequest, ChatMessage, ChatRequest, ClientRequest, ServerMessage,
};

/// Connection state of the control client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Connect attempt in progress (1-based)
    Connecting { attempt: u32 },
    Connected,
    /// Retries exhausted; the client will not reconnect
    GaveUp,
}

/// Events from the control client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// Connection state changed
    StateChanged(ConnectionState),

    /// Full announcement list, newest first (sent on every connect)
    Announcements(Vec<Announcement>),

    /// A new announcement to show at the top
    NewAnnouncement(Announcement),

    /// Full chat history, oldest first (sent on every connect)
    ChatHistory(Vec<ChatMessage>),

    /// A new chat message
    Chat(ChatMessage),

    /// The server rejected an announcement
    AnnouncementError(String),

    /// The server reported an error, or sent something unintelligible
    ServerError(String),

    /// The connection dropped and will be retried
    ConnectionLost,
}

struct Connection {
    writer: OwnedWriteHalf,
    closer: CancellationToken,
}

/// Control channel client
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use vidcast::client::{ClientConfig, ControlClient};
///
/// # async fn example() -> vidcast::error::Result<()> {
/// let (client, mut events) = ControlClient::new(ClientConfig::default().sender_name("laptop"));
/// let client = Arc::new(client);
///
/// let runner = Arc::clone(&client);
/// tokio::spawn(async move { runner.run(CancellationToken::new()).await });
///
/// while let Some(event) = events.recv().await {
///     println!("Event: {:?}", event);
/// }
/// client.send_chat("hello").await?;
/// # Ok(())
/// # }
/// ```
pub struct ControlClient {
    config: ClientConfig,
    events: mpsc::Sender<ControlEvent>,
    state: watch::Sender<ConnectionState>,
    connection: Mutex<Option<Connection>>,
}

impl ControlClient {
    /// Create a new client.
    ///
    /// Returns the client and a receiver for events.
    pub fn new(config: ClientConfig) -> (Self, mpsc::Receiver<ControlEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let client = Self {
            config,
            events: tx,
            state,
            connection: Mutex::new(None),
        };

        (client, rx)
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Connect, read and reconnect until `shutdown` fires or retries run out
    ///
    /// Returns the final state: `GaveUp` or `Disconnected`.
    pub async fn run(&self, shutdown: CancellationToken) -> ConnectionState {
        let mut failures = 0u32;

        while !shutdown.is_cancelled() {
            self.set_state(ConnectionState::Connecting {
                attempt: failures + 1,
            })
            .await;

            let attempt = tokio::time::timeout(
                self.config.connect_timeout,
                TcpStream::connect(self.config.control_addr),
            );
            let connected = tokio::select! {
                _ = shutdown.cancelled() => break,
                result = attempt => match result {
                    Ok(result) => result,
                    Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")),
                },
            };

            match connected {
                Ok(stream) => {
                    failures = 0;
                    tracing::info!(server = %self.config.control_addr, "Connected to control server");
                    self.serve(stream, &shutdown).await;
                    if shutdown.is_cancelled() {
                        break;
                    }
                    self.set_state(ConnectionState::Disconnected).await;
                    self.emit(ControlEvent::ConnectionLost).await;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        server = %self.config.control_addr,
                        attempt = failures,
                        error = %e,
                        "Control connection failed"
                    );
                    self.set_state(ConnectionState::Disconnected).await;

                    if self.config.max_retries.is_some_and(|max| failures >= max) {
                        tracing::error!(attempts = failures, "Giving up on control server");
                        self.set_state(ConnectionState::GaveUp).await;
                        return ConnectionState::GaveUp;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }

        self.connection.lock().await.take();
        self.set_state(ConnectionState::Disconnected).await;
        ConnectionState::Disconnected
    }

    /// Send a chat message
    ///
    /// The text is trimmed; blank and over-long messages are rejected
    /// without contacting the server.
    pub async fn send_chat(&self, text: &str) -> Result<()> {
        let message = text.trim();
        if message.is_empty() {
            return Err(ClientError::EmptyMessage.into());
        }

        let len = message.chars().count();
        if len > MAX_CHAT_CHARS {
            return Err(ClientError::MessageTooLong {
                len,
                max: MAX_CHAT_CHARS,
            }
            .into());
        }

        self.send(&ClientRequest::ChatMessage(ChatRequest {
            sender_id: self.config.sender_name.clone(),
            message: message.to_string(),
        }))
        .await
    }

    /// Ask the server to create an announcement
    ///
    /// Only the server decides whether this peer is allowed to; a refusal
    /// arrives later as [`ControlEvent::AnnouncementError`].
    pub async fn create_announcement(&self, text: &str) -> Result<()> {
        let message = text.trim();
        if message.is_empty() {
            return Err(ClientError::EmptyMessage.into());
        }

        self.send(&ClientRequest::CreateAnnouncement(AnnouncementRequest {
            message: message.to_string(),
        }))
        .await
    }

    async fn send(&self, request: &ClientRequest) -> Result<()> {
        let line = encode_line(request)?;
        let mut slot = self.connection.lock().await;
        let Some(connection) = slot.as_mut() else {
            return Err(ClientError::NotConnected.into());
        };

        let write = async {
            connection.writer.write_all(&line).await?;
            connection.writer.flush().await
        };
        let result = match tokio::time::timeout(self.config.write_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "request write timed out")),
        };

        if let Err(e) = result {
            tracing::warn!(kind = request.kind(), error = %e, "Request write failed, dropping connection");
            if let Some(connection) = slot.take() {
                connection.closer.cancel();
            }
            return Err(Error::Io(e));
        }

        tracing::debug!(kind = request.kind(), "Request sent");
        Ok(())
    }

    /// Run one established connection until it drops
    async fn serve(&self, stream: TcpStream, shutdown: &CancellationToken) {
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        let closer = shutdown.child_token();

        *self.connection.lock().await = Some(Connection {
            writer,
            closer: closer.clone(),
        });
        self.set_state(ConnectionState::Connected).await;

        if let Err(e) = self.read_loop(reader, &closer).await {
            tracing::warn!(error = %e, "Control connection lost");
        }

        closer.cancel();
        self.connection.lock().await.take();
    }

    async fn read_loop(&self, mut reader: OwnedReadHalf, closer: &CancellationToken) -> Result<()> {
        let mut buf = BytesMut::with_capacity(8192);

        loop {
            let n = tokio::select! {
                _ = closer.cancelled() => return Ok(()),
                read = reader.read_buf(&mut buf) => read?,
            };
            if n == 0 {
                tracing::info!("Control server closed the connection");
                return Ok(());
            }

            while let Some(line) = take_line(&mut buf, self.config.max_line_len)? {
                if line.trim_ascii().is_empty() {
                    continue;
                }
                self.emit(translate(decode_server_message(&line))).await;
            }
        }
    }

    async fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            self.emit(ControlEvent::StateChanged(state)).await;
        }
    }

    async fn emit(&self, event: ControlEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event).await;
    }
}

fn translate(decoded: std::result::Result<ServerMessage, ProtocolError>) -> ControlEvent {
    match decoded {
        Ok(ServerMessage::LoadOldAnnouncements(list)) => ControlEvent::Announcements(list),
        Ok(ServerMessage::NewAnnouncement(announcement)) => {
            ControlEvent::NewAnnouncement(announcement)
        }
        Ok(ServerMessage::LoadOldChatMessages(log)) => ControlEvent::ChatHistory(log),
        Ok(ServerMessage::ChatMessage(message)) => ControlEvent::Chat(message),
        Ok(ServerMessage::AnnouncementError(e)) => ControlEvent::AnnouncementError(e.message),
        Ok(ServerMessage::ServerError(e)) => ControlEvent::ServerError(e.message),
        Err(ProtocolError::UnknownMessageType(kind)) => {
            tracing::warn!(kind = %kind, "Unknown message type from server");
            ControlEvent::ServerError(format!("Unknown message type from server: {}", kind))
        }
        Err(ProtocolError::InvalidJson(e)) => {
            tracing::warn!(error = %e, "Invalid JSON from server");
            ControlEvent::ServerError("Invalid JSON received from server.".to_string())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Undecodable message from server");
            ControlEvent::ServerError(format!("Error processing server message: {}", e))
        }
    }
}

//! Control broadcast hub
//!
//! Owns the announcement list, the chat log and the set of live control
//! sessions. Sessions reach these only through the hub's operations.
//!
//! Each structure has its own lock, always taken in the order
//! announcements, chat, sessions. A mutation holds its log's lock while it
//! snapshots the session set, and [`BroadcastHub::register`] holds all
//! three while it snapshots the logs and inserts the new session, so a
//! joining session sees every event exactly once: either in its initial
//! snapshot or as a broadcast. Sends happen after the locks are released
//! and never block: each session has a bounded queue, and a session whose
//! queue is full or closed is removed and closed.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use super::auth::{Authorizer, PrivilegedAddress};
use super::config::ServerConfig;
use crate::error::{ProtocolError, StoreError};
use crate::protocol::constants::MAX_CHAT_CHARS;
use crate::protocol::envelope::encode_line;
use crate::protocol::message::{now_millis, Announcement, ChatMessage, ClientRequest, ServerMessage};
use crate::store::AnnouncementStore;

/// Reply to an unprivileged `createAnnouncement`
pub const ONLY_HOST: &str = "Only the designated host can create announcements.";

/// Reply to a blank `createAnnouncement`
pub const EMPTY_ANNOUNCEMENT: &str = "Announcement message cannot be empty.";

/// The hub's handle on one control session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: u64,
    pub peer: SocketAddr,
    outbound: mpsc::Sender<Bytes>,
    closer: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        id: u64,
        peer: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
        closer: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            outbound,
            closer,
        }
    }

    /// Queue a line without waiting; fails if the queue is full or closed
    pub fn try_send(&self, line: Bytes) -> bool {
        self.outbound.try_send(line).is_ok()
    }

    pub fn close(&self) {
        self.closer.cancel();
    }
}

/// Result of a `createAnnouncement` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementOutcome {
    Created(Announcement),
    Empty,
    Unauthorized,
}

/// Result of a `chatMessage` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    Posted(ChatMessage),
    /// Blank message, dropped without a reply
    Empty,
    /// Message longer than the chat bound, in characters
    TooLong(usize),
}

/// Shared announcement/chat state and session set
pub struct BroadcastHub {
    announcements: Mutex<Vec<Announcement>>,
    chat: Mutex<Vec<ChatMessage>>,
    sessions: Mutex<HashMap<u64, SessionHandle>>,
    store: Arc<dyn AnnouncementStore>,
    authorizer: Arc<dyn Authorizer>,
    next_seq: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub with an empty announcement list
    pub fn new(store: Arc<dyn AnnouncementStore>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self::with_announcements(Vec::new(), store, authorizer)
    }

    fn with_announcements(
        announcements: Vec<Announcement>,
        store: Arc<dyn AnnouncementStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        Self {
            announcements: Mutex::new(announcements),
            chat: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashMap::new()),
            store,
            authorizer,
            next_seq: AtomicU64::new(1),
        }
    }

    /// Create a hub seeded from the store
    ///
    /// An unreadable or corrupt store is logged and treated as empty.
    pub async fn load(store: Arc<dyn AnnouncementStore>, authorizer: Arc<dyn Authorizer>) -> Self {
        let announcements = match run_blocking(&store, |store| store.load()).await {
            Ok(mut list) => {
                list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                list
            }
            Err(e) => {
                tracing::warn!(error = %e, "Announcement store unreadable, starting empty");
                Vec::new()
            }
        };

        Self::with_announcements(announcements, store, authorizer)
    }

    /// Create a hub seeded from the store that lets only the config's
    /// `privileged_ip` create announcements
    pub async fn load_for(store: Arc<dyn AnnouncementStore>, config: &ServerConfig) -> Self {
        Self::load(store, Arc::new(PrivilegedAddress(config.privileged_ip))).await
    }

    /// Add a session and return the snapshot lines it must be sent first
    ///
    /// The lines are `loadOldAnnouncements` then `loadOldChatMessages`.
    pub async fn register(&self, handle: SessionHandle) -> Result<Vec<Bytes>, ProtocolError> {
        let announcements = self.announcements.lock().await;
        let chat = self.chat.lock().await;
        let mut sessions = self.sessions.lock().await;

        let snapshot = vec![
            encode_line(&ServerMessage::LoadOldAnnouncements(announcements.clone()))?,
            encode_line(&ServerMessage::LoadOldChatMessages(chat.clone()))?,
        ];

        tracing::debug!(
            session_id = handle.id,
            peer = %handle.peer,
            announcements = announcements.len(),
            chat = chat.len(),
            "Session registered"
        );
        sessions.insert(handle.id, handle);

        Ok(snapshot)
    }

    /// Remove a session; returns whether it was still registered
    pub async fn unregister(&self, id: u64) -> bool {
        self.sessions.lock().await.remove(&id).is_some()
    }

    /// Dispatch a decoded request
    ///
    /// Returns the reply owed to the requester, if any. Successful
    /// requests are answered by the broadcast itself.
    pub async fn handle_request(
        &self,
        peer: &SocketAddr,
        request: ClientRequest,
    ) -> Option<ServerMessage> {
        match request {
            ClientRequest::CreateAnnouncement(req) => {
                match self.create_announcement(peer, &req.message).await {
                    AnnouncementOutcome::Created(_) => None,
                    AnnouncementOutcome::Empty => {
                        Some(ServerMessage::announcement_error(EMPTY_ANNOUNCEMENT))
                    }
                    AnnouncementOutcome::Unauthorized => {
                        Some(ServerMessage::announcement_error(ONLY_HOST))
                    }
                }
            }
            ClientRequest::ChatMessage(req) => {
                match self.post_chat(peer, req.sender_id, &req.message).await {
                    ChatOutcome::Posted(_) | ChatOutcome::Empty => None,
                    ChatOutcome::TooLong(len) => Some(ServerMessage::server_error(format!(
                        "Chat message is {} characters; the limit is {}.",
                        len, MAX_CHAT_CHARS
                    ))),
                }
            }
        }
    }

    /// Create, persist and broadcast an announcement
    pub async fn create_announcement(&self, peer: &SocketAddr, text: &str) -> AnnouncementOutcome {
        if !self.authorizer.may_announce(peer) {
            tracing::warn!(peer = %peer, "Rejected announcement from unprivileged peer");
            return AnnouncementOutcome::Unauthorized;
        }

        let message = text.trim();
        if message.is_empty() {
            return AnnouncementOutcome::Empty;
        }

        let timestamp = now_millis();
        let announcement = Announcement {
            id: format!("{}-{}", timestamp, self.next_seq.fetch_add(1, Ordering::Relaxed)),
            message: message.to_string(),
            timestamp,
        };

        let targets = {
            let mut announcements = self.announcements.lock().await;
            announcements.insert(0, announcement.clone());

            let record = announcement.clone();
            if let Err(e) = run_blocking(&self.store, move |store| store.append(&record)).await {
                tracing::warn!(error = %e, id = %announcement.id, "Failed to persist announcement");
            }

            self.session_snapshot().await
        };

        tracing::info!(peer = %peer, id = %announcement.id, "Announcement created");
        self.fan_out(
            &targets,
            &ServerMessage::NewAnnouncement(announcement.clone()),
        )
        .await;

        AnnouncementOutcome::Created(announcement)
    }

    /// Append a chat line to the log and broadcast it
    ///
    /// A missing or blank `sender_id` becomes `UnknownClient-<port>`.
    pub async fn post_chat(
        &self,
        peer: &SocketAddr,
        sender_id: Option<String>,
        text: &str,
    ) -> ChatOutcome {
        let message = text.trim();
        if message.is_empty() {
            return ChatOutcome::Empty;
        }

        let chars = message.chars().count();
        if chars > MAX_CHAT_CHARS {
            tracing::warn!(peer = %peer, chars, "Rejected over-long chat message");
            return ChatOutcome::TooLong(chars);
        }

        let sender = sender_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("UnknownClient-{}", peer.port()));

        let chat_message = ChatMessage {
            sender,
            message: message.to_string(),
            timestamp: now_millis(),
        };

        let targets = {
            let mut chat = self.chat.lock().await;
            chat.push(chat_message.clone());
            self.session_snapshot().await
        };

        tracing::debug!(peer = %peer, sender = %chat_message.sender, "Chat message posted");
        self.fan_out(&targets, &ServerMessage::ChatMessage(chat_message.clone()))
            .await;

        ChatOutcome::Posted(chat_message)
    }

    /// Send a message to every live session
    ///
    /// Returns the number of sessions it was queued for.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let targets = self.session_snapshot().await;
        self.fan_out(&targets, message).await
    }

    /// Write the in-memory announcement list back to the store
    ///
    /// Holds the announcement lock until the write lands, so it never
    /// overlaps the append of a concurrent announcement.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let guard = self.announcements.lock().await;
        let announcements = guard.clone();
        let count = announcements.len();
        run_blocking(&self.store, move |store| store.replace(&announcements)).await?;
        drop(guard);
        tracing::info!(count, "Announcements flushed");
        Ok(())
    }

    /// Current announcement list, newest first
    pub async fn announcements(&self) -> Vec<Announcement> {
        self.announcements.lock().await.clone()
    }

    /// Current chat log, in append order
    pub async fn chat_log(&self) -> Vec<ChatMessage> {
        self.chat.lock().await.clone()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn session_snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.lock().await.values().cloned().collect()
    }

    async fn fan_out(&self, targets: &[SessionHandle], message: &ServerMessage) -> usize {
        let line = match encode_line(message) {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, kind = message.kind(), "Failed to encode broadcast");
                return 0;
            }
        };

        let mut failed = Vec::new();
        for target in targets {
            if !target.try_send(line.clone()) {
                failed.push(target.id);
            }
        }

        if !failed.is_empty() {
            let mut sessions = self.sessions.lock().await;
            for id in &failed {
                if let Some(handle) = sessions.remove(id) {
                    tracing::warn!(
                        session_id = handle.id,
                        peer = %handle.peer,
                        "Dropping session that cannot keep up"
                    );
                    handle.close();
                }
            }
        }

        targets.len() - failed.len()
    }
}

async fn run_blocking<T, F>(store: &Arc<dyn AnnouncementStore>, f: F) -> Result<T, StoreError>
where
    F: FnOnce(&dyn AnnouncementStore) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || f(store.as_ref())).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))),
    }
}

//! Control channel message types
//!
//! Every control line is a JSON object `{"type": ..., "payload": ...}`.
//! Server-to-client and client-to-server messages are separate enums:
//! the `chatMessage` type appears in both directions with different
//! payloads.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A host-issued announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: String,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// A chat line as logged and broadcast by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub sender: String,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Payload of `announcementError` and `serverError`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full announcement list, newest first
    LoadOldAnnouncements(Vec<Announcement>),
    NewAnnouncement(Announcement),
    /// Full chat log, in append order
    LoadOldChatMessages(Vec<ChatMessage>),
    ChatMessage(ChatMessage),
    AnnouncementError(ErrorPayload),
    ServerError(ErrorPayload),
}

impl ServerMessage {
    /// Wire `type` values this enum decodes
    pub const TYPES: &'static [&'static str] = &[
        "loadOldAnnouncements",
        "newAnnouncement",
        "loadOldChatMessages",
        "chatMessage",
        "announcementError",
        "serverError",
    ];

    pub fn announcement_error(message: impl Into<String>) -> Self {
        ServerMessage::AnnouncementError(ErrorPayload {
            message: message.into(),
        })
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        ServerMessage::ServerError(ErrorPayload {
            message: message.into(),
        })
    }

    /// Wire `type` of this message
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::LoadOldAnnouncements(_) => "loadOldAnnouncements",
            ServerMessage::NewAnnouncement(_) => "newAnnouncement",
            ServerMessage::LoadOldChatMessages(_) => "loadOldChatMessages",
            ServerMessage::ChatMessage(_) => "chatMessage",
            ServerMessage::AnnouncementError(_) => "announcementError",
            ServerMessage::ServerError(_) => "serverError",
        }
    }
}

/// `createAnnouncement` payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementRequest {
    #[serde(default)]
    pub message: String,
}

/// `chatMessage` payload as sent by a client
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Requests sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientRequest {
    CreateAnnouncement(AnnouncementRequest),
    ChatMessage(ChatRequest),
}

impl ClientRequest {
    /// Wire `type` values this enum decodes
    pub const TYPES: &'static [&'static str] = &["createAnnouncement", "chatMessage"];

    /// Wire `type` of this request
    pub fn kind(&self) -> &'static str {
        match self {
            ClientRequest::CreateAnnouncement(_) => "createAnnouncement",
            ClientRequest::ChatMessage(_) => "chatMessage",
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

//! Announcement persistence
//!
//! The broadcast hub owns the in-memory announcement list; a store only
//! has to load it at startup and keep a durable copy. Chat is never
//! persisted.

pub mod json;
pub mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::protocol::message::Announcement;

/// Durable announcement list, newest first
pub trait AnnouncementStore: Send + Sync {
    /// Load the stored list, newest first
    fn load(&self) -> Result<Vec<Announcement>, StoreError>;

    /// Persist a newly created announcement at the front of the list
    fn append(&self, announcement: &Announcement) -> Result<(), StoreError>;

    /// Overwrite the stored list
    fn replace(&self, announcements: &[Announcement]) -> Result<(), StoreError>;
}

//! In-memory store

use std::sync::Mutex;

use super::AnnouncementStore;
use crate::error::StoreError;
use crate::protocol::message::Announcement;

/// Store that keeps the list in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    announcements: Mutex<Vec<Announcement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing list (newest first)
    pub fn with_announcements(announcements: Vec<Announcement>) -> Self {
        Self {
            announcements: Mutex::new(announcements),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Announcement>> {
        self.announcements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AnnouncementStore for MemoryStore {
    fn load(&self) -> Result<Vec<Announcement>, StoreError> {
        Ok(self.lock().clone())
    }

    fn append(&self, announcement: &Announcement) -> Result<(), StoreError> {
        self.lock().insert(0, announcement.clone());
        Ok(())
    }

    fn replace(&self, announcements: &[Announcement]) -> Result<(), StoreError> {
        *self.lock() = announcements.to_vec();
        Ok(())
    }
}

//! JSON file store
//!
//! The file holds a JSON array of `{id, message, timestamp}` objects,
//! newest first. Saves write a sibling temporary file and rename it over
//! the original, so a crash mid-save leaves the previous list intact.
//! Records without a non-empty `message` or a usable `timestamp` are
//! skipped with a warning on load.
//!
//! `timestamp` is written as milliseconds since the Unix epoch. On load it
//! may also be an ISO-8601 string (RFC 3339, or a date-time without an
//! offset, read as UTC), as found in files written by older hosts.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::AnnouncementStore;
use crate::error::StoreError;
use crate::protocol::message::Announcement;

/// Announcement list persisted as a JSON file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl AnnouncementStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Announcement>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No announcement file, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let records: Vec<Value> = serde_json::from_slice(&data)?;
        let total = records.len();

        let mut announcements: Vec<Announcement> = records
            .into_iter()
            .filter_map(|record| {
                let parsed = parse_record(&record);
                if parsed.is_none() {
                    tracing::warn!(record = %record, "Skipping invalid announcement record");
                }
                parsed
            })
            .collect();

        // Newest first, regardless of how the file was ordered
        announcements.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        tracing::info!(
            path = %self.path.display(),
            loaded = announcements.len(),
            skipped = total - announcements.len(),
            "Loaded announcements"
        );

        Ok(announcements)
    }

    fn append(&self, announcement: &Announcement) -> Result<(), StoreError> {
        let mut announcements = self.load()?;
        announcements.insert(0, announcement.clone());
        self.replace(&announcements)
    }

    fn replace(&self, announcements: &[Announcement]) -> Result<(), StoreError> {
        let data = serde_json::to_vec_pretty(announcements)?;
        let temp = self.temp_path();

        {
            let mut file = File::create(&temp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;

        tracing::debug!(
            path = %self.path.display(),
            count = announcements.len(),
            "Saved announcements"
        );
        Ok(())
    }
}

fn parse_record(record: &Value) -> Option<Announcement> {
    let message = record.get("message")?.as_str()?.trim();
    if message.is_empty() {
        return None;
    }
    let timestamp = parse_timestamp(record.get("timestamp")?)?;
    let id = record
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| timestamp.to_string());

    Some(Announcement {
        id,
        message: message.to_string(),
        timestamp,
    })
}

fn parse_timestamp(value: &Value) -> Option<u64> {
    match value {
        Value::Number(millis) => millis.as_u64(),
        Value::String(text) => parse_iso8601_millis(text.trim()),
        _ => None,
    }
}

fn parse_iso8601_millis(text: &str) -> Option<u64> {
    let at = match OffsetDateTime::parse(text, &Rfc3339) {
        Ok(at) => at,
        Err(_) => PrimitiveDateTime::parse(
            text,
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
        )
        .ok()?
        .assume_utc(),
    };
    u64::try_from(at.unix_timestamp_nanos() / 1_000_000).ok()
}

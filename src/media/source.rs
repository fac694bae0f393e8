//! Frame source and sink collaborators
//!
//! Capture, encoding, decoding and display live outside this crate. The
//! distributor pulls already-encoded frames from a [`FrameSource`] and the
//! receiver pushes reassembled frames into a [`FrameSink`]; both only see
//! opaque byte buffers.

use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::reassembly::CompletedFrame;
use crate::error::{Error, Result};

/// Produces encoded frames for distribution
///
/// Implementations may block; the distributor calls them on tokio's
/// blocking pool.
pub trait FrameSource: Send {
    /// Next frame, or `Ok(None)` once the source is exhausted
    fn next_frame(&mut self) -> Result<Option<Bytes>>;

    /// Restart the source from its first frame
    fn rewind(&mut self) -> Result<()>;
}

impl<S> FrameSource for Box<S>
where
    S: FrameSource + ?Sized,
{
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        (**self).next_frame()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}

/// Consumes reassembled frames
pub trait FrameSink: Send {
    fn deliver(&mut self, frame: CompletedFrame);
}

impl<F> FrameSink for F
where
    F: FnMut(CompletedFrame) + Send,
{
    fn deliver(&mut self, frame: CompletedFrame) {
        self(frame)
    }
}

/// Frames held in memory, replayed in order
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: Vec<Bytes>,
    position: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<Bytes>) -> Self {
        Self {
            frames,
            position: 0,
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let frame = self.frames.get(self.position).cloned();
        if frame.is_some() {
            self.position += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

/// Pre-encoded frames stored one per file in a directory
///
/// Files are played in lexicographic order of their names, so a sequence
/// such as `frame_00001.jpg`, `frame_00002.jpg`, ... plays as recorded.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    files: Vec<PathBuf>,
    position: usize,
}

impl DirectorySource {
    /// Index the regular files in `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }

        if files.is_empty() {
            return Err(Error::SourceUnavailable(format!(
                "no frames in {}",
                dir.display()
            )));
        }

        files.sort();
        tracing::info!(dir = %dir.display(), frames = files.len(), "Frame directory indexed");

        Ok(Self { files, position: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Result<Option<Bytes>> {
        let Some(path) = self.files.get(self.position) else {
            return Ok(None);
        };

        let data = std::fs::read(path)?;
        self.position += 1;
        Ok(Some(Bytes::from(data)))
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

//! Frame handling: fragmentation, reassembly, and the source/sink seams

pub mod fragment;
pub mod reassembly;
pub mod source;

pub use fragment::Fragmenter;
pub use reassembly::{CompletedFrame, InsertOutcome, Reassembler};
pub use source::{DirectorySource, FrameSink, FrameSource, MemorySource};

//! Checkpoint capture: the in-memory execution tree, its debounced
//! persistence, and the sink port snapshots are written through.

pub mod manager;
pub mod redact;
pub mod sink;

pub use manager::CheckpointManager;
pub use sink::{BoxCheckpointSink, CheckpointSink, MemorySink, NoopSink};

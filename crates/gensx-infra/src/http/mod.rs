//! Hosted GenSX API adapters.

pub mod checkpoint;

pub use checkpoint::HttpCheckpointSink;

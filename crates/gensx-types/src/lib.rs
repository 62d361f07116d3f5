//! Shared domain types for the GenSX execution engine.
//!
//! This crate contains the data model every other layer speaks: the
//! execution tree (`ExecutionNode`), deterministic node ids, checkpoint
//! snapshots, lifecycle events, configuration, and the error types used by
//! the persistence ports.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, sha2, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod node;

//! Execution engine and port definitions for GenSX.
//!
//! This crate runs workflows as trees of named components, records every
//! invocation into a checkpoint tree, persists snapshots through the
//! [`checkpoint::sink::CheckpointSink`] port, and replays completed subtrees
//! from a prior checkpoint. Stored checkpoints are read back through the
//! [`repository::CheckpointRepository`] port. It depends only on
//! `gensx-types` -- never on `gensx-infra` or any database/HTTP crate.

pub mod checkpoint;
pub mod error;
pub mod event;
pub mod replay;
pub mod repository;
pub mod runtime;

pub use error::ExecutionError;
pub use runtime::{
    Component, InvokeOptions, NodeContext, RunOptions, WorkflowExecution, WorkflowRuntime,
};

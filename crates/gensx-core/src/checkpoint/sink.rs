//! Persistence sink port for checkpoint snapshots.
//!
//! The checkpoint manager needs exactly one capability from storage: accept
//! a full snapshot of an execution tree. Adapters (SQLite, the hosted API)
//! live in `gensx-infra`; this module also ships two in-process sinks.
//!
//! Dynamic dispatch follows the usual blanket-impl pattern:
//! 1. `CheckpointSink` uses RPITIT and is not object safe
//! 2. `CheckpointSinkDyn` is the object-safe twin with boxed futures
//! 3. `BoxCheckpointSink` wraps `Arc<dyn CheckpointSinkDyn>` and delegates

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gensx_types::checkpoint::CheckpointSnapshot;
use gensx_types::error::SinkError;

/// Destination for checkpoint snapshots.
///
/// Each call carries the complete current tree; implementations may
/// overwrite whatever they stored for the same execution before.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait CheckpointSink: Send + Sync {
    fn send(
        &self,
        snapshot: &CheckpointSnapshot,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

/// Object-safe version of [`CheckpointSink`] with boxed futures.
pub trait CheckpointSinkDyn: Send + Sync {
    fn send_boxed<'a>(
        &'a self,
        snapshot: &'a CheckpointSnapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>>;
}

impl<T: CheckpointSink> CheckpointSinkDyn for T {
    fn send_boxed<'a>(
        &'a self,
        snapshot: &'a CheckpointSnapshot,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + 'a>> {
        Box::pin(self.send(snapshot))
    }
}

/// Type-erased, cheaply cloneable checkpoint sink.
///
/// Lets the runtime pick a sink from configuration at startup while the
/// checkpoint manager stays non-generic.
#[derive(Clone)]
pub struct BoxCheckpointSink {
    inner: Arc<dyn CheckpointSinkDyn>,
}

impl BoxCheckpointSink {
    pub fn new<T: CheckpointSink + 'static>(sink: T) -> Self {
        Self {
            inner: Arc::new(sink),
        }
    }

    pub async fn send(&self, snapshot: &CheckpointSnapshot) -> Result<(), SinkError> {
        self.inner.send_boxed(snapshot).await
    }
}

impl std::fmt::Debug for BoxCheckpointSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxCheckpointSink").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// Accepts and discards every snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl CheckpointSink for NoopSink {
    async fn send(&self, _snapshot: &CheckpointSnapshot) -> Result<(), SinkError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps every accepted snapshot in memory.
///
/// Clones share the same storage, so a test can hand one clone to the
/// runtime and inspect another.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    snapshots: Arc<Mutex<Vec<CheckpointSnapshot>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every send for `delay` before accepting it.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// While set, every send is counted and then rejected.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `send` calls, accepted or not.
    pub fn send_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Accepted snapshots in arrival order.
    pub fn snapshots(&self) -> Vec<CheckpointSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn latest(&self) -> Option<CheckpointSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl CheckpointSink for MemorySink {
    async fn send(&self, snapshot: &CheckpointSnapshot) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("memory sink set to fail".to_string()));
        }
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(snapshot.clone());
        Ok(())
    }
}

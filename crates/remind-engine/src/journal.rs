//! Persistence seams: the durable event log and the snapshot store.
//!
//! The engine only ever talks to these two interfaces. [`crate::db`]
//! provides the SQLite-backed implementation; the in-memory variants here
//! exist for tests and for callers wiring their own durability.

use std::sync::Arc;

use async_trait::async_trait;
use remind_core::{Event, ReminderError, Result, State};
use tokio::sync::Mutex;

/// Append-only, per-instance event log with strictly increasing sequence
/// numbers.
#[async_trait]
pub trait EventJournal: Send + Sync {
    /// Persist `event` at `seq`. The engine never issues a second append
    /// before the first one resolved, so implementations may assume
    /// strictly increasing, gap-free sequence numbers per instance.
    async fn append(&self, persistence_id: &str, seq: u64, event: &Event) -> Result<()>;

    /// Events with a sequence number greater than `from_seq`, in order.
    async fn replay(&self, persistence_id: &str, from_seq: u64) -> Result<Vec<(u64, Event)>>;

    /// Drop events at or before `up_to_seq`. Compaction only.
    async fn truncate(&self, persistence_id: &str, up_to_seq: u64) -> Result<()>;
}

/// Store for whole-state snapshots keyed by log sequence number.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, persistence_id: &str, seq: u64, state: &State) -> Result<()>;

    /// The snapshot with the highest sequence number, if any.
    async fn load_latest(&self, persistence_id: &str) -> Result<Option<(u64, State)>>;
}

/// In-memory journal. Not durable — tests and wiring experiments only.
#[derive(Clone, Default)]
pub struct MemoryJournal {
    events: Arc<Mutex<Vec<(u64, Event)>>>,
    fail_appends: Arc<std::sync::atomic::AtomicBool>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail, to exercise the engine's
    /// persistence-failure path.
    pub fn set_fail_appends(&self, fail: bool) {
        self.fail_appends
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<(u64, Event)> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventJournal for MemoryJournal {
    async fn append(&self, _persistence_id: &str, seq: u64, event: &Event) -> Result<()> {
        if self.fail_appends.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ReminderError::Persistence(
                "journal append rejected".to_string(),
            ));
        }
        self.events.lock().await.push((seq, event.clone()));
        Ok(())
    }

    async fn replay(&self, _persistence_id: &str, from_seq: u64) -> Result<Vec<(u64, Event)>> {
        Ok(self
            .events
            .lock()
            .await
            .iter()
            .filter(|(seq, _)| *seq > from_seq)
            .cloned()
            .collect())
    }

    async fn truncate(&self, _persistence_id: &str, up_to_seq: u64) -> Result<()> {
        self.events.lock().await.retain(|(seq, _)| *seq > up_to_seq);
        Ok(())
    }
}

/// In-memory snapshot store counterpart to [`MemoryJournal`].
#[derive(Clone, Default)]
pub struct MemorySnapshots {
    snapshots: Arc<Mutex<Vec<(u64, State)>>>,
}

impl MemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshots(&self) -> Vec<(u64, State)> {
        self.snapshots.lock().await.clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshots {
    async fn save(&self, _persistence_id: &str, seq: u64, state: &State) -> Result<()> {
        self.snapshots.lock().await.push((seq, state.clone()));
        Ok(())
    }

    async fn load_latest(&self, _persistence_id: &str) -> Result<Option<(u64, State)>> {
        Ok(self
            .snapshots
            .lock()
            .await
            .iter()
            .max_by_key(|(seq, _)| *seq)
            .cloned())
    }
}

//! Reminder data model: schedule entries, immutable state, persisted events.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use remind_cron::CronExpression;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a scheduled task repeats, if at all. Closed set — no open extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleKind {
    /// Fire once, then the entry is removed for good.
    Once,

    /// Fire, then reschedule at `fired_at + interval`. Drift is anchored to
    /// the firing time, not to the original schedule time.
    Repeat { interval_secs: u64 },

    /// Fire on a cron schedule.
    Cron { expression: CronExpression },
}

/// A single pending task owned by a reminder instance.
///
/// Entries are immutable values: every "next occurrence" transition produces
/// a new entry, never a mutation. The `task_id` is the unique key and never
/// changes across reschedules. Ack tokens are deliberately absent here —
/// they live only on the transient [`Schedule`] request so they can never be
/// persisted or replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub task_id: String,
    /// Opaque delivery address, resolved by the delivery sink.
    pub recipient: String,
    /// Opaque payload handed to the recipient as-is.
    pub message: serde_json::Value,
    pub trigger_at: DateTime<Utc>,
    pub schedule: ScheduleKind,
}

impl Entry {
    /// Copy of this entry with a new trigger time.
    pub fn with_trigger_at(&self, trigger_at: DateTime<Utc>) -> Self {
        Self {
            trigger_at,
            ..self.clone()
        }
    }

    /// The entry's next occurrence after firing at `fired_at`, or `None`
    /// when the schedule is exhausted.
    pub fn with_next_occurrence(&self, fired_at: DateTime<Utc>) -> Option<Self> {
        match &self.schedule {
            ScheduleKind::Once => None,
            ScheduleKind::Repeat { interval_secs } => {
                Some(self.with_trigger_at(fired_at + Duration::seconds(*interval_secs as i64)))
            }
            ScheduleKind::Cron { expression } => match expression.next_execution_date(fired_at) {
                Ok(next) => Some(self.with_trigger_at(next)),
                Err(e) => {
                    warn!(task_id = %self.task_id, "cron schedule exhausted: {e}");
                    None
                }
            },
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.trigger_at <= now
    }
}

/// Immutable mapping from task id to pending entry — the recoverable
/// snapshot payload. Mutated only through [`State::apply`]; equality is
/// structural and independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    entries: BTreeMap<String, Entry>,
}

impl State {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &BTreeMap<String, Entry> {
        &self.entries
    }

    pub fn get(&self, task_id: &str) -> Option<&Entry> {
        self.entries.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// New state with `entry` added (or replaced, keyed by task id).
    pub fn with_entry(&self, entry: Entry) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(entry.task_id.clone(), entry);
        Self { entries }
    }

    /// New state with the entry for `task_id` removed. No-op when absent.
    pub fn without_entry(&self, task_id: &str) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(task_id);
        Self { entries }
    }

    /// The pure reducer shared by live processing and recovery replay.
    /// Idempotent: applying the same event twice is a no-op the second time.
    pub fn apply(&self, event: &Event) -> Self {
        match event {
            Event::Scheduled { entry } => self.with_entry(entry.clone()),
            Event::Completed { task_id, .. } => self.without_entry(task_id),
        }
    }

    /// Entries whose trigger time has arrived.
    pub fn due(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Entry> {
        self.entries.values().filter(move |e| e.is_due(now))
    }
}

/// Persisted, append-only events — the only source of truth for state
/// reconstruction. The in-memory [`State`] is a derived cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Scheduled { entry: Entry },
    Completed {
        task_id: String,
        completed_at: DateTime<Utc>,
    },
}

/// A request to schedule a message delivery. Transient — never persisted.
///
/// `ack` is an opaque token returned to the requester once the task is
/// durably persisted; [`Schedule::entry`] strips it before the event is
/// built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub task_id: String,
    pub recipient: String,
    pub message: serde_json::Value,
    pub trigger_at: DateTime<Utc>,
    pub schedule: ScheduleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<serde_json::Value>,
}

impl Schedule {
    /// The durable entry for this request, with the ephemeral ack stripped.
    pub fn entry(&self) -> Entry {
        Entry {
            task_id: self.task_id.clone(),
            recipient: self.recipient.clone(),
            message: self.message.clone(),
            trigger_at: self.trigger_at,
            schedule: self.schedule.clone(),
        }
    }
}

/// A fired entry handed to the delivery sink. Fire-and-forget: the core
/// assumes no delivery confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    pub task_id: String,
    pub recipient: String,
    pub message: serde_json::Value,
}

impl From<&Entry> for Delivery {
    fn from(entry: &Entry) -> Self {
        Self {
            task_id: entry.task_id.clone(),
            recipient: entry.recipient.clone(),
            message: entry.message.clone(),
        }
    }
}

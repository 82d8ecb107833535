//! The reminder state machine: a single-writer command loop over an
//! event-sourced [`State`].
//!
//! All commands for one instance are processed strictly sequentially, so log
//! sequence numbers, in-memory state and the snapshot counter stay
//! consistent. Recovery (snapshot + log replay) runs to completion before
//! the mailbox is first polled — commands arriving earlier queue up and
//! never observe partially-replayed state.

use chrono::{DateTime, Utc};
use remind_core::{
    Delivery, Entry, Event, ReminderError, ReminderSettings, Result, Schedule, State,
};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::journal::{EventJournal, SnapshotStore};

/// Commands accepted by a running engine. Transient — never persisted.
pub enum Command {
    Schedule {
        request: Schedule,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
    Cancel {
        task_id: String,
        ack: Option<Value>,
        reply: oneshot::Sender<Result<Option<Value>>>,
    },
    GetState {
        reply: oneshot::Sender<State>,
    },
}

/// Cloneable front door to a running [`ReminderEngine`].
///
/// Dropping every handle closes the mailbox and stops the engine loop.
#[derive(Clone)]
pub struct ReminderHandle {
    tx: mpsc::Sender<Command>,
}

impl ReminderHandle {
    /// Create a handle and the mailbox receiver to pass to
    /// [`ReminderEngine::run`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Schedule a task. Resolves once the `Scheduled` event is durably
    /// persisted, returning the request's ack token (if any); a persistence
    /// failure is returned as the error and leaves the scheduler unchanged.
    pub async fn schedule(&self, request: Schedule) -> Result<Option<Value>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Schedule { request, reply })
            .await
            .map_err(|_| ReminderError::Stopped)?;
        rx.await.map_err(|_| ReminderError::Stopped)?
    }

    /// Cancel a scheduled task. Modeled as a normal completion.
    pub async fn cancel(&self, task_id: &str, ack: Option<Value>) -> Result<Option<Value>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Cancel {
                task_id: task_id.to_string(),
                ack,
                reply,
            })
            .await
            .map_err(|_| ReminderError::Stopped)?;
        rx.await.map_err(|_| ReminderError::Stopped)?
    }

    /// Current in-memory state. Read-only, no persistence side effect.
    pub async fn get_state(&self) -> Result<State> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::GetState { reply })
            .await
            .map_err(|_| ReminderError::Stopped)?;
        rx.await.map_err(|_| ReminderError::Stopped)
    }
}

/// Durable scheduler for long-horizon tasks (minutes, hours, days, weeks).
///
/// Scheduled entries survive process restarts: every mutation is persisted
/// to the event journal before it is applied, and startup recovers the
/// exact pending set from the latest snapshot plus the log tail.
pub struct ReminderEngine<J, S> {
    settings: ReminderSettings,
    journal: J,
    snapshots: S,
    /// Fired entries are pushed here for delivery routing. `try_send` keeps
    /// the tick loop from ever blocking on a slow consumer.
    delivery_tx: mpsc::Sender<Delivery>,
    state: State,
    last_seq: u64,
    events_since_snapshot: u32,
}

impl<J, S> ReminderEngine<J, S>
where
    J: EventJournal,
    S: SnapshotStore,
{
    pub fn new(
        settings: ReminderSettings,
        journal: J,
        snapshots: S,
        delivery_tx: mpsc::Sender<Delivery>,
    ) -> Self {
        Self {
            settings,
            journal,
            snapshots,
            delivery_tx,
            state: State::empty(),
            last_seq: 0,
            events_since_snapshot: 0,
        }
    }

    /// Current pending-task set.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Sequence number of the last persisted event.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Rebuild state from the latest snapshot plus the remaining log tail.
    ///
    /// Fatal on a corrupt or unreadable snapshot/log entry: silently
    /// starting from empty state would resurrect completed tasks or drop
    /// pending ones.
    pub async fn recover(&mut self) -> Result<()> {
        let pid = self.settings.persistence_id.clone();

        let (snapshot_seq, mut state) = match self
            .snapshots
            .load_latest(&pid)
            .await
            .map_err(|e| ReminderError::Recovery(e.to_string()))?
        {
            Some((seq, state)) => (seq, state),
            None => (0, State::empty()),
        };

        let mut seq = snapshot_seq;
        let tail = self
            .journal
            .replay(&pid, snapshot_seq)
            .await
            .map_err(|e| ReminderError::Recovery(e.to_string()))?;
        let replayed = tail.len();
        for (event_seq, event) in tail {
            state = state.apply(&event);
            seq = event_seq;
        }

        self.state = state;
        self.last_seq = seq;
        debug!(
            persistence_id = %pid,
            snapshot_seq,
            replayed,
            entries = self.state.len(),
            "reminder state recovered"
        );
        Ok(())
    }

    /// Main event loop: recover, then serve ticks and commands until
    /// `shutdown` broadcasts `true` or every handle is dropped.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        self.recover().await?;
        info!(
            persistence_id = %self.settings.persistence_id,
            entries = self.state.len(),
            "reminder engine ready"
        );

        let mut interval = tokio::time::interval(self.settings.tick_interval());
        // the immediate first tick would re-fire everything due before startup
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("reminder tick error: {e}");
                    }
                }
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => {
                        info!("all reminder handles dropped — stopping");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("reminder engine shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate due entries at `now`: deliver, persist `Completed`, and
    /// reschedule repeating entries from the fire time.
    ///
    /// Delivery happens before the `Completed` event is persisted, so a
    /// crash in between redelivers the task on recovery — at-least-once is
    /// the documented guarantee.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        let due: Vec<Entry> = self.state.due(now).cloned().collect();
        for entry in due {
            info!(
                task_id = %entry.task_id,
                recipient = %entry.recipient,
                "sending reminder"
            );
            if self.delivery_tx.try_send(Delivery::from(&entry)).is_err() {
                warn!(task_id = %entry.task_id, "delivery channel full or closed — message dropped");
            }

            self.persist(Event::Completed {
                task_id: entry.task_id.clone(),
                completed_at: now,
            })
            .await?;

            if let Some(next) = entry.with_next_occurrence(now) {
                self.persist(Event::Scheduled { entry: next }).await?;
            }
        }
        Ok(())
    }

    /// Persist a `Scheduled` event for the request and return its ack token.
    pub async fn schedule(&mut self, request: Schedule) -> Result<Option<Value>> {
        let entry = request.entry();
        self.persist(Event::Scheduled { entry }).await?;
        Ok(request.ack)
    }

    /// Persist a `Completed` event for `task_id`. Removal is idempotent by
    /// key, so cancelling an unknown or already-completed task is harmless.
    pub async fn cancel(&mut self, task_id: &str, ack: Option<Value>) -> Result<Option<Value>> {
        self.persist(Event::Completed {
            task_id: task_id.to_string(),
            completed_at: Utc::now(),
        })
        .await?;
        Ok(ack)
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Schedule { request, reply } => {
                let result = self.schedule(request).await;
                let _ = reply.send(result);
            }
            Command::Cancel {
                task_id,
                ack,
                reply,
            } => {
                let result = self.cancel(&task_id, ack).await;
                let _ = reply.send(result);
            }
            Command::GetState { reply } => {
                let _ = reply.send(self.state.clone());
            }
        }
    }

    /// Append the event, then apply it through the same reducer recovery
    /// uses. On append failure nothing is applied — no partial state.
    async fn persist(&mut self, event: Event) -> Result<()> {
        let seq = self.last_seq + 1;
        self.journal
            .append(&self.settings.persistence_id, seq, &event)
            .await?;
        self.last_seq = seq;
        self.state = self.state.apply(&event);
        debug!(seq, "reminder state updated from event: {event:?}");
        self.save_snapshot_if_needed().await;
        Ok(())
    }

    /// Snapshot the whole state every `snapshot_interval` persisted events.
    /// A failed save is logged and otherwise ignored: the log is left
    /// untouched, so durability is unaffected and the next threshold
    /// re-attempts.
    async fn save_snapshot_if_needed(&mut self) {
        let interval = self.settings.snapshot_interval.max(1);
        self.events_since_snapshot = (self.events_since_snapshot + 1) % interval;
        if self.events_since_snapshot != 0 {
            return;
        }

        let pid = &self.settings.persistence_id;
        match self.snapshots.save(pid, self.last_seq, &self.state).await {
            Ok(()) => {
                debug!(seq = self.last_seq, "saved reminder snapshot");
                if self.settings.truncate_on_snapshot {
                    if let Err(e) = self.journal.truncate(pid, self.last_seq).await {
                        warn!("failed to truncate event log: {e}");
                    }
                }
            }
            Err(e) => error!("failed to save reminder snapshot: {e}"),
        }
    }
}

//! `remind-engine` — event-sourced scheduling state machine.
//!
//! # Overview
//!
//! A [`ReminderEngine`] owns one persistence identity: an append-only event
//! log plus a snapshot store. Commands (`Schedule`, `Cancel`, `GetState`)
//! and the periodic tick are processed strictly sequentially; every state
//! change is persisted as a `Scheduled` or `Completed` event before it is
//! applied, and startup replays snapshot + log tail to reconstruct the
//! exact pending-task set.
//!
//! ```no_run
//! use remind_core::ReminderSettings;
//! use remind_engine::{ReminderEngine, ReminderHandle, SqliteStore};
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn example() -> remind_core::Result<()> {
//! let store = SqliteStore::open("remind.db")?;
//! let (delivery_tx, mut deliveries) = mpsc::channel(64);
//! let (handle, commands) = ReminderHandle::channel(64);
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let engine = ReminderEngine::new(
//!     ReminderSettings::default(),
//!     store.clone(),
//!     store,
//!     delivery_tx,
//! );
//! tokio::spawn(engine.run(commands, shutdown_rx));
//!
//! while let Some(delivery) = deliveries.recv().await {
//!     println!("deliver {} to {}", delivery.message, delivery.recipient);
//! }
//! # Ok(())
//! # }
//! ```

pub mod db;
pub mod engine;
pub mod journal;

pub use db::SqliteStore;
pub use engine::{Command, ReminderEngine, ReminderHandle};
pub use journal::{EventJournal, MemoryJournal, MemorySnapshots, SnapshotStore};

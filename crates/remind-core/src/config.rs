//! Reminder settings (remind.toml + REMIND_* env overrides).

use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ReminderError, Result};

pub const DEFAULT_PERSISTENCE_ID: &str = "reminder";
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_SNAPSHOT_INTERVAL: u32 = 100;

/// Settings consumed by a reminder instance.
///
/// Reminders are designed for long-running tasks (minutes, hours, days or
/// weeks), hence the coarse default tick of 10 seconds — this is not a
/// sub-second timer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderSettings {
    /// Identity of the event stream owned by this instance. Two live
    /// instances must never share one, or their events interleave.
    #[serde(default = "default_persistence_id")]
    pub persistence_id: String,

    /// Seconds between due-task evaluations.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,

    /// A state snapshot is saved after this many consecutively persisted
    /// events, bounding recovery replay length.
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval: u32,

    /// Delete log entries covered by a successful snapshot. Compaction
    /// only — recovery is correct either way.
    #[serde(default = "bool_true")]
    pub truncate_on_snapshot: bool,

    #[serde(default)]
    pub database: DatabaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            persistence_id: default_persistence_id(),
            tick_interval_secs: default_tick_interval_secs(),
            snapshot_interval: default_snapshot_interval(),
            truncate_on_snapshot: true,
            database: DatabaseSettings::default(),
        }
    }
}

impl ReminderSettings {
    /// Load settings from a TOML file plus `REMIND_*` env overrides
    /// (e.g. `REMIND_TICK_INTERVAL_SECS=2`). Missing file means defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or("remind.toml");

        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("REMIND_"))
            .extract()
            .map_err(|e| ReminderError::Config(e.to_string()))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn with_persistence_id(mut self, persistence_id: impl Into<String>) -> Self {
        self.persistence_id = persistence_id.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_secs = interval.as_secs();
        self
    }

    pub fn with_snapshot_interval(mut self, snapshot_interval: u32) -> Self {
        self.snapshot_interval = snapshot_interval;
        self
    }

    pub fn with_truncate_on_snapshot(mut self, truncate: bool) -> Self {
        self.truncate_on_snapshot = truncate;
        self
    }
}

fn default_persistence_id() -> String {
    DEFAULT_PERSISTENCE_ID.to_string()
}

fn default_tick_interval_secs() -> u64 {
    DEFAULT_TICK_INTERVAL_SECS
}

fn default_snapshot_interval() -> u32 {
    DEFAULT_SNAPSHOT_INTERVAL
}

fn bool_true() -> bool {
    true
}

fn default_db_path() -> String {
    "remind.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = ReminderSettings::default();
        assert_eq!(s.persistence_id, "reminder");
        assert_eq!(s.tick_interval(), Duration::from_secs(10));
        assert_eq!(s.snapshot_interval, 100);
        assert!(s.truncate_on_snapshot);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let s = ReminderSettings::load(Some("/nonexistent/remind.toml")).unwrap();
        assert_eq!(s.persistence_id, "reminder");
    }

    #[test]
    fn builder_overrides() {
        let s = ReminderSettings::default()
            .with_persistence_id("reminder-2")
            .with_tick_interval(Duration::from_secs(1))
            .with_snapshot_interval(5)
            .with_truncate_on_snapshot(false);
        assert_eq!(s.persistence_id, "reminder-2");
        assert_eq!(s.tick_interval_secs, 1);
        assert_eq!(s.snapshot_interval, 5);
        assert!(!s.truncate_on_snapshot);
    }

    #[test]
    fn empty_toml_deserializes_with_defaults() {
        let s: ReminderSettings = toml_from_str("");
        assert_eq!(s.snapshot_interval, 100);
    }

    fn toml_from_str(s: &str) -> ReminderSettings {
        Figment::new()
            .merge(Toml::string(s))
            .extract()
            .expect("extract")
    }
}

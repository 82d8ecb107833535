// End-to-end scenarios for the reminder engine: trigger/complete flow,
// rescheduling, snapshotting, and crash recovery.

use chrono::{DateTime, Duration, TimeZone, Utc};
use remind_core::{Delivery, Event, ReminderSettings, Schedule, ScheduleKind, State};
use remind_cron::CronExpression;
use remind_engine::{
    EventJournal, MemoryJournal, MemorySnapshots, ReminderEngine, ReminderHandle, SnapshotStore,
    SqliteStore,
};
use serde_json::json;
use tokio::sync::{mpsc, watch};

fn settings() -> ReminderSettings {
    ReminderSettings::default()
}

fn request(task_id: &str, trigger_at: DateTime<Utc>, kind: ScheduleKind) -> Schedule {
    Schedule {
        task_id: task_id.to_string(),
        recipient: format!("user:{task_id}"),
        message: json!({ "text": format!("msg-{task_id}") }),
        trigger_at,
        schedule: kind,
        ack: None,
    }
}

fn make_engine(
    settings: ReminderSettings,
    journal: MemoryJournal,
    snapshots: MemorySnapshots,
) -> (
    ReminderEngine<MemoryJournal, MemorySnapshots>,
    mpsc::Receiver<Delivery>,
) {
    let (delivery_tx, deliveries) = mpsc::channel(64);
    (
        ReminderEngine::new(settings, journal, snapshots, delivery_tx),
        deliveries,
    )
}

#[tokio::test]
async fn schedule_trigger_complete() {
    let journal = MemoryJournal::new();
    let (mut engine, mut deliveries) =
        make_engine(settings(), journal.clone(), MemorySnapshots::new());
    engine.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    engine
        .schedule(request("t1", now + Duration::seconds(2), ScheduleKind::Once))
        .await
        .unwrap();
    assert!(engine.state().get("t1").is_some());

    // not yet due
    engine.tick(now).await.unwrap();
    assert!(engine.state().get("t1").is_some());
    assert!(deliveries.try_recv().is_err());

    // due now: delivered, completed, removed
    let fire = now + Duration::seconds(2);
    engine.tick(fire).await.unwrap();
    let delivery = deliveries.try_recv().unwrap();
    assert_eq!(delivery.task_id, "t1");
    assert_eq!(delivery.recipient, "user:t1");
    assert_eq!(delivery.message, json!({ "text": "msg-t1" }));
    assert!(engine.state().get("t1").is_none());

    let events = journal.events().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0].1, Event::Scheduled { entry } if entry.task_id == "t1"));
    assert!(
        matches!(&events[1].1, Event::Completed { task_id, completed_at }
            if task_id == "t1" && *completed_at == fire)
    );
}

#[tokio::test]
async fn repeat_entry_is_rescheduled_from_fire_time() {
    let journal = MemoryJournal::new();
    let (mut engine, mut deliveries) =
        make_engine(settings(), journal.clone(), MemorySnapshots::new());
    engine.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    engine
        .schedule(request("t1", now, ScheduleKind::Repeat { interval_secs: 1 }))
        .await
        .unwrap();

    // tick fires late: drift anchors to the fire time, not the original slot
    let fire = now + Duration::seconds(10);
    engine.tick(fire).await.unwrap();
    assert_eq!(deliveries.try_recv().unwrap().task_id, "t1");

    let entry = engine.state().get("t1").expect("rescheduled under same id");
    assert_eq!(entry.trigger_at, fire + Duration::seconds(1));

    // log: Scheduled, Completed, Scheduled(next)
    let events = journal.events().await;
    assert_eq!(events.len(), 3);
    assert!(
        matches!(&events[2].1, Event::Scheduled { entry } if entry.trigger_at == fire + Duration::seconds(1))
    );
}

#[tokio::test]
async fn cron_entry_is_rescheduled_to_next_occurrence() {
    let (mut engine, _deliveries) =
        make_engine(settings(), MemoryJournal::new(), MemorySnapshots::new());
    engine.recover().await.unwrap();

    let expression = CronExpression::parse("0 0 9 * * *").unwrap();
    let first = Utc.with_ymd_and_hms(2019, 1, 1, 9, 0, 0).unwrap();
    engine
        .schedule(request("t1", first, ScheduleKind::Cron { expression }))
        .await
        .unwrap();

    engine.tick(first).await.unwrap();
    let entry = engine.state().get("t1").unwrap();
    assert_eq!(
        entry.trigger_at,
        Utc.with_ymd_and_hms(2019, 1, 2, 9, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn cancel_removes_entry_and_returns_ack() {
    let (mut engine, _deliveries) =
        make_engine(settings(), MemoryJournal::new(), MemorySnapshots::new());
    engine.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    engine
        .schedule(request("t1", now + Duration::hours(1), ScheduleKind::Once))
        .await
        .unwrap();

    let ack = engine
        .cancel("t1", Some(json!("cancel-ack")))
        .await
        .unwrap();
    assert_eq!(ack, Some(json!("cancel-ack")));
    assert!(engine.state().is_empty());

    // cancelling an unknown task is harmless (removal is idempotent by key)
    assert!(engine.cancel("ghost", None).await.is_ok());
}

#[tokio::test]
async fn persistence_failure_leaves_state_unchanged() {
    let journal = MemoryJournal::new();
    let (mut engine, _deliveries) =
        make_engine(settings(), journal.clone(), MemorySnapshots::new());
    engine.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    journal.set_fail_appends(true);
    let result = engine
        .schedule(request("t1", now, ScheduleKind::Once))
        .await;
    assert!(result.is_err());
    assert!(engine.state().is_empty());
    assert_eq!(engine.last_seq(), 0);

    // no retry happened behind our back; a later attempt succeeds cleanly
    journal.set_fail_appends(false);
    engine
        .schedule(request("t1", now, ScheduleKind::Once))
        .await
        .unwrap();
    assert_eq!(engine.state().len(), 1);
    assert_eq!(engine.last_seq(), 1);
}

#[tokio::test]
async fn snapshot_threshold_saves_state_and_truncates_log() {
    let journal = MemoryJournal::new();
    let snapshots = MemorySnapshots::new();
    let (mut engine, _deliveries) = make_engine(
        settings().with_snapshot_interval(5),
        journal.clone(),
        snapshots.clone(),
    );
    engine.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    for i in 0..4 {
        engine
            .schedule(request(
                &format!("t{i}"),
                now + Duration::hours(1),
                ScheduleKind::Once,
            ))
            .await
            .unwrap();
    }
    assert!(snapshots.snapshots().await.is_empty());

    // fifth persisted event crosses the threshold
    engine
        .schedule(request("t4", now + Duration::hours(1), ScheduleKind::Once))
        .await
        .unwrap();

    let saved = snapshots.snapshots().await;
    assert_eq!(saved.len(), 1);
    let (seq, snapshot_state) = &saved[0];
    assert_eq!(*seq, 5);
    assert_eq!(snapshot_state, engine.state());

    // truncation removed every event the snapshot covers
    assert!(journal.events().await.is_empty());

    // recovery from the snapshot alone reproduces the live state
    let (mut recovered, _d) = make_engine(settings(), journal, snapshots);
    recovered.recover().await.unwrap();
    assert_eq!(recovered.state(), engine.state());
    assert_eq!(recovered.last_seq(), 5);
}

#[tokio::test]
async fn truncation_can_be_disabled() {
    let journal = MemoryJournal::new();
    let snapshots = MemorySnapshots::new();
    let (mut engine, _deliveries) = make_engine(
        settings()
            .with_snapshot_interval(2)
            .with_truncate_on_snapshot(false),
        journal.clone(),
        snapshots.clone(),
    );
    engine.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    for i in 0..2 {
        engine
            .schedule(request(
                &format!("t{i}"),
                now + Duration::hours(1),
                ScheduleKind::Once,
            ))
            .await
            .unwrap();
    }
    assert_eq!(snapshots.snapshots().await.len(), 1);
    assert_eq!(journal.events().await.len(), 2);
}

#[tokio::test]
async fn recovery_equivalence_at_every_point() {
    // live-process a command sequence; after each step, a fresh engine
    // recovering from (snapshot, log tail) must land on the same state
    let journal = MemoryJournal::new();
    let snapshots = MemorySnapshots::new();
    let (mut live, _deliveries) = make_engine(
        settings().with_snapshot_interval(3),
        journal.clone(),
        snapshots.clone(),
    );
    live.recover().await.unwrap();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();

    let steps: Vec<Schedule> = vec![
        request("a", now + Duration::seconds(1), ScheduleKind::Once),
        request(
            "b",
            now + Duration::seconds(1),
            ScheduleKind::Repeat { interval_secs: 30 },
        ),
        request(
            "c",
            now + Duration::hours(2),
            ScheduleKind::Cron {
                expression: CronExpression::parse("@hourly").unwrap(),
            },
        ),
    ];
    for step in steps {
        live.schedule(step).await.unwrap();
        assert_recovers_to_live(&live, journal.clone(), snapshots.clone()).await;
    }

    // fire everything due: completes "a", reschedules "b"
    live.tick(now + Duration::seconds(5)).await.unwrap();
    assert_recovers_to_live(&live, journal.clone(), snapshots.clone()).await;

    live.cancel("c", None).await.unwrap();
    assert_recovers_to_live(&live, journal.clone(), snapshots.clone()).await;
}

async fn assert_recovers_to_live(
    live: &ReminderEngine<MemoryJournal, MemorySnapshots>,
    journal: MemoryJournal,
    snapshots: MemorySnapshots,
) {
    let (delivery_tx, _rx) = mpsc::channel(64);
    let mut recovered = ReminderEngine::new(settings(), journal, snapshots, delivery_tx);
    recovered.recover().await.unwrap();
    assert_eq!(recovered.state(), live.state());
    assert_eq!(recovered.last_seq(), live.last_seq());
}

#[tokio::test]
async fn recovery_fails_on_corrupt_log_instead_of_starting_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remind.db").display().to_string();

    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    {
        let store = SqliteStore::open(&path).unwrap();
        let (delivery_tx, _rx) = mpsc::channel(64);
        let mut engine = ReminderEngine::new(settings(), store.clone(), store, delivery_tx);
        engine.recover().await.unwrap();
        engine
            .schedule(request("t1", now, ScheduleKind::Once))
            .await
            .unwrap();
    }

    // corrupt the log out-of-band
    {
        let raw = rusqlite::Connection::open(&path).unwrap();
        raw.execute("UPDATE events SET payload = 'garbage'", [])
            .unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    let (delivery_tx, _rx) = mpsc::channel(64);
    let mut engine = ReminderEngine::new(settings(), store.clone(), store, delivery_tx);
    assert!(matches!(
        engine.recover().await,
        Err(remind_core::ReminderError::Recovery(_))
    ));
}

#[tokio::test]
async fn sqlite_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("remind.db").display().to_string();
    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();

    let first_state: State;
    {
        let store = SqliteStore::open(&path).unwrap();
        let (delivery_tx, _rx) = mpsc::channel(64);
        let mut engine = ReminderEngine::new(settings(), store.clone(), store, delivery_tx);
        engine.recover().await.unwrap();
        engine
            .schedule(request("t1", now + Duration::hours(1), ScheduleKind::Once))
            .await
            .unwrap();
        engine
            .schedule(request(
                "t2",
                now + Duration::hours(2),
                ScheduleKind::Repeat { interval_secs: 60 },
            ))
            .await
            .unwrap();
        first_state = engine.state().clone();
    }

    // "restart": fresh connection, fresh engine, same database file
    let store = SqliteStore::open(&path).unwrap();
    let (delivery_tx, _rx) = mpsc::channel(64);
    let mut engine = ReminderEngine::new(settings(), store.clone(), store, delivery_tx);
    engine.recover().await.unwrap();
    assert_eq!(engine.state(), &first_state);
    assert_eq!(engine.last_seq(), 2);
}

#[tokio::test]
async fn run_loop_serves_commands_and_ticks() {
    let journal = MemoryJournal::new();
    let (delivery_tx, mut deliveries) = mpsc::channel(64);
    let (handle, commands) = ReminderHandle::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let engine = ReminderEngine::new(
        settings().with_tick_interval(std::time::Duration::from_secs(1)),
        journal.clone(),
        MemorySnapshots::new(),
        delivery_tx,
    );
    let task = tokio::spawn(engine.run(commands, shutdown_rx));

    // already due, so the first periodic tick fires it
    let ack = handle
        .schedule(Schedule {
            task_id: "t1".to_string(),
            recipient: "user:1".to_string(),
            message: json!("hello"),
            trigger_at: Utc::now() - Duration::seconds(1),
            schedule: ScheduleKind::Once,
            ack: Some(json!("ack-1")),
        })
        .await
        .unwrap();
    assert_eq!(ack, Some(json!("ack-1")));

    let state = handle.get_state().await.unwrap();
    assert_eq!(state.len(), 1);

    let delivery = deliveries.recv().await.unwrap();
    assert_eq!(delivery.task_id, "t1");

    let state = handle.get_state().await.unwrap();
    assert!(state.is_empty());

    shutdown_tx.send(true).unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn handle_reports_stopped_engine() {
    let (handle, commands) = ReminderHandle::channel(4);
    drop(commands);
    let result = handle.get_state().await;
    assert!(matches!(result, Err(remind_core::ReminderError::Stopped)));
}

#[tokio::test]
async fn journal_seams_agree_between_memory_and_sqlite() {
    // the same append/replay/truncate contract must hold for both backends
    let now = Utc.with_ymd_and_hms(2019, 1, 1, 12, 0, 0).unwrap();
    let event = Event::Completed {
        task_id: "t1".to_string(),
        completed_at: now,
    };

    let memory = MemoryJournal::new();
    let sqlite = SqliteStore::open_in_memory().unwrap();
    for journal in [&memory as &dyn EventJournal, &sqlite as &dyn EventJournal] {
        journal.append("r1", 1, &event).await.unwrap();
        journal.append("r1", 2, &event).await.unwrap();
        journal.truncate("r1", 1).await.unwrap();
        let tail = journal.replay("r1", 0).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].0, 2);
    }

    let snapshots = MemorySnapshots::new();
    snapshots.save("r1", 7, &State::empty()).await.unwrap();
    let (seq, _) = snapshots.load_latest("r1").await.unwrap().unwrap();
    assert_eq!(seq, 7);
}

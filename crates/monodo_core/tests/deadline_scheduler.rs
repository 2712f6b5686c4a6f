use monodo_core::db::open_db_in_memory;
use monodo_core::{
    evaluate, DeadlineScheduler, DispatchError, Language, Notification, NotificationDispatcher,
    NotificationKind, NotificationPermission, NotificationSettings, PermissionGate,
    SqliteTaskRepository, Task, TaskRepository,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

const MIN: i64 = 60_000;
const T: i64 = 1_800_000_000_000;

#[derive(Clone, Default)]
struct Recording {
    seen: Arc<Mutex<Vec<Notification>>>,
}

impl Recording {
    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl NotificationDispatcher for Recording {
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        self.seen.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

fn with_reminders(title: &str, deadline: i64, start: u32, interval: u32) -> Task {
    let mut task = Task::new(title, T - 3 * 60 * MIN);
    task.deadline = Some(deadline);
    task.notification = Some(NotificationSettings {
        enabled: true,
        start_before_minutes: start,
        interval_minutes: interval,
    });
    task
}

fn scheduler_with(tasks: &[Task], dispatcher: Recording) -> DeadlineScheduler {
    let conn = open_db_in_memory().unwrap();
    {
        let repo = SqliteTaskRepository::try_new(&conn).unwrap();
        for task in tasks {
            repo.upsert_task(task).unwrap();
        }
    }
    DeadlineScheduler::new(conn, dispatcher).with_language(Language::En)
}

#[test]
fn configured_cadence_over_one_hour_of_ticks() {
    let task = with_reminders("essay", T, 30, 10);
    let recording = Recording::default();
    let mut scheduler = scheduler_with(&[task], recording.clone());

    let mut fired_at = Vec::new();
    let mut now = T - 60 * MIN;
    while now <= T + 30 * MIN {
        if scheduler.tick_at(now).dispatched > 0 {
            fired_at.push(now);
        }
        now += MIN;
    }

    assert!(fired_at.iter().all(|at| *at > T - 30 * MIN - MIN && *at < T));
    assert_eq!(fired_at, vec![T - 30 * MIN, T - 20 * MIN, T - 10 * MIN]);
    assert_eq!(recording.count(), 3);
}

#[test]
fn jittered_ticks_still_fire_every_interval() {
    let task = with_reminders("essay", T, 30, 10);
    let recording = Recording::default();
    let mut scheduler = scheduler_with(&[task], recording.clone());

    // Ticks drift up to 600 ms early; the one-second tolerance absorbs it.
    let mut fired_steps = Vec::new();
    for step in 0..30 {
        let now = T - 30 * MIN + step * MIN - (step % 3) * 300;
        if scheduler.tick_at(now).dispatched > 0 {
            fired_steps.push(step);
        }
    }
    assert_eq!(fired_steps, vec![0, 10, 20]);
    assert_eq!(recording.count(), 3);
}

#[test]
fn legacy_alert_fires_once_per_task_lifetime() {
    let mut task = Task::new("pick up parcel", T - 60 * MIN);
    task.deadline = Some(T);
    let recording = Recording::default();
    let mut scheduler = scheduler_with(&[task], recording.clone());

    assert_eq!(scheduler.tick_at(T - 10 * MIN).dispatched, 1);
    assert_eq!(scheduler.tick_at(T - 5 * MIN).dispatched, 0);
    assert_eq!(scheduler.tick_at(T - MIN).dispatched, 0);

    let seen = recording.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].kind, NotificationKind::Legacy);
    assert!(seen[0].body.contains("pick up parcel"));
}

#[test]
fn toggling_complete_mid_window_silences_task() {
    let task = with_reminders("presentation", T, 30, 10);
    let recording = Recording::default();
    let mut scheduler = scheduler_with(&[task.clone()], recording.clone());

    assert_eq!(scheduler.tick_at(T - 25 * MIN).dispatched, 1);
    assert!(scheduler.complete_task(task.id, T - 20 * MIN));
    for offset in [15, 10, 5, 1] {
        assert_eq!(scheduler.tick_at(T - offset * MIN).dispatched, 0);
    }
    assert_eq!(recording.count(), 1);
}

#[test]
fn pure_evaluation_is_idempotent_after_applying_its_result() {
    let configured = with_reminders("configured", T + 5 * MIN, 30, 10);
    let mut legacy = Task::new("legacy", T - 60 * MIN);
    legacy.deadline = Some(T + 10 * MIN);
    let tasks = vec![configured, legacy];

    let first = evaluate(&tasks, T, &BTreeSet::new());
    assert_eq!(first.due.len(), 2);

    let applied: Vec<Task> = tasks
        .iter()
        .map(|task| {
            first
                .updated_tasks
                .iter()
                .find(|updated| updated.id == task.id)
                .cloned()
                .unwrap_or_else(|| task.clone())
        })
        .collect();
    let second = evaluate(&applied, T, &first.legacy_alerted);
    assert!(second.due.is_empty());
}

#[test]
fn granting_permission_later_does_not_replay_backlog() {
    let task = with_reminders("stretch", T, 30, 10);
    let conn = open_db_in_memory().unwrap();
    SqliteTaskRepository::try_new(&conn)
        .unwrap()
        .upsert_task(&task)
        .unwrap();

    let silent = Recording::default();
    let mut denied = DeadlineScheduler::new(
        conn,
        PermissionGate::new(NotificationPermission::Denied, silent.clone()),
    );
    assert_eq!(denied.tick_at(T - 25 * MIN).dispatched, 1);
    assert_eq!(silent.count(), 0);

    // Same store, now with permission: the interval still counts from the
    // suppressed reminder.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reminders.sqlite3");
    let conn = monodo_core::db::open_db(&path).unwrap();
    let mut reminded = task.clone();
    reminded.last_notified_at = Some(T - 25 * MIN);
    SqliteTaskRepository::try_new(&conn)
        .unwrap()
        .upsert_task(&reminded)
        .unwrap();

    let loud = Recording::default();
    let mut granted = DeadlineScheduler::new(
        conn,
        PermissionGate::new(NotificationPermission::Granted, loud.clone()),
    );
    assert_eq!(granted.tick_at(T - 20 * MIN).dispatched, 0);
    assert_eq!(granted.tick_at(T - 15 * MIN).dispatched, 1);
    assert_eq!(loud.count(), 1);
}

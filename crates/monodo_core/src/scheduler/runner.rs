//! Scheduler apply step and polling loop.
//!
//! # Responsibility
//! - Turn an `Evaluation` into side effects: dispatch first, then persist
//!   `last_notified_at` / legacy-alert bookkeeping.
//! - Run ticks on a fixed cadence plus eagerly on task-set changes.
//! - Apply "mark done" messages relayed by the background worker.
//!
//! # Invariants
//! - The task store is read fresh on every tick; nothing is cached.
//! - Ticks and commands run sequentially in one tokio task.
//! - Notification failures never escape a tick.

use crate::background::ClientMessage;
use crate::i18n::{Language, ReminderStrings};
use crate::model::task::TaskId;
use crate::notify::{Notification, NotificationDispatcher};
use crate::repo::task_repo::{
    list_tasks_or_empty, NotificationRecord, RepoResult, SqliteTaskRepository, TaskRepository,
};
use crate::scheduler::policy::{evaluate, Evaluation, TICK_INTERVAL};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Commands accepted by a running scheduler loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Task set changed; evaluate now instead of waiting for the next tick.
    Reevaluate,
    /// Mark one task complete. Completion only removes reminders, so no
    /// evaluation follows.
    CompleteTask(TaskId),
    Shutdown,
}

/// Counters describing one applied evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Applies one evaluation: dispatch every due reminder, then persist.
///
/// Dispatch failures are logged and counted but still persisted, so a broken
/// surface cannot cause a flood once it recovers.
pub fn apply(
    evaluation: &Evaluation,
    repo: &impl TaskRepository,
    dispatcher: &mut dyn NotificationDispatcher,
    strings: &ReminderStrings,
) -> RepoResult<TickReport> {
    let mut report = TickReport::default();

    for due in &evaluation.due {
        let notification = Notification::for_due(due, strings);
        match dispatcher.deliver(&notification) {
            Ok(()) => report.dispatched += 1,
            Err(err) => {
                report.failed += 1;
                warn!(
                    "event=notification_deliver module=scheduler status=error task_id={} kind={:?} error={err}",
                    due.task.id, due.kind
                );
            }
        }
    }

    let records: Vec<NotificationRecord> = evaluation
        .updated_tasks
        .iter()
        .map(|task| NotificationRecord::Configured {
            task_id: task.id,
            at: evaluation.evaluated_at,
        })
        .chain(
            evaluation
                .newly_alerted()
                .map(|task_id| NotificationRecord::Legacy {
                    task_id,
                    at: evaluation.evaluated_at,
                }),
        )
        .collect();
    repo.record_notifications(&records)?;

    Ok(report)
}

/// Owns the task database connection and the dispatch surface.
pub struct DeadlineScheduler {
    conn: Connection,
    dispatcher: Box<dyn NotificationDispatcher>,
    language: Language,
    tick_interval: Duration,
    client_rx: Option<mpsc::UnboundedReceiver<ClientMessage>>,
}

/// Cloneable control handle for a spawned scheduler loop.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Requests an immediate evaluation. Returns false if the loop stopped.
    pub fn notify_changed(&self) -> bool {
        self.send(SchedulerCommand::Reevaluate)
    }

    /// Requests that a task be marked complete.
    pub fn complete_task(&self, task_id: TaskId) -> bool {
        self.send(SchedulerCommand::CompleteTask(task_id))
    }

    /// Stops the loop after the command currently running.
    pub fn shutdown(&self) -> bool {
        self.send(SchedulerCommand::Shutdown)
    }

    fn send(&self, command: SchedulerCommand) -> bool {
        let delivered = self.tx.send(command).is_ok();
        if !delivered {
            debug!("event=scheduler_command module=scheduler status=dropped command={command:?}");
        }
        delivered
    }
}

impl DeadlineScheduler {
    /// Creates a scheduler over a connection opened by `db::open_*`.
    pub fn new(conn: Connection, dispatcher: impl NotificationDispatcher + 'static) -> Self {
        Self {
            conn,
            dispatcher: Box::new(dispatcher),
            language: Language::default(),
            tick_interval: TICK_INTERVAL,
            client_rx: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Overrides the polling cadence. Zero is clamped to one second.
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_secs(1));
        self
    }

    /// Listens for messages relayed by the background worker.
    pub fn with_client_messages(mut self, rx: mpsc::UnboundedReceiver<ClientMessage>) -> Self {
        self.client_rx = Some(rx);
        self
    }

    /// Runs one evaluation pass at `now`.
    ///
    /// Never fails: storage problems are logged and yield an empty report.
    pub fn tick_at(&mut self, now: i64) -> TickReport {
        let repo = match SqliteTaskRepository::try_new(&self.conn) {
            Ok(repo) => repo,
            Err(err) => {
                error!("event=scheduler_tick module=scheduler status=error error={err}");
                return TickReport::default();
            }
        };

        let tasks = list_tasks_or_empty(&repo);
        let legacy_alerted = repo.legacy_alerted().unwrap_or_else(|err| {
            warn!("event=legacy_alerts_load module=scheduler status=fallback_empty error={err}");
            Default::default()
        });

        let evaluation = evaluate(&tasks, now, &legacy_alerted);
        let strings = self.language.strings();
        match apply(&evaluation, &repo, self.dispatcher.as_mut(), strings) {
            Ok(mut report) => {
                report.evaluated = tasks.len();
                if report.dispatched + report.failed > 0 {
                    info!(
                        "event=scheduler_tick module=scheduler status=ok evaluated={} dispatched={} failed={}",
                        report.evaluated, report.dispatched, report.failed
                    );
                } else {
                    debug!(
                        "event=scheduler_tick module=scheduler status=ok evaluated={} dispatched=0",
                        report.evaluated
                    );
                }
                report
            }
            Err(err) => {
                error!(
                    "event=scheduler_tick module=scheduler status=error error_code=bookkeeping_failed error={err}"
                );
                TickReport {
                    evaluated: tasks.len(),
                    ..TickReport::default()
                }
            }
        }
    }

    /// Marks a task complete; already-completed tasks stay completed.
    ///
    /// Returns whether the task changed.
    pub fn complete_task(&mut self, task_id: TaskId, now: i64) -> bool {
        let result = SqliteTaskRepository::try_new(&self.conn).and_then(|repo| {
            match repo.get_task(task_id)? {
                Some(task) if !task.completed => repo.toggle_completed(task_id, now).map(|_| true),
                Some(_) => Ok(false),
                None => Ok(false),
            }
        });

        match result {
            Ok(changed) => {
                info!(
                    "event=task_complete module=scheduler status=ok task_id={task_id} changed={changed}"
                );
                changed
            }
            Err(err) => {
                warn!("event=task_complete module=scheduler status=error task_id={task_id} error={err}");
                false
            }
        }
    }

    /// Starts the polling loop on the current tokio runtime.
    ///
    /// The first tick fires immediately. The loop ends on `Shutdown` or when
    /// every handle is dropped; awaiting the join handle leaves no timer.
    pub fn spawn(mut self) -> (SchedulerHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut client_rx = self.client_rx.take();

        let join = tokio::spawn(async move {
            info!(
                "event=scheduler_loop module=scheduler status=start tick_secs={}",
                self.tick_interval.as_secs()
            );
            let mut interval = tokio::time::interval(self.tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.tick_at(now_epoch_ms());
                    }
                    command = rx.recv() => match command {
                        Some(SchedulerCommand::Reevaluate) => {
                            self.tick_at(now_epoch_ms());
                        }
                        Some(SchedulerCommand::CompleteTask(task_id)) => {
                            self.complete_task(task_id, now_epoch_ms());
                        }
                        Some(SchedulerCommand::Shutdown) | None => break,
                    },
                    message = recv_client(&mut client_rx) => match message {
                        Some(ClientMessage::CompleteTask { task_id }) => {
                            self.complete_task(task_id, now_epoch_ms());
                        }
                        None => client_rx = None,
                    },
                }
            }

            info!("event=scheduler_loop module=scheduler status=stopped");
        });

        (SchedulerHandle { tx }, join)
    }
}

async fn recv_client(
    rx: &mut Option<mpsc::UnboundedReceiver<ClientMessage>>,
) -> Option<ClientMessage> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::{apply, DeadlineScheduler};
    use crate::background::{BackgroundWorker, WorkerEvent};
    use crate::db::open_db_in_memory;
    use crate::i18n::Language;
    use crate::model::task::{NotificationSettings, Task};
    use crate::notify::{
        ChannelDispatcher, DispatchError, Notification, NotificationAction,
        NotificationDispatcher, NotificationPermission, PermissionGate,
    };
    use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
    use crate::scheduler::policy::evaluate;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const MIN: i64 = 60_000;
    const T: i64 = 1_800_000_000_000;

    #[derive(Clone, Default)]
    struct Recording {
        seen: Arc<Mutex<Vec<Notification>>>,
    }

    impl NotificationDispatcher for Recording {
        fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
            self.seen.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    struct Broken;

    impl NotificationDispatcher for Broken {
        fn deliver(&mut self, _: &Notification) -> Result<(), DispatchError> {
            Err(DispatchError::Unavailable("no surface".to_string()))
        }
    }

    fn reminder_task(deadline: i64) -> Task {
        let mut task = Task::new("submit report", T - 60 * MIN);
        task.deadline = Some(deadline);
        task.notification = Some(NotificationSettings::default());
        task
    }

    #[test]
    fn apply_persists_bookkeeping_even_when_dispatch_fails() {
        let conn = open_db_in_memory().unwrap();
        let repo = SqliteTaskRepository::try_new(&conn).unwrap();
        let task = reminder_task(T + 5 * MIN);
        repo.upsert_task(&task).unwrap();

        let evaluation = evaluate(&repo.list_tasks().unwrap(), T, &Default::default());
        let report = apply(&evaluation, &repo, &mut Broken, Language::En.strings()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 0);

        let stored = repo.get_task(task.id).unwrap().unwrap();
        assert_eq!(stored.last_notified_at, Some(T));
    }

    #[test]
    fn tick_is_idempotent_for_same_instant() {
        let conn = open_db_in_memory().unwrap();
        {
            let repo = SqliteTaskRepository::try_new(&conn).unwrap();
            repo.upsert_task(&reminder_task(T + 5 * MIN)).unwrap();
            let mut legacy = Task::new("water plants", T - 60 * MIN);
            legacy.deadline = Some(T + 10 * MIN);
            repo.upsert_task(&legacy).unwrap();
        }

        let recording = Recording::default();
        let mut scheduler = DeadlineScheduler::new(conn, recording.clone());

        let first = scheduler.tick_at(T);
        assert_eq!(first.dispatched, 2);
        let second = scheduler.tick_at(T);
        assert_eq!(second.dispatched, 0);
        assert_eq!(recording.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn configured_scenario_follows_interval_and_deadline() {
        let conn = open_db_in_memory().unwrap();
        let task = reminder_task(T + 5 * MIN);
        SqliteTaskRepository::try_new(&conn)
            .unwrap()
            .upsert_task(&task)
            .unwrap();

        let recording = Recording::default();
        let mut scheduler = DeadlineScheduler::new(conn, recording.clone());

        assert_eq!(scheduler.tick_at(T).dispatched, 1);
        assert_eq!(scheduler.tick_at(T + 3 * MIN).dispatched, 0);
        assert_eq!(scheduler.tick_at(T + 10 * MIN).dispatched, 0);

        let seen = recording.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].correlation_id, task.id);
        assert!(seen[0].body.contains("submit report"));
    }

    #[test]
    fn denied_permission_still_advances_bookkeeping() {
        let conn = open_db_in_memory().unwrap();
        let task = reminder_task(T + 20 * MIN);
        SqliteTaskRepository::try_new(&conn)
            .unwrap()
            .upsert_task(&task)
            .unwrap();

        let recording = Recording::default();
        let gate = PermissionGate::new(NotificationPermission::Denied, recording.clone());
        let mut scheduler = DeadlineScheduler::new(conn, gate);
        scheduler.tick_at(T);
        assert!(recording.seen.lock().unwrap().is_empty());

        let repo = SqliteTaskRepository::try_new(&scheduler.conn).unwrap();
        assert_eq!(repo.get_task(task.id).unwrap().unwrap().last_notified_at, Some(T));
    }

    #[test]
    fn complete_task_does_not_reopen() {
        let conn = open_db_in_memory().unwrap();
        let task = reminder_task(T + 5 * MIN);
        SqliteTaskRepository::try_new(&conn)
            .unwrap()
            .upsert_task(&task)
            .unwrap();

        let mut scheduler = DeadlineScheduler::new(conn, Recording::default());
        assert!(scheduler.complete_task(task.id, T));
        assert!(!scheduler.complete_task(task.id, T + MIN));

        let repo = SqliteTaskRepository::try_new(&scheduler.conn).unwrap();
        let stored = repo.get_task(task.id).unwrap().unwrap();
        assert!(stored.completed);
        assert_eq!(stored.completed_at, Some(T));
    }

    #[tokio::test]
    async fn spawned_loop_ticks_eagerly_and_shuts_down() {
        let conn = open_db_in_memory().unwrap();
        let now = super::now_epoch_ms();
        let task = reminder_task(now + 5 * MIN);
        SqliteTaskRepository::try_new(&conn)
            .unwrap()
            .upsert_task(&task)
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = DeadlineScheduler::new(conn, ChannelDispatcher::new(tx))
            .with_tick_interval(Duration::from_secs(3600));
        let (handle, join) = scheduler.spawn();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            WorkerEvent::Show(notification) => assert_eq!(notification.correlation_id, task.id),
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(handle.shutdown());
        join.await.unwrap();
        assert!(!handle.notify_changed());
    }

    #[tokio::test]
    async fn handle_completion_updates_store_without_new_reminders() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monodo.sqlite3");
        let conn = crate::db::open_db(&path).unwrap();
        let now = super::now_epoch_ms();
        let task = reminder_task(now + 5 * MIN);
        SqliteTaskRepository::try_new(&conn)
            .unwrap()
            .upsert_task(&task)
            .unwrap();

        let recording = Recording::default();
        let scheduler = DeadlineScheduler::new(conn, recording.clone())
            .with_tick_interval(Duration::from_secs(3600));
        let (handle, join) = scheduler.spawn();

        let observer = crate::db::open_db(&path).unwrap();
        let repo = SqliteTaskRepository::try_new(&observer).unwrap();
        let first_tick = tokio::time::timeout(Duration::from_secs(5), async {
            while recording.seen.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(first_tick.is_ok());

        assert!(handle.complete_task(task.id));
        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            while !repo.get_task(task.id).unwrap().unwrap().completed {
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(completed.is_ok());

        assert!(handle.shutdown());
        join.await.unwrap();
        assert_eq!(recording.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn background_complete_reaches_task_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monodo.sqlite3");
        let conn = crate::db::open_db(&path).unwrap();
        let now = super::now_epoch_ms();
        let task = reminder_task(now + 5 * MIN);
        SqliteTaskRepository::try_new(&conn)
            .unwrap()
            .upsert_task(&task)
            .unwrap();

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (worker, worker_join) = BackgroundWorker::new(client_tx).spawn();
        let scheduler = DeadlineScheduler::new(conn, ChannelDispatcher::new(worker.sender()))
            .with_tick_interval(Duration::from_secs(3600))
            .with_client_messages(client_rx);
        let (handle, join) = scheduler.spawn();

        let mut visible = Vec::new();
        for _ in 0..50 {
            visible = worker.visible().await.unwrap();
            if !visible.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(visible.len(), 1);

        worker.interact(task.id, NotificationAction::Complete);

        let observer = crate::db::open_db(&path).unwrap();
        let repo = SqliteTaskRepository::try_new(&observer).unwrap();
        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if repo.get_task(task.id).unwrap().unwrap().completed {
                    break;
                }
                tokio::task::yield_now().await;
            }
        })
        .await;
        assert!(completed.is_ok(), "relayed completion never reached the store");
        assert!(worker.visible().await.unwrap().is_empty());

        handle.shutdown();
        join.await.unwrap();
        worker.shutdown();
        worker_join.await.unwrap();
    }
}

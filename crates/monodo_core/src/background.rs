//! Background notification worker.
//!
//! # Responsibility
//! - Show reminders outside the foreground flow, one per task id.
//! - Relay "mark done" interactions back to the task store owner as
//!   `ClientMessage`s keyed by task id.
//!
//! # Invariants
//! - A newer notification for a task replaces the visible one.
//! - Any interaction closes the notification it targets.

use crate::model::task::TaskId;
use crate::notify::{Notification, NotificationAction};
use log::{debug, info};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Inbound events for the worker.
#[derive(Debug)]
pub enum WorkerEvent {
    Show(Notification),
    Interact {
        task_id: TaskId,
        action: NotificationAction,
    },
    /// Reports currently visible notifications.
    Snapshot(oneshot::Sender<Vec<Notification>>),
    Shutdown,
}

/// Messages relayed from the worker to the in-process client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    CompleteTask { task_id: TaskId },
}

/// Out-of-band actor owning the visible notification set.
pub struct BackgroundWorker {
    visible: BTreeMap<TaskId, Notification>,
    client_tx: mpsc::UnboundedSender<ClientMessage>,
}

/// Cloneable sender side of a running worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
    /// Raw event sender, used to build a `ChannelDispatcher`.
    pub fn sender(&self) -> mpsc::UnboundedSender<WorkerEvent> {
        self.tx.clone()
    }

    /// Simulates the user acting on a visible notification.
    pub fn interact(&self, task_id: TaskId, action: NotificationAction) -> bool {
        self.tx
            .send(WorkerEvent::Interact { task_id, action })
            .is_ok()
    }

    /// Returns visible notifications, or `None` when the worker stopped.
    pub async fn visible(&self) -> Option<Vec<Notification>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(WorkerEvent::Snapshot(reply_tx)).ok()?;
        reply_rx.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(WorkerEvent::Shutdown);
    }
}

impl BackgroundWorker {
    pub fn new(client_tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self {
            visible: BTreeMap::new(),
            client_tx,
        }
    }

    /// Starts the worker loop on the current tokio runtime.
    ///
    /// The loop ends on `Shutdown` or when every handle is dropped.
    pub fn spawn(self) -> (WorkerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(self.run(rx));
        (WorkerHandle { tx }, join)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerEvent>) {
        info!("event=background_worker module=background status=start");
        while let Some(event) = rx.recv().await {
            match event {
                WorkerEvent::Show(notification) => self.show(notification),
                WorkerEvent::Interact { task_id, action } => self.interact(task_id, action),
                WorkerEvent::Snapshot(reply) => {
                    let _ = reply.send(self.visible.values().cloned().collect());
                }
                WorkerEvent::Shutdown => break,
            }
        }
        info!("event=background_worker module=background status=stopped");
    }

    fn show(&mut self, notification: Notification) {
        let task_id = notification.correlation_id;
        let replaced = self.visible.insert(task_id, notification).is_some();
        info!(
            "event=background_notification module=background status=shown task_id={task_id} replaced={replaced}"
        );
    }

    fn interact(&mut self, task_id: TaskId, action: NotificationAction) {
        if self.visible.remove(&task_id).is_none() {
            debug!(
                "event=background_interaction module=background status=ignored reason=not_visible task_id={task_id}"
            );
            return;
        }

        if action == NotificationAction::Complete
            && self
                .client_tx
                .send(ClientMessage::CompleteTask { task_id })
                .is_err()
        {
            debug!(
                "event=background_interaction module=background status=dropped reason=client_gone task_id={task_id}"
            );
            return;
        }
        info!(
            "event=background_interaction module=background status=ok task_id={task_id} action={action:?}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{BackgroundWorker, ClientMessage};
    use crate::i18n::Language;
    use crate::model::task::Task;
    use crate::notify::{
        ChannelDispatcher, Notification, NotificationAction, NotificationDispatcher,
    };
    use crate::scheduler::policy::{DueNotification, NotificationKind};
    use tokio::sync::mpsc;

    fn notification_for(task: &Task, kind: NotificationKind) -> Notification {
        let due = DueNotification {
            task: task.clone(),
            kind,
        };
        Notification::for_due(&due, Language::En.strings())
    }

    #[tokio::test]
    async fn same_task_replaces_visible_notification() {
        let (client_tx, _client_rx) = mpsc::unbounded_channel();
        let (handle, join) = BackgroundWorker::new(client_tx).spawn();
        let mut dispatcher = ChannelDispatcher::new(handle.sender());

        let task = Task::new("gym", 0);
        dispatcher
            .deliver(&notification_for(&task, NotificationKind::Configured))
            .unwrap();
        dispatcher
            .deliver(&notification_for(&task, NotificationKind::Legacy))
            .unwrap();

        let visible = handle.visible().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, NotificationKind::Legacy);

        handle.shutdown();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn complete_action_relays_message_and_closes() {
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        let (handle, join) = BackgroundWorker::new(client_tx).spawn();
        let mut dispatcher = ChannelDispatcher::new(handle.sender());

        let task = Task::new("laundry", 0);
        dispatcher
            .deliver(&notification_for(&task, NotificationKind::Configured))
            .unwrap();
        assert!(handle.interact(task.id, NotificationAction::Complete));

        assert_eq!(
            client_rx.recv().await,
            Some(ClientMessage::CompleteTask { task_id: task.id })
        );
        assert!(handle.visible().await.unwrap().is_empty());

        handle.shutdown();
        join.await.unwrap();
    }

    #[tokio::test]
    async fn snooze_closes_without_relaying() {
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        let (handle, join) = BackgroundWorker::new(client_tx).spawn();
        let mut dispatcher = ChannelDispatcher::new(handle.sender());

        let task = Task::new("call mom", 0);
        dispatcher
            .deliver(&notification_for(&task, NotificationKind::Legacy))
            .unwrap();
        handle.interact(task.id, NotificationAction::Snooze);

        assert!(handle.visible().await.unwrap().is_empty());
        handle.shutdown();
        join.await.unwrap();
        assert!(client_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn focus_closes_without_relaying() {
        let (client_tx, mut client_rx) = mpsc::unbounded_channel();
        let (handle, join) = BackgroundWorker::new(client_tx).spawn();
        let mut dispatcher = ChannelDispatcher::new(handle.sender());

        let task = Task::new("book dentist", 0);
        dispatcher
            .deliver(&notification_for(&task, NotificationKind::Configured))
            .unwrap();
        assert!(handle.interact(task.id, NotificationAction::Focus));

        assert!(handle.visible().await.unwrap().is_empty());
        handle.shutdown();
        join.await.unwrap();
        assert!(client_rx.try_recv().is_err());
    }
}

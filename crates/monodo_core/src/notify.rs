//! Notification delivery boundary.
//!
//! # Responsibility
//! - Define the dispatcher capability the scheduler depends on.
//! - Gate delivery on the permission consulted once at startup.
//! - Provide the in-process alert banner and background channel surfaces.
//!
//! # Invariants
//! - Delivery is best-effort; callers never treat errors as fatal.
//! - Surfaces keyed by task id replace rather than stack alerts.

use crate::background::WorkerEvent;
use crate::i18n::ReminderStrings;
use crate::model::task::TaskId;
use crate::scheduler::policy::{DueNotification, NotificationKind};
use log::{debug, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::mpsc::UnboundedSender;

/// User interaction attached to a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// Mark the referenced task complete.
    Complete,
    /// Dismiss for now; the scheduler cadence decides the next reminder.
    Snooze,
    /// Plain click on the notification body.
    Focus,
}

/// Action button rendered by background surfaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationButton {
    pub action: NotificationAction,
    pub label: String,
}

/// One user-visible reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Task id; surfaces use it to replace an older alert for the same task.
    pub correlation_id: TaskId,
    pub kind: NotificationKind,
    pub buttons: Vec<NotificationButton>,
}

impl Notification {
    /// Builds the localized reminder for one scheduler decision.
    pub fn for_due(due: &DueNotification, strings: &ReminderStrings) -> Self {
        let body = match due.kind {
            NotificationKind::Configured => strings.configured_body(&due.task.title),
            NotificationKind::Legacy => strings.legacy_body(&due.task.title),
        };
        Self {
            title: strings.reminder_title.to_string(),
            body,
            correlation_id: due.task.id,
            kind: due.kind,
            buttons: vec![
                NotificationButton {
                    action: NotificationAction::Complete,
                    label: strings.mark_done.to_string(),
                },
                NotificationButton {
                    action: NotificationAction::Snooze,
                    label: strings.snooze.to_string(),
                },
            ],
        }
    }
}

/// Delivery failure reported by a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Background worker is gone.
    ChannelClosed,
    /// Surface exists but cannot show notifications right now.
    Unavailable(String),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "background notification channel is closed"),
            Self::Unavailable(reason) => write!(f, "notification surface unavailable: {reason}"),
        }
    }
}

impl Error for DispatchError {}

/// Capability to surface a reminder to the user.
pub trait NotificationDispatcher: Send {
    /// Best-effort, non-blocking delivery.
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError>;
}

impl<D: NotificationDispatcher + ?Sized> NotificationDispatcher for Box<D> {
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        (**self).deliver(notification)
    }
}

/// Host notification permission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Never asked; treated as not granted.
    #[default]
    Default,
}

impl NotificationPermission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "default" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn is_granted(self) -> bool {
        self == Self::Granted
    }
}

/// Turns delivery into a silent no-op unless permission was granted.
///
/// Scheduler bookkeeping still advances, so granting permission later does
/// not replay a backlog.
pub struct PermissionGate<D> {
    permission: NotificationPermission,
    inner: D,
}

impl<D: NotificationDispatcher> PermissionGate<D> {
    pub fn new(permission: NotificationPermission, inner: D) -> Self {
        info!(
            "event=notification_permission module=notify status=ok permission={}",
            permission.as_str()
        );
        Self { permission, inner }
    }

    pub fn permission(&self) -> NotificationPermission {
        self.permission
    }
}

impl<D: NotificationDispatcher> NotificationDispatcher for PermissionGate<D> {
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        if !self.permission.is_granted() {
            debug!(
                "event=notification_deliver module=notify status=skipped reason=permission task_id={}",
                notification.correlation_id
            );
            return Ok(());
        }
        self.inner.deliver(notification)
    }
}

/// In-process alert banner surface.
///
/// Holds at most one banner per task; a newer reminder replaces the older.
#[derive(Debug, Default)]
pub struct AlertBannerDispatcher {
    banners: BTreeMap<TaskId, Notification>,
}

impl AlertBannerDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently visible banners.
    pub fn banners(&self) -> impl Iterator<Item = &Notification> {
        self.banners.values()
    }

    /// Removes the banner for one task. Returns whether one was shown.
    pub fn dismiss(&mut self, task_id: TaskId) -> bool {
        self.banners.remove(&task_id).is_some()
    }
}

impl NotificationDispatcher for AlertBannerDispatcher {
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        let replaced = self
            .banners
            .insert(notification.correlation_id, notification.clone())
            .is_some();
        info!(
            "event=alert_banner module=notify status=shown task_id={} kind={:?} replaced={}",
            notification.correlation_id, notification.kind, replaced
        );
        Ok(())
    }
}

/// Forwards reminders to the background worker.
pub struct ChannelDispatcher {
    tx: UnboundedSender<WorkerEvent>,
}

impl ChannelDispatcher {
    pub fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        self.tx
            .send(WorkerEvent::Show(notification.clone()))
            .map_err(|_| DispatchError::ChannelClosed)
    }
}

/// Tries surfaces in order and stops at the first successful delivery.
///
/// Mirrors "background surface first, in-process banner as fallback".
#[derive(Default)]
pub struct FallbackDispatcher {
    surfaces: Vec<Box<dyn NotificationDispatcher>>,
}

impl FallbackDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_surface(mut self, surface: impl NotificationDispatcher + 'static) -> Self {
        self.surfaces.push(Box::new(surface));
        self
    }
}

impl NotificationDispatcher for FallbackDispatcher {
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        let mut last_error = DispatchError::Unavailable("no surface configured".to_string());
        for surface in &mut self.surfaces {
            match surface.deliver(notification) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    debug!(
                        "event=notification_deliver module=notify status=fallback task_id={} error={err}",
                        notification.correlation_id
                    );
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }
}

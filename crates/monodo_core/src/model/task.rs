//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical task record owned by the task store.
//! - Provide lifecycle helpers for completion toggling.
//! - Map optional notification settings onto a tagged policy.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `completed_at` is present exactly when `completed` is true.
//! - Notification minute values are strictly positive.
//! - `last_notified_at` is written by the scheduler only.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of one task.
pub type TaskId = Uuid;

/// Default lead time before the deadline when reminders start.
pub const DEFAULT_START_BEFORE_MINUTES: u32 = 30;
/// Default spacing between repeated reminders.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;

/// Descriptive task tag. Does not affect scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Work,
    Study,
    #[default]
    Personal,
    Urgent,
}

impl Category {
    /// Stable storage/wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Study => "study",
            Self::Personal => "personal",
            Self::Urgent => "urgent",
        }
    }

    /// Parses the storage/wire string.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "work" => Some(Self::Work),
            "study" => Some(Self::Study),
            "personal" => Some(Self::Personal),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Per-task reminder configuration chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub enabled: bool,
    /// Reminders start this many minutes before the deadline.
    pub start_before_minutes: u32,
    /// Reminders repeat at most once per this many minutes.
    pub interval_minutes: u32,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            start_before_minutes: DEFAULT_START_BEFORE_MINUTES,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

/// Reminder policy that applies to one task at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPolicy {
    /// Repeating reminders inside a window before the deadline.
    Configured {
        start_before_minutes: u32,
        interval_minutes: u32,
    },
    /// One-shot warning shortly before the deadline.
    Legacy,
    /// Task is not subject to deadline reminders at all.
    None,
}

/// Validation failures for task records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    NilId,
    EmptyTitle,
    CompletedWithoutTimestamp,
    CompletedAtWithoutCompletion,
    NonPositiveStartBefore,
    NonPositiveInterval,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId => write!(f, "task id must not be nil"),
            Self::EmptyTitle => write!(f, "task title must not be blank"),
            Self::CompletedWithoutTimestamp => {
                write!(f, "completed task must carry completedAt")
            }
            Self::CompletedAtWithoutCompletion => {
                write!(f, "completedAt must be absent while task is open")
            }
            Self::NonPositiveStartBefore => {
                write!(f, "notification startBeforeMinutes must be > 0")
            }
            Self::NonPositiveInterval => write!(f, "notification intervalMinutes must be > 0"),
        }
    }
}

impl Error for TaskValidationError {}

/// Canonical task record.
///
/// Points in time are Unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TaskRecord")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<i64>,
    pub completed: bool,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_notified_at: Option<i64>,
}

impl Task {
    /// Creates an open task with a generated id.
    pub fn new(title: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            deadline: None,
            completed: false,
            created_at,
            completed_at: None,
            category: None,
            notification: None,
            last_notified_at: None,
        }
    }

    /// Creates an open task with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    pub fn with_id(
        id: TaskId,
        title: impl Into<String>,
        created_at: i64,
    ) -> Result<Self, TaskValidationError> {
        if id.is_nil() {
            return Err(TaskValidationError::NilId);
        }
        let mut task = Self::new(title, created_at);
        task.id = id;
        Ok(task)
    }

    /// Checks record-level invariants.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.is_nil() {
            return Err(TaskValidationError::NilId);
        }
        if self.title.trim().is_empty() {
            return Err(TaskValidationError::EmptyTitle);
        }
        match (self.completed, self.completed_at) {
            (true, None) => return Err(TaskValidationError::CompletedWithoutTimestamp),
            (false, Some(_)) => return Err(TaskValidationError::CompletedAtWithoutCompletion),
            _ => {}
        }
        if let Some(settings) = self.notification {
            if settings.start_before_minutes == 0 {
                return Err(TaskValidationError::NonPositiveStartBefore);
            }
            if settings.interval_minutes == 0 {
                return Err(TaskValidationError::NonPositiveInterval);
            }
        }
        Ok(())
    }

    /// Flips completion state and keeps `completed_at` in lockstep.
    pub fn toggle_completed(&mut self, now: i64) {
        self.completed = !self.completed;
        self.completed_at = self.completed.then_some(now);
    }

    /// Returns whether the task still needs attention.
    pub fn is_active(&self) -> bool {
        !self.completed
    }

    /// Resolves which reminder policy governs this task right now.
    pub fn notification_policy(&self) -> NotificationPolicy {
        if !self.is_active() || self.deadline.is_none() {
            return NotificationPolicy::None;
        }
        match self.notification {
            Some(settings) if settings.enabled => NotificationPolicy::Configured {
                start_before_minutes: settings.start_before_minutes,
                interval_minutes: settings.interval_minutes,
            },
            _ => NotificationPolicy::Legacy,
        }
    }
}

/// Lenient wire shape accepted on input.
///
/// Older records may lack `completed`, `completedAt` or `notification`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: TaskId,
    title: String,
    #[serde(default)]
    deadline: Option<i64>,
    #[serde(default)]
    completed: bool,
    created_at: i64,
    #[serde(default)]
    completed_at: Option<i64>,
    #[serde(default)]
    category: Option<Category>,
    #[serde(default)]
    notification: Option<NotificationSettings>,
    #[serde(default)]
    last_notified_at: Option<i64>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = TaskValidationError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        // Records written before completion timestamps existed.
        let completed_at = match (record.completed, record.completed_at) {
            (true, None) => Some(record.created_at),
            (_, value) => value,
        };
        let task = Task {
            id: record.id,
            title: record.title,
            deadline: record.deadline,
            completed: record.completed,
            created_at: record.created_at,
            completed_at,
            category: record.category,
            notification: record.notification,
            last_notified_at: record.last_notified_at,
        };
        task.validate()?;
        Ok(task)
    }
}

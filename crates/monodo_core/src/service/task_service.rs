//! Task use-case service.
//!
//! # Responsibility
//! - Provide create/toggle/delete/list entry points for front-ends.
//! - Derive presentation helpers (display order, progress, stats).
//! - Wake the scheduler after every mutation.
//!
//! # Invariants
//! - Service APIs never bypass repository validation.
//! - Service layer remains storage-agnostic.

use crate::model::task::{Category, NotificationSettings, Task, TaskId};
use crate::repo::task_repo::{list_tasks_or_empty, RepoError, RepoResult, TaskRepository};
use crate::scheduler::runner::SchedulerHandle;
use log::info;
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for task use-cases.
#[derive(Debug)]
pub enum ServiceError {
    EmptyTitle,
    TaskNotFound(TaskId),
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "task title must not be blank"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

/// Input for creating one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskRequest {
    pub title: String,
    /// Epoch milliseconds.
    pub deadline: Option<i64>,
    pub category: Category,
    pub notification: NotificationSettings,
}

impl NewTaskRequest {
    /// Request with the default category and reminder settings.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            deadline: None,
            category: Category::default(),
            notification: NotificationSettings::default(),
        }
    }
}

/// Completion counters over the whole task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionStats {
    pub total: usize,
    pub completed: usize,
    /// Rounded down, 0 when there are no tasks.
    pub percent: u8,
}

/// Task service facade over repository implementations.
pub struct TaskService<R: TaskRepository> {
    repo: R,
    scheduler: Option<SchedulerHandle>,
}

impl<R: TaskRepository> TaskService<R> {
    pub fn new(repo: R) -> Self {
        Self {
            repo,
            scheduler: None,
        }
    }

    /// Re-evaluates reminders through `scheduler` after each mutation.
    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Creates one open task at `now`.
    pub fn create_task(&self, request: NewTaskRequest, now: i64) -> Result<Task, ServiceError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(ServiceError::EmptyTitle);
        }

        let mut task = Task::new(title, now);
        task.deadline = request.deadline;
        task.category = Some(request.category);
        task.notification = Some(request.notification);
        self.repo.upsert_task(&task)?;

        info!(
            "event=task_create module=service status=ok task_id={} has_deadline={}",
            task.id,
            task.deadline.is_some()
        );
        self.wake_scheduler();
        Ok(task)
    }

    /// Flips completion state of one task.
    pub fn toggle_task(&self, id: TaskId, now: i64) -> Result<Task, ServiceError> {
        let task = self.repo.toggle_completed(id, now)?;
        info!(
            "event=task_toggle module=service status=ok task_id={id} completed={}",
            task.completed
        );
        self.wake_scheduler();
        Ok(task)
    }

    /// Deletes one task permanently.
    pub fn delete_task(&self, id: TaskId) -> Result<(), ServiceError> {
        self.repo.remove_task(id)?;
        info!("event=task_delete module=service status=ok task_id={id}");
        self.wake_scheduler();
        Ok(())
    }

    pub fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        self.repo.get_task(id)
    }

    /// All tasks, newest first; unreadable storage yields an empty list.
    pub fn list_tasks(&self) -> Vec<Task> {
        list_tasks_or_empty(&self.repo)
    }

    /// All tasks in display order.
    pub fn sorted_for_display(&self) -> Vec<Task> {
        sort_for_display(self.list_tasks())
    }

    /// First open task in display order.
    pub fn top_task(&self) -> Option<Task> {
        self.sorted_for_display()
            .into_iter()
            .find(Task::is_active)
    }

    pub fn completion_stats(&self) -> CompletionStats {
        completion_stats(&self.list_tasks())
    }

    fn wake_scheduler(&self) {
        if let Some(scheduler) = &self.scheduler {
            scheduler.notify_changed();
        }
    }
}

/// Orders tasks: open before completed, then by deadline, undated last.
///
/// The sort is stable, so equal keys keep their incoming order.
pub fn sort_for_display(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then_with(|| match (a.deadline, b.deadline) {
                (Some(left), Some(right)) => left.cmp(&right),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
    tasks
}

pub fn completion_stats(tasks: &[Task]) -> CompletionStats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();
    let percent = if total == 0 {
        0
    } else {
        u8::try_from(completed * 100 / total).unwrap_or(100)
    };
    CompletionStats {
        total,
        completed,
        percent,
    }
}

/// Share of the creation-to-deadline span already elapsed, in 0..=100.
///
/// `None` for tasks without a deadline; 100 when the deadline does not lie
/// after creation.
pub fn deadline_progress(task: &Task, now: i64) -> Option<u8> {
    let deadline = task.deadline?;
    let total = deadline - task.created_at;
    if total <= 0 {
        return Some(100);
    }
    let elapsed = (now - task.created_at).clamp(0, total);
    u8::try_from(elapsed * 100 / total).ok()
}

//! Core domain logic for MonoDo.
//! This crate is the single source of truth for task and reminder invariants.

pub mod background;
pub mod config;
pub mod db;
pub mod i18n;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod scheduler;
pub mod service;
pub mod snapshot;

pub use background::{BackgroundWorker, ClientMessage, WorkerEvent, WorkerHandle};
pub use config::{ConfigError, MonodoConfig};
pub use i18n::{Language, ReminderStrings};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::task::{
    Category, NotificationPolicy, NotificationSettings, Task, TaskId, TaskValidationError,
};
pub use notify::{
    AlertBannerDispatcher, ChannelDispatcher, DispatchError, FallbackDispatcher, Notification,
    NotificationAction, NotificationDispatcher, NotificationPermission, PermissionGate,
};
pub use repo::task_repo::{
    NotificationRecord, RepoError, RepoResult, SqliteTaskRepository, TaskRepository,
};
pub use scheduler::runner::now_epoch_ms;
pub use scheduler::{
    evaluate, DeadlineScheduler, DueNotification, Evaluation, NotificationKind, SchedulerHandle,
    TickReport,
};
pub use service::task_service::{
    deadline_progress, CompletionStats, NewTaskRequest, ServiceError, TaskService,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

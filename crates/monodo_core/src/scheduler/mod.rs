//! Deadline reminder scheduler.
//!
//! # Responsibility
//! - Decide which tasks are due for a reminder (`policy`, pure).
//! - Apply decisions: dispatch, then persist bookkeeping (`runner`).
//! - Host the periodic polling loop (`runner`).
//!
//! # Invariants
//! - Completed tasks and tasks without a deadline never fire.
//! - Ticks never overlap; one loop task owns evaluation and apply.

pub mod policy;
pub mod runner;

pub use policy::{diff_minutes, evaluate, DueNotification, Evaluation, NotificationKind};
pub use runner::{apply, DeadlineScheduler, SchedulerCommand, SchedulerHandle, TickReport};

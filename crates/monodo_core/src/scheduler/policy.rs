//! Pure reminder decision logic.
//!
//! Two mutually exclusive policies are evaluated per task:
//! - configured: repeating reminders inside `start_before_minutes` of the
//!   deadline, spaced by `interval_minutes`;
//! - legacy: one warning the first time the deadline is under 15 minutes away.

use crate::model::task::{NotificationPolicy, Task, TaskId};
use std::collections::BTreeSet;
use std::time::Duration;

/// Cadence of the polling loop.
pub const TICK_INTERVAL: Duration = Duration::from_secs(60);
/// Legacy warning fires when the deadline is closer than this.
pub const LEGACY_WINDOW_MS: i64 = 15 * MINUTE_MS;
/// Slack applied to the repeat interval to absorb tick drift.
pub const JITTER_TOLERANCE_MS: i64 = 1_000;

const MINUTE_MS: i64 = 60_000;

/// Which policy produced a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Configured,
    Legacy,
}

/// One reminder decided by an evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueNotification {
    /// Task snapshot as seen by the pass (title used for the message).
    pub task: Task,
    pub kind: NotificationKind,
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub due: Vec<DueNotification>,
    /// Tasks whose `last_notified_at` moved to `now`.
    pub updated_tasks: Vec<Task>,
    /// Legacy alerted set including ids alerted by this pass.
    pub legacy_alerted: BTreeSet<TaskId>,
    /// Evaluation instant in epoch milliseconds.
    pub evaluated_at: i64,
}

impl Evaluation {
    /// Ids newly added to the legacy set by this pass.
    pub fn newly_alerted(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.due
            .iter()
            .filter(|due| due.kind == NotificationKind::Legacy)
            .map(|due| due.task.id)
    }
}

/// Whole minutes left until `deadline`, rounded up.
///
/// One second before a minute boundary still counts as that minute.
/// Saturates instead of overflowing on extreme timestamps.
pub fn diff_minutes(deadline: i64, now: i64) -> i64 {
    let diff = deadline.saturating_sub(now);
    // Integer division truncates toward zero, which is already the ceiling
    // for negative values.
    let minutes = diff / MINUTE_MS;
    if diff % MINUTE_MS > 0 {
        minutes + 1
    } else {
        minutes
    }
}

/// Evaluates every task against its reminder policy at `now`.
///
/// Pure: no I/O, no clock reads. Emission order follows input order but
/// callers must not rely on it.
pub fn evaluate(tasks: &[Task], now: i64, legacy_alerted: &BTreeSet<TaskId>) -> Evaluation {
    let mut evaluation = Evaluation {
        legacy_alerted: legacy_alerted.clone(),
        evaluated_at: now,
        ..Evaluation::default()
    };

    for task in tasks {
        let Some(deadline) = task.deadline else {
            continue;
        };

        match task.notification_policy() {
            NotificationPolicy::Configured {
                start_before_minutes,
                interval_minutes,
            } => {
                if configured_is_due(task, deadline, now, start_before_minutes, interval_minutes) {
                    let mut updated = task.clone();
                    updated.last_notified_at = Some(now);
                    evaluation.due.push(DueNotification {
                        task: updated.clone(),
                        kind: NotificationKind::Configured,
                    });
                    evaluation.updated_tasks.push(updated);
                }
            }
            NotificationPolicy::Legacy => {
                let remaining = deadline.saturating_sub(now);
                if remaining > 0
                    && remaining < LEGACY_WINDOW_MS
                    && evaluation.legacy_alerted.insert(task.id)
                {
                    evaluation.due.push(DueNotification {
                        task: task.clone(),
                        kind: NotificationKind::Legacy,
                    });
                }
            }
            NotificationPolicy::None => {}
        }
    }

    evaluation
}

fn configured_is_due(
    task: &Task,
    deadline: i64,
    now: i64,
    start_before_minutes: u32,
    interval_minutes: u32,
) -> bool {
    let minutes_left = diff_minutes(deadline, now);
    if minutes_left <= 0 || minutes_left > i64::from(start_before_minutes) {
        return false;
    }

    match task.last_notified_at {
        // A timestamp from the future means the clock moved backwards; treat
        // the task as never notified so it cannot stay silent indefinitely.
        Some(last) if last <= now => {
            now.saturating_sub(last)
                >= i64::from(interval_minutes) * MINUTE_MS - JITTER_TOLERANCE_MS
        }
        _ => true,
    }
}

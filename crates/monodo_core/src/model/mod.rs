//! Domain model for tasks and their reminder policy.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Derive the notification policy that applies to one task.
//!
//! # Invariants
//! - Every task is identified by a stable, non-nil `TaskId`.
//! - `completed_at` is set if and only if `completed` is true.

pub mod task;

//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the task store contract used by services and the scheduler.
//! - Isolate SQLite query details from business orchestration.
//!
//! # Invariants
//! - Repository writes must enforce `Task::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to DB
//!   transport errors.

pub mod task_repo;

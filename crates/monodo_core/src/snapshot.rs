//! JSON interchange for the persisted task list.
//!
//! # Responsibility
//! - Export every task as one versioned JSON document.
//! - Import documents, including bare arrays written by older builds.
//!
//! # Invariants
//! - Import is all-or-nothing: one malformed record rejects the document.
//! - Lenient loading falls back to an empty list, never a partial one.

use crate::model::task::Task;
use crate::repo::task_repo::{RepoError, TaskRepository};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot encode/decode/import failures.
#[derive(Debug)]
pub enum SnapshotError {
    Json(serde_json::Error),
    UnsupportedVersion(u32),
    Repo(RepoError),
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid task snapshot: {err}"),
            Self::UnsupportedVersion(version) => write!(
                f,
                "task snapshot version {version} is newer than supported {SNAPSHOT_VERSION}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::UnsupportedVersion(_) => None,
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for SnapshotError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<RepoError> for SnapshotError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

#[derive(Serialize)]
struct SnapshotOut<'a> {
    version: u32,
    tasks: &'a [Task],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotIn {
    Versioned { version: u32, tasks: Vec<Task> },
    Bare(Vec<Task>),
}

/// Serializes tasks into a pretty-printed versioned document.
pub fn export_json(tasks: &[Task]) -> Result<String, SnapshotError> {
    let document = SnapshotOut {
        version: SNAPSHOT_VERSION,
        tasks,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Parses a snapshot strictly.
pub fn parse_snapshot(text: &str) -> Result<Vec<Task>, SnapshotError> {
    match serde_json::from_str::<SnapshotIn>(text)? {
        SnapshotIn::Versioned { version, tasks } => {
            if version > SNAPSHOT_VERSION {
                return Err(SnapshotError::UnsupportedVersion(version));
            }
            Ok(tasks)
        }
        SnapshotIn::Bare(tasks) => Ok(tasks),
    }
}

/// Parses a snapshot, treating any malformed input as an empty task list.
pub fn load_snapshot_or_empty(text: &str) -> Vec<Task> {
    match parse_snapshot(text) {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!("event=snapshot_load module=snapshot status=fallback_empty error={err}");
            Vec::new()
        }
    }
}

/// Upserts every task into the repository. Returns the number written.
pub fn import_into(repo: &impl TaskRepository, tasks: &[Task]) -> Result<usize, SnapshotError> {
    for task in tasks {
        repo.upsert_task(task)?;
    }
    info!(
        "event=snapshot_import module=snapshot status=ok count={}",
        tasks.len()
    );
    Ok(tasks.len())
}

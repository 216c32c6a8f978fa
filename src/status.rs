//! Task status store
//!
//! Process-wide view of every task's stage, latest progress message, result
//! and failure. Only the orchestrator running a task writes its entry;
//! callers read snapshots or subscribe to [`ProgressEvent`]s.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::error::{ErrorKind, PipelineError};
use crate::progress::{PipelineStage, ProgressEvent};

/// Failure detail recorded for a FAILED task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// Stage the task was in when it failed
    pub stage: PipelineStage,
    pub kind: ErrorKind,
    pub detail: String,
}

/// Snapshot of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: String,
    pub stage: PipelineStage,
    pub message: String,
    pub progress: f32,
    /// Present only once COMPLETE
    pub result: Option<PathBuf>,
    /// Present only once FAILED
    pub error: Option<TaskFailure>,
    /// Every stage entered, in order
    pub history: Vec<PipelineStage>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    fn pending(task_id: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            stage: PipelineStage::Pending,
            message: PipelineStage::Pending.message().to_string(),
            progress: 0.0,
            result: None,
            error: None,
            history: vec![PipelineStage::Pending],
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}

/// Finished tasks kept by default before the oldest are forgotten
pub const DEFAULT_RETENTION: usize = 1024;

#[derive(Default)]
struct Entries {
    tasks: HashMap<String, TaskStatus>,
    /// Terminal task ids, oldest first
    finished: VecDeque<String>,
}

/// In-memory status store shared by the dispatcher and all workers.
/// Running tasks are always kept; at most `retention` finished ones are.
pub struct TaskStatusStore {
    entries: RwLock<Entries>,
    retention: usize,
    tx: broadcast::Sender<ProgressEvent>,
}

impl TaskStatusStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: usize) -> Self {
        let (tx, _) = broadcast::channel(256);
        Self {
            entries: RwLock::new(Entries::default()),
            retention: retention.max(1),
            tx,
        }
    }

    /// Receive every progress event published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Register a newly accepted task in PENDING
    pub fn insert_pending(&self, task_id: &str) {
        let status = TaskStatus::pending(task_id);
        self.entries.write().tasks.insert(task_id.to_string(), status);
        self.publish(ProgressEvent::new(task_id, PipelineStage::Pending, PipelineStage::Pending.message()));
    }

    pub fn get(&self, task_id: &str) -> Option<TaskStatus> {
        self.entries.read().tasks.get(task_id).cloned()
    }

    /// Move a task to `stage`. Returns false if the transition is not allowed.
    pub fn advance(&self, task_id: &str, stage: PipelineStage, message: &str) -> bool {
        if stage.is_terminal() {
            log::warn!("Task {}: terminal stage {} must go through complete/fail", task_id, stage);
            return false;
        }
        let updated = self.update(task_id, stage, message, |_| {});
        if updated {
            self.publish(ProgressEvent::new(task_id, stage, message));
        }
        updated
    }

    /// Update the progress message without changing stage
    pub fn note(&self, task_id: &str, message: &str) {
        let event = {
            let mut entries = self.entries.write();
            let Some(status) = entries.tasks.get_mut(task_id) else {
                return;
            };
            if status.is_terminal() {
                return;
            }
            status.message = message.to_string();
            status.updated_at = Utc::now();
            ProgressEvent::new(task_id, status.stage, message)
        };
        self.publish(event);
    }

    pub fn complete(&self, task_id: &str, result: PathBuf) -> bool {
        let message = format!("Result available at {}", result.display());
        let updated = self.update(task_id, PipelineStage::Complete, &message, |status| {
            status.result = Some(result);
        });
        if updated {
            self.publish(ProgressEvent::new(task_id, PipelineStage::Complete, message));
        }
        updated
    }

    pub fn fail(&self, task_id: &str, failed_stage: PipelineStage, error: &PipelineError) -> bool {
        let failure = TaskFailure {
            stage: failed_stage,
            kind: error.kind(),
            detail: error.to_string(),
        };
        let message = format!("Failed during {}: {}", failed_stage, failure.detail);
        let updated = self.update(task_id, PipelineStage::Failed, &message, |status| {
            status.error = Some(failure);
        });
        if updated {
            self.publish(ProgressEvent::new(task_id, PipelineStage::Failed, message));
        }
        updated
    }

    pub fn len(&self) -> usize {
        self.entries.read().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().tasks.is_empty()
    }

    fn update<F>(&self, task_id: &str, stage: PipelineStage, message: &str, apply: F) -> bool
    where
        F: FnOnce(&mut TaskStatus),
    {
        let mut entries = self.entries.write();
        let Some(status) = entries.tasks.get_mut(task_id) else {
            log::warn!("Status update for unknown task {}", task_id);
            return false;
        };
        if !status.stage.can_advance_to(stage) {
            log::warn!(
                "Task {}: rejected transition {} -> {}",
                task_id,
                status.stage,
                stage
            );
            return false;
        }
        status.stage = stage;
        status.message = message.to_string();
        status.progress = stage.progress_percent();
        status.history.push(stage);
        status.updated_at = Utc::now();
        apply(status);

        if stage.is_terminal() {
            entries.finished.push_back(task_id.to_string());
            while entries.finished.len() > self.retention {
                if let Some(oldest) = entries.finished.pop_front() {
                    log::debug!("Forgetting finished task {}", oldest);
                    entries.tasks.remove(&oldest);
                }
            }
        }
        true
    }

    fn publish(&self, event: ProgressEvent) {
        // No subscribers is the normal case for background tasks
        let _ = self.tx.send(event);
    }
}

impl Default for TaskStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Task submission and the worker pool
//!
//! `submit` validates a request and returns its task id at once; the task
//! runs on a spawned tokio task once one of `workers` permits is free.
//! Speaker leases keep registration of an id exclusive while letting any
//! number of generations share a registered speaker.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Semaphore};

use super::context::WorkerContext;
use super::orchestrator::Orchestrator;
use super::request::{PipelineTask, SubmitRequest};
use crate::error::{PipelineError, Result};
use crate::progress::PipelineStage;
use crate::status::{TaskStatus, TaskStatusStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lease {
    Registering,
    Generating(usize),
}

type LeaseTable = Arc<Mutex<HashMap<String, Lease>>>;

/// Held by a running task; releases its speaker lease on drop
struct SpeakerLease {
    table: LeaseTable,
    speaker_id: String,
}

impl SpeakerLease {
    fn acquire(table: &LeaseTable, speaker_id: &str, exclusive: bool) -> Result<Self> {
        let mut leases = table.lock();
        match (leases.get(speaker_id).copied(), exclusive) {
            (None, true) => {
                leases.insert(speaker_id.to_string(), Lease::Registering);
            }
            (None, false) => {
                leases.insert(speaker_id.to_string(), Lease::Generating(1));
            }
            (Some(_), true) => {
                return Err(PipelineError::AlreadyRegistered(speaker_id.to_string()));
            }
            (Some(Lease::Registering), false) => {
                return Err(PipelineError::Validation(format!(
                    "speaker {} is still being registered",
                    speaker_id
                )));
            }
            (Some(Lease::Generating(n)), false) => {
                leases.insert(speaker_id.to_string(), Lease::Generating(n + 1));
            }
        }
        Ok(Self {
            table: table.clone(),
            speaker_id: speaker_id.to_string(),
        })
    }
}

impl Drop for SpeakerLease {
    fn drop(&mut self) {
        let mut leases = self.table.lock();
        match leases.get(&self.speaker_id).copied() {
            Some(Lease::Generating(n)) if n > 1 => {
                leases.insert(self.speaker_id.clone(), Lease::Generating(n - 1));
            }
            _ => {
                leases.remove(&self.speaker_id);
            }
        }
    }
}

pub struct Dispatcher {
    ctx: Arc<WorkerContext>,
    status: Arc<TaskStatusStore>,
    permits: Arc<Semaphore>,
    leases: LeaseTable,
}

impl Dispatcher {
    pub fn new(ctx: WorkerContext) -> Self {
        let workers = ctx.config.workers.max(1);
        log::info!("Starting dispatcher with {} worker(s)", workers);
        let status = TaskStatusStore::with_retention(ctx.config.status_retention);
        Self {
            ctx: Arc::new(ctx),
            status: Arc::new(status),
            permits: Arc::new(Semaphore::new(workers)),
            leases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn status_store(&self) -> &Arc<TaskStatusStore> {
        &self.status
    }

    /// Accept a request and return its task id. Must be called inside a
    /// tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> Result<String> {
        request.validate()?;

        let registration = request.is_registration();
        let lease = SpeakerLease::acquire(&self.leases, &request.speaker_id, registration)?;
        if registration && self.ctx.speakers.exists(&request.speaker_id) {
            return Err(PipelineError::AlreadyRegistered(request.speaker_id));
        }

        let task = PipelineTask::new(request);
        let task_id = task.id.clone();
        self.status.insert_pending(&task_id);
        log::info!(
            "Accepted task {} for speaker {} ({}), {} task(s) tracked",
            task_id,
            task.request.speaker_id,
            if registration { "registration" } else { "generation" },
            self.status.len()
        );

        let ctx = self.ctx.clone();
        let status = self.status.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let err = PipelineError::Configuration(format!("worker pool closed: {}", e));
                    status.fail(&task.id, PipelineStage::Pending, &err);
                    return;
                }
            };

            let id = task.id.clone();
            let worker_status = status.clone();
            let run = tokio::spawn(async move {
                // The outcome is already recorded in the status store
                let _ = Orchestrator::new(&ctx, &worker_status)
                    .run_holding(&task, lease)
                    .await;
            });

            if let Err(e) = run.await {
                let stage = status
                    .get(&id)
                    .map(|s| s.stage)
                    .unwrap_or(PipelineStage::Pending);
                log::error!("Task {} worker aborted: {}", id, e);
                let err = PipelineError::Io(std::io::Error::other(format!("worker aborted: {}", e)));
                status.fail(&id, stage, &err);
            }
        });

        Ok(task_id)
    }

    pub fn get(&self, task_id: &str) -> Option<TaskStatus> {
        self.status.get(task_id)
    }

    /// Wait until `task_id` is COMPLETE or FAILED. `None` for unknown ids.
    pub async fn wait(&self, task_id: &str) -> Option<TaskStatus> {
        let mut rx = self.status.subscribe();
        loop {
            let current = self.status.get(task_id)?;
            if current.is_terminal() {
                return Some(current);
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return self.status.get(task_id),
            }
        }
    }
}

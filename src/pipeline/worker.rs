//! Bounded background execution of moderation runs.
//!
//! A dispatcher task pulls jobs from a bounded queue and runs each one on
//! its own task, at most `concurrency` at a time. The pool handle supports
//! graceful `shutdown()` (finish everything queued) and `abort()` (abandon
//! in-flight runs; their records stay Pending).

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};

use super::orchestrator::ModerationOrchestrator;
use crate::config::WorkerConfig;
use crate::error::ModerationError;
use crate::models::{IdentityClaim, ModerationRecord};

/// One queued run: a Pending record and the claim it verifies.
#[derive(Debug, Clone)]
pub struct ModerationJob {
    pub record: ModerationRecord,
    pub claim: IdentityClaim,
}

pub struct ModerationWorkerPool {
    sender: mpsc::Sender<ModerationJob>,
    dispatcher: JoinHandle<()>,
}

impl ModerationWorkerPool {
    /// Spawn the dispatcher. Must be called from within a Tokio runtime.
    pub fn start(orchestrator: Arc<ModerationOrchestrator>, config: &WorkerConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let concurrency = config.concurrency.max(1);

        tracing::info!(concurrency, queue_capacity = config.queue_capacity, "Moderation workers started");
        let dispatcher = tokio::spawn(dispatch_loop(orchestrator, receiver, concurrency));

        Self { sender, dispatcher }
    }

    /// Queue a run, waiting for space if the queue is full.
    pub async fn submit(&self, job: ModerationJob) -> Result<(), ModerationError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| ModerationError::QueueClosed)
    }

    /// Stop accepting jobs and wait for queued and in-flight runs to finish.
    pub async fn shutdown(self) -> Result<(), ModerationError> {
        drop(self.sender);
        self.dispatcher.await?;
        tracing::info!("Moderation workers stopped");
        Ok(())
    }

    /// Abandon queued and in-flight runs.
    pub async fn abort(self) {
        self.dispatcher.abort();
        let _ = self.dispatcher.await;
        tracing::warn!("Moderation workers aborted; unfinished records remain pending");
    }
}

async fn dispatch_loop(
    orchestrator: Arc<ModerationOrchestrator>,
    mut receiver: mpsc::Receiver<ModerationJob>,
    concurrency: usize,
) {
    let slots = Arc::new(Semaphore::new(concurrency));
    // Dropping the set (on abort) cancels every run in it
    let mut running = JoinSet::new();

    loop {
        while let Some(result) = running.try_join_next() {
            log_join(result);
        }

        let Ok(permit) = slots.clone().acquire_owned().await else {
            break;
        };
        let Some(job) = receiver.recv().await else {
            break;
        };

        let orchestrator = orchestrator.clone();
        running.spawn(async move {
            let _permit = permit;
            run_job(&orchestrator, job).await;
        });
    }

    while let Some(result) = running.join_next().await {
        log_join(result);
    }
}

async fn run_job(orchestrator: &ModerationOrchestrator, job: ModerationJob) {
    let moderation_id = job.record.id.clone();
    if let Err(e) = orchestrator.run(&job.record, &job.claim).await {
        tracing::error!(moderation_id = %moderation_id, error = %e, "Moderation run could not be finalized");
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            tracing::error!(error = %e, "Moderation run panicked");
        }
    }
}

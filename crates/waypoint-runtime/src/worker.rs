//! Worker pool: N slots pulling jobs from a task queue.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::TaskOrchestrator;
use crate::queue::TaskQueue;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `concurrency` workers on the current tokio runtime.
    ///
    /// Each worker runs one task at a time. Job failures are logged and
    /// not retried; retry bookkeeping belongs to the queue transport.
    pub fn spawn(
        queue: Arc<dyn TaskQueue>,
        orchestrator: Arc<TaskOrchestrator>,
        concurrency: usize,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handles = (0..concurrency.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    queue.clone(),
                    orchestrator.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();
        tracing::info!(queue = %queue.name(), concurrency = concurrency.max(1), "worker pool started");
        Self { handles, shutdown }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop taking new jobs and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                tracing::error!("worker terminated abnormally: {}", err);
            }
        }
        tracing::info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn TaskQueue>,
    orchestrator: Arc<TaskOrchestrator>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = queue.dequeue() => job,
        };
        let Some(job) = job else {
            break;
        };

        tracing::debug!(worker_id, task_id = %job.task_id, user_id = %job.user_id, "job picked up");
        match orchestrator.execute_task(&job.task_id).await {
            Ok(task) => tracing::info!(
                worker_id,
                task_id = %task.id,
                status = %task.status,
                "job finished"
            ),
            Err(err) => tracing::warn!(
                worker_id,
                task_id = %job.task_id,
                error = %err,
                "job failed"
            ),
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

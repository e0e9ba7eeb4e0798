//! Background ingestion over a fixed-size worker pool.
//!
//! Jobs carry pre-extracted blocks; extraction itself happens before the
//! boundary. A failing job is retried a bounded number of times with a fixed
//! backoff before its task is marked terminally failed. Workers never hold a
//! lock across a collaborator call: registry writes happen between awaits.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use vellum_core::config::IngestionConfig;
use vellum_core::types::{KbId, SourceBlock, TaskId, TaskState};
use vellum_llm::EmbeddingProvider;

use crate::error::IngestError;
use crate::task::TaskRegistry;
use crate::writer::IndexWriter;

/// One file's worth of ingestion work, bound to a single knowledge base.
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub kb_id: KbId,
    pub source_file: String,
    pub file_type: String,
    pub upload_date: NaiveDate,
    pub blocks: Vec<SourceBlock>,
}

pub struct IngestionExecutor {
    queue: mpsc::Sender<(TaskId, IngestionJob)>,
    registry: Arc<TaskRegistry>,
    workers: Vec<JoinHandle<()>>,
}

impl IngestionExecutor {
    /// Spawn the worker pool.
    pub fn start<E: EmbeddingProvider + 'static>(
        writer: Arc<IndexWriter<E>>,
        registry: Arc<TaskRegistry>,
        cfg: IngestionConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<(TaskId, IngestionJob)>(64);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..cfg.workers.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let writer = Arc::clone(&writer);
                let registry = Arc::clone(&registry);
                let cfg = cfg.clone();
                tokio::spawn(async move {
                    loop {
                        let next = rx.lock().await.recv().await;
                        let Some((task_id, job)) = next else {
                            break;
                        };
                        tracing::debug!(worker, %task_id, file = %job.source_file, "picked up ingestion job");
                        run_job(&writer, &registry, &cfg, task_id, job).await;
                    }
                })
            })
            .collect();

        Self {
            queue: tx,
            registry,
            workers,
        }
    }

    /// Register a pending task for `job` and queue it.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor has been shut down.
    pub async fn submit(&self, job: IngestionJob) -> Result<TaskId, IngestError> {
        let task_id = self.registry.register(job.source_file.clone(), job.kb_id.clone());
        self.queue
            .send((task_id, job))
            .await
            .map_err(|_| IngestError::QueueClosed)?;
        Ok(task_id)
    }

    /// Stop accepting work and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        drop(self.queue);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_job<E: EmbeddingProvider>(
    writer: &IndexWriter<E>,
    registry: &TaskRegistry,
    cfg: &IngestionConfig,
    task_id: TaskId,
    job: IngestionJob,
) {
    registry.transition(task_id, TaskState::Processing);

    let mut attempt = 0;
    loop {
        match writer
            .write(
                &job.kb_id,
                &job.blocks,
                &job.source_file,
                &job.file_type,
                job.upload_date,
            )
            .await
        {
            Ok(chunks) => {
                registry.transition(task_id, TaskState::Completed { chunks });
                tracing::info!(%task_id, file = %job.source_file, chunks, "ingestion completed");
                return;
            }
            Err(e) if attempt < cfg.max_retries => {
                attempt += 1;
                tracing::warn!(
                    %task_id,
                    file = %job.source_file,
                    attempt,
                    max_retries = cfg.max_retries,
                    error = %e,
                    "ingestion attempt failed, retrying after backoff"
                );
                tokio::time::sleep(cfg.retry_backoff).await;
            }
            Err(e) => {
                tracing::error!(%task_id, file = %job.source_file, error = %e, "ingestion terminally failed");
                registry.transition(
                    task_id,
                    TaskState::Failed {
                        error: e.to_string(),
                    },
                );
                return;
            }
        }
    }
}

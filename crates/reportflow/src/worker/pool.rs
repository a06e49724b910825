use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::error::WorkerError;
use crate::worker::{JobResult, Worker};

pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl WorkerPool {
    pub fn start(
        worker: Arc<Worker>,
        worker_count: usize,
        poll_interval: Duration,
    ) -> Result<Self, WorkerError> {
        Self::with_result_sender(worker, worker_count, poll_interval, None)
    }

    /// Starts `worker_count` tasks sharing one [`Worker`]. Each finished
    /// delivery is reported on `results` when given.
    pub fn with_result_sender(
        worker: Arc<Worker>,
        worker_count: usize,
        poll_interval: Duration,
        results: Option<mpsc::UnboundedSender<JobResult>>,
    ) -> Result<Self, WorkerError> {
        if worker_count == 0 {
            return Err(WorkerError::NoWorkers);
        }

        let shutdown = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());
        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let handle = tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&worker),
                Arc::clone(&shutdown),
                Arc::clone(&wake),
                poll_interval,
                results.clone(),
            ));
            workers.push(handle);
        }

        info!("Started {} workers", worker_count);

        Ok(Self {
            workers,
            shutdown,
            wake,
        })
    }

    /// Stops claiming new deliveries. Runs in progress finish first.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
        self.wake.notify_waiters();
    }

    pub async fn wait(self) {
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

async fn run_worker(
    worker_id: usize,
    worker: Arc<Worker>,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
    poll_interval: Duration,
    results: Option<mpsc::UnboundedSender<JobResult>>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            debug!("Worker {} received shutdown signal", worker_id);
            break;
        }

        match worker.process_next().await {
            Ok(Some(result)) => {
                debug!("Worker {} finished job {}", worker_id, result.job_id);
                if let Some(ref sender) = results {
                    // Receiver gone only matters to whoever dropped it.
                    let _ = sender.send(result);
                }
            }
            Ok(None) => {
                tokio::select! {
                    _ = worker.wait_for_work(poll_interval) => {}
                    _ = wake.notified() => {}
                }
            }
            Err(e) => {
                error!("Worker {} queue error: {}", worker_id, e);
                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = wake.notified() => {}
                }
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::broadcast::JobEventBroadcaster;
    use crate::collaborators::Collaborators;
    use crate::db::{job_repo, report_repo};
    use crate::events::EventLog;
    use crate::model::{JobScope, JobStatus, ReportInput};
    use crate::pipeline::{PipelineConfig, ReportPipeline};
    use crate::queue::sqlite::{QueueSettings, SqliteQueue};
    use crate::queue::{QueueMessage, WorkQueue, REPORT_QUEUE};
    use crate::store::StatusStore;

    fn worker() -> (Arc<Worker>, Arc<SqliteQueue>, StatusStore) {
        let store = StatusStore::open_in_memory().unwrap();
        let queue = Arc::new(SqliteQueue::new(
            store.database().clone(),
            REPORT_QUEUE,
            QueueSettings::default(),
        ));
        let events = EventLog::new(store.clone(), JobEventBroadcaster::default());
        let pipeline = Arc::new(ReportPipeline::new(
            Arc::new(PipelineConfig::default()),
            store.clone(),
            events,
            Collaborators::simulated(Duration::ZERO),
        ));
        let worker = Arc::new(Worker::new(queue.clone(), pipeline));
        (worker, queue, store)
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let (worker, _, _) = worker();
        assert!(matches!(
            WorkerPool::start(worker, 0, Duration::from_millis(10)),
            Err(WorkerError::NoWorkers)
        ));
    }

    #[tokio::test]
    async fn test_pool_start_and_shutdown() {
        let (worker, _, _) = worker();
        let pool = WorkerPool::start(worker, 2, Duration::from_millis(10)).unwrap();
        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_pool_processes_enqueued_job() {
        let (worker, queue, store) = worker();
        store
            .transaction(|tx| {
                let now = Utc::now();
                report_repo::insert(tx, "r1", "alice", now)?;
                report_repo::insert_input(tx, "r1", &ReportInput::new("Solar"), now)?;
                job_repo::insert(tx, "j1", "r1", JobScope::Full, now)?;
                Ok(())
            })
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let pool =
            WorkerPool::with_result_sender(worker, 1, Duration::from_millis(10), Some(tx)).unwrap();
        queue.enqueue(&QueueMessage::new("r1", "j1")).await.unwrap();

        let result = rx.recv().await.unwrap();
        assert!(result.success, "Job failed: {:?}", result.error);
        assert_eq!(result.job_id, "j1");
        assert_eq!(store.job("j1").unwrap().unwrap().status, JobStatus::Completed);
        assert_eq!(queue.stats().await.unwrap().done, 1);

        pool.shutdown();
        pool.wait().await;
    }
}

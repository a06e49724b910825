//! Wiring of the store, queue, event log, admission, pipeline and reader
//! from one [`Config`].

use std::sync::Arc;

use log::info;

use crate::admission::{AdmissionController, AdmissionSettings};
use crate::broadcast::JobEventBroadcaster;
use crate::collaborators::Collaborators;
use crate::config::{validate_config, Config};
use crate::db::{Database, DatabaseError};
use crate::error::{ReportflowError, WorkerError};
use crate::events::EventLog;
use crate::pipeline::{PipelineConfig, ReportPipeline};
use crate::queue::sqlite::SqliteQueue;
use crate::queue::REPORT_QUEUE;
use crate::reader::ProgressReader;
use crate::store::StatusStore;
use crate::worker::{Worker, WorkerPool};

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub store: StatusStore,
    pub events: EventLog,
    pub queue: Arc<SqliteQueue>,
    pub admission: Arc<AdmissionController>,
    pub reader: ProgressReader,
    pub pipeline: Arc<ReportPipeline>,
}

impl Services {
    /// Opens the databases named by `config` and builds every component.
    pub fn open(config: Config) -> Result<Self, ReportflowError> {
        validate_config(&config)?;

        let store_path = config.database_path();
        let queue_path = config.queue_path();
        let store_db = Database::open(&store_path)?;
        let queue_db = if queue_path == store_path {
            store_db.clone()
        } else {
            Database::open(&queue_path)?
        };

        let collaborators = Collaborators::from_config(&config.collaborators);
        info!(
            "Services ready (store: {}, queue: {})",
            store_path.display(),
            queue_path.display()
        );
        Ok(Self::assemble(config, store_db, queue_db, collaborators))
    }

    /// Single in-memory database; for tests and demos.
    pub fn in_memory(config: Config, collaborators: Collaborators) -> Result<Self, DatabaseError> {
        let db = Database::open_in_memory()?;
        Ok(Self::assemble(config, db.clone(), db, collaborators))
    }

    pub fn assemble(
        config: Config,
        store_db: Database,
        queue_db: Database,
        collaborators: Collaborators,
    ) -> Self {
        let store = StatusStore::new(store_db);
        let events = EventLog::new(store.clone(), JobEventBroadcaster::default());
        let queue = Arc::new(SqliteQueue::new(
            queue_db,
            REPORT_QUEUE,
            config.queue_settings(),
        ));
        let admission = Arc::new(AdmissionController::new(
            store.clone(),
            events.clone(),
            queue.clone(),
            AdmissionSettings::from_config(&config),
        ));
        let reader = ProgressReader::new(store.clone(), config.pipeline.events_limit);
        let pipeline = Arc::new(ReportPipeline::new(
            Arc::new(PipelineConfig::from_config(&config)),
            store.clone(),
            events.clone(),
            collaborators,
        ));

        Self {
            config: Arc::new(config),
            store,
            events,
            queue,
            admission,
            reader,
            pipeline,
        }
    }

    pub fn worker(&self) -> Arc<Worker> {
        Arc::new(Worker::new(self.queue.clone(), self.pipeline.clone()))
    }

    /// Starts the configured number of workers.
    pub fn start_workers(&self) -> Result<WorkerPool, WorkerError> {
        WorkerPool::start(
            self.worker(),
            self.config.worker.worker_count,
            self.config.poll_interval(),
        )
    }
}

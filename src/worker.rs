//! The worker loop: fetch a task, run it, report it, repeat.
//!
//! A worker has no identity the coordinator knows about. It keeps asking
//! for work until it is told the job is done. Failing to reach the
//! coordinator ends the loop with an error; a task attempt that fails
//! locally is dropped without a report and left for the coordinator's
//! timeout to hand out again.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::engine;
use crate::error::Result;
use crate::rpc::{Assignment, MapAssignment, ReduceAssignment, RemoteCoordinator};
use crate::storage::BlobStore;
use crate::Workload;

/// What one worker got through before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub maps_done: u32,
    pub reduces_done: u32,
    /// Attempts that failed locally and were not reported.
    pub abandoned: u32,
    pub waits: u32,
}

pub struct Worker {
    id: Uuid,
    coordinator: RemoteCoordinator,
    store: Arc<dyn BlobStore>,
    workload: Workload,
    config: WorkerConfig,
}

impl Worker {
    pub async fn connect(
        config: WorkerConfig,
        store: Arc<dyn BlobStore>,
        workload: Workload,
    ) -> Result<Self> {
        let coordinator = RemoteCoordinator::connect(config.endpoint()).await?;
        Ok(Self::with_coordinator(coordinator, config, store, workload))
    }

    pub fn with_coordinator(
        coordinator: RemoteCoordinator,
        config: WorkerConfig,
        store: Arc<dyn BlobStore>,
        workload: Workload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            coordinator,
            store,
            workload,
            config,
        }
    }

    /// Runs until the coordinator answers `JobDone`, or a call to it fails.
    pub async fn run(mut self) -> Result<WorkerSummary> {
        let span = info_span!("worker", id = %self.id);
        self.run_loop().instrument(span).await
    }

    async fn run_loop(&mut self) -> Result<WorkerSummary> {
        let mut summary = WorkerSummary::default();
        info!(coordinator = %self.config.coordinator_addr, "worker started");
        loop {
            match self.coordinator.fetch_task().await? {
                Assignment::Map(task) => {
                    let file = task.file_name.clone();
                    match self.map_attempt(task).await {
                        Ok(prefix) => {
                            info!(%file, %prefix, "map task finished");
                            summary.maps_done += 1;
                        }
                        Err(e) if e.is_transport() => return Err(e),
                        Err(e) => {
                            warn!(%file, error = %e, "map attempt failed, leaving it to be reassigned");
                            summary.abandoned += 1;
                        }
                    }
                }
                Assignment::Reduce(task) => {
                    let partition = task.partition_index;
                    match self.reduce_attempt(task).await {
                        Ok(output) => {
                            info!(partition, %output, "reduce task finished");
                            summary.reduces_done += 1;
                        }
                        Err(e) if e.is_transport() => return Err(e),
                        Err(e) => {
                            warn!(partition, error = %e, "reduce attempt failed, leaving it to be reassigned");
                            summary.abandoned += 1;
                        }
                    }
                }
                Assignment::Wait => {
                    summary.waits += 1;
                    sleep(self.config.wait_interval).await;
                }
                Assignment::JobDone => {
                    info!(?summary, "job done, worker exiting");
                    return Ok(summary);
                }
            }
        }
    }

    /// Runs one map attempt and reports it. Nothing is reported if the
    /// attempt fails.
    async fn map_attempt(&mut self, task: MapAssignment) -> Result<String> {
        let file = task.file_name.clone();
        debug!(%file, map_task_id = task.map_task_id, "running map task");
        let prefix = self
            .execute(move |store, workload, aux| engine::perform_map(store, workload, aux, &task))
            .await?;
        self.coordinator.report_map_done(&file, &prefix).await?;
        Ok(prefix)
    }

    async fn reduce_attempt(&mut self, task: ReduceAssignment) -> Result<String> {
        let partition = task.partition_index;
        debug!(partition, inputs = task.map_output_prefixes.len(), "running reduce task");
        let output = self
            .execute(move |store, workload, aux| engine::perform_reduce(store, workload, aux, &task))
            .await?;
        self.coordinator.report_reduce_done(partition, &output).await?;
        Ok(output)
    }

    /// Runs `f` on the blocking pool; user functions and file I/O are
    /// synchronous.
    async fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn BlobStore, &Workload, &str) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let workload = self.workload;
        let aux = self.config.aux.clone();
        tokio::task::spawn_blocking(move || f(&*store, &workload, &aux)).await?
    }
}

//! The coordinator: scheduling RPCs over a lock-protected [`TaskLedger`].
//!
//! Every RPC takes the ledger lock for exactly one scan-and-claim or one
//! record operation and releases it before answering. Nothing here ever
//! sleeps while holding it: a worker that finds nothing to do gets `Wait`
//! back immediately and does its back-off on its own side.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::error::Result;
use crate::ledger::{JobSnapshot, Phase, TaskLedger};
use crate::proto::coordinator_server::{Coordinator, CoordinatorServer};
use crate::proto::{
    Empty, FetchTaskReply, FetchTaskRequest, JobStatusReply, MapDoneReport, ReduceDoneReport,
};
use crate::rpc::{Assignment, MapAssignment, ReduceAssignment};

struct State {
    ledger: TaskLedger,
    /// Next map task id; bumped on every map dispatch, including
    /// reassignments.
    next_map_id: u64,
}

/// Owns the job. Cheap to clone; clones share the same ledger.
#[derive(Clone)]
pub struct CoordinatorService {
    state: Arc<Mutex<State>>,
    complete: Arc<AtomicBool>,
}

impl CoordinatorService {
    /// Creates one map task per distinct input file. Fails if `config` is
    /// invalid.
    pub fn new<I, S>(files: I, config: &CoordinatorConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        config.validate()?;
        let ledger = TaskLedger::new(files, config.reduce_count, config.task_timeout);
        Ok(Self {
            state: Arc::new(Mutex::new(State {
                ledger,
                next_map_id: 0,
            })),
            complete: Arc::new(AtomicBool::new(false)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hands out the next piece of work as of now.
    pub fn next_assignment(&self) -> Assignment {
        self.next_assignment_at(Instant::now())
    }

    /// Hands out the next piece of work as of `now`.
    ///
    /// Maps first, in input order; then, once every map is done, reduces in
    /// partition order. `Wait` while something is still in flight, `JobDone`
    /// once every reduce is done.
    pub fn next_assignment_at(&self, now: Instant) -> Assignment {
        let mut state = self.lock();
        if state.ledger.phase() == Phase::Complete {
            return Assignment::JobDone;
        }

        if let Some(file_name) = state.ledger.next_unassigned_or_expired_map(now) {
            let map_task_id = state.next_map_id;
            state.next_map_id += 1;
            debug!(file = %file_name, map_task_id, "dispatching map task");
            return Assignment::Map(MapAssignment {
                file_name,
                map_task_id,
                reduce_count: state.ledger.reduce_count(),
            });
        }
        if !state.ledger.all_maps_done() {
            return Assignment::Wait;
        }

        state.ledger.ensure_reduce_phase();
        if let Some(partition_index) = state.ledger.next_unassigned_or_expired_reduce(now) {
            debug!(partition_index, "dispatching reduce task");
            return Assignment::Reduce(ReduceAssignment {
                partition_index,
                map_output_prefixes: state.ledger.reduce_inputs().to_vec(),
            });
        }
        if !state.ledger.all_reduces_done() {
            return Assignment::Wait;
        }

        self.settle(&mut state);
        Assignment::JobDone
    }

    /// Records a finished map attempt. Safe to call any number of times and
    /// after the task was reassigned; the latest report wins.
    pub fn record_map_done(&self, processed_filename: &str, output_prefix: &str) {
        let mut state = self.lock();
        if state.ledger.record_map_done(processed_filename, output_prefix) {
            debug!(file = processed_filename, output_prefix, "map task done");
        }
    }

    /// Records a finished reduce partition. Unknown partitions are ignored.
    pub fn record_reduce_done(&self, partition_index: u32, output_file: &str) {
        let mut state = self.lock();
        if state.ledger.record_reduce_done(partition_index, output_file) {
            debug!(partition_index, output_file, "reduce task done");
            self.settle(&mut state);
        }
    }

    fn settle(&self, state: &mut State) {
        if state.ledger.mark_complete() {
            self.complete.store(true, Ordering::Release);
        }
    }

    /// Non-blocking; once true, stays true.
    pub fn is_job_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.lock();
        state.ledger.snapshot(state.next_map_id)
    }

    /// Polls [`Self::is_job_complete`] every `poll` until it turns true.
    pub async fn wait_for_completion(&self, poll: Duration) {
        let mut ticker = tokio::time::interval(poll);
        loop {
            ticker.tick().await;
            if self.is_job_complete() {
                return;
            }
        }
    }

    /// Serves this coordinator on `addr` in the background.
    pub async fn spawn(self, addr: SocketAddr) -> Result<RunningCoordinator> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown, signal) = oneshot::channel::<()>();
        info!(addr = %local_addr, "coordinator listening");
        let server = tokio::spawn(
            Server::builder()
                .add_service(CoordinatorServer::new(self))
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = signal.await;
                }),
        );
        Ok(RunningCoordinator {
            local_addr,
            shutdown,
            server,
        })
    }
}

/// A coordinator being served in the background.
pub struct RunningCoordinator {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::result::Result<(), tonic::transport::Error>>,
}

impl RunningCoordinator {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting calls and waits for the server to wind down.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.server.await??;
        Ok(())
    }
}

/// Drives a whole job: serves the coordinator, waits until the job is
/// complete, lingers for the configured grace period, then shuts down.
pub async fn run(files: Vec<String>, config: CoordinatorConfig) -> Result<()> {
    let service = CoordinatorService::new(files, &config)?;
    info!(
        map_tasks = service.snapshot().maps.unstarted,
        reduce_count = config.reduce_count,
        timeout = ?config.task_timeout,
        "starting job"
    );
    let running = service.clone().spawn(config.listen_addr).await?;
    service.wait_for_completion(config.poll_interval).await;
    info!("job complete");
    tokio::time::sleep(config.exit_grace).await;
    running.shutdown().await
}

#[tonic::async_trait]
impl Coordinator for CoordinatorService {
    async fn fetch_task(
        &self,
        _request: Request<FetchTaskRequest>,
    ) -> std::result::Result<Response<FetchTaskReply>, Status> {
        Ok(Response::new(self.next_assignment().into()))
    }

    async fn report_map_done(
        &self,
        request: Request<MapDoneReport>,
    ) -> std::result::Result<Response<Empty>, Status> {
        let report = request.into_inner();
        self.record_map_done(&report.processed_filename, &report.output_prefix);
        Ok(Response::new(Empty {}))
    }

    async fn report_reduce_done(
        &self,
        request: Request<ReduceDoneReport>,
    ) -> std::result::Result<Response<Empty>, Status> {
        let report = request.into_inner();
        self.record_reduce_done(report.partition_index, &report.output_file);
        Ok(Response::new(Empty {}))
    }

    async fn job_status(
        &self,
        _request: Request<Empty>,
    ) -> std::result::Result<Response<JobStatusReply>, Status> {
        Ok(Response::new(self.snapshot().into()))
    }
}

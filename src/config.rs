use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ledger::TASK_TIMEOUT;

/// Partition count used when none is given.
pub const DEFAULT_REDUCE_COUNT: u32 = 10;

/// Port the coordinator listens on by default.
pub const DEFAULT_PORT: u16 = 50051;

/// Fixed back-off a worker sleeps after a `Wait` reply.
pub const WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for the coordinator process.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of reduce partitions, fixed for the whole job.
    pub reduce_count: u32,
    /// How long a dispatched task may stay silent before it is reassigned.
    pub task_timeout: Duration,
    /// Address the gRPC server binds to.
    pub listen_addr: SocketAddr,
    /// How often the driver checks for completion.
    pub poll_interval: Duration,
    /// How long to keep serving after completion, so that idle workers
    /// still get to see `JobDone`.
    pub exit_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reduce_count: DEFAULT_REDUCE_COUNT,
            task_timeout: TASK_TIMEOUT,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            poll_interval: Duration::from_secs(1),
            exit_grace: Duration::from_secs(1),
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.reduce_count == 0 {
            return Err(Error::Config("reduce count must be at least 1".into()));
        }
        if self.task_timeout.is_zero() {
            return Err(Error::Config("task timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Settings for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// `host:port` of the coordinator, or a full `http://` URI.
    pub coordinator_addr: String,
    /// Back-off after a `Wait` reply.
    pub wait_interval: Duration,
    /// Auxiliary argument passed to every map and reduce call.
    pub aux: String,
}

impl WorkerConfig {
    pub fn new(coordinator_addr: impl Into<String>) -> Self {
        Self {
            coordinator_addr: coordinator_addr.into(),
            wait_interval: WAIT_INTERVAL,
            aux: String::new(),
        }
    }

    /// The URI tonic should dial.
    pub fn endpoint(&self) -> String {
        if self.coordinator_addr.contains("://") {
            self.coordinator_addr.clone()
        } else {
            format!("http://{}", self.coordinator_addr)
        }
    }
}

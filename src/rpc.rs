//! Domain view of the coordinator's wire contract, and a thin client.
//!
//! Everything that touches the generated protobuf types for task
//! assignment goes through the conversions here.

use tonic::transport::Channel;
use tonic::Request;

use crate::error::{Error, Result};
use crate::ledger::{JobSnapshot, Phase, TaskCounts};
use crate::proto::coordinator_client::CoordinatorClient;
use crate::proto::{self, fetch_task_reply};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapAssignment {
    pub file_name: String,
    /// Fresh for every dispatch, so two attempts never share output names.
    pub map_task_id: u64,
    pub reduce_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceAssignment {
    pub partition_index: u32,
    pub map_output_prefixes: Vec<String>,
}

/// What the coordinator tells a worker to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Map(MapAssignment),
    Reduce(ReduceAssignment),
    /// Nothing claimable right now; back off and ask again.
    Wait,
    /// Every reduce is done; the worker should exit.
    JobDone,
}

impl From<Assignment> for proto::FetchTaskReply {
    fn from(assignment: Assignment) -> Self {
        let task = match assignment {
            Assignment::Map(m) => fetch_task_reply::Task::Map(proto::MapTask {
                file_name: m.file_name,
                map_task_id: m.map_task_id,
                reduce_count: m.reduce_count,
            }),
            Assignment::Reduce(r) => fetch_task_reply::Task::Reduce(proto::ReduceTask {
                partition_index: r.partition_index,
                map_output_prefixes: r.map_output_prefixes,
            }),
            Assignment::Wait => fetch_task_reply::Task::Wait(proto::Wait {}),
            Assignment::JobDone => fetch_task_reply::Task::Done(proto::JobDone {}),
        };
        proto::FetchTaskReply { task: Some(task) }
    }
}

impl TryFrom<proto::FetchTaskReply> for Assignment {
    type Error = Error;

    fn try_from(reply: proto::FetchTaskReply) -> Result<Self> {
        match reply.task {
            Some(fetch_task_reply::Task::Map(m)) => {
                if m.reduce_count == 0 {
                    return Err(Error::Protocol("map task with zero reduce partitions".into()));
                }
                Ok(Assignment::Map(MapAssignment {
                    file_name: m.file_name,
                    map_task_id: m.map_task_id,
                    reduce_count: m.reduce_count,
                }))
            }
            Some(fetch_task_reply::Task::Reduce(r)) => Ok(Assignment::Reduce(ReduceAssignment {
                partition_index: r.partition_index,
                map_output_prefixes: r.map_output_prefixes,
            })),
            Some(fetch_task_reply::Task::Wait(_)) => Ok(Assignment::Wait),
            Some(fetch_task_reply::Task::Done(_)) => Ok(Assignment::JobDone),
            None => Err(Error::Protocol("fetch reply carries no task".into())),
        }
    }
}

impl From<TaskCounts> for proto::TaskCounts {
    fn from(c: TaskCounts) -> Self {
        proto::TaskCounts {
            unstarted: c.unstarted,
            in_flight: c.in_flight,
            done: c.done,
        }
    }
}

impl From<proto::TaskCounts> for TaskCounts {
    fn from(c: proto::TaskCounts) -> Self {
        TaskCounts {
            unstarted: c.unstarted,
            in_flight: c.in_flight,
            done: c.done,
        }
    }
}

impl From<JobSnapshot> for proto::JobStatusReply {
    fn from(s: JobSnapshot) -> Self {
        proto::JobStatusReply {
            phase: s.phase.to_string(),
            maps: Some(s.maps.into()),
            reduces: Some(s.reduces.into()),
            reduce_count: s.reduce_count,
            map_tasks_issued: s.map_tasks_issued,
            complete: s.complete,
        }
    }
}

impl TryFrom<proto::JobStatusReply> for JobSnapshot {
    type Error = Error;

    fn try_from(r: proto::JobStatusReply) -> Result<Self> {
        let phase = match r.phase.as_str() {
            "mapping" => Phase::Mapping,
            "reducing" => Phase::Reducing,
            "complete" => Phase::Complete,
            other => return Err(Error::Protocol(format!("unknown phase {other:?}"))),
        };
        Ok(JobSnapshot {
            phase,
            maps: r.maps.unwrap_or_default().into(),
            reduces: r.reduces.unwrap_or_default().into(),
            reduce_count: r.reduce_count,
            map_tasks_issued: r.map_tasks_issued,
            complete: r.complete,
        })
    }
}

/// A connection to a remote coordinator.
///
/// Every call either returns the coordinator's answer or an error; there
/// are no retries.
#[derive(Debug, Clone)]
pub struct RemoteCoordinator {
    client: CoordinatorClient<Channel>,
}

impl RemoteCoordinator {
    /// Dials `endpoint`, e.g. `http://127.0.0.1:50051`.
    pub async fn connect(endpoint: String) -> Result<Self> {
        let client = CoordinatorClient::connect(endpoint).await?;
        Ok(Self { client })
    }

    pub async fn fetch_task(&mut self) -> Result<Assignment> {
        let reply = self
            .client
            .fetch_task(Request::new(proto::FetchTaskRequest {}))
            .await?;
        reply.into_inner().try_into()
    }

    pub async fn report_map_done(&mut self, processed_filename: &str, output_prefix: &str) -> Result<()> {
        self.client
            .report_map_done(Request::new(proto::MapDoneReport {
                processed_filename: processed_filename.to_string(),
                output_prefix: output_prefix.to_string(),
            }))
            .await?;
        Ok(())
    }

    pub async fn report_reduce_done(&mut self, partition_index: u32, output_file: &str) -> Result<()> {
        self.client
            .report_reduce_done(Request::new(proto::ReduceDoneReport {
                partition_index,
                output_file: output_file.to_string(),
            }))
            .await?;
        Ok(())
    }

    pub async fn job_status(&mut self) -> Result<JobSnapshot> {
        let reply = self.client.job_status(Request::new(proto::Empty {})).await?;
        reply.into_inner().try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_survive_the_wire_types() {
        let cases = vec![
            Assignment::Map(MapAssignment {
                file_name: "pg-1.txt".into(),
                map_task_id: 4,
                reduce_count: 3,
            }),
            Assignment::Reduce(ReduceAssignment {
                partition_index: 2,
                map_output_prefixes: vec!["mr-out-0".into(), "mr-out-4".into()],
            }),
            Assignment::Wait,
            Assignment::JobDone,
        ];
        for case in cases {
            let reply: proto::FetchTaskReply = case.clone().into();
            assert_eq!(Assignment::try_from(reply).unwrap(), case);
        }
    }

    #[test]
    fn empty_or_inconsistent_replies_are_protocol_errors() {
        let empty = proto::FetchTaskReply { task: None };
        assert!(matches!(Assignment::try_from(empty), Err(Error::Protocol(_))));

        let zero = proto::FetchTaskReply {
            task: Some(fetch_task_reply::Task::Map(proto::MapTask {
                file_name: "a".into(),
                map_task_id: 0,
                reduce_count: 0,
            })),
        };
        assert!(Assignment::try_from(zero).is_err());
    }

    #[test]
    fn snapshot_phase_must_be_known() {
        let reply = proto::JobStatusReply {
            phase: "shuffling".into(),
            ..Default::default()
        };
        assert!(JobSnapshot::try_from(reply).is_err());
    }
}

//! The authoritative record of every map and reduce task.
//!
//! The ledger itself is plain data; [`crate::coordinator`] owns it behind a
//! single mutex and every method here runs under that lock. Scans are in a
//! fixed order (input-file order for maps, partition order for reduces), and
//! a claim marks the task in flight before returning it, so scan-and-claim
//! is atomic with respect to other callers.
//!
//! Time is passed in explicitly so that timeout behaviour can be driven
//! deterministically.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

/// How long a task may stay in flight before it is presumed lost.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Unstarted,
    InFlight { since: Instant },
    /// Holds the map output prefix, or the reduce output file.
    Done { output: String },
}

impl TaskState {
    /// Unstarted, or in flight for strictly longer than `timeout`.
    fn claimable(&self, now: Instant, timeout: Duration) -> bool {
        match self {
            TaskState::Unstarted => true,
            TaskState::InFlight { since } => now.saturating_duration_since(*since) > timeout,
            TaskState::Done { .. } => false,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, TaskState::Done { .. })
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            TaskState::Done { output } => Some(output),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Mapping,
    Reducing,
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Mapping => "mapping",
            Phase::Reducing => "reducing",
            Phase::Complete => "complete",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub unstarted: u32,
    pub in_flight: u32,
    pub done: u32,
}

impl TaskCounts {
    fn tally<'a>(states: impl Iterator<Item = &'a TaskState>) -> Self {
        let mut counts = TaskCounts::default();
        for state in states {
            match state {
                TaskState::Unstarted => counts.unstarted += 1,
                TaskState::InFlight { .. } => counts.in_flight += 1,
                TaskState::Done { .. } => counts.done += 1,
            }
        }
        counts
    }
}

/// A read-only view of the job for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSnapshot {
    pub phase: Phase,
    pub maps: TaskCounts,
    pub reduces: TaskCounts,
    pub reduce_count: u32,
    pub map_tasks_issued: u64,
    pub complete: bool,
}

#[derive(Debug, Clone)]
struct MapTask {
    file: String,
    state: TaskState,
}

#[derive(Debug)]
pub struct TaskLedger {
    timeout: Duration,
    reduce_count: u32,
    maps: Vec<MapTask>,
    by_file: HashMap<String, usize>,
    /// Materialized all at once when every map first reaches Done.
    reduces: Option<Vec<TaskState>>,
    /// Map output prefixes frozen at the phase barrier.
    reduce_inputs: Vec<String>,
    phase: Phase,
}

impl TaskLedger {
    /// One Unstarted map task per distinct input file, in the given order.
    pub fn new<I, S>(files: I, reduce_count: u32, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut maps = Vec::new();
        let mut by_file = HashMap::new();
        for file in files {
            let file = file.into();
            if by_file.contains_key(&file) {
                continue;
            }
            by_file.insert(file.clone(), maps.len());
            maps.push(MapTask {
                file,
                state: TaskState::Unstarted,
            });
        }
        Self {
            timeout,
            reduce_count,
            maps,
            by_file,
            reduces: None,
            reduce_inputs: Vec::new(),
            phase: Phase::Mapping,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn reduce_count(&self) -> u32 {
        self.reduce_count
    }

    /// Map output prefixes handed to every reduce task.
    pub fn reduce_inputs(&self) -> &[String] {
        &self.reduce_inputs
    }

    pub fn map_state(&self, file: &str) -> Option<&TaskState> {
        self.by_file.get(file).map(|&i| &self.maps[i].state)
    }

    pub fn reduce_state(&self, partition: u32) -> Option<&TaskState> {
        self.reduces.as_ref()?.get(partition as usize)
    }

    /// Claims the first map task that is unstarted or whose attempt timed
    /// out, marking it in flight as of `now`.
    pub fn next_unassigned_or_expired_map(&mut self, now: Instant) -> Option<String> {
        let timeout = self.timeout;
        let task = self
            .maps
            .iter_mut()
            .find(|t| t.state.claimable(now, timeout))?;
        if let TaskState::InFlight { since } = task.state {
            warn!(
                file = %task.file,
                silent_for = ?now.saturating_duration_since(since),
                "map task timed out, reassigning"
            );
        }
        task.state = TaskState::InFlight { since: now };
        Some(task.file.clone())
    }

    pub fn all_maps_done(&self) -> bool {
        self.maps.iter().all(|t| t.state.is_done())
    }

    /// Marks the map task for `file` Done with `output_prefix`, whatever its
    /// current state. A later report replaces an earlier one. Reports for
    /// unknown files are ignored; returns whether the file was known.
    pub fn record_map_done(&mut self, file: &str, output_prefix: &str) -> bool {
        let Some(&i) = self.by_file.get(file) else {
            debug!(file, "ignoring completion for unknown map task");
            return false;
        };
        let task = &mut self.maps[i];
        if let TaskState::Done { output } = &task.state {
            debug!(file, previous = %output, latest = output_prefix, "duplicate map completion");
        }
        task.state = TaskState::Done {
            output: output_prefix.to_string(),
        };
        if self.reduces.is_some() {
            debug!(file, "map completion after the reduce barrier; reduce inputs unchanged");
        }
        true
    }

    /// Crosses the map→reduce barrier if every map is Done and it has not
    /// been crossed yet. Returns whether this call crossed it.
    pub fn ensure_reduce_phase(&mut self) -> bool {
        if self.reduces.is_some() || !self.all_maps_done() {
            return false;
        }
        self.reduce_inputs = self
            .maps
            .iter()
            .filter_map(|t| t.state.output().map(str::to_string))
            .collect();
        self.reduces = Some(vec![TaskState::Unstarted; self.reduce_count as usize]);
        self.phase = Phase::Reducing;
        info!(
            map_outputs = self.reduce_inputs.len(),
            reduce_count = self.reduce_count,
            "all map tasks done, entering reduce phase"
        );
        true
    }

    /// Same claim policy as maps, over the reduce partitions. Always `None`
    /// before the reduce phase.
    pub fn next_unassigned_or_expired_reduce(&mut self, now: Instant) -> Option<u32> {
        let timeout = self.timeout;
        let reduces = self.reduces.as_mut()?;
        let (partition, state) = reduces
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.claimable(now, timeout))?;
        if let TaskState::InFlight { since } = *state {
            warn!(
                partition,
                silent_for = ?now.saturating_duration_since(since),
                "reduce task timed out, reassigning"
            );
        }
        *state = TaskState::InFlight { since: now };
        Some(partition as u32)
    }

    /// Marks a reduce partition Done. Unknown partitions, or reports that
    /// arrive before the reduce phase, are ignored.
    pub fn record_reduce_done(&mut self, partition: u32, output_file: &str) -> bool {
        let Some(state) = self
            .reduces
            .as_mut()
            .and_then(|r| r.get_mut(partition as usize))
        else {
            debug!(partition, "ignoring completion for unknown reduce task");
            return false;
        };
        *state = TaskState::Done {
            output: output_file.to_string(),
        };
        true
    }

    /// False until the reduce tasks exist and are all Done.
    pub fn all_reduces_done(&self) -> bool {
        self.reduces
            .as_ref()
            .is_some_and(|r| r.iter().all(TaskState::is_done))
    }

    /// Moves the job to Complete once every reduce is Done. Idempotent;
    /// returns whether the job is complete.
    pub fn mark_complete(&mut self) -> bool {
        if self.phase != Phase::Complete && self.all_reduces_done() {
            self.phase = Phase::Complete;
            info!("all reduce tasks done, job complete");
        }
        self.phase == Phase::Complete
    }

    pub fn snapshot(&self, map_tasks_issued: u64) -> JobSnapshot {
        let empty = Vec::new();
        JobSnapshot {
            phase: self.phase,
            maps: TaskCounts::tally(self.maps.iter().map(|t| &t.state)),
            reduces: TaskCounts::tally(self.reduces.as_ref().unwrap_or(&empty).iter()),
            reduce_count: self.reduce_count,
            map_tasks_issued,
            complete: self.phase == Phase::Complete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn ledger(files: &[&str], reduce_count: u32) -> TaskLedger {
        TaskLedger::new(files.iter().copied(), reduce_count, TIMEOUT)
    }

    #[test]
    fn maps_are_claimed_in_input_order_once() {
        let mut l = ledger(&["a.txt", "b.txt", "a.txt"], 2);
        let now = Instant::now();
        assert_eq!(l.next_unassigned_or_expired_map(now).as_deref(), Some("a.txt"));
        assert_eq!(l.next_unassigned_or_expired_map(now).as_deref(), Some("b.txt"));
        assert_eq!(l.next_unassigned_or_expired_map(now), None);
        assert!(!l.all_maps_done());
    }

    #[test]
    fn in_flight_map_is_reclaimable_only_after_timeout() {
        let mut l = ledger(&["a.txt"], 1);
        let t0 = Instant::now();
        assert!(l.next_unassigned_or_expired_map(t0).is_some());

        assert_eq!(l.next_unassigned_or_expired_map(t0 + TIMEOUT - Duration::from_millis(1)), None);
        assert_eq!(l.next_unassigned_or_expired_map(t0 + TIMEOUT), None);

        let t1 = t0 + TIMEOUT + Duration::from_millis(1);
        assert_eq!(l.next_unassigned_or_expired_map(t1).as_deref(), Some("a.txt"));
        // The deadline restarts from the reassignment.
        assert_eq!(l.next_unassigned_or_expired_map(t1 + TIMEOUT), None);
        assert_eq!(l.map_state("a.txt"), Some(&TaskState::InFlight { since: t1 }));
    }

    #[test]
    fn done_maps_are_never_reclaimed() {
        let mut l = ledger(&["a.txt"], 1);
        let t0 = Instant::now();
        l.next_unassigned_or_expired_map(t0);
        assert!(l.record_map_done("a.txt", "mr-out-0"));
        assert_eq!(l.next_unassigned_or_expired_map(t0 + TIMEOUT * 5), None);
        assert!(l.all_maps_done());
    }

    #[test]
    fn duplicate_map_reports_keep_the_latest_prefix() {
        let mut l = ledger(&["a.txt", "b.txt"], 1);
        let now = Instant::now();
        l.next_unassigned_or_expired_map(now);
        l.next_unassigned_or_expired_map(now);

        assert!(l.record_map_done("a.txt", "mr-out-0"));
        assert!(!l.all_maps_done());
        assert!(l.record_map_done("a.txt", "mr-out-2"));
        assert!(!l.all_maps_done());
        assert_eq!(l.map_state("a.txt").and_then(TaskState::output), Some("mr-out-2"));

        assert!(l.record_map_done("b.txt", "mr-out-1"));
        assert!(l.all_maps_done());
        assert!(l.record_map_done("b.txt", "mr-out-1"));
        assert!(l.all_maps_done());
    }

    #[test]
    fn unknown_reports_are_ignored() {
        let mut l = ledger(&["a.txt"], 2);
        assert!(!l.record_map_done("nope.txt", "mr-out-9"));
        assert!(!l.record_reduce_done(0, "mr-out-0"));
        l.record_map_done("a.txt", "mr-out-0");
        l.ensure_reduce_phase();
        assert!(!l.record_reduce_done(2, "mr-out-2"));
        assert_eq!(l.snapshot(1).reduces.done, 0);
    }

    #[test]
    fn reduce_phase_waits_for_every_map() {
        let mut l = ledger(&["a.txt", "b.txt"], 3);
        let now = Instant::now();
        l.next_unassigned_or_expired_map(now);
        l.record_map_done("a.txt", "mr-out-0");

        assert!(!l.ensure_reduce_phase());
        assert_eq!(l.next_unassigned_or_expired_reduce(now), None);
        assert_eq!(l.phase(), Phase::Mapping);

        l.record_map_done("b.txt", "mr-out-1");
        assert!(l.ensure_reduce_phase());
        assert!(!l.ensure_reduce_phase());
        assert_eq!(l.phase(), Phase::Reducing);
        assert_eq!(l.reduce_inputs(), ["mr-out-0", "mr-out-1"]);

        // A late duplicate does not disturb the frozen inputs.
        l.record_map_done("a.txt", "mr-out-5");
        assert_eq!(l.reduce_inputs(), ["mr-out-0", "mr-out-1"]);

        let claimed: Vec<u32> = std::iter::from_fn(|| l.next_unassigned_or_expired_reduce(now)).collect();
        assert_eq!(claimed, vec![0, 1, 2]);
    }

    #[test]
    fn reduce_timeout_and_completion() {
        let mut l = ledger(&[], 2);
        assert!(l.all_maps_done());
        assert!(l.ensure_reduce_phase());
        assert!(l.reduce_inputs().is_empty());

        let t0 = Instant::now();
        assert_eq!(l.next_unassigned_or_expired_reduce(t0), Some(0));
        assert_eq!(l.next_unassigned_or_expired_reduce(t0), Some(1));
        assert_eq!(l.next_unassigned_or_expired_reduce(t0 + TIMEOUT), None);
        assert_eq!(
            l.next_unassigned_or_expired_reduce(t0 + TIMEOUT + Duration::from_millis(1)),
            Some(0)
        );

        assert!(!l.mark_complete());
        assert!(l.record_reduce_done(0, "mr-out-0"));
        assert!(l.record_reduce_done(1, "mr-out-1"));
        assert!(l.record_reduce_done(1, "mr-out-1"));
        assert!(l.all_reduces_done());
        assert!(l.mark_complete());
        assert!(l.mark_complete());
        assert_eq!(l.phase(), Phase::Complete);
        assert_eq!(l.reduce_state(1).and_then(TaskState::output), Some("mr-out-1"));
    }

    #[test]
    fn snapshot_counts_states() {
        let mut l = ledger(&["a", "b", "c"], 2);
        let now = Instant::now();
        l.next_unassigned_or_expired_map(now);
        l.next_unassigned_or_expired_map(now);
        l.record_map_done("a", "mr-out-0");

        let snap = l.snapshot(2);
        assert_eq!(snap.phase, Phase::Mapping);
        assert_eq!(
            snap.maps,
            TaskCounts {
                unstarted: 1,
                in_flight: 1,
                done: 1
            }
        );
        assert_eq!(snap.reduces, TaskCounts::default());
        assert_eq!(snap.reduce_count, 2);
        assert!(!snap.complete);
    }
}

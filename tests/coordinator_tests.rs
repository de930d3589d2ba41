//! Coordinator behavior under concurrency and over the wire.


use std::collections::HashSet;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mrsched::config::{CoordinatorConfig, WorkerConfig};
use mrsched::coordinator::CoordinatorService;
use mrsched::ledger::Phase;
use mrsched::rpc::{Assignment, RemoteCoordinator};
use mrsched::storage::{BlobStore, MemoryStore};
use mrsched::worker::Worker;
use mrsched::{workload, Error};
use test_harness::TestJob;

/// Calls `next_assignment` from `threads` threads, `calls` times each.
fn hammer(service: &CoordinatorService, threads: usize, calls: usize) -> Vec<Assignment> {
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let service = service.clone();
            thread::spawn(move || (0..calls).map(|_| service.next_assignment()).collect::<Vec<_>>())
        })
        .collect();
    handles
        .into_iter()
        .flat_map(|h| h.join().expect("caller thread"))
        .collect()
}

#[test]
fn concurrent_callers_never_share_a_task() {
    let files: Vec<String> = (0..20).map(|i| format!("in-{i}.txt")).collect();
    let config = CoordinatorConfig {
        reduce_count: 7,
        ..Default::default()
    };
    let service = CoordinatorService::new(files.clone(), &config).unwrap();

    let mut claimed_files = HashSet::new();
    let mut map_ids = HashSet::new();
    for assignment in hammer(&service, 8, 10) {
        match assignment {
            Assignment::Map(m) => {
                assert!(claimed_files.insert(m.file_name.clone()), "{} claimed twice", m.file_name);
                assert!(map_ids.insert(m.map_task_id));
                service.record_map_done(&m.file_name, &format!("mr-out-{}", m.map_task_id));
            }
            Assignment::Wait => {}
            other => panic!("no reduce or done before every map reported: {other:?}"),
        }
    }
    assert_eq!(claimed_files, files.into_iter().collect::<HashSet<_>>());

    let mut partitions = HashSet::new();
    for assignment in hammer(&service, 8, 4) {
        match assignment {
            Assignment::Reduce(r) => {
                assert_eq!(r.map_output_prefixes.len(), 20);
                assert!(partitions.insert(r.partition_index), "partition {} claimed twice", r.partition_index);
            }
            Assignment::Wait => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(partitions, (0..7).collect::<HashSet<_>>());
    assert!(!service.is_job_complete());
}

#[test]
fn barrier_holds_while_reports_race_fetches() {
    let files: Vec<String> = (0..20).map(|i| format!("in-{i}.txt")).collect();
    let config = CoordinatorConfig {
        reduce_count: 7,
        ..Default::default()
    };
    let service = CoordinatorService::new(files, &config).unwrap();

    let mut claimed = Vec::new();
    while let Assignment::Map(m) = service.next_assignment() {
        claimed.push(m);
    }
    assert_eq!(claimed.len(), 20);

    // Bumped before each report, so it can only run ahead of the ledger.
    let reports_started = Arc::new(AtomicUsize::new(0));
    let reduces_claimed = Arc::new(AtomicUsize::new(0));

    let fetchers: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let reports_started = Arc::clone(&reports_started);
            let reduces_claimed = Arc::clone(&reduces_claimed);
            thread::spawn(move || {
                let mut partitions = Vec::new();
                while reduces_claimed.load(Ordering::SeqCst) < 7 {
                    match service.next_assignment() {
                        Assignment::Reduce(r) => {
                            reduces_claimed.fetch_add(1, Ordering::SeqCst);
                            partitions.push(r.partition_index);
                            assert_eq!(
                                reports_started.load(Ordering::SeqCst),
                                20,
                                "reduce handed out before every map was reported"
                            );
                            assert_eq!(r.map_output_prefixes.len(), 20);
                        }
                        Assignment::Wait => thread::yield_now(),
                        other => panic!("unexpected {other:?}"),
                    }
                }
                partitions
            })
        })
        .collect();

    let reporters: Vec<_> = claimed
        .chunks(5)
        .map(|chunk| {
            let service = service.clone();
            let reports_started = Arc::clone(&reports_started);
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                for m in chunk {
                    thread::sleep(Duration::from_millis(1));
                    reports_started.fetch_add(1, Ordering::SeqCst);
                    service.record_map_done(&m.file_name, &format!("mr-out-{}", m.map_task_id));
                }
            })
        })
        .collect();

    for r in reporters {
        r.join().expect("reporter thread");
    }
    let mut partitions: Vec<u32> = fetchers
        .into_iter()
        .flat_map(|f| f.join().expect("fetcher thread"))
        .collect();
    partitions.sort_unstable();
    assert_eq!(partitions, (0..7).collect::<Vec<_>>());
}

#[test]
fn completion_flag_is_visible_to_every_observer() {
    let config = CoordinatorConfig {
        reduce_count: 1,
        ..Default::default()
    };
    let service = CoordinatorService::new(["only.txt"], &config).unwrap();
    let observer = Arc::new(service.clone());

    let Assignment::Map(m) = service.next_assignment() else {
        panic!("expected a map task");
    };
    service.record_map_done(&m.file_name, "mr-out-0");
    let Assignment::Reduce(r) = service.next_assignment() else {
        panic!("expected a reduce task");
    };
    assert!(!observer.is_job_complete());
    service.record_reduce_done(r.partition_index, "mr-out-0");

    let watchers: Vec<_> = (0..4)
        .map(|_| {
            let observer = Arc::clone(&observer);
            thread::spawn(move || observer.is_job_complete())
        })
        .collect();
    for w in watchers {
        assert!(w.join().unwrap());
    }
    assert_eq!(service.snapshot().phase, Phase::Complete);
}

#[tokio::test]
async fn latest_map_report_wins_over_the_wire() {
    let job = TestJob::start(&[("a.txt", ""), ("b.txt", "")], 2, Duration::from_secs(10)).await;
    let mut client = RemoteCoordinator::connect(job.worker_config().endpoint())
        .await
        .unwrap();

    let mut files = Vec::new();
    for _ in 0..2 {
        match client.fetch_task().await.unwrap() {
            Assignment::Map(m) => files.push(m.file_name),
            other => panic!("expected a map task, got {other:?}"),
        }
    }
    assert_eq!(client.fetch_task().await.unwrap(), Assignment::Wait);

    client.report_map_done("a.txt", "mr-out-7").await.unwrap();
    client.report_map_done("a.txt", "mr-out-9").await.unwrap();
    // Reports for files the job never had are dropped.
    client.report_map_done("nope.txt", "mr-out-3").await.unwrap();
    assert_eq!(client.fetch_task().await.unwrap(), Assignment::Wait);
    client.report_map_done("b.txt", "mr-out-1").await.unwrap();

    let Assignment::Reduce(r) = client.fetch_task().await.unwrap() else {
        panic!("expected a reduce task");
    };
    assert_eq!(r.partition_index, 0);
    assert_eq!(r.map_output_prefixes, vec!["mr-out-9".to_string(), "mr-out-1".to_string()]);

    // Too late to change what reducers read.
    client.report_map_done("a.txt", "mr-out-11").await.unwrap();
    let Assignment::Reduce(r) = client.fetch_task().await.unwrap() else {
        panic!("expected a reduce task");
    };
    assert_eq!(r.partition_index, 1);
    assert_eq!(r.map_output_prefixes, vec!["mr-out-9".to_string(), "mr-out-1".to_string()]);

    job.shutdown().await;
}

#[tokio::test]
async fn reduce_reports_are_idempotent_and_unknown_ones_ignored() {
    let job = TestJob::start(&[], 2, Duration::from_secs(10)).await;
    let mut client = RemoteCoordinator::connect(job.worker_config().endpoint())
        .await
        .unwrap();

    client.report_reduce_done(99, "mr-out-99").await.unwrap();
    assert!(matches!(client.fetch_task().await.unwrap(), Assignment::Reduce(_)));
    assert!(matches!(client.fetch_task().await.unwrap(), Assignment::Reduce(_)));
    client.report_reduce_done(99, "mr-out-99").await.unwrap();

    client.report_reduce_done(0, "mr-out-0").await.unwrap();
    client.report_reduce_done(0, "mr-out-0").await.unwrap();
    assert_eq!(client.fetch_task().await.unwrap(), Assignment::Wait);
    assert!(!job.service.is_job_complete());

    client.report_reduce_done(1, "mr-out-1").await.unwrap();
    assert!(job.service.is_job_complete());
    assert_eq!(client.fetch_task().await.unwrap(), Assignment::JobDone);

    job.shutdown().await;
}

#[tokio::test]
async fn job_status_over_grpc() {
    let job = TestJob::start(&[("a.txt", "x"), ("b.txt", "y")], 3, Duration::from_secs(10)).await;
    let mut client = RemoteCoordinator::connect(job.worker_config().endpoint())
        .await
        .unwrap();

    let status = client.job_status().await.unwrap();
    assert_eq!(status.phase, Phase::Mapping);
    assert_eq!(status.maps.unstarted, 2);
    assert_eq!(status.reduces.unstarted + status.reduces.in_flight + status.reduces.done, 0);
    assert_eq!(status.reduce_count, 3);

    client.fetch_task().await.unwrap();
    let status = client.job_status().await.unwrap();
    assert_eq!((status.maps.unstarted, status.maps.in_flight), (1, 1));
    assert_eq!(status.map_tasks_issued, 1);
    assert!(!status.complete);
    assert_eq!(status, job.service.snapshot());

    job.shutdown().await;
}

#[tokio::test]
async fn worker_fails_when_coordinator_is_unreachable() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let store: Arc<dyn BlobStore> = Arc::new(MemoryStore::new());
    let wc = workload::named("wc").unwrap();

    let Err(err) = Worker::connect(WorkerConfig::new(addr.to_string()), store, wc).await else {
        panic!("connected to a closed port");
    };
    assert!(matches!(err, Error::Transport(_)));
    assert!(err.is_transport());
}

#[tokio::test]
async fn worker_stops_when_coordinator_goes_away() {
    let job = TestJob::start(&[("a.txt", "x")], 1, Duration::from_secs(10)).await;
    let mut hog = RemoteCoordinator::connect(job.worker_config().endpoint())
        .await
        .unwrap();
    // Keeps the only map in flight so the worker can do nothing but wait.
    assert!(matches!(hog.fetch_task().await.unwrap(), Assignment::Map(_)));

    let store: Arc<dyn BlobStore> = job.store.clone();
    let worker = Worker::connect(job.worker_config(), store, workload::named("wc").unwrap())
        .await
        .unwrap();
    let handle = tokio::spawn(worker.run());
    tokio::time::sleep(Duration::from_millis(100)).await;
    job.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("worker noticed the coordinator is gone")
        .unwrap();
    assert!(result.unwrap_err().is_transport());
}

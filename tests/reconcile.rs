//! Reconciler passes and health-monitor eviction

mod common;

use common::*;
use minidfs::coordinator::{GateMode, HealthMonitor, NodeHandle, Orchestrator};
use std::sync::Arc;
use std::time::Duration;

fn cluster(orch: &Orchestrator, ids: &[&str], log: &CallLog) -> Vec<Arc<FakeNode>> {
    let nodes: Vec<Arc<FakeNode>> = ids.iter().map(|id| FakeNode::new(id, log)).collect();
    link(&nodes);
    for node in &nodes {
        let handle: Arc<dyn NodeHandle> = node.clone();
        orch.add_node_handle(&node.id, handle).unwrap();
    }
    nodes
}

#[tokio::test]
async fn test_create_replicate_delete_purge() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B", "C"], &log);
    let reconciler = reconciler(&orch);
    let token = orch.login("man", "123").unwrap();
    let file = name("IT/report.txt");

    orch.create_file(&token, "127.0.0.1", 9000, &file).unwrap();
    assert!(eventually(|| orch.replicas().is_live(&file)).await);
    assert!(eventually(|| orch.gate().is_empty()).await);

    let report = reconciler.run_pass().await;
    assert_eq!(report.repaired, 1);
    assert!(nodes.iter().all(|n| n.has(&file)));
    // broadcasts are unacknowledged; only the creator is confirmed so far
    assert_eq!(orch.replicas().get(&file).unwrap().replicas.len(), 1);

    let report = reconciler.run_pass().await;
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.repaired, 0);
    assert_eq!(orch.replicas().get(&file).unwrap().replicas.len(), 3);

    // fully replicated: another pass has nothing to do
    let report = reconciler.run_pass().await;
    assert_eq!(report.confirmed, 0);
    assert_eq!(report.repaired, 0);
    assert_eq!(report.purged, 0);

    orch.delete_file(&token, &file).unwrap();
    assert!(eventually(|| !orch.replicas().is_live(&file)).await);
    assert!(eventually(|| orch.gate().is_empty()).await);
    // only one replica was deleted by the task itself
    assert_eq!(nodes.iter().filter(|n| n.has(&file)).count(), 2);

    let report = reconciler.run_pass().await;
    assert_eq!(report.purged, 1);
    assert!(nodes.iter().all(|n| !n.has(&file)));
    assert!(orch.replicas().get(&file).unwrap().replicas.is_empty());
    assert!(orch.list_department_files(&token, "IT").unwrap().is_empty());
}

#[tokio::test]
async fn test_tombstoned_name_can_be_created_again() {
    let log = CallLog::default();
    let orch = orchestrator();
    let _nodes = cluster(&orch, &["A"], &log);
    let reconciler = reconciler(&orch);
    let token = orch.login("man", "123").unwrap();
    let file = name("HR/cv.pdf");

    orch.create_file(&token, "127.0.0.1", 9000, &file).unwrap();
    assert!(eventually(|| orch.replicas().is_live(&file) && orch.gate().is_empty()).await);
    orch.delete_file(&token, &file).unwrap();
    assert!(eventually(|| !orch.replicas().is_live(&file) && orch.gate().is_empty()).await);
    reconciler.run_pass().await;

    orch.create_file(&token, "127.0.0.1", 9000, &file).unwrap();
    assert!(eventually(|| orch.replicas().is_live(&file)).await);
}

#[tokio::test]
async fn test_busy_files_skipped() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B"], &log);
    let file = name("QA/cases.txt");
    nodes[0].put(&file);
    orch.replicas().add_replica(&file, "A");

    let permit = orch.gate().try_acquire(&file, GateMode::Read).unwrap();
    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.skipped_busy, 1);
    assert!(!nodes[1].has(&file));
    drop(permit);

    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.repaired, 1);
    assert!(nodes[1].has(&file));
}

#[tokio::test]
async fn test_broadcast_falls_back_to_next_replica() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B", "C"], &log);
    let file = name("SALES/leads.csv");
    nodes[0].put(&file);
    nodes[1].put(&file);
    orch.replicas().add_replicas(&file, ["A", "B"]);
    nodes[0].set_behavior(Behavior::Fail);

    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.repaired, 1);
    assert!(nodes[2].has(&file));
    assert_eq!(*log.lock().unwrap(), vec!["sync:A", "sync:B"]);
}

#[tokio::test]
async fn test_replica_without_copy_is_dropped() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B"], &log);
    let file = name("SALES/q4.csv");
    // A is listed but lost its copy; B still has it
    nodes[1].put(&file);
    orch.replicas().add_replicas(&file, ["A", "B"]);

    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.repaired, 1);
    assert_eq!(*log.lock().unwrap(), vec!["sync:B"]);
    assert!(nodes[0].has(&file));

    reconciler(&orch).run_pass().await;
    assert_eq!(orch.replicas().get(&file).unwrap().replicas.len(), 2);
}

#[tokio::test]
async fn test_missed_broadcast_retried_every_pass() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B", "C"], &log);
    // C drops every datagram from A
    link(&nodes[..2]);
    let file = name("IT/x.txt");
    nodes[0].put(&file);
    orch.replicas().add_replica(&file, "A");
    let reconciler = reconciler(&orch);

    assert_eq!(reconciler.run_pass().await.repaired, 1);
    assert!(nodes[1].has(&file));
    assert!(!nodes[2].has(&file));

    // B is confirmed, C is still missing and gets another broadcast
    let report = reconciler.run_pass().await;
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.repaired, 1);
    let replicas: Vec<_> = orch.replicas().get(&file).unwrap().replicas.into_iter().collect();
    assert_eq!(replicas, vec!["A", "B"]);

    link(&nodes);
    assert_eq!(reconciler.run_pass().await.repaired, 1);
    assert!(nodes[2].has(&file));

    let report = reconciler.run_pass().await;
    assert_eq!(report.repaired, 0);
    assert_eq!(orch.replicas().get(&file).unwrap().replicas.len(), 3);
}

#[tokio::test]
async fn test_update_rebroadcast_replaces_stale_copies() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B"], &log);
    let file = name("IT/y.txt");
    nodes[0].put(&file);
    nodes[1].put(&file);
    orch.replicas().add_replicas(&file, ["A", "B"]);

    let token = orch.login("man", "123").unwrap();
    orch.update_file(&token, "127.0.0.1", 9000, &file).unwrap();
    assert!(eventually(|| nodes[0].content(&file).as_deref() != Some(ORIGINAL)).await);
    assert!(eventually(|| orch.gate().is_empty()).await);
    let replicas: Vec<_> = orch.replicas().get(&file).unwrap().replicas.into_iter().collect();
    assert_eq!(replicas, vec!["A"]);

    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.repaired, 1);
    assert_eq!(*log.lock().unwrap(), vec!["update:A", "sync:A"]);
    assert_eq!(nodes[1].content(&file), nodes[0].content(&file));

    reconciler(&orch).run_pass().await;
    assert_eq!(orch.replicas().get(&file).unwrap().replicas.len(), 2);
}

#[tokio::test]
async fn test_replica_on_evicted_node_counts_as_missing() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B"], &log);
    let file = name("IT/lonely.txt");
    nodes[0].put(&file);
    orch.replicas().add_replica(&file, "A");
    orch.nodes().evict("A");

    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.failed, 1);
    assert!(!nodes[1].has(&file));
    // the stale belief is kept; the file stays listed
    assert!(orch.replicas().is_live(&file));
}

#[tokio::test]
async fn test_manager_trigger_runs_pass() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B"], &log);
    let file = name("GRAPHICS/banner.svg");
    nodes[0].put(&file);
    orch.replicas().add_replica(&file, "A");

    let token = orch.login("man", "123").unwrap();
    assert!(orch.trigger_sync(&token).unwrap());
    assert!(eventually(|| nodes[1].has(&file)).await);
}

#[tokio::test]
async fn test_failed_probe_evicts_atomically() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B", "C", "D"], &log);
    orch.nodes().adjust_load("B", 3);
    nodes[1].set_ping(PingBehavior::Fail);
    nodes[2].set_ping(PingBehavior::SaysFalse);
    nodes[3].set_ping(PingBehavior::Hang);

    let monitor = HealthMonitor::new(
        orch.nodes().clone(),
        orch.replicas().clone(),
        Duration::from_secs(60),
        Duration::from_millis(50),
    );
    let evicted = monitor.check_all().await;
    assert_eq!(evicted, vec!["B", "D"]);

    let registry = orch.nodes();
    for gone in ["B", "D"] {
        assert!(!registry.contains(gone));
        assert!(!registry.is_alive(gone));
        assert_eq!(registry.load_of(gone), None);
    }
    // a false answer is not a fault
    assert!(registry.is_alive("C"));
    assert_eq!(registry.node_ids(), vec!["A", "C"]);

    let ranked: Vec<String> = registry
        .rank_by_load(&["A", "B", "C", "D"])
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ranked, vec!["A", "C"]);
}

#[tokio::test]
async fn test_evicted_node_rejoins_without_stale_replicas() {
    let log = CallLog::default();
    let orch = orchestrator();
    let nodes = cluster(&orch, &["A", "B"], &log);
    let shared = name("HR/handbook.pdf");
    let lonely = name("HR/draft.txt");
    for node in &nodes {
        node.put(&shared);
    }
    orch.replicas().add_replicas(&shared, ["A", "B"]);
    nodes[1].put(&lonely);
    orch.replicas().add_replica(&lonely, "B");

    nodes[1].set_ping(PingBehavior::Fail);
    let monitor = HealthMonitor::new(
        orch.nodes().clone(),
        orch.replicas().clone(),
        Duration::from_secs(60),
        Duration::from_millis(50),
    );
    assert_eq!(monitor.check_all().await, vec!["B"]);
    let replicas: Vec<_> = orch.replicas().get(&shared).unwrap().replicas.into_iter().collect();
    assert_eq!(replicas, vec!["A"]);
    // sole holder: kept, so the file is not tombstoned by an outage
    assert!(orch.replicas().is_live(&lonely));

    // B comes back with a wiped disk
    nodes[1].lose(&shared);
    nodes[1].lose(&lonely);
    nodes[1].set_ping(PingBehavior::Up);
    let handle: Arc<dyn NodeHandle> = nodes[1].clone();
    orch.add_node_handle("B", handle).unwrap();

    let report = reconciler(&orch).run_pass().await;
    assert_eq!(report.repaired, 1);
    assert_eq!(report.failed, 1);
    assert!(nodes[1].has(&shared));
    assert_eq!(*log.lock().unwrap(), vec!["sync:A"]);
}

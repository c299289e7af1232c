//! End-to-end: real node servers over loopback HTTP, TCP and UDP

mod common;

use common::*;
use minidfs::common::FullName;
use minidfs::node::http::{create_router, NodeState};
use minidfs::node::replication::{Broadcaster, Receiver};
use minidfs::node::{Storage, TransferEndpoint};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};

struct TestNode {
    url: String,
    storage: Arc<Storage>,
}

impl TestNode {
    fn read(&self, name: &FullName) -> Option<Vec<u8>> {
        std::fs::read(self.storage.path_for(name)).ok()
    }
}

/// Start a node whose broadcasts go to `peer` (unicast stands in for the group)
async fn start_node(
    id: &str,
    dir: &TempDir,
    inbox: UdpSocket,
    peer: SocketAddr,
) -> TestNode {
    let storage = Arc::new(Storage::open(dir.path().join(id)).unwrap());
    tokio::spawn(Receiver::new(id.to_string(), storage.clone()).run(inbox));

    let broadcaster = Broadcaster::bind(
        id.to_string(),
        storage.clone(),
        peer,
        256,
        Duration::from_millis(1),
    )
    .await
    .unwrap();
    let router = create_router(NodeState {
        node_id: id.to_string(),
        storage: storage.clone(),
        transfer: Arc::new(TransferEndpoint::new(storage.clone(), Duration::from_secs(2))),
        broadcaster: Arc::new(broadcaster),
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestNode { url, storage }
}

async fn two_nodes(dir: &TempDir) -> (TestNode, TestNode) {
    let inbox1 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let inbox2 = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr1 = inbox1.local_addr().unwrap();
    let addr2 = inbox2.local_addr().unwrap();
    let n1 = start_node("n1", dir, inbox1, addr2).await;
    let n2 = start_node("n2", dir, inbox2, addr1).await;
    (n1, n2)
}

/// Play the client side of an upload: accept the node's dial and send `bytes`
async fn upload(listener: TcpListener, bytes: Vec<u8>) {
    let (mut sock, _) = listener.accept().await.unwrap();
    sock.write_all(&bytes).await.unwrap();
    sock.shutdown().await.unwrap();
}

async fn download(listener: TcpListener) -> Vec<u8> {
    let (mut sock, _) = listener.accept().await.unwrap();
    let mut out = Vec::new();
    sock.read_to_end(&mut out).await.unwrap();
    out
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_lifecycle_across_nodes() {
    let dir = TempDir::new().unwrap();
    let (n1, n2) = two_nodes(&dir).await;

    let orch = orchestrator();
    orch.add_node("n1", &n1.url).unwrap();
    orch.add_node("n2", &n2.url).unwrap();
    let reconciler = reconciler(&orch);
    let token = orch.login("man", "123").unwrap();

    let file = name("IT/report.txt");
    let content: Vec<u8> = (0..5_000u32).map(|i| (i % 251) as u8).collect();

    // create: the client listens, the least-loaded node (n1, registered first) dials in
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(orch.create_file(&token, "127.0.0.1", port, &file).unwrap());
    upload(listener, content.clone()).await;

    assert!(eventually(|| orch.replicas().is_live(&file)).await);
    assert_eq!(orch.list_department_files(&token, "IT").unwrap(), vec!["report.txt"]);
    assert_eq!(n1.read(&file).unwrap(), content);
    assert!(n2.read(&file).is_none());

    // reconcile: n1 broadcasts its copy to n2
    assert!(eventually(|| orch.gate().is_empty()).await);
    let report = reconciler.run_pass().await;
    assert_eq!(report.repaired, 1);
    assert!(eventually(|| n2.read(&file).as_deref() == Some(&content[..])).await);

    // the next pass sees a matching digest on n2 and records it
    let report = reconciler.run_pass().await;
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.repaired, 0);
    assert_eq!(orch.replicas().get(&file).unwrap().replicas.len(), 2);

    // get: whichever node is chosen streams the same bytes back
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    assert!(orch.get_file(&token, "127.0.0.1", port, "report.txt", "IT").unwrap());
    assert_eq!(download(listener).await, content);

    // delete, then purge everywhere
    assert!(eventually(|| orch.gate().is_empty()).await);
    assert!(orch.delete_file(&token, &file).unwrap());
    assert!(eventually(|| !orch.replicas().is_live(&file) && orch.gate().is_empty()).await);
    reconciler.run_pass().await;
    assert!(n1.read(&file).is_none());
    assert!(n2.read(&file).is_none());
    assert!(orch.replicas().get(&file).unwrap().replicas.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_replaces_content() {
    let dir = TempDir::new().unwrap();
    let (n1, _n2) = two_nodes(&dir).await;

    let orch = orchestrator();
    orch.add_node("n1", &n1.url).unwrap();
    let token = orch.login("man", "123").unwrap();
    let file = name("HR/policy.txt");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    orch.create_file(&token, "127.0.0.1", port, &file).unwrap();
    upload(listener, b"version one".to_vec()).await;
    assert!(eventually(|| orch.replicas().is_live(&file) && orch.gate().is_empty()).await);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    orch.update_file(&token, "127.0.0.1", port, &file).unwrap();
    upload(listener, b"v2".to_vec()).await;

    assert!(eventually(|| n1.read(&file).as_deref() == Some(&b"v2"[..])).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_node_evicted_and_skipped() {
    let dir = TempDir::new().unwrap();
    let (n1, _n2) = two_nodes(&dir).await;

    // a registered node nobody is listening for
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_url = format!("http://{}", dead.local_addr().unwrap());
    drop(dead);

    let orch = orchestrator();
    orch.add_node("ghost", &dead_url).unwrap();
    orch.add_node("n1", &n1.url).unwrap();
    let token = orch.login("man", "123").unwrap();

    // ghost ranks first and fails; n1 serves
    let file = name("QA/smoke.txt");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    orch.create_file(&token, "127.0.0.1", port, &file).unwrap();
    upload(listener, b"ok".to_vec()).await;
    assert!(eventually(|| orch.replicas().is_live(&file)).await);
    assert_eq!(n1.read(&file).unwrap(), b"ok");

    let monitor = minidfs::coordinator::HealthMonitor::new(
        orch.nodes().clone(),
        orch.replicas().clone(),
        Duration::from_secs(60),
        Duration::from_secs(1),
    );
    assert_eq!(monitor.check_all().await, vec!["ghost"]);
    assert_eq!(orch.nodes().node_ids(), vec!["n1"]);
}

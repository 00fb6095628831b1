//! End-to-end exercises of a single running node through its collaborator
//! handle

use std::time::{Duration, Instant};

use common::types::{NodeId, TaskStatus};
use config::NodeConfig;
use fabric_node::FabricNode;

/// The deterministic node id the test node runs under
const TEST_NODE_ID: NodeId = NodeId(0x42);

/// A config bound to high loopback-only ports so the test cannot disturb,
/// or be disturbed by, a real fabric
fn test_config() -> NodeConfig {
    NodeConfig {
        node_id: Some(TEST_NODE_ID),
        discovery_port: 28881,
        data_port: 28882,
        broadcast_interval: Duration::from_secs(1),
        broadcast_addrs: vec!["127.0.0.1".to_string()],
        ..Default::default()
    }
}

/// Poll until the condition holds or the deadline passes
fn wait_for(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Drives a full submit/run/complete cycle plus the memory and lock paths
/// on a live node
#[test]
fn test_single_node_end_to_end() {
    let node = FabricNode::start(&test_config()).expect("node failed to start");
    let handle = node.handle();
    assert_eq!(handle.node_id(), TEST_NODE_ID);

    // --- submit path --- //

    let task_id = handle.submit("task-a", 5, Vec::new()).unwrap();
    assert_eq!(task_id, 1);

    let record = handle.task(task_id).unwrap();
    assert_eq!(record.status, TaskStatus::Assigned);
    assert_eq!(record.assigned_node, TEST_NODE_ID);

    handle.mark_running(task_id).unwrap();
    assert!(wait_for(
        || handle.task(task_id).map(|t| t.status == TaskStatus::Running).unwrap_or(false),
        Duration::from_secs(2),
    ));

    handle.complete(task_id, 0, b"ok".to_vec()).unwrap();
    assert!(wait_for(
        || handle.task(task_id).map(|t| t.status == TaskStatus::Completed).unwrap_or(false),
        Duration::from_secs(2),
    ));

    let record = handle.task(task_id).unwrap();
    assert!(record.completed_at > 0);
    assert_eq!(record.result, b"ok");

    // The local node executed its own task; its reputation moved up
    let local = handle.peers().into_iter().find(|p| p.is_local).unwrap();
    assert!(local.reputation > 0.5 && local.reputation <= 1.0);

    let (assigned, completed, failed, migrated) = handle.counters();
    assert_eq!((assigned, completed, failed, migrated), (1, 1, 0, 0));

    // --- shared memory path --- //

    let block = handle.allocate(256).unwrap();
    handle.write(block, b"shared", 16).unwrap();

    let mut buf = [0u8; 6];
    handle.read(block, &mut buf, 16).unwrap();
    assert_eq!(&buf, b"shared");

    handle.record_replica(block, NodeId(7)).unwrap();
    let meta = handle.block_meta(block).unwrap();
    assert_eq!(meta.version, 2);
    assert!(meta.is_replicated());

    assert_eq!(handle.release(block).unwrap(), 0);
    assert!(handle.block_meta(block).is_err());

    // --- lock path --- //

    let lock = handle.create_or_get("db").unwrap();
    assert_eq!(handle.create_or_get("db").unwrap(), lock);

    handle.acquire(lock, task_id, 100).unwrap();
    assert!(handle.lock_info(lock).unwrap().is_locked());
    handle.release_lock(lock).unwrap();
    assert!(!handle.lock_info(lock).unwrap().is_locked());

    node.shutdown();
}

/// Starting a second node on occupied ports must fail initialization rather
/// than limp along
#[test]
fn test_port_conflict_fails_init() {
    let mut config = test_config();
    config.discovery_port = 28891;
    config.data_port = 28892;

    let node = FabricNode::start(&config).expect("node failed to start");
    assert!(FabricNode::start(&config).is_err());
    node.shutdown();
}

//! Reconciliation after a scheduler restart.
//!
//! A node launched before the restart is reloaded with its task id but
//! without confirmation from the cluster manager. Once the framework
//! registers, the reconciliation server must ask about the task until a
//! status update arrives, and then stop asking.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{master, test_config, MockDriver};
use riakgrid_core::{SchedulerEvent, TaskState, TaskStatus};
use riakgrid_scheduler::{ReconciliationServer, SchedulerCore};
use riakgrid_state::{
    MemoryCoordination, NodeAsk, RiakCluster, RiakNode, SchedulerState, StateStorage,
};
use tokio::sync::watch;

/// Persist a state with one launched node, as a previous scheduler run
/// would have left it. Returns the storage and the live task id.
async fn seed_previous_run() -> (StateStorage, String) {
    let storage = StateStorage::new(Arc::new(MemoryCoordination::new()), "riakgrid-test");

    let mut node = RiakNode::new("golden", NodeAsk::default());
    let task_id = node.prepare_for_launch("worker-1", "host-1");
    let mut cluster = RiakCluster::new("golden");
    cluster.add_node(node);

    let mut state = SchedulerState {
        framework_id: Some("fw-1".to_string()),
        ..Default::default()
    };
    state.clusters.insert("golden".to_string(), cluster);
    storage.persist(&state).await.unwrap();

    (storage, task_id)
}

#[tokio::test]
async fn restart_reconciles_until_status_arrives() {
    let (storage, task_id) = seed_previous_run().await;

    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage, test_config())
        .await
        .unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = ReconciliationServer::spawn(
        core.clone(),
        driver.clone(),
        Duration::from_millis(50),
        shutdown_rx,
    );

    // Nothing is asked before registration enables reconciliation.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(driver.reconciles.lock().unwrap().is_empty());

    core.handle_event(SchedulerEvent::Registered {
        framework_id: "fw-1".to_string(),
        master: master(),
    })
    .await;

    // An explicit reconciliation request for the reloaded task shows up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    {
        let asked = driver.reconciles.lock().unwrap();
        assert!(!asked.is_empty(), "no reconciliation request emitted");
        assert!(asked
            .iter()
            .flatten()
            .any(|status| status.task_id == task_id));
    }

    // The authoritative answer flips the node to reconciled.
    core.handle_event(SchedulerEvent::StatusUpdate(TaskStatus::new(
        task_id.clone(),
        TaskState::Running,
    )))
    .await;

    let cluster = core.get_cluster("golden").await.unwrap();
    let node = cluster.nodes.values().next().unwrap();
    assert!(node.reconciled);
    assert_eq!(node.status, riakgrid_state::NodeStatus::Running);

    // No further requests once reconciled.
    driver.reconciles.lock().unwrap().clear();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(driver.reconciles.lock().unwrap().is_empty());

    let _ = shutdown_tx.send(true);
    let _ = server.await;
}

#[tokio::test]
async fn reask_is_rate_limited_per_node() {
    let (storage, _task_id) = seed_previous_run().await;

    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage, test_config())
        .await
        .unwrap();

    core.handle_event(SchedulerEvent::Registered {
        framework_id: "fw-1".to_string(),
        master: master(),
    })
    .await;

    // Two immediate polls: the second falls inside the re-ask window.
    let first = core.tasks_to_reconcile().await;
    assert_eq!(first.len(), 1);
    let second = core.tasks_to_reconcile().await;
    assert!(second.is_empty());
}

#[tokio::test]
async fn reregistration_reenables_reconciliation() {
    let (storage, task_id) = seed_previous_run().await;

    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage, test_config())
        .await
        .unwrap();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let _server = ReconciliationServer::spawn(
        core.clone(),
        driver.clone(),
        Duration::from_millis(50),
        shutdown_rx,
    );

    core.handle_event(SchedulerEvent::Disconnected).await;
    core.handle_event(SchedulerEvent::Reregistered { master: master() })
        .await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let asked = driver.reconciles.lock().unwrap();
    assert!(asked
        .iter()
        .flatten()
        .any(|status| status.task_id == task_id));
}

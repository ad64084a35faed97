//! Offer handling end to end: placement, launch dispatch, status routing.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{master, test_config, MockDriver};
use riakgrid_core::{
    ranges_to_array, scalar_sum, Offer, Resource, SchedulerEvent, TaskData, TaskState, TaskStatus,
};
use riakgrid_scheduler::SchedulerCore;
use riakgrid_state::{MemoryCoordination, NodeAsk, NodeStatus, StateStorage};

fn storage() -> StateStorage {
    StateStorage::new(Arc::new(MemoryCoordination::new()), "riakgrid-test")
}

fn offer(id: &str, cpus: f64, mem: f64, disk: f64, ports: (u64, u64)) -> Offer {
    Offer {
        id: id.to_string(),
        worker_id: format!("worker-{id}"),
        hostname: format!("host-{id}"),
        resources: vec![
            Resource::scalar("cpus", cpus),
            Resource::scalar("mem", mem),
            Resource::scalar("disk", disk),
            Resource::ranges("ports", vec![ports]),
        ],
    }
}

async fn settle() {
    // Launch dispatch happens on detached tasks.
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn two_nodes_launch_from_one_offer() {
    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage(), test_config())
        .await
        .unwrap();

    core.add_cluster("golden").await.unwrap();
    core.add_node("golden", NodeAsk::default()).await.unwrap();
    core.add_node("golden", NodeAsk::default()).await.unwrap();

    core.handle_event(SchedulerEvent::ResourceOffers(vec![offer(
        "o-1", 4.0, 2048.0, 4096.0, (31000, 31099),
    )]))
    .await;
    settle().await;

    let tasks = driver.launched_tasks();
    assert_eq!(tasks.len(), 2);
    for task in &tasks {
        assert_eq!(scalar_sum(&task.resources, "cpus"), 1.0);
        assert_eq!(scalar_sum(&task.executor.resources, "cpus"), 0.1);
        let ports = task
            .resources
            .iter()
            .find(|r| r.name == "ports")
            .and_then(|r| r.as_ranges())
            .map(ranges_to_array)
            .unwrap();
        assert_eq!(ports.len(), 4);

        // The payload describes the placement.
        let data = TaskData::from_bytes(&task.data).unwrap();
        assert_eq!(data.cluster_name, "golden");
        assert!(data.node_name.ends_with("@host-o-1"));
        assert_eq!(data.framework_name, "riakgrid-test");
    }

    let cluster = core.get_cluster("golden").await.unwrap();
    assert!(cluster
        .nodes
        .values()
        .all(|n| n.status == NodeStatus::Launched));
}

#[tokio::test]
async fn unmatched_offers_are_declined_with_empty_launch() {
    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage(), test_config())
        .await
        .unwrap();

    core.handle_event(SchedulerEvent::ResourceOffers(vec![offer(
        "o-1", 4.0, 2048.0, 4096.0, (31000, 31099),
    )]))
    .await;
    settle().await;

    let launches = driver.launches.lock().unwrap();
    assert_eq!(launches.len(), 1);
    assert_eq!(launches[0].0, vec!["o-1".to_string()]);
    assert!(launches[0].1.is_empty());
}

#[tokio::test]
async fn insufficient_capacity_leaves_node_awaiting() {
    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage(), test_config())
        .await
        .unwrap();

    core.add_cluster("golden").await.unwrap();
    core.add_node(
        "golden",
        NodeAsk {
            cpus: 4.0,
            ..NodeAsk::default()
        },
    )
    .await
    .unwrap();

    core.handle_event(SchedulerEvent::ResourceOffers(vec![offer(
        "o-1", 2.0, 2048.0, 4096.0, (31000, 31099),
    )]))
    .await;
    settle().await;

    assert!(driver.launched_tasks().is_empty());
    let cluster = core.get_cluster("golden").await.unwrap();
    assert!(cluster
        .nodes
        .values()
        .all(|n| n.status == NodeStatus::AwaitingOffer));
}

#[tokio::test]
async fn status_updates_persist_through_the_storage() {
    let driver = MockDriver::arc();
    let storage = storage();
    let core = SchedulerCore::start(driver.clone(), storage.clone(), test_config())
        .await
        .unwrap();

    core.add_cluster("golden").await.unwrap();
    let node = core.add_node("golden", NodeAsk::default()).await.unwrap();

    core.handle_event(SchedulerEvent::ResourceOffers(vec![offer(
        "o-1", 4.0, 2048.0, 4096.0, (31000, 31099),
    )]))
    .await;
    settle().await;

    let task_id = driver.launched_tasks()[0].task_id.clone();
    core.handle_event(SchedulerEvent::StatusUpdate(TaskStatus::new(
        task_id.clone(),
        TaskState::Running,
    )))
    .await;

    // In-memory view.
    let cluster = core.get_cluster("golden").await.unwrap();
    assert_eq!(cluster.nodes[&node.uuid].status, NodeStatus::Running);

    // Durable view matches.
    let reloaded = storage.load().await.unwrap();
    assert_eq!(
        reloaded.clusters["golden"].nodes[&node.uuid].status,
        NodeStatus::Running
    );
    assert_eq!(
        reloaded.clusters["golden"].nodes[&node.uuid]
            .current_task_id
            .as_deref(),
        Some(task_id.as_str())
    );
}

#[tokio::test]
async fn terminal_failure_drops_binding_and_unknown_updates_are_ignored() {
    let driver = MockDriver::arc();
    let core = SchedulerCore::start(driver.clone(), storage(), test_config())
        .await
        .unwrap();

    core.add_cluster("golden").await.unwrap();
    let node = core.add_node("golden", NodeAsk::default()).await.unwrap();

    core.handle_event(SchedulerEvent::ResourceOffers(vec![offer(
        "o-1", 4.0, 2048.0, 4096.0, (31000, 31099),
    )]))
    .await;
    settle().await;

    let task_id = driver.launched_tasks()[0].task_id.clone();
    core.handle_event(SchedulerEvent::StatusUpdate(TaskStatus::new(
        task_id,
        TaskState::Failed,
    )))
    .await;

    let cluster = core.get_cluster("golden").await.unwrap();
    let failed = &cluster.nodes[&node.uuid];
    assert_eq!(failed.status, NodeStatus::Failed);
    assert!(failed.current_task_id.is_none());

    // A status for a task nobody knows is logged and dropped.
    core.handle_event(SchedulerEvent::StatusUpdate(TaskStatus::new(
        "no-such-task",
        TaskState::Running,
    )))
    .await;
    let cluster = core.get_cluster("golden").await.unwrap();
    assert_eq!(cluster.nodes[&node.uuid].status, NodeStatus::Failed);
}

#[tokio::test]
async fn registration_persists_the_framework_id() {
    let driver = MockDriver::arc();
    let storage = storage();
    let core = SchedulerCore::start(driver.clone(), storage.clone(), test_config())
        .await
        .unwrap();

    core.handle_event(SchedulerEvent::Registered {
        framework_id: "fw-77".to_string(),
        master: master(),
    })
    .await;

    assert_eq!(core.framework_id().await.as_deref(), Some("fw-77"));
    let reloaded = storage.load().await.unwrap();
    assert_eq!(reloaded.framework_id.as_deref(), Some("fw-77"));
}

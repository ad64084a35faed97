//! SchedulerCore — owns mutable framework state and handles driver events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use riakgrid_core::{
    CommandInfo, ExecutorInfo, Filters, FrameworkInfo, Offer, OfferId, SchedulerDriver,
    SchedulerEvent, TaskData, TaskId, TaskInfo, TaskStatus,
};
use riakgrid_placement::{spread_across_offers, NodeRequest};
use riakgrid_state::{NodeAsk, RelaunchPolicy, RiakCluster, RiakNode, SchedulerState, StateStorage};

use crate::error::{SchedulerError, SchedulerResult};

/// How long the manager withholds the unmatched remainder of an offer.
pub const OFFER_REFUSE_SECONDS: f64 = 5.0;

/// Minimum gap between explicit reconciliation requests for one node.
pub const RECONCILE_REASK: Duration = Duration::from_secs(5);

/// Static scheduler configuration, assembled from the CLI.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub framework_name: String,
    pub framework_role: String,
    pub user: Option<String>,
    pub principal: Option<String>,
    pub coordination_endpoints: Vec<String>,
    /// Base URL of the artifact server, advertised as the WebUI URL and
    /// embedded in executor fetch URIs.
    pub artifact_base_url: String,
}

impl SchedulerConfig {
    /// The registration info emitted to the cluster manager.
    pub fn framework_info(&self, framework_id: Option<String>) -> FrameworkInfo {
        let mut info = FrameworkInfo::new(
            &self.framework_name,
            &self.framework_role,
            self.user.clone(),
        );
        info.id = framework_id;
        info.webui_url = Some(self.artifact_base_url.clone());
        info.principal = self.principal.clone();
        info
    }
}

struct NodeRef {
    cluster: String,
    uuid: String,
}

struct Inner {
    state: SchedulerState,
    /// Task-id → owning node, for status routing (including tasks learned
    /// from a reloaded state that reconciliation has yet to confirm).
    task_index: HashMap<TaskId, NodeRef>,
    connected: bool,
}

/// The scheduler control plane.
///
/// One coarse mutex guards all mutable state; every event handler,
/// reconciliation tick, and admin mutation holds it for its full duration.
/// Driver launch calls are dispatched on detached tasks so the driver is
/// never re-entered under the lock.
pub struct SchedulerCore {
    inner: Mutex<Inner>,
    driver: Arc<dyn SchedulerDriver>,
    storage: StateStorage,
    config: SchedulerConfig,
    reconcile_enabled: watch::Sender<bool>,
}

impl SchedulerCore {
    /// Load persisted state and build the core.
    ///
    /// Nodes reloaded with a live task id come back unreconciled; the
    /// reconciliation server converges them with the manager's view once
    /// the framework (re)registers.
    pub async fn start(
        driver: Arc<dyn SchedulerDriver>,
        storage: StateStorage,
        config: SchedulerConfig,
    ) -> SchedulerResult<Arc<Self>> {
        let state = storage.load().await?;

        let mut task_index = HashMap::new();
        for node in state.nodes() {
            if let Some(task_id) = &node.current_task_id {
                task_index.insert(
                    task_id.clone(),
                    NodeRef {
                        cluster: node.cluster_name.clone(),
                        uuid: node.uuid.clone(),
                    },
                );
            }
        }

        let (reconcile_enabled, _) = watch::channel(false);
        Ok(Arc::new(Self {
            inner: Mutex::new(Inner {
                state,
                task_index,
                connected: false,
            }),
            driver,
            storage,
            config,
            reconcile_enabled,
        }))
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Signal watched by the reconciliation server.
    pub fn reconcile_signal(&self) -> watch::Receiver<bool> {
        self.reconcile_enabled.subscribe()
    }

    /// Drain driver events until the channel closes.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<SchedulerEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        info!("event channel closed, scheduler core stopping");
    }

    /// Handle one driver event. Sequential by construction.
    pub async fn handle_event(&self, event: SchedulerEvent) {
        match event {
            SchedulerEvent::Registered {
                framework_id,
                master,
            } => {
                let mut inner = self.inner.lock().await;
                info!(%framework_id, master = %master.hostname, "framework registered");
                inner.connected = true;
                inner.state.framework_id = Some(framework_id);
                if let Err(e) = self.storage.persist(&inner.state).await {
                    // Without the persisted id a restarted scheduler
                    // registers as a new framework and orphans its tasks.
                    error!(error = %e, "unable to persist framework id after registration");
                }
                self.reconcile_enabled.send_replace(true);
            }
            SchedulerEvent::Reregistered { master } => {
                let mut inner = self.inner.lock().await;
                info!(master = %master.hostname, "framework reregistered");
                inner.connected = true;
                self.reconcile_enabled.send_replace(true);
            }
            SchedulerEvent::Disconnected => {
                let mut inner = self.inner.lock().await;
                warn!("framework disconnected from master");
                inner.connected = false;
            }
            SchedulerEvent::ResourceOffers(offers) => {
                self.handle_offers(offers).await;
            }
            SchedulerEvent::StatusUpdate(status) => {
                self.handle_status_update(status).await;
            }
            SchedulerEvent::OfferRescinded(offer_id) => {
                // Offers are borrowed per event, never cached.
                info!(%offer_id, "offer rescinded");
            }
            SchedulerEvent::FrameworkMessage {
                executor_id,
                worker_id,
                ..
            } => {
                info!(%executor_id, %worker_id, "unhandled framework message");
            }
            SchedulerEvent::WorkerLost(worker_id) => {
                // Affected nodes surface through TASK_LOST updates.
                warn!(%worker_id, "worker lost");
            }
            SchedulerEvent::ExecutorLost {
                executor_id,
                worker_id,
                status,
            } => {
                warn!(%executor_id, %worker_id, status, "executor lost");
            }
            SchedulerEvent::Error(message) => {
                error!(%message, "scheduler received error from master");
            }
        }
    }

    async fn handle_offers(&self, offers: Vec<Offer>) {
        let mut launch_map: HashMap<OfferId, Vec<TaskInfo>> = HashMap::new();

        {
            let mut inner = self.inner.lock().await;
            let inner = &mut *inner;
            let policy = inner.state.relaunch_policy;

            let mut requests = Vec::new();
            for node in inner.state.nodes() {
                if node.needs_to_be_scheduled(policy) {
                    debug!(uuid = %node.uuid, cluster = %node.cluster_name, "node awaits placement");
                    requests.push(NodeRequest {
                        node_uuid: node.uuid.clone(),
                        asker: node.combined_asker(),
                    });
                }
            }

            let (assignments, outcome) = spread_across_offers(&offers, &requests);
            if let Err(e) = outcome {
                warn!(error = %e, "placement round ended early");
            }

            for assignment in assignments {
                let Some(node) = inner
                    .state
                    .nodes_mut()
                    .find(|n| n.uuid == assignment.node_uuid)
                else {
                    continue;
                };

                let task_id = node.prepare_for_launch(&assignment.worker_id, &assignment.hostname);
                let task = match self.build_task_info(node, &task_id, &assignment.worker_id, assignment.executor_ask, assignment.task_ask) {
                    Ok(task) => task,
                    Err(e) => {
                        error!(error = %e, uuid = %assignment.node_uuid, "failed to build task descriptor");
                        continue;
                    }
                };

                let cluster = node.cluster_name.clone();
                inner.task_index.insert(
                    task_id,
                    NodeRef {
                        cluster,
                        uuid: assignment.node_uuid.clone(),
                    },
                );
                launch_map
                    .entry(assignment.offer_id.clone())
                    .or_default()
                    .push(task);
            }

            if let Err(e) = self.storage.persist(&inner.state).await {
                error!(error = %e, "state persist failed after placement");
            }
        }

        // Dispatch off the event handler so the driver is never entered
        // under the scheduler lock.
        for offer in offers {
            let tasks = launch_map.remove(&offer.id).unwrap_or_default();
            let driver = Arc::clone(&self.driver);
            tokio::spawn(async move {
                debug!(offer = %offer.id, tasks = tasks.len(), "launching tasks");
                if let Err(e) = driver
                    .launch_tasks(
                        std::slice::from_ref(&offer.id),
                        tasks,
                        Filters {
                            refuse_seconds: OFFER_REFUSE_SECONDS,
                        },
                    )
                    .await
                {
                    error!(offer = %offer.id, error = %e, "launch call failed");
                }
            });
        }
    }

    async fn handle_status_update(&self, status: TaskStatus) {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;

        let Some(node_ref) = inner.task_index.get(&status.task_id) else {
            // Unknown tasks are killed by reconciliation, not here.
            error!(task_id = %status.task_id, state = ?status.state, "status update for unknown task");
            return;
        };
        let (cluster, uuid) = (node_ref.cluster.clone(), node_ref.uuid.clone());

        let Some(node) = inner.state.node_mut(&cluster, &uuid) else {
            error!(task_id = %status.task_id, "task index points at a removed node");
            inner.task_index.remove(&status.task_id);
            return;
        };

        if node.current_task_id.as_deref() != Some(status.task_id.as_str()) {
            debug!(task_id = %status.task_id, "status for a superseded launch attempt");
            inner.task_index.remove(&status.task_id);
            return;
        }

        info!(task_id = %status.task_id, state = ?status.state, "status update");
        node.handle_status_update(&status);
        if status.state.is_terminal() {
            inner.task_index.remove(&status.task_id);
        }

        if let Err(e) = self.storage.persist(&inner.state).await {
            error!(error = %e, "state persist failed after status update");
        }
    }

    fn build_task_info(
        &self,
        node: &RiakNode,
        task_id: &str,
        worker_id: &str,
        executor_ask: Vec<riakgrid_core::Resource>,
        task_ask: Vec<riakgrid_core::Resource>,
    ) -> SchedulerResult<TaskInfo> {
        let data = TaskData {
            node_name: node.node_name(),
            explorer_node_name: node.explorer_node_name(),
            cluster_name: node.cluster_name.clone(),
            framework_name: self.config.framework_name.clone(),
            coordination_endpoints: self.config.coordination_endpoints.clone(),
        };

        Ok(TaskInfo {
            task_id: task_id.to_string(),
            name: format!("riak-{}", node.cluster_name),
            worker_id: worker_id.to_string(),
            executor: ExecutorInfo {
                executor_id: format!("executor-{task_id}"),
                command: CommandInfo {
                    uris: vec![format!(
                        "{}/static/riakgrid-executor.tar.gz",
                        self.config.artifact_base_url
                    )],
                    value: "./riakgridd executor".to_string(),
                },
                resources: executor_ask,
            },
            resources: task_ask,
            data: data.to_bytes()?,
        })
    }

    /// Nodes overdue for explicit reconciliation, statuses stamped.
    ///
    /// Called by the reconciliation server; a node leaves this set when a
    /// status update for its current task id arrives.
    pub async fn tasks_to_reconcile(&self) -> Vec<TaskStatus> {
        let mut inner = self.inner.lock().await;
        let inner = &mut *inner;
        let now = Instant::now();

        let mut statuses = Vec::new();
        let mut index_refresh = Vec::new();
        for node in inner.state.nodes_mut() {
            if node.reconciled {
                continue;
            }
            if let Some(asked) = node.last_asked_to_reconcile {
                if now.duration_since(asked) < RECONCILE_REASK {
                    continue;
                }
            }
            node.last_asked_to_reconcile = Some(now);
            let status = node.task_status();
            index_refresh.push((
                status.task_id.clone(),
                NodeRef {
                    cluster: node.cluster_name.clone(),
                    uuid: node.uuid.clone(),
                },
            ));
            statuses.push(status);
        }

        for (task_id, node_ref) in index_refresh {
            inner.task_index.entry(task_id).or_insert(node_ref);
        }
        statuses
    }

    // ── Administrative surface ──────────────────────────────────────

    /// Create an empty cluster.
    pub async fn add_cluster(&self, name: &str) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.clusters.contains_key(name) {
            return Err(SchedulerError::ClusterExists(name.to_string()));
        }
        inner
            .state
            .clusters
            .insert(name.to_string(), RiakCluster::new(name));
        self.storage.persist(&inner.state).await?;
        info!(cluster = %name, "cluster created");
        Ok(())
    }

    /// Declare a new node in a cluster; it becomes eligible for the next
    /// offer round.
    pub async fn add_node(&self, cluster: &str, ask: NodeAsk) -> SchedulerResult<RiakNode> {
        let mut inner = self.inner.lock().await;
        let Some(cluster_entry) = inner.state.clusters.get_mut(cluster) else {
            return Err(SchedulerError::UnknownCluster(cluster.to_string()));
        };
        let mut node = RiakNode::new(cluster, ask);
        node.status = riakgrid_state::NodeStatus::AwaitingOffer;
        let added = cluster_entry.add_node(node).clone();
        self.storage.persist(&inner.state).await?;
        info!(cluster = %cluster, uuid = %added.uuid, "node declared");
        Ok(added)
    }

    /// Names of all clusters.
    pub async fn list_clusters(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut names: Vec<String> = inner.state.clusters.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of one cluster.
    pub async fn get_cluster(&self, name: &str) -> Option<RiakCluster> {
        let inner = self.inner.lock().await;
        inner.state.clusters.get(name).cloned()
    }

    /// Change what happens to failed nodes.
    pub async fn set_relaunch_policy(&self, policy: RelaunchPolicy) -> SchedulerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.state.relaunch_policy = policy;
        self.storage.persist(&inner.state).await?;
        Ok(())
    }

    /// Current framework id, if registered.
    pub async fn framework_id(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.state.framework_id.clone()
    }

    /// Whether the driver currently has a master session.
    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.connected
    }
}

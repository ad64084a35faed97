//! Per-task database node lifecycle.
//!
//! Configure from the resource-derived template, launch the database
//! under supervision, join the cluster exactly once through the
//! coordinator lock, watch health, and terminate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use askama::Template;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use riakgrid_core::{
    ranges_to_array, ExecutorDriver, TaskData, TaskInfo, TaskState, TaskStatus,
};
use riakgrid_state::{paths, CoordinationStore};

use crate::error::{ExecutorError, ExecutorResult};
use crate::explorer::{coordinated_join, Explorer};
use crate::hooks::disable_port_mapper;
use crate::process::{HealthCheck, ProcessManager, ProcessOptions};

/// External timeout around one wait-for-service probe run.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Node runtime knobs, defaulting to the sandbox layout the artifact
/// bundle unpacks to.
#[derive(Debug, Clone)]
pub struct NodeSettings {
    /// Root of the unpacked database distribution.
    pub riak_root: PathBuf,
    /// Post-terminal wait so the manager observes the final status.
    pub linger: Duration,
    /// Longer wait after a startup failure, keeping the sandbox around
    /// for diagnosis until the manager garbage-collects it.
    pub startup_fail_linger: Duration,
    pub process: ProcessOptions,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            riak_root: PathBuf::from("riak"),
            linger: Duration::from_secs(15),
            startup_fail_linger: Duration::from_secs(15 * 60),
            process: ProcessOptions::default(),
        }
    }
}

/// The four ports a node binds, in template-substitution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub http: u64,
    pub pb: u64,
    pub handoff: u64,
    pub explorer: u64,
}

impl NodePorts {
    /// Walk the offered "ports" resources in order and bind the four
    /// node ports.
    pub fn from_task(task: &TaskInfo) -> ExecutorResult<Self> {
        let ports: Vec<u64> = task
            .resources
            .iter()
            .filter(|r| r.name == "ports")
            .filter_map(|r| r.as_ranges())
            .flat_map(ranges_to_array)
            .collect();
        match ports.as_slice() {
            [http, pb, handoff, explorer, ..] => Ok(Self {
                http: *http,
                pb: *pb,
                handoff: *handoff,
                explorer: *explorer,
            }),
            _ => Err(ExecutorError::Config(format!(
                "task carries {} ports, need 4",
                ports.len()
            ))),
        }
    }
}

#[derive(Template)]
#[template(path = "riak.conf", escape = "none")]
struct RiakConf<'a> {
    node_name: &'a str,
    http_port: u64,
    pb_port: u64,
    handoff_port: u64,
}

/// One supervised database node, the unit this executor exists for.
pub struct RiakNode {
    task: TaskInfo,
    data: TaskData,
    driver: Arc<dyn ExecutorDriver>,
    coordination: Arc<dyn CoordinationStore>,
    settings: NodeSettings,
    finish_rx: mpsc::Receiver<()>,
}

/// Handle used to deliver the external finish signal (task kill or
/// executor shutdown). At most one send matters; teardown is idempotent.
#[derive(Clone)]
pub struct FinishHandle(mpsc::Sender<()>);

impl FinishHandle {
    pub async fn finish(&self) {
        let _ = self.0.send(()).await;
    }
}

impl RiakNode {
    /// Parse the embedded `TaskData` and set up the lifecycle.
    pub fn new(
        task: TaskInfo,
        driver: Arc<dyn ExecutorDriver>,
        coordination: Arc<dyn CoordinationStore>,
        settings: NodeSettings,
    ) -> ExecutorResult<(Self, FinishHandle)> {
        let data = TaskData::from_bytes(&task.data)?;
        info!(task_id = %task.task_id, node = %data.node_name, "task data decoded");
        let (finish_tx, finish_rx) = mpsc::channel(1);
        Ok((
            Self {
                task,
                data,
                driver,
                coordination,
                settings,
                finish_rx,
            },
            FinishHandle(finish_tx),
        ))
    }

    /// Render `riak.conf` and write it atomically into the distribution.
    fn write_config(&self, ports: NodePorts) -> ExecutorResult<()> {
        let rendered = RiakConf {
            node_name: &self.data.node_name,
            http_port: ports.http,
            pb_port: ports.pb,
            handoff_port: ports.handoff,
        }
        .render()?;

        let etc = self.settings.riak_root.join("etc");
        std::fs::create_dir_all(&etc)?;
        let target = etc.join("riak.conf");
        let staging = etc.join(".riak.conf.tmp");
        std::fs::write(&staging, rendered)?;
        std::fs::rename(&staging, &target)?;
        info!(path = %target.display(), "node configuration written");
        Ok(())
    }

    fn health_check(&self) -> HealthCheck {
        let root = self.settings.riak_root.clone();
        Arc::new(move || {
            let root = root.clone();
            Box::pin(async move {
                // Probe under an isolated HOME so the admin tool never
                // touches the operator's environment.
                let home = root.join("data");
                let result = tokio::time::timeout(
                    HEALTH_PROBE_TIMEOUT,
                    tokio::process::Command::new(root.join("bin/riak-admin"))
                        .args(["wait-for-service", "riak_kv"])
                        .env("HOME", &home)
                        .status(),
                )
                .await;
                matches!(result, Ok(Ok(status)) if status.success())
            })
        })
    }

    async fn send_status(&self, state: TaskState) {
        let status = TaskStatus::new(self.task.task_id.clone(), state);
        if let Err(e) = self.driver.send_status_update(status).await {
            error!(error = %e, "status update failed");
        }
    }

    /// Drive the node from configuration to termination.
    pub async fn run(mut self) {
        let ports = match NodePorts::from_task(&self.task) {
            Ok(ports) => ports,
            Err(e) => {
                error!(error = %e, "port assignment failed");
                return self.fail_before_start().await;
            }
        };
        info!(?ports, "ports bound");

        if let Err(e) = self.write_config(ports) {
            error!(error = %e, "configuration failed");
            return self.fail_before_start().await;
        }

        if let Err(e) = disable_port_mapper(&self.settings.riak_root) {
            error!(error = %e, "port-mapper hook failed");
            return self.fail_before_start().await;
        }

        let explorer = match Explorer::start(ports.explorer, &self.data.explorer_node_name).await {
            Ok(explorer) => explorer,
            Err(e) => {
                error!(error = %e, "explorer sidecar failed");
                return self.fail_before_start().await;
            }
        };

        let pm = match ProcessManager::spawn(
            self.settings.riak_root.join("bin/riak"),
            &["console", "-noinput"],
            None,
            Some(self.health_check()),
            self.settings.process,
        )
        .await
        {
            Ok(pm) => pm,
            Err(e) => {
                error!(error = %e, "database start failed");
                explorer.tear_down().await;
                return self.fail_before_start().await;
            }
        };

        let transport = explorer.client();
        if let Err(e) = coordinated_join(
            &self.coordination,
            &self.data.framework_name,
            &self.data.cluster_name,
            &self.task.task_id,
            &self.data.node_name,
            &transport,
        )
        .await
        {
            // The node runs even if coordination is unreachable; it just
            // has not advertised itself yet.
            warn!(error = %e, "cluster join incomplete");
        }

        self.send_status(TaskState::Running).await;
        info!(task_id = %self.task.task_id, "node running");

        // Run loop: first of process exit / external finish wins.
        let mut exit = pm.listen();
        let finished = tokio::select! {
            _ = exit.changed() => false,
            _ = self.finish_rx.recv() => true,
        };
        if finished {
            info!("finish signal received, tearing the node down");
            pm.tear_down().await;
            self.send_status(TaskState::Finished).await;
        } else {
            warn!("database process died");
            self.send_status(TaskState::Failed).await;
        }

        explorer.tear_down().await;
        self.teardown().await;
    }

    /// Startup failed: report, keep the sandbox alive for diagnosis, stop.
    async fn fail_before_start(self) {
        self.send_status(TaskState::Failed).await;
        tokio::time::sleep(self.settings.startup_fail_linger).await;
        info!("stopping driver after startup failure");
        self.driver.stop().await;
    }

    /// Remove the ephemeral advertisement, linger so the manager observes
    /// the terminal status, then stop the driver.
    async fn teardown(self) {
        let path = paths::coordinated_node(
            &self.data.framework_name,
            &self.data.cluster_name,
            &self.task.task_id,
        );
        if let Err(e) = self.coordination.delete(&path).await {
            warn!(error = %e, "failed to delete coordination record");
        }
        tokio::time::sleep(self.settings.linger).await;
        info!("shutting down");
        self.driver.stop().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riakgrid_core::{CommandInfo, ExecutorInfo, Resource};

    fn task_with_ports(ranges: Vec<(u64, u64)>) -> TaskInfo {
        TaskInfo {
            task_id: "golden-abc-1".to_string(),
            name: "riak-golden".to_string(),
            worker_id: "w-1".to_string(),
            executor: ExecutorInfo {
                executor_id: "executor-golden-abc-1".to_string(),
                command: CommandInfo {
                    uris: vec![],
                    value: String::new(),
                },
                resources: vec![],
            },
            resources: vec![
                Resource::scalar("cpus", 1.0),
                Resource::ranges("ports", ranges),
            ],
            data: TaskData {
                node_name: "riak-abc@host-1".to_string(),
                explorer_node_name: "explorer-abc@host-1".to_string(),
                cluster_name: "golden".to_string(),
                framework_name: "riakgrid".to_string(),
                coordination_endpoints: vec![],
            }
            .to_bytes()
            .unwrap(),
        }
    }

    #[test]
    fn ports_bind_in_fixed_order() {
        let task = task_with_ports(vec![(31000, 31003)]);
        let ports = NodePorts::from_task(&task).unwrap();
        assert_eq!(
            ports,
            NodePorts {
                http: 31000,
                pb: 31001,
                handoff: 31002,
                explorer: 31003,
            }
        );
    }

    #[test]
    fn ports_bind_across_split_ranges() {
        let task = task_with_ports(vec![(31000, 31001), (31005, 31006)]);
        let ports = NodePorts::from_task(&task).unwrap();
        assert_eq!(ports.http, 31000);
        assert_eq!(ports.explorer, 31006);
    }

    #[test]
    fn too_few_ports_is_a_config_error() {
        let task = task_with_ports(vec![(31000, 31002)]);
        assert!(matches!(
            NodePorts::from_task(&task),
            Err(ExecutorError::Config(_))
        ));
    }

    #[test]
    fn config_template_substitutes_all_ports() {
        let rendered = RiakConf {
            node_name: "riak-abc@host-1",
            http_port: 31000,
            pb_port: 31001,
            handoff_port: 31002,
        }
        .render()
        .unwrap();

        assert!(rendered.contains("nodename = riak-abc@host-1"));
        assert!(rendered.contains("listener.http.internal = 0.0.0.0:31000"));
        assert!(rendered.contains("listener.protobuf.internal = 0.0.0.0:31001"));
        assert!(rendered.contains("handoff.port = 31002"));
    }
}

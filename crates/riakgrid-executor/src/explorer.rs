//! Explorer sidecar and the serialized cluster join.
//!
//! The explorer is a companion process started before the database. The
//! core uses exactly one of its operations: a join RPC from this node to
//! a peer. Its liveness is implicit in its port binding; everything else
//! about it is a black box.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::Empty;
use tracing::{info, warn};

use riakgrid_core::CoordinatedData;
use riakgrid_state::{paths, CoordinationStore};

use crate::error::{ExecutorError, ExecutorResult};
use crate::process::{ProcessManager, ProcessOptions};

/// Where the explorer lives inside the fetched artifact bundle.
pub const EXPLORER_BIN: &str = "riak_explorer/bin/riak_explorer";

const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// The join RPC, abstracted so the coordination logic can be exercised
/// without a live sidecar.
#[async_trait]
pub trait JoinTransport: Send + Sync {
    /// Ask `peer` to accept `from` into the cluster. `Ok` iff accepted.
    async fn join(&self, from: &str, peer: &str) -> ExecutorResult<()>;
}

/// The running sidecar process.
pub struct Explorer {
    pm: ProcessManager,
    port: u64,
}

impl Explorer {
    /// Launch the explorer bound to its port and node name. Failure here
    /// is fatal for the task.
    pub async fn start(port: u64, node_name: &str) -> ExecutorResult<Self> {
        let port_arg = port.to_string();
        let pm = ProcessManager::spawn(
            EXPLORER_BIN,
            &["-name", node_name, "-port", &port_arg],
            None,
            None,
            ProcessOptions::default(),
        )
        .await
        .map_err(|e| ExecutorError::Explorer(format!("sidecar start failed: {e}")))?;
        info!(port, %node_name, "explorer sidecar started");
        Ok(Self { pm, port })
    }

    pub fn client(&self) -> ExplorerClient {
        ExplorerClient::new(format!("127.0.0.1:{}", self.port))
    }

    pub async fn tear_down(&self) {
        self.pm.tear_down().await;
    }
}

/// HTTP client for the explorer's join RPC.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    address: String,
}

impl ExplorerClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    async fn request(&self, path: &str) -> ExecutorResult<http::StatusCode> {
        let address = self.address.clone();
        let uri = format!("http://{address}{path}");

        let response = tokio::time::timeout(JOIN_TIMEOUT, async {
            let stream = tokio::net::TcpStream::connect(&address)
                .await
                .map_err(|e| ExecutorError::Explorer(format!("connect {address}: {e}")))?;
            let io = hyper_util::rt::TokioIo::new(stream);
            let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
                .await
                .map_err(|e| ExecutorError::Explorer(format!("handshake: {e}")))?;
            tokio::spawn(async move {
                let _ = conn.await;
            });

            let request = http::Request::builder()
                .method("PUT")
                .uri(&uri)
                .header("host", &address)
                .body(Empty::<bytes::Bytes>::new())
                .map_err(|e| ExecutorError::Explorer(format!("request build: {e}")))?;

            sender
                .send_request(request)
                .await
                .map(|resp| resp.status())
                .map_err(|e| ExecutorError::Explorer(format!("request: {e}")))
        })
        .await
        .map_err(|_| ExecutorError::Explorer(format!("timeout talking to {uri}")))??;

        Ok(response)
    }
}

#[async_trait]
impl JoinTransport for ExplorerClient {
    async fn join(&self, from: &str, peer: &str) -> ExecutorResult<()> {
        let status = self
            .request(&format!("/explore/nodes/{from}/join/{peer}"))
            .await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(ExecutorError::JoinRefused(peer.to_string()))
        }
    }
}

/// Join the cluster under the coordinator's distributed lock.
///
/// The lock serializes joins cluster-wide so every new member sees a
/// stable member set. Within the lock: read all live members, issue a join
/// RPC to each (per-peer failures are logged and skipped), then publish
/// this node's ephemeral record so a dead executor drops out on session
/// loss. Returns the peers that accepted.
pub async fn coordinated_join(
    coordination: &Arc<dyn CoordinationStore>,
    framework: &str,
    cluster: &str,
    task_id: &str,
    node_name: &str,
    transport: &dyn JoinTransport,
) -> ExecutorResult<Vec<String>> {
    let members_path = paths::coordinated_nodes(framework, cluster);
    coordination.create_persistent(&members_path, &[]).await?;

    let _lock = coordination
        .lock(&paths::coordinator(framework, cluster))
        .await?;

    let mut joined = Vec::new();
    for member in coordination.get_children(&members_path).await? {
        let member_path = paths::coordinated_node(framework, cluster, &member);
        let Some(bytes) = coordination.get_data(&member_path).await? else {
            continue;
        };
        let peer = CoordinatedData::from_bytes(&bytes)?;
        match transport.join(node_name, &peer.node_name).await {
            Ok(()) => {
                info!(peer = %peer.node_name, "joined peer");
                joined.push(peer.node_name);
            }
            Err(e) => {
                // A refused or unreachable peer does not stop the join;
                // this node still publishes its own record.
                warn!(peer = %peer.node_name, error = %e, "join to peer failed");
            }
        }
    }

    let own = CoordinatedData {
        node_name: node_name.to_string(),
    };
    coordination
        .create_ephemeral(
            &paths::coordinated_node(framework, cluster, task_id),
            &own.to_bytes()?,
        )
        .await?;

    Ok(joined)
}

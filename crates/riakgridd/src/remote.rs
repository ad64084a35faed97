//! HTTP adapter to the cluster-manager driver shim.
//!
//! The manager's wire protocol stays outside this repository; a driver
//! shim translates it to plain JSON over HTTP. Outbound calls are POSTs,
//! inbound events are long-polled and fed into the plane's event channel.
//! The shim owns retries against the manager; this adapter reports
//! transport errors and nothing more.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use riakgrid_core::{
    Credential, DriverError, DriverResult, ExecutorDriver, ExecutorEvent, Filters, FrameworkInfo,
    OfferId, SchedulerDriver, SchedulerEvent, TaskInfo, TaskStatus,
};

const POLL_RETRY: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct LaunchCall<'a> {
    offer_ids: &'a [OfferId],
    tasks: &'a [TaskInfo],
    filters: Filters,
}

#[derive(Serialize)]
struct ReconcileCall<'a> {
    statuses: &'a [TaskStatus],
}

#[derive(Serialize)]
struct SubscribeCall<'a> {
    framework: &'a FrameworkInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    credential: Option<&'a Credential>,
}

#[derive(Clone)]
struct ShimClient {
    base: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl ShimClient {
    fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> DriverResult<()> {
        let uri = format!("{}{path}", self.base);
        let payload =
            serde_json::to_vec(body).map_err(|e| DriverError::Transport(e.to_string()))?;
        let request = http::Request::builder()
            .method("POST")
            .uri(&uri)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| DriverError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| DriverError::Transport(format!("{uri}: {e}")))?;
        if !response.status().is_success() {
            return Err(DriverError::Transport(format!(
                "{uri}: shim answered {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn poll<E: serde::de::DeserializeOwned>(&self, path: &str) -> DriverResult<Vec<E>> {
        let uri = format!("{}{path}", self.base);
        let request = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .body(Full::new(Bytes::new()))
            .map_err(|e| DriverError::Transport(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| DriverError::Transport(format!("{uri}: {e}")))?;
        if !response.status().is_success() {
            return Err(DriverError::Transport(format!(
                "{uri}: shim answered {}",
                response.status()
            )));
        }
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| DriverError::Transport(e.to_string()))?
            .to_bytes();
        serde_json::from_slice(&body).map_err(|e| DriverError::Transport(e.to_string()))
    }
}

/// Scheduler-plane driver over the shim.
pub struct RemoteSchedulerDriver {
    shim: ShimClient,
}

impl RemoteSchedulerDriver {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            shim: ShimClient::new(base),
        }
    }

    /// Register the framework with the manager through the shim.
    pub async fn subscribe(
        &self,
        framework: &FrameworkInfo,
        credential: Option<&Credential>,
    ) -> DriverResult<()> {
        self.shim
            .post(
                "/scheduler/subscribe",
                &SubscribeCall {
                    framework,
                    credential,
                },
            )
            .await
    }

    /// Long-poll driver events into the scheduler's channel. Runs until
    /// the channel closes.
    pub async fn pump_events(&self, events: mpsc::Sender<SchedulerEvent>) {
        loop {
            match self.shim.poll::<SchedulerEvent>("/scheduler/events").await {
                Ok(batch) => {
                    debug!(count = batch.len(), "driver events received");
                    for event in batch {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "event poll failed");
                    tokio::time::sleep(POLL_RETRY).await;
                }
            }
        }
    }
}

#[async_trait]
impl SchedulerDriver for RemoteSchedulerDriver {
    async fn launch_tasks(
        &self,
        offer_ids: &[OfferId],
        tasks: Vec<TaskInfo>,
        filters: Filters,
    ) -> DriverResult<()> {
        self.shim
            .post(
                "/scheduler/launch",
                &LaunchCall {
                    offer_ids,
                    tasks: &tasks,
                    filters,
                },
            )
            .await
    }

    async fn reconcile_tasks(&self, statuses: Vec<TaskStatus>) -> DriverResult<()> {
        self.shim
            .post(
                "/scheduler/reconcile",
                &ReconcileCall {
                    statuses: &statuses,
                },
            )
            .await
    }

    async fn stop(&self) {
        if let Err(e) = self.shim.post("/scheduler/stop", &()).await {
            warn!(error = %e, "driver stop call failed");
        }
    }
}

/// Executor-plane driver over the shim's per-worker agent endpoint.
pub struct RemoteExecutorDriver {
    shim: ShimClient,
}

impl RemoteExecutorDriver {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            shim: ShimClient::new(base),
        }
    }

    /// Long-poll executor events into the executor's channel.
    pub async fn pump_events(&self, events: mpsc::Sender<ExecutorEvent>) {
        loop {
            match self.shim.poll::<ExecutorEvent>("/executor/events").await {
                Ok(batch) => {
                    for event in batch {
                        if events.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "event poll failed");
                    tokio::time::sleep(POLL_RETRY).await;
                }
            }
        }
    }
}

#[async_trait]
impl ExecutorDriver for RemoteExecutorDriver {
    async fn send_status_update(&self, status: TaskStatus) -> DriverResult<()> {
        self.shim.post("/executor/status", &status).await
    }

    async fn stop(&self) {
        if let Err(e) = self.shim.post("/executor/stop", &()).await {
            warn!(error = %e, "driver stop call failed");
        }
    }
}

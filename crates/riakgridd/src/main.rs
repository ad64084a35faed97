//! riakgridd — the riakgrid daemon.
//!
//! One binary, two roles:
//!
//! - **scheduler** — the framework control plane: registers with the
//!   cluster manager, accepts offers, places database nodes, serves
//!   artifacts and the admin API, reconciles after restarts
//! - **executor** — spawned by the cluster manager on a worker to host
//!   exactly one database node
//!
//! ```text
//! riakgridd scheduler --master http://10.0.0.1:9090 --name riakgrid \
//!     --coordination zk-1:2181 --bind 0.0.0.0:8080 --artifact-dir ./artifacts
//! riakgridd executor --agent http://127.0.0.1:9091
//! ```

mod remote;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::info;

use riakgrid_core::{Credential, SchedulerDriver};
use riakgrid_executor::{ExecutorCore, NodeSettings};
use riakgrid_scheduler::{artifact, ReconciliationServer, SchedulerConfig, SchedulerCore};
use riakgrid_state::{CoordinationStore, MemoryCoordination, StateStorage};

use remote::{RemoteExecutorDriver, RemoteSchedulerDriver};

#[derive(Parser)]
#[command(name = "riakgridd", about = "riakgrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler control plane.
    Scheduler {
        /// Framework name, also the root of all coordination paths.
        #[arg(long, default_value = "riakgrid")]
        name: String,

        /// Resource role to register under.
        #[arg(long, default_value = "*")]
        role: String,

        /// Cluster-manager driver shim endpoint.
        #[arg(long)]
        master: String,

        /// Coordination-service endpoints, handed to executors.
        #[arg(long = "coordination", default_value = "127.0.0.1:2181")]
        coordination: Vec<String>,

        /// Bind address for the artifact + admin HTTP server.
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: SocketAddr,

        /// Directory served under /static/.
        #[arg(long, default_value = "./artifacts")]
        artifact_dir: PathBuf,

        /// User tasks run as; the manager defaults it to "guest".
        #[arg(long)]
        user: Option<String>,

        /// Principal for authenticated registration.
        #[arg(long)]
        principal: Option<String>,

        /// File holding the secret for --principal.
        #[arg(long)]
        secret_file: Option<PathBuf>,

        /// Seconds between reconciliation sweeps.
        #[arg(long, default_value = "5")]
        reconcile_interval: u64,
    },

    /// Run one executor (normally spawned by the cluster manager).
    Executor {
        /// Worker-side driver shim endpoint.
        #[arg(long)]
        agent: String,

        /// Root of the unpacked database distribution.
        #[arg(long, default_value = "riak")]
        riak_root: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,riakgrid=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Scheduler {
            name,
            role,
            master,
            coordination,
            bind,
            artifact_dir,
            user,
            principal,
            secret_file,
            reconcile_interval,
        } => {
            run_scheduler(
                name,
                role,
                master,
                coordination,
                bind,
                artifact_dir,
                user,
                principal,
                secret_file,
                Duration::from_secs(reconcile_interval),
            )
            .await
        }
        Command::Executor { agent, riak_root } => run_executor(agent, riak_root).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_scheduler(
    name: String,
    role: String,
    master: String,
    coordination: Vec<String>,
    bind: SocketAddr,
    artifact_dir: PathBuf,
    user: Option<String>,
    principal: Option<String>,
    secret_file: Option<PathBuf>,
    reconcile_interval: Duration,
) -> anyhow::Result<()> {
    info!(%name, %role, %master, "riakgrid scheduler starting");

    // In-memory coordination backend; a ZooKeeper-backed CoordinationStore
    // plugs in here for multi-process deployments.
    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordination::new());
    let storage = StateStorage::new(store, &name);

    let credential = match (&principal, &secret_file) {
        (Some(principal), Some(path)) => {
            let secret = tokio::fs::read(path).await?;
            Some(Credential {
                principal: principal.clone(),
                secret,
            })
        }
        _ => None,
    };

    let config = SchedulerConfig {
        framework_name: name,
        framework_role: role,
        user,
        principal,
        coordination_endpoints: coordination,
        artifact_base_url: format!("http://{bind}"),
    };

    let driver = Arc::new(RemoteSchedulerDriver::new(master));
    let core = SchedulerCore::start(driver.clone(), storage, config).await?;

    // Artifact + admin HTTP server.
    let router = artifact::build_router(core.clone(), artifact_dir);
    let (uri, _server) = artifact::serve(bind, router).await?;
    info!(%uri, "artifact server up");

    // Reconciliation server.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = ReconciliationServer::spawn(
        core.clone(),
        driver.clone(),
        reconcile_interval,
        shutdown_rx,
    );

    // Register and start draining driver events.
    let framework_id = core.framework_id().await;
    driver
        .subscribe(&core.config().framework_info(framework_id), credential.as_ref())
        .await?;

    let (event_tx, event_rx) = mpsc::channel(64);
    let pump = {
        let driver = driver.clone();
        tokio::spawn(async move { driver.pump_events(event_tx).await })
    };
    let core_loop = tokio::spawn(core.run(event_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    driver.stop().await;
    pump.abort();
    core_loop.abort();
    let _ = reconciler.await;

    info!("scheduler stopped");
    Ok(())
}

async fn run_executor(agent: String, riak_root: PathBuf) -> anyhow::Result<()> {
    info!(%agent, "riakgrid executor starting");

    let store: Arc<dyn CoordinationStore> = Arc::new(MemoryCoordination::new());
    let driver = Arc::new(RemoteExecutorDriver::new(agent));

    let settings = NodeSettings {
        riak_root,
        ..NodeSettings::default()
    };
    let core = ExecutorCore::new(driver.clone(), store, settings);

    let (event_tx, event_rx) = mpsc::channel(16);
    let pump = {
        let driver = driver.clone();
        let events = event_tx.clone();
        tokio::spawn(async move { driver.pump_events(events).await })
    };

    let mut core_task = tokio::spawn(core.run(event_rx));
    tokio::select! {
        _ = &mut core_task => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = event_tx.send(riakgrid_core::ExecutorEvent::Shutdown).await;
            let _ = core_task.await;
        }
    }

    pump.abort();
    info!("executor stopped");
    Ok(())
}

//! Scoped supervision of exactly one child process.
//!
//! The manager spawns the child, a watcher that flips the exit channel
//! exactly once when the child dies, and (when a probe is given) a health
//! loop that terminates the child after consecutive probe failures.
//! Nothing else in the executor is allowed to signal or wait on the
//! child.

use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{ExecutorError, ExecutorResult};

/// A single asynchronous health probe run.
pub type ProbeFuture = Pin<Box<dyn std::future::Future<Output = bool> + Send>>;

/// Health probe factory, invoked once per poll.
pub type HealthCheck = Arc<dyn Fn() -> ProbeFuture + Send + Sync>;

/// Callback run once when the child exits.
pub type OnExit = Box<dyn FnOnce() + Send>;

/// Supervision knobs.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    /// Gap between health probes.
    pub health_interval: Duration,
    /// Consecutive probe failures before the child is terminated.
    pub failure_threshold: u32,
    /// How long a terminated child gets before escalation to SIGKILL.
    pub grace: Duration,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(10),
            failure_threshold: 3,
            grace: Duration::from_secs(5),
        }
    }
}

/// Supervises one child process for its whole lifetime.
pub struct ProcessManager {
    pid: i32,
    exit_rx: watch::Receiver<bool>,
    torn_down: Arc<AtomicBool>,
    options: ProcessOptions,
}

impl ProcessManager {
    /// Spawn and begin supervising `executable` with `args`.
    ///
    /// `on_exit` runs once when the child exits for any reason. With a
    /// health check, the child is terminated after
    /// `options.failure_threshold` consecutive probe failures.
    pub async fn spawn(
        executable: impl AsRef<Path>,
        args: &[&str],
        on_exit: Option<OnExit>,
        health_check: Option<HealthCheck>,
        options: ProcessOptions,
    ) -> ExecutorResult<Self> {
        let executable = executable.as_ref();
        let mut child = Command::new(executable)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutorError::Process(format!("spawn {} failed: {e}", executable.display()))
            })?;

        let pid = child
            .id()
            .ok_or_else(|| ExecutorError::Process("child exited before supervision".into()))?
            as i32;
        info!(pid, executable = %executable.display(), "child started");

        let (exit_tx, exit_rx) = watch::channel(false);
        let torn_down = Arc::new(AtomicBool::new(false));

        // Watcher: exactly one exit notification per child lifetime.
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!(pid, %status, "child exited"),
                Err(e) => warn!(pid, error = %e, "wait on child failed"),
            }
            let _ = exit_tx.send(true);
            if let Some(callback) = on_exit {
                callback();
            }
        });

        if let Some(probe) = health_check {
            let mut exit_watch = exit_rx.clone();
            let opts = options;
            tokio::spawn(async move {
                let mut failures = 0u32;
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(opts.health_interval) => {}
                        _ = exit_watch.changed() => break,
                    }
                    if *exit_watch.borrow() {
                        break;
                    }
                    if probe().await {
                        failures = 0;
                        debug!(pid, "health probe passed");
                    } else {
                        failures += 1;
                        warn!(pid, failures, threshold = opts.failure_threshold, "health probe failed");
                    }
                    if failures >= opts.failure_threshold {
                        error!(pid, "health probe threshold reached, terminating child");
                        terminate(pid, opts.grace, exit_watch.clone()).await;
                        break;
                    }
                }
            });
        }

        Ok(Self {
            pid,
            exit_rx,
            torn_down,
            options,
        })
    }

    /// Subscribe to the exit notification. The channel flips to `true`
    /// once, when the child exits.
    pub fn listen(&self) -> watch::Receiver<bool> {
        self.exit_rx.clone()
    }

    /// Whether the child has already exited.
    pub fn exited(&self) -> bool {
        *self.exit_rx.borrow()
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Terminate the child: SIGTERM, then SIGKILL after the grace period.
    /// Idempotent; later calls return immediately.
    pub async fn tear_down(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.exited() {
            return;
        }
        terminate(self.pid, self.options.grace, self.exit_rx.clone()).await;
    }
}

/// TERM, wait for the exit notification up to `grace`, then KILL.
async fn terminate(pid: i32, grace: Duration, mut exit_rx: watch::Receiver<bool>) {
    if *exit_rx.borrow() {
        return;
    }
    debug!(pid, "sending SIGTERM");
    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed, child likely gone");
        return;
    }

    let exited = tokio::time::timeout(grace, exit_rx.changed()).await.is_ok();
    if !exited {
        warn!(pid, "child survived SIGTERM, escalating to SIGKILL");
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ProcessOptions {
        ProcessOptions {
            health_interval: Duration::from_millis(50),
            failure_threshold: 2,
            grace: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn exit_notification_fires_for_short_lived_child() {
        let pm = ProcessManager::spawn("/bin/true", &[], None, None, options())
            .await
            .unwrap();
        let mut listener = pm.listen();
        tokio::time::timeout(Duration::from_secs(5), listener.changed())
            .await
            .expect("no exit notification")
            .unwrap();
        assert!(pm.exited());
    }

    #[tokio::test]
    async fn tear_down_stops_a_long_running_child() {
        let pm = ProcessManager::spawn("/bin/sleep", &["30"], None, None, options())
            .await
            .unwrap();
        let mut listener = pm.listen();

        pm.tear_down().await;
        tokio::time::timeout(Duration::from_secs(5), listener.changed())
            .await
            .expect("child did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn tear_down_is_idempotent() {
        let pm = ProcessManager::spawn("/bin/sleep", &["30"], None, None, options())
            .await
            .unwrap();
        pm.tear_down().await;
        pm.tear_down().await;
        pm.tear_down().await;
    }

    #[tokio::test]
    async fn on_exit_callback_runs_once() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(4);
        let callback: OnExit = Box::new(move || {
            let _ = tx.try_send(());
        });
        let _pm = ProcessManager::spawn("/bin/true", &[], Some(callback), None, options())
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("callback never ran");
        // Channel closes when the callback (and its sender) is dropped.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn failing_health_check_terminates_the_child() {
        let probe: HealthCheck = Arc::new(|| Box::pin(async { false }));
        let pm = ProcessManager::spawn("/bin/sleep", &["30"], None, Some(probe), options())
            .await
            .unwrap();
        let mut listener = pm.listen();

        tokio::time::timeout(Duration::from_secs(5), listener.changed())
            .await
            .expect("unhealthy child was not terminated")
            .unwrap();
    }

    #[tokio::test]
    async fn passing_health_check_leaves_the_child_alone() {
        let probe: HealthCheck = Arc::new(|| Box::pin(async { true }));
        let pm = ProcessManager::spawn("/bin/sleep", &["30"], None, Some(probe), options())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!pm.exited());
        pm.tear_down().await;
    }

    #[tokio::test]
    async fn spawn_failure_is_an_error() {
        let result =
            ProcessManager::spawn("/no/such/binary", &[], None, None, options()).await;
        assert!(matches!(result, Err(ExecutorError::Process(_))));
    }
}

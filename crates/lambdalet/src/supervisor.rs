//! Process supervisor - owns the worker lifecycle and the forwarding path.
//!
//! Flow per invocation:
//! 1. No worker handle -> register readiness listener, spawn, wait for
//!    SIGUSR2 (or child exit, the failure path)
//! 2. Encode the event + context and POST it to the worker's loopback port
//! 3. Report timings and lifecycle counters around the exchange
//!
//! Process-level failures (spawn error, crash, dead worker found before a
//! forward) are retried in place with the same invocation until the failure
//! budget is spent, then the supervisor terminates its own process so the
//! hosting platform recycles the container.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::bridge::client::{ExchangeTimings, ProxyClient, ProxyError, ResponsePayload, WorkerFailure};
use crate::bridge::codec::encode_request;
use crate::context::LambdaContext;
use crate::handshake::ReadySignal;
use crate::metrics::{LifecycleEvent, MetricSample, Reporter};

/// Consecutive process-level failures tolerated before the supervisor
/// terminates itself (exit code 1) and lets the platform recycle the host.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

const DEFAULT_WORKER_PORT: u16 = 9999;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Worker executable, invoked as `<worker> execute --level <level>
    /// --signal <supervisor pid>`.
    pub worker_path: PathBuf,
    pub service_name: String,
    pub log_level: String,
    /// Loopback port the worker binds.
    pub port: u16,
    /// Request path forwarded to the worker and used as the metric dimension.
    pub path: String,
    /// Metric namespace prefix; the full namespace is `<prefix>/<service>`.
    pub namespace_prefix: String,
    pub failure_budget: u32,
}

impl SupervisorConfig {
    pub fn new(worker_path: impl Into<PathBuf>, service_name: impl Into<String>) -> Self {
        Self {
            worker_path: worker_path.into(),
            service_name: service_name.into(),
            log_level: std::env::var("LAMBDALET_LOG_LEVEL")
                .unwrap_or_else(|_| "info".to_string()),
            port: DEFAULT_WORKER_PORT,
            path: "/".to_string(),
            namespace_prefix: "Lambdalet".to_string(),
            failure_budget: MAX_CONSECUTIVE_FAILURES,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn with_failure_budget(mut self, budget: u32) -> Self {
        self.failure_budget = budget;
        self
    }

    pub fn namespace(&self) -> String {
        format!("{}/{}", self.namespace_prefix, self.service_name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("spawn failed: {0}")]
    Other(String),
}

/// Extension point for different worker spawn strategies.
pub trait WorkerSpawner: Send + Sync {
    fn spawn(&self, config: &SupervisorConfig) -> Result<Child, SpawnError>;
}

/// Spawns the configured worker binary in execute mode.
///
/// Stdio is inherited, not piped: worker logs flow to the container's log
/// destination un-mediated.
pub struct ExecSpawner;

impl WorkerSpawner for ExecSpawner {
    fn spawn(&self, config: &SupervisorConfig) -> Result<Child, SpawnError> {
        let child = Command::new(&config.worker_path)
            .arg("execute")
            .args(["--level", &config.log_level])
            .args(["--signal", &std::process::id().to_string()])
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        Ok(child)
    }
}

/// How the supervisor terminates itself once the failure budget is spent.
///
/// Injectable so the budget property is testable; production exits the
/// process, which is the platform's cue to recycle the whole container.
pub trait FatalExit: Send + Sync {
    fn exit(&self);
}

pub struct ProcessExit;

impl FatalExit for ProcessExit {
    fn exit(&self) {
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvocationError {
    #[error(transparent)]
    Worker(#[from] WorkerFailure),

    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    #[error("worker failure budget exhausted")]
    FailureBudgetExhausted,
}

struct WorkerState {
    child: Option<Child>,
    consecutive_failures: u32,
}

/// Long-lived parent that keeps one worker warm and proxies invocations to it.
///
/// The state mutex serializes invokers end to end: a caller arriving while a
/// launch is in flight queues behind it instead of spawning a second worker
/// or clobbering the pending invocation.
pub struct Supervisor {
    config: SupervisorConfig,
    client: ProxyClient,
    reporter: Reporter,
    spawner: Arc<dyn WorkerSpawner>,
    fatal: Arc<dyn FatalExit>,
    state: Mutex<WorkerState>,
    started_at: Instant,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig, reporter: Reporter) -> Self {
        let client = ProxyClient::new(config.port, config.path.clone());
        Self {
            config,
            client,
            reporter,
            spawner: Arc::new(ExecSpawner),
            fatal: Arc::new(ProcessExit),
            state: Mutex::new(WorkerState {
                child: None,
                consecutive_failures: 0,
            }),
            started_at: Instant::now(),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn WorkerSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_fatal_exit(mut self, fatal: Arc<dyn FatalExit>) -> Self {
        self.fatal = fatal;
        self
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Process-level failures since the last supervisor start. Never reset by
    /// a successful exchange.
    pub async fn consecutive_failures(&self) -> u32 {
        self.state.lock().await.consecutive_failures
    }

    /// Forward one invocation to the worker, spawning or respawning it as
    /// needed, and decode its reply.
    ///
    /// Transport and worker-reported errors resolve this invocation only;
    /// spawn errors and crashes retry the same invocation until the failure
    /// budget is spent.
    pub async fn invoke(
        &self,
        event: serde_json::Value,
        context: LambdaContext,
    ) -> Result<ResponsePayload, InvocationError> {
        // Captured once; respawn retries reuse it rather than re-reading a
        // budget that has meanwhile shrunk.
        let start_remaining = context.remaining_time_in_millis;

        let mut state = self.state.lock().await;
        loop {
            let lifecycle = match self.ensure_worker(&mut state).await {
                Ok(lifecycle) => lifecycle,
                Err(()) => {
                    if self.record_failure(&mut state) {
                        return Err(InvocationError::FailureBudgetExhausted);
                    }
                    continue;
                }
            };
            self.reporter.counter(&self.config.path, lifecycle);

            let body = encode_request(event.clone(), &context);
            tracing::debug!(
                request_id = %context.aws_request_id,
                bytes = body.len(),
                "forwarding invocation"
            );
            let (result, timings) = self.client.send(&body).await;
            self.report_sample(start_remaining, timings);

            match result {
                Ok(payload) => return Ok(payload),
                Err(ProxyError::Worker(failure)) => {
                    // The worker answered; it is healthy even if the handler
                    // was not. No respawn accounting.
                    return Err(failure.into());
                }
                Err(ProxyError::Transport(e)) => {
                    if worker_exited(&mut state) {
                        tracing::warn!(error = %e, "worker died mid-exchange, retrying invocation");
                        if self.record_failure(&mut state) {
                            return Err(InvocationError::FailureBudgetExhausted);
                        }
                        continue;
                    }
                    return Err(InvocationError::Transport(e));
                }
            }
        }
    }

    /// Kill and reap the worker. Call on supervisor shutdown so no worker
    /// process outlives its parent.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut child) = state.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            tracing::info!("worker terminated on shutdown");
        }
    }

    /// Make sure a ready worker exists, spawning one if needed.
    ///
    /// Returns which lifecycle counter the attempt should emit, or `Err` on
    /// the process-failure path (spawn error, exit before readiness, dead
    /// worker found on reuse).
    async fn ensure_worker(&self, state: &mut WorkerState) -> Result<LifecycleEvent, ()> {
        if state.child.is_some() {
            if worker_exited(state) {
                tracing::warn!("worker found dead before forward");
                return Err(());
            }
            return Ok(LifecycleEvent::Reused);
        }

        // Listener first: a worker that binds fast must not signal into the void.
        let ready = match ReadySignal::register() {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!(error = %e, "failed to register readiness listener");
                return Err(());
            }
        };

        tracing::info!(
            worker = %self.config.worker_path.display(),
            level = %self.config.log_level,
            signal_pid = std::process::id(),
            "launching worker"
        );
        let mut child = match self.spawner.spawn(&self.config) {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(error = %e, "worker spawn failed");
                return Err(());
            }
        };

        // No readiness timeout by design: a worker that never signals is only
        // ever detected through its own exit.
        let became_ready = tokio::select! {
            _ = ready.wait() => true,
            status = child.wait() => {
                tracing::error!(?status, "worker exited before readiness signal");
                false
            }
        };

        if became_ready {
            tracing::info!("worker ready");
            state.child = Some(child);
            Ok(LifecycleEvent::Created)
        } else {
            Err(())
        }
    }

    /// Failure path shared by spawn errors, pre-readiness exits, and crashes.
    ///
    /// Returns true when the budget is spent, after firing the fatal-exit
    /// hook. The counter is deliberately never reset on success.
    fn record_failure(&self, state: &mut WorkerState) -> bool {
        state.consecutive_failures += 1;
        self.reporter
            .counter(&self.config.path, LifecycleEvent::Terminated);

        if let Some(mut child) = state.child.take() {
            let _ = child.start_kill();
        }

        if state.consecutive_failures >= self.config.failure_budget {
            tracing::error!(
                failures = state.consecutive_failures,
                "failure budget exhausted, terminating supervisor"
            );
            self.fatal.exit();
            return true;
        }
        tracing::warn!(
            failures = state.consecutive_failures,
            budget = self.config.failure_budget,
            "worker failure, respawning"
        );
        false
    }

    fn report_sample(&self, start_remaining: Option<u64>, timings: ExchangeTimings) {
        self.reporter.sample(
            &self.config.path,
            MetricSample {
                uptime: self.started_at.elapsed(),
                start_remaining_time_in_millis: start_remaining,
                response_length: timings.response_length,
                open_socket: timings.socket_open,
                request_complete: timings.request_complete,
                response_complete: timings.response_complete,
            },
        );
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Best effort: kill_on_drop on the child covers the rest.
        if let Ok(mut state) = self.state.try_lock()
            && let Some(child) = state.child.as_mut()
        {
            let _ = child.start_kill();
        }
    }
}

fn worker_exited(state: &mut WorkerState) -> bool {
    match state.child.as_mut().map(|c| c.try_wait()) {
        Some(Ok(Some(_))) | Some(Err(_)) => true,
        Some(Ok(None)) => false,
        None => true,
    }
}

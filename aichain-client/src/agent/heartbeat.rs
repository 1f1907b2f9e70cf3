use std::sync::Arc;
use std::time::Duration;

use aichain_shared::device::GpuDevice;
use aichain_shared::heartbeat::HeartbeatRequest;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::gpu::{self, GpuProbe, describe_gpus};
use crate::agent::outcome::classify;
use crate::agent::sink::{StatusLine, StatusSender};
use crate::auth::ApiKey;
use crate::config::HeartbeatSettings;
use crate::server::HeartbeatClient;
use crate::util::format::timestamp;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("API key and wallet required")]
    MissingCredentials,
    #[error("heartbeat interval must be greater than zero")]
    ZeroInterval,
    #[error("failed to prepare heartbeat client: {0}")]
    Client(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

struct ActiveLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the single background heartbeat loop of this process.
pub struct HeartbeatAgent {
    settings: HeartbeatSettings,
    probe: Arc<dyn GpuProbe>,
    sink: StatusSender,
    state: Arc<RwLock<LoopState>>,
    active: Mutex<Option<ActiveLoop>>,
}

impl HeartbeatAgent {
    pub fn new(settings: HeartbeatSettings, probe: Arc<dyn GpuProbe>, sink: StatusSender) -> Self {
        Self {
            settings,
            probe,
            sink,
            state: Arc::new(RwLock::new(LoopState::Idle)),
            active: Mutex::new(None),
        }
    }

    /// Spawns the loop unless one is still alive. A loop that was asked to
    /// stop but has a request in flight still counts as alive.
    pub async fn start(&self, api_key: ApiKey, wallet: &str) -> Result<StartOutcome, AgentError> {
        if api_key.is_empty() || wallet.trim().is_empty() {
            return Err(AgentError::MissingCredentials);
        }
        if self.settings.interval.is_zero() {
            return Err(AgentError::ZeroInterval);
        }

        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            if !current.task.is_finished() {
                debug!("Heartbeat loop already running");
                return Ok(StartOutcome::AlreadyRunning);
            }
        }

        let client =
            HeartbeatClient::new(&self.settings).map_err(|e| AgentError::Client(format!("{e:#}")))?;

        info!(
            endpoint = client.endpoint(),
            %api_key,
            wallet,
            "Heartbeat started (every {}s)",
            self.settings.interval.as_secs()
        );

        let ctx = TickContext {
            client,
            probe: Arc::clone(&self.probe),
            sink: self.sink.clone(),
            sample_timeout: self.settings.sample_timeout,
            api_key,
            wallet: wallet.to_string(),
        };
        let cancel = CancellationToken::new();
        *self.state.write().await = LoopState::Running;

        let task = tokio::spawn(run_loop(
            ctx,
            self.settings.interval,
            cancel.clone(),
            Arc::clone(&self.state),
        ));
        *active = Some(ActiveLoop { cancel, task });

        Ok(StartOutcome::Started)
    }

    /// Requests a stop. An in-flight request is allowed to finish; no new
    /// tick begins afterwards. Calling it again is harmless.
    pub async fn stop(&self) {
        let active = self.active.lock().await;
        let Some(current) = active.as_ref() else {
            return;
        };

        if !current.cancel.is_cancelled() {
            info!("Stopping heartbeat loop");
            current.cancel.cancel();
        }

        let mut state = self.state.write().await;
        if *state == LoopState::Running {
            *state = LoopState::Stopping;
        }
    }

    /// Stops and waits for the loop task to exit.
    pub async fn shutdown(&self) {
        self.stop().await;

        let task = self.active.lock().await.take().map(|a| a.task);
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Heartbeat loop task failed: {}", e);
            }
        }
    }

    pub async fn state(&self) -> LoopState {
        *self.state.read().await
    }

    pub async fn is_running(&self) -> bool {
        self.state().await == LoopState::Running
    }
}

struct TickContext {
    client: HeartbeatClient,
    probe: Arc<dyn GpuProbe>,
    sink: StatusSender,
    sample_timeout: Duration,
    api_key: ApiKey,
    wallet: String,
}

impl TickContext {
    /// A probe that outlives `sample_timeout` is abandoned and the tick
    /// reports no GPU.
    async fn sample_devices(&self) -> Vec<GpuDevice> {
        let probe = Arc::clone(&self.probe);
        let sampling = tokio::task::spawn_blocking(move || gpu::sample(probe.as_ref()));

        match tokio::time::timeout(self.sample_timeout, sampling).await {
            Ok(Ok(devices)) => devices,
            Ok(Err(e)) => {
                warn!("GPU sampling task failed: {}", e);
                Vec::new()
            }
            Err(_) => {
                warn!("GPU sampling exceeded {:?}, reporting no GPU", self.sample_timeout);
                Vec::new()
            }
        }
    }

    /// sample -> send -> classify -> one status line
    async fn tick(&self) -> StatusLine {
        let devices = self.sample_devices().await;

        let gpu_desc = describe_gpus(&devices);
        let req = HeartbeatRequest::new(&self.wallet, &devices);
        let ts = timestamp();

        let result = self.client.post_heartbeat(&self.api_key, &req).await;
        let outcome = classify(result, self.client.timeout());
        let message = outcome.render(&gpu_desc);

        if outcome.is_ok() {
            info!(gpu_count = req.gpu_count, "Heartbeat {}", message);
        } else {
            warn!(gpu_count = req.gpu_count, "Heartbeat {}", message);
        }

        StatusLine::new(outcome.is_ok(), format!("{ts} {message}"))
    }
}

async fn run_loop(
    ctx: TickContext,
    interval: Duration,
    cancel: CancellationToken,
    state: Arc<RwLock<LoopState>>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let line = ctx.tick().await;
        ctx.sink.push(line);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    *state.write().await = LoopState::Stopped;
    info!("Heartbeat loop stopped");
}

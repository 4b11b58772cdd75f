//! Process supervisor for the ACE-Step engine
//!
//! Owns the engine subprocess and the connection state machine:
//!
//! ```text
//! Stopped --start--> Starting --healthy--> Healthy --probe fails--> Unhealthy
//!    ^                  |                                              |
//!    +--timeout/exit----+            Restarting <-----restart----------+
//! ```
//!
//! At most one launch is in flight at a time. Callers that arrive while a
//! start is running wait for it and share its outcome. Start, stop and
//! restart run on spawned tasks so a dropped caller can never leave the
//! engine half-started or half-stopped.

pub mod health;
pub mod process;

pub use health::{HealthProbe, HttpHealthProbe, HEALTH_CHECK_TIMEOUT};
pub use process::{
    discover_command, find_in_path, ChildProcess, CommandLauncher, EngineLauncher, EngineProcess,
    LaunchCommand, ProcessExit,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::{sleep, timeout, Instant};
use tracing::{error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Grace period between terminate and kill.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Healthy,
    Unhealthy,
    Restarting,
}

impl SupervisorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Stopped => "stopped",
            SupervisorState::Starting => "starting",
            SupervisorState::Healthy => "healthy",
            SupervisorState::Unhealthy => "unhealthy",
            SupervisorState::Restarting => "restarting",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor tuning
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub upstream_url: String,
    pub auto_start: bool,
    pub startup_timeout: Duration,
    pub health_check_interval: Duration,
    pub stop_timeout: Duration,
}

impl From<&BridgeConfig> for SupervisorConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            upstream_url: config.upstream_url.clone(),
            auto_start: config.auto_start,
            startup_timeout: config.startup_timeout,
            health_check_interval: config.health_check_interval,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

/// Supervises one ACE-Step instance.
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: SupervisorConfig,
    probe: Arc<dyn HealthProbe>,
    launcher: Arc<dyn EngineLauncher>,
    state: watch::Sender<SupervisorState>,
    process: Mutex<Option<Box<dyn EngineProcess>>>,
    /// Held for the whole of a start or restart; stores the last outcome.
    start_slot: Mutex<bool>,
    /// Bumped when a start or restart finishes.
    generation: AtomicU64,
    /// Bumped by every stop. A start begun before the bump gives up.
    stop_epoch: AtomicU64,
    last_error: std::sync::Mutex<Option<String>>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        probe: Arc<dyn HealthProbe>,
        launcher: Arc<dyn EngineLauncher>,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Stopped);
        Self {
            inner: Arc::new(Inner {
                config,
                probe,
                launcher,
                state,
                process: Mutex::new(None),
                start_slot: Mutex::new(false),
                generation: AtomicU64::new(0),
                stop_epoch: AtomicU64::new(0),
                last_error: std::sync::Mutex::new(None),
            }),
        }
    }

    /// Supervisor probing `{upstream}/health` and launching the local engine.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let probe = HttpHealthProbe::new(&config.upstream_url)
            .map_err(|e| BridgeError::Internal(format!("failed to build health client: {}", e)))?;
        let launcher = CommandLauncher::from_config(config);
        Ok(Self::new(
            SupervisorConfig::from(config),
            Arc::new(probe),
            Arc::new(launcher),
        ))
    }

    pub fn state(&self) -> SupervisorState {
        *self.inner.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.inner.state.subscribe()
    }

    pub fn auto_start(&self) -> bool {
        self.inner.config.auto_start
    }

    pub fn upstream_url(&self) -> &str {
        &self.inner.config.upstream_url
    }

    /// Why the last start attempt failed, if it did.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// True while a subprocess launched by this supervisor is alive.
    pub async fn is_running(&self) -> bool {
        let mut guard = self.inner.process.lock().await;
        match guard.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Single bounded probe. Never fails; a transport error is `false`.
    pub async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    /// Make sure the engine is serving, starting it if allowed.
    pub async fn ensure_running(&self) -> bool {
        if self.health_check().await {
            return true;
        }
        if !self.inner.config.auto_start {
            return false;
        }
        self.start().await
    }

    /// Launch the engine and wait until it is healthy.
    ///
    /// Joins a start that is already in flight instead of launching again.
    pub async fn start(&self) -> bool {
        let inner = self.inner.clone();
        let observed = inner.generation.load(Ordering::SeqCst);
        let epoch = inner.stop_epoch.load(Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let mut last = inner.start_slot.lock().await;
            if inner.generation.load(Ordering::SeqCst) != observed {
                return *last;
            }
            let ok = inner.launch_and_wait(epoch).await;
            *last = ok;
            inner.generation.fetch_add(1, Ordering::SeqCst);
            ok
        });
        match task.await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "engine start task failed");
                false
            }
        }
    }

    /// Terminate the engine. Idempotent.
    ///
    /// A start or restart in flight is abandoned and shuts down whatever it
    /// launched.
    pub async fn stop(&self) {
        let inner = self.inner.clone();
        inner.stop_epoch.fetch_add(1, Ordering::SeqCst);
        let task = tokio::spawn(async move {
            inner.shutdown_process().await;
            inner.set_state(SupervisorState::Stopped);
        });
        if let Err(e) = task.await {
            error!(error = %e, "engine stop task failed");
        }
    }

    /// Stop then start, holding off concurrent starts throughout.
    pub async fn restart(&self) -> bool {
        let inner = self.inner.clone();
        let epoch = inner.stop_epoch.load(Ordering::SeqCst);
        let task = tokio::spawn(async move {
            let mut last = inner.start_slot.lock().await;
            if inner.stopped_since(epoch) {
                *last = inner.abandon_start().await;
                return false;
            }
            info!("Restarting ACE-Step");
            inner.set_state(SupervisorState::Restarting);
            inner.shutdown_process().await;
            let ok = inner.launch_and_wait(epoch).await;
            *last = ok;
            inner.generation.fetch_add(1, Ordering::SeqCst);
            ok
        });
        match task.await {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "engine restart task failed");
                false
            }
        }
    }
}

impl Inner {
    fn set_state(&self, next: SupervisorState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            info!(from = %state, to = %next, "supervisor state change");
            *state = next;
            true
        });
    }

    fn stopped_since(&self, epoch: u64) -> bool {
        self.stop_epoch.load(Ordering::SeqCst) != epoch
    }

    /// Moves a start forward unless a stop has happened since `epoch`.
    ///
    /// The check runs inside the watch lock, which `stop` also takes to
    /// publish `Stopped`, so the two cannot interleave.
    fn advance(&self, epoch: u64, next: SupervisorState) -> bool {
        let mut allowed = false;
        self.state.send_if_modified(|state| {
            if self.stopped_since(epoch) {
                return false;
            }
            allowed = true;
            if *state == next {
                return false;
            }
            info!(from = %state, to = %next, "supervisor state change");
            *state = next;
            true
        });
        allowed
    }

    /// A stop arrived mid-start: undo the launch and report failure.
    async fn abandon_start(&self) -> bool {
        info!("ACE-Step start cancelled by stop");
        self.record_error(Some("ACE-Step start was cancelled by stop".to_string()));
        self.shutdown_process().await;
        self.set_state(SupervisorState::Stopped);
        false
    }

    fn record_error(&self, message: Option<String>) {
        if let Ok(mut slot) = self.last_error.lock() {
            *slot = message;
        }
    }

    async fn health_check(&self) -> bool {
        let healthy = self.probe.probe().await;
        // Starting and Restarting belong to the start loop.
        self.state.send_if_modified(|state| {
            let next = match (*state, healthy) {
                (SupervisorState::Healthy, false) => SupervisorState::Unhealthy,
                (SupervisorState::Stopped | SupervisorState::Unhealthy, true) => {
                    SupervisorState::Healthy
                }
                _ => return false,
            };
            info!(from = %state, to = %next, "supervisor state change");
            *state = next;
            true
        });
        if healthy {
            self.record_error(None);
        }
        healthy
    }

    /// Caller holds `start_slot`. `epoch` is the stop epoch seen when the
    /// start was requested.
    async fn launch_and_wait(&self, epoch: u64) -> bool {
        if self.probe.probe().await {
            if !self.advance(epoch, SupervisorState::Healthy) {
                return self.abandon_start().await;
            }
            info!(url = %self.config.upstream_url, "ACE-Step already running");
            self.record_error(None);
            return true;
        }
        if self.stopped_since(epoch) {
            return self.abandon_start().await;
        }

        // A leftover process that stopped answering is replaced, not reused.
        self.shutdown_process().await;
        if !self.advance(epoch, SupervisorState::Starting) {
            return self.abandon_start().await;
        }

        let process = match self.launcher.launch() {
            Ok(process) => process,
            Err(e) => {
                error!(error = %e, "Failed to start ACE-Step");
                self.record_error(Some(format!("failed to launch ACE-Step: {}", e)));
                self.set_state(SupervisorState::Stopped);
                return false;
            }
        };
        info!(pid = ?process.id(), "ACE-Step process started");
        *self.process.lock().await = Some(process);

        let startup_timeout = self.config.startup_timeout;
        let deadline = Instant::now() + startup_timeout;
        loop {
            if self.stopped_since(epoch) {
                return self.abandon_start().await;
            }
            if let Some(reason) = self.check_exited().await {
                error!(reason = %reason, "ACE-Step exited during startup");
                self.record_error(Some(reason));
                self.set_state(SupervisorState::Stopped);
                return false;
            }

            if self.probe.probe().await {
                if !self.advance(epoch, SupervisorState::Healthy) {
                    return self.abandon_start().await;
                }
                info!(url = %self.config.upstream_url, "ACE-Step is healthy");
                self.record_error(None);
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.config.health_check_interval.min(deadline - now)).await;
        }

        let reason = format!(
            "ACE-Step did not become healthy within {}s",
            startup_timeout.as_secs()
        );
        error!("{}", reason);
        self.record_error(Some(reason));
        self.shutdown_process().await;
        self.set_state(SupervisorState::Stopped);
        false
    }

    /// Reaps the process if it has exited; returns why.
    async fn check_exited(&self) -> Option<String> {
        let mut guard = self.process.lock().await;
        let process = match guard.as_mut() {
            Some(process) => process,
            None => return Some("ACE-Step was stopped during startup".to_string()),
        };

        match process.try_wait() {
            Ok(Some(exit)) => {
                let stderr = process.stderr_tail().await;
                *guard = None;
                if stderr.is_empty() {
                    Some(format!("ACE-Step exited ({})", exit))
                } else {
                    Some(format!("ACE-Step exited ({}): {}", exit, stderr))
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "could not poll ACE-Step process");
                None
            }
        }
    }

    /// Terminate, wait, then kill.
    async fn shutdown_process(&self) {
        let taken = self.process.lock().await.take();
        let mut process = match taken {
            Some(process) => process,
            None => return,
        };

        info!(pid = ?process.id(), "Stopping ACE-Step");
        if let Err(e) = process.request_terminate() {
            warn!(error = %e, "terminate signal failed");
        }

        match timeout(self.config.stop_timeout, process.wait()).await {
            Ok(Ok(exit)) => info!(%exit, "ACE-Step stopped"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for ACE-Step to exit"),
            Err(_) => {
                warn!(
                    "ACE-Step did not stop within {}s, killing",
                    self.config.stop_timeout.as_secs()
                );
                if let Err(e) = process.force_kill() {
                    warn!(error = %e, "kill failed");
                }
                let _ = process.wait().await;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    // ============================================================================
    // Start
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_ensure_running_launches_once() {
        let engine = FakeEngine::new(Duration::from_secs(10));
        let sup = supervisor(&engine, config(true));

        let (a, b) = tokio::join!(sup.ensure_running(), sup.ensure_running());

        assert!(a);
        assert!(b);
        assert_eq!(engine.launches(), 1);
        assert_eq!(sup.state(), SupervisorState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_waiters_share_one_start() {
        let engine = FakeEngine::new(Duration::from_secs(20));
        let sup = supervisor(&engine, config(true));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sup = sup.clone();
                tokio::spawn(async move { sup.ensure_running().await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_timeout_leaves_stopped() {
        let engine = FakeEngine::new(Duration::from_secs(3600));
        let mut cfg = config(true);
        cfg.startup_timeout = Duration::from_secs(30);
        let sup = supervisor(&engine, cfg);

        assert!(!sup.start().await);
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(!engine.is_alive(), "timed-out engine must be shut down");
        assert!(sup.last_error().unwrap().contains("30s"));
        assert!(!sup.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_exit_reports_stderr() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        engine.exit_on_launch.store(true, Ordering::SeqCst);
        let sup = supervisor(&engine, config(true));

        assert!(!sup.ensure_running().await);
        assert_eq!(sup.state(), SupervisorState::Stopped);
        let reason = sup.last_error().unwrap();
        assert!(reason.contains("exit code 1"));
        assert!(reason.contains("CUDA out of memory"));

        // No automatic retry.
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_start_disabled() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        let sup = supervisor(&engine, config(false));

        assert!(!sup.ensure_running().await);
        assert_eq!(engine.launches(), 0);
        assert_eq!(sup.state(), SupervisorState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_engine_is_adopted() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        engine.external.store(true, Ordering::SeqCst);
        let sup = supervisor(&engine, config(false));

        assert!(sup.ensure_running().await);
        assert_eq!(engine.launches(), 0);
        assert_eq!(sup.state(), SupervisorState::Healthy);
    }

    // ============================================================================
    // Health transitions
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_healthy_to_unhealthy_then_relaunch() {
        let engine = FakeEngine::new(Duration::from_secs(5));
        let sup = supervisor(&engine, config(true));

        assert!(sup.ensure_running().await);
        assert_eq!(sup.state(), SupervisorState::Healthy);

        engine.crash();
        assert!(!sup.health_check().await);
        assert_eq!(sup.state(), SupervisorState::Unhealthy);

        assert!(sup.ensure_running().await);
        assert_eq!(engine.launches(), 2);
        assert_eq!(sup.state(), SupervisorState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_changes_are_observable() {
        let engine = FakeEngine::new(Duration::from_secs(5));
        let sup = supervisor(&engine, config(true));
        let mut rx = sup.subscribe();

        let waiter = tokio::spawn(async move {
            rx.wait_for(|s| *s == SupervisorState::Healthy).await.is_ok()
        });
        assert!(sup.start().await);
        assert!(waiter.await.unwrap());
    }

    // ============================================================================
    // Stop / restart
    // ============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        let sup = supervisor(&engine, config(true));

        sup.stop().await;
        assert_eq!(sup.state(), SupervisorState::Stopped);

        assert!(sup.start().await);
        assert!(sup.is_running().await);

        sup.stop().await;
        sup.stop().await;
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(!engine.is_alive());
        assert!(!sup.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_force_kills_stubborn_engine() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        engine.ignore_terminate.store(true, Ordering::SeqCst);
        let sup = supervisor(&engine, config(true));

        assert!(sup.start().await);
        let started = Instant::now();
        sup.stop().await;

        assert!(!engine.is_alive());
        assert!(started.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_relaunches() {
        let engine = FakeEngine::new(Duration::from_secs(2));
        let sup = supervisor(&engine, config(true));

        assert!(sup.start().await);
        assert!(sup.restart().await);
        assert_eq!(engine.launches(), 2);
        assert_eq!(sup.state(), SupervisorState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_first_probe_cancels_start() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        let sup = slow_supervisor(&engine, config(true), Duration::from_secs(5));

        let starting = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start().await })
        };
        sleep(Duration::from_secs(1)).await;
        sup.stop().await;
        assert_eq!(sup.state(), SupervisorState::Stopped);

        assert!(!starting.await.unwrap());
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert_eq!(engine.launches(), 0);
        assert!(!engine.is_alive());
        assert!(sup.last_error().unwrap().contains("cancelled"));

        // A start requested after the stop goes ahead.
        assert!(sup.start().await);
        assert_eq!(sup.state(), SupervisorState::Healthy);
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_polling_shuts_down_launched_engine() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        let sup = slow_supervisor(&engine, config(true), Duration::from_secs(5));

        let starting = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start().await })
        };
        // Launched at 5s, second probe answers at 10s.
        sleep(Duration::from_secs(7)).await;
        assert_eq!(sup.state(), SupervisorState::Starting);
        assert_eq!(engine.launches(), 1);

        sup.stop().await;

        assert!(!starting.await.unwrap());
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(!engine.is_alive());
        assert!(!sup.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_restart() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        let sup = slow_supervisor(&engine, config(true), Duration::from_secs(5));

        let restarting = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.restart().await })
        };
        sleep(Duration::from_secs(1)).await;
        sup.stop().await;

        assert!(!restarting.await.unwrap());
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(!engine.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_start_in_flight() {
        let engine = FakeEngine::new(Duration::from_secs(2));
        let sup = supervisor(&engine, config(true));

        let starting = {
            let sup = sup.clone();
            tokio::spawn(async move { sup.start().await })
        };
        sleep(Duration::from_secs(1)).await;
        assert_eq!(sup.state(), SupervisorState::Starting);

        assert!(sup.restart().await);
        assert!(starting.await.unwrap());
        assert_eq!(engine.launches(), 2);
        assert_eq!(sup.state(), SupervisorState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_probe_clears_last_error() {
        let engine = FakeEngine::new(Duration::from_secs(1));
        engine.exit_on_launch.store(true, Ordering::SeqCst);
        let sup = supervisor(&engine, config(false));

        assert!(!sup.restart().await);
        assert!(sup.last_error().is_some());

        engine.external.store(true, Ordering::SeqCst);
        assert!(sup.health_check().await);
        assert_eq!(sup.last_error(), None);
    }

    #[test]
    fn test_state_serialization() {
        assert_eq!(
            serde_json::to_value(SupervisorState::Restarting).unwrap(),
            "restarting"
        );
        assert_eq!(SupervisorState::Healthy.to_string(), "healthy");
    }
}

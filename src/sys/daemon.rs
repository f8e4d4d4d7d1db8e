// src/sys/daemon.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ProvisionError, ProvisionResult};
use crate::sys::traits::CommandRunner;

const INITIAL_BACKOFF: Duration = Duration::from_millis(50);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Reads the master PID from `pid_file` and checks the process is alive.
pub async fn pid_alive(pid_file: &Path) -> bool {
    let Ok(raw) = tokio::fs::read_to_string(pid_file).await else {
        return false;
    };
    let Ok(pid) = raw.trim().parse::<i32>() else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    // Signal 0: existence check only. EPERM still means the process exists.
    matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
}

/// Thin wrapper over `nginx` and `systemctl`.
pub struct DaemonController {
    runner: Arc<dyn CommandRunner>,
    service: String,
    pid_file: PathBuf,
}

impl DaemonController {
    pub fn new(runner: Arc<dyn CommandRunner>, service: String, pid_file: PathBuf) -> Self {
        Self {
            runner,
            service,
            pid_file,
        }
    }

    /// `nginx -t`. A failing check is a `ConfigValidation` error carrying
    /// nginx's own diagnostics.
    pub async fn test_config(&self) -> ProvisionResult<()> {
        let out = self.runner.run("nginx", &["-t"]).await?;
        if out.success() {
            debug!("nginx configuration test passed");
            return Ok(());
        }
        let detail = out.stderr.trim().to_string();
        error!(detail = %detail, "nginx configuration test failed");
        Err(ProvisionError::ConfigValidation(detail))
    }

    async fn systemctl(&self, action: &str) -> ProvisionResult<()> {
        self.runner
            .run_checked("systemctl", &[action, &self.service])
            .await
            .inspect_err(|e| error!(action, error = %e, "systemctl failed"))?;
        info!(action, service = %self.service, "systemctl ok");
        Ok(())
    }

    pub async fn start(&self) -> ProvisionResult<()> {
        self.systemctl("start").await
    }

    pub async fn stop(&self) -> ProvisionResult<()> {
        self.systemctl("stop").await
    }

    /// Syntax check, then a service-manager restart. Both are fatal.
    pub async fn test_and_restart(&self) -> ProvisionResult<()> {
        self.test_config().await?;
        self.systemctl("restart").await
    }

    /// Live reload. Refuses to signal the daemon when the on-disk config is
    /// broken.
    pub async fn reload(&self) -> ProvisionResult<()> {
        self.test_config().await?;
        self.runner
            .run_checked("nginx", &["-s", "reload"])
            .await
            .inspect_err(|e| error!(error = %e, "nginx reload failed"))?;
        info!("nginx configuration reloaded");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        pid_alive(&self.pid_file).await
    }

    /// Polls the PID file with exponential backoff until the master is up or
    /// `budget` runs out.
    pub async fn wait_until_running(&self, budget: Duration) -> bool {
        let ready = self.poll(budget, true).await;
        if !ready {
            warn!(?budget, pid_file = %self.pid_file.display(), "daemon not confirmed running");
        }
        ready
    }

    /// Polls until the master PID is gone or `budget` runs out.
    pub async fn wait_until_stopped(&self, budget: Duration) -> bool {
        let stopped = self.poll(budget, false).await;
        if !stopped {
            warn!(?budget, pid_file = %self.pid_file.display(), "daemon not confirmed stopped");
        }
        stopped
    }

    async fn poll(&self, budget: Duration, want_running: bool) -> bool {
        let deadline = Instant::now() + budget;
        let mut delay = INITIAL_BACKOFF;
        loop {
            if self.is_running().await == want_running {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(MAX_BACKOFF);
        }
    }
}

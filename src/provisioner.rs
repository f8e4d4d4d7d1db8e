// src/provisioner.rs

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::ProvisionerConfig;
use crate::error::ProvisionResult;
use crate::sys::command::SystemCommandRunner;
use crate::sys::daemon::DaemonController;
use crate::sys::domain::Domain;
use crate::sys::init::ConfigInitializer;
use crate::sys::install::{InstallerSettings, SiteInstaller};
use crate::sys::layout::Layout;
use crate::sys::probe::ReachabilityProbe;
use crate::sys::remove::{RemoverSettings, SiteRemover};
use crate::sys::render::{NginxRenderer, SiteSpec};
use crate::sys::traits::{CommandRunner, SiteRenderer};
use crate::sys::user::{ServiceUser, UserResolver};

/// Outcome of a top-level operation. Always fully populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Entry point for every operation. Calls against one host must be
/// serialized by the caller: install and delete both rewrite the shared
/// `nginx.conf` and bounce the single daemon.
pub struct SiteProvisioner {
    users: Arc<UserResolver>,
    initializer: Arc<ConfigInitializer>,
    daemon: Arc<DaemonController>,
    probe: Arc<ReachabilityProbe>,
    installer: SiteInstaller,
    remover: SiteRemover,
}

impl SiteProvisioner {
    pub fn new(config: &ProvisionerConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new(config.command_timeout));
        Self::with_parts(config, Layout::from_config(config), runner, Arc::new(NginxRenderer))
    }

    /// Wires the components together around an injected runner and renderer.
    pub fn with_parts(
        config: &ProvisionerConfig,
        layout: Layout,
        runner: Arc<dyn CommandRunner>,
        renderer: Arc<dyn SiteRenderer>,
    ) -> Self {
        let users = Arc::new(UserResolver::new(runner.clone(), config.redhat_release.clone()));
        let initializer = Arc::new(ConfigInitializer::new(runner.clone(), layout.clone(), users.clone()));
        let daemon = Arc::new(DaemonController::new(
            runner.clone(),
            config.service_name.clone(),
            layout.pid_file.clone(),
        ));
        let probe = Arc::new(ReachabilityProbe::new(
            runner.clone(),
            config.probe_timeout,
            config.status_marker.clone(),
        ));

        let installer = SiteInstaller::new(
            runner.clone(),
            layout.clone(),
            users.clone(),
            initializer.clone(),
            renderer,
            daemon.clone(),
            probe.clone(),
            InstallerSettings {
                status_marker: config.status_marker.clone(),
                start_grace: config.start_grace,
                reload_grace: config.reload_grace,
            },
        );
        let remover = SiteRemover::new(
            runner,
            layout,
            users.clone(),
            daemon.clone(),
            probe.clone(),
            RemoverSettings {
                grace: config.reload_grace,
                max_retries: config.removal_retries,
            },
        );

        Self {
            users,
            initializer,
            daemon,
            probe,
            installer,
            remover,
        }
    }

    pub async fn create_site(&self, spec: &SiteSpec) -> ProvisionResult<OperationResult> {
        let domain = self.installer.create_site(spec).await?;
        info!(domain = %domain, "site created");
        Ok(OperationResult::ok(format!("site {domain} created")))
    }

    pub async fn delete_site(&self, domain: &str) -> ProvisionResult<OperationResult> {
        let domain = self.remover.delete_site(domain).await?;
        info!(domain = %domain, "site deleted");
        Ok(OperationResult::ok(format!("site {domain} deleted")))
    }

    pub async fn reload(&self) -> ProvisionResult<OperationResult> {
        self.daemon
            .reload()
            .await
            .inspect_err(|e| error!(error = %e, "failed to reload nginx"))?;
        Ok(OperationResult::ok("nginx configuration reloaded"))
    }

    pub async fn test_and_restart(&self) -> ProvisionResult<OperationResult> {
        self.daemon.test_and_restart().await?;
        self.users.invalidate();
        Ok(OperationResult::ok("nginx restarted"))
    }

    pub async fn test_config(&self) -> ProvisionResult<OperationResult> {
        self.daemon.test_config().await?;
        Ok(OperationResult::ok("nginx configuration is valid"))
    }

    pub async fn init_base_config(&self) -> ProvisionResult<OperationResult> {
        let user = self.initializer.init_base_config().await?;
        Ok(OperationResult::ok(format!("base configuration written for {user}")))
    }

    pub async fn service_user(&self) -> ServiceUser {
        self.users.service_user().await
    }

    /// Read-only reachability check; a failed probe is a failed result, not
    /// an error.
    pub async fn verify(&self, domain: &str) -> ProvisionResult<OperationResult> {
        let domain = Domain::parse(domain)?;
        Ok(if self.probe.verify_reachable(&domain).await {
            OperationResult::ok(format!("site {domain} is reachable"))
        } else {
            OperationResult::failed(format!("site {domain} is not reachable"))
        })
    }
}

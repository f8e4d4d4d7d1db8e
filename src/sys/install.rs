// src/sys/install.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::fs;
use tracing::{error, info, warn};

use crate::error::{fs_err, ProvisionError, ProvisionResult};
use crate::sys::daemon::DaemonController;
use crate::sys::domain::Domain;
use crate::sys::files::{path_exists, remove_best_effort, remove_path, set_owner_and_mode, write_atomic};
use crate::sys::init::ConfigInitializer;
use crate::sys::layout::Layout;
use crate::sys::probe::ReachabilityProbe;
use crate::sys::render::{render_placeholder_page, SiteSpec};
use crate::sys::traits::{CommandRunner, SiteRenderer};
use crate::sys::user::UserResolver;

pub struct InstallerSettings {
    pub status_marker: String,
    pub start_grace: Duration,
    pub reload_grace: Duration,
}

/// Renders, installs, enables and verifies one site.
pub struct SiteInstaller {
    runner: Arc<dyn CommandRunner>,
    layout: Layout,
    users: Arc<UserResolver>,
    initializer: Arc<ConfigInitializer>,
    renderer: Arc<dyn SiteRenderer>,
    daemon: Arc<DaemonController>,
    probe: Arc<ReachabilityProbe>,
    settings: InstallerSettings,
}

impl SiteInstaller {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        layout: Layout,
        users: Arc<UserResolver>,
        initializer: Arc<ConfigInitializer>,
        renderer: Arc<dyn SiteRenderer>,
        daemon: Arc<DaemonController>,
        probe: Arc<ReachabilityProbe>,
        settings: InstallerSettings,
    ) -> Self {
        Self {
            runner,
            layout,
            users,
            initializer,
            renderer,
            daemon,
            probe,
            settings,
        }
    }

    pub async fn create_site(&self, spec: &SiteSpec) -> ProvisionResult<Domain> {
        let domain = Domain::parse(&spec.domain)?;
        self.install(&domain, spec)
            .await
            .inspect_err(|e| error!(domain = %domain, error = %e, "site creation failed"))?;
        Ok(domain)
    }

    async fn install(&self, domain: &Domain, spec: &SiteSpec) -> ProvisionResult<()> {
        // Rendering is pure; a bad spec must not leave anything behind.
        let config = self.renderer.render_site(spec, &self.layout)?;

        self.initializer.init_base_config().await?;
        let user = self.users.service_user().await;
        let runner = self.runner.as_ref();

        // Document root and the status page verification looks for.
        let site_root = self.layout.site_root(domain);
        fs::create_dir_all(&site_root).await.map_err(|e| fs_err(&site_root, e))?;
        let page = self.layout.placeholder_page(domain);
        if !path_exists(&page).await {
            let html = render_placeholder_page(domain, &self.settings.status_marker, Utc::now());
            write_atomic(&page, &html).await?;
        }
        set_owner_and_mode(runner, &site_root, &user, "755", true).await?;

        let log_dir = &self.layout.log_dir;
        fs::create_dir_all(log_dir).await.map_err(|e| fs_err(log_dir, e))?;
        let owner = user.to_string();
        let log_dir_arg = log_dir.to_string_lossy();
        runner.run_checked("chown", &["-h", "-R", owner.as_str(), &*log_dir_arg]).await?;

        let config_path = self.layout.config_path(domain);
        write_atomic(&config_path, &config).await?;
        set_owner_and_mode(runner, &config_path, &user, "644", false).await?;

        let enabled_path = self.layout.enabled_path(domain);
        remove_path(&enabled_path).await?;
        if let Some(dir) = enabled_path.parent() {
            fs::create_dir_all(dir).await.map_err(|e| fs_err(dir, e))?;
        }
        fs::symlink(&config_path, &enabled_path)
            .await
            .map_err(|e| fs_err(&enabled_path, e))?;
        info!(domain = %domain, config = %config_path.display(), "site config written and enabled");

        // Never restart on a broken config: roll the site back first.
        if let Err(e) = self.daemon.test_config().await {
            warn!(domain = %domain, "rolling back site config after failed test");
            remove_best_effort(&config_path).await;
            remove_best_effort(&enabled_path).await;
            return Err(e);
        }

        self.daemon.test_and_restart().await?;
        self.users.invalidate();
        self.daemon.wait_until_running(self.settings.start_grace).await;

        self.verify_with_reload(domain).await
    }

    /// One probe, then a single reload-and-retry.
    async fn verify_with_reload(&self, domain: &Domain) -> ProvisionResult<()> {
        if self.probe.verify_reachable(domain).await {
            return Ok(());
        }

        error!(domain = %domain, "site unreachable, reloading nginx and retrying once");
        self.daemon.reload().await?;
        self.daemon.wait_until_running(self.settings.reload_grace).await;

        if self.probe.verify_reachable(domain).await {
            return Ok(());
        }
        Err(ProvisionError::VerificationTimeout {
            domain: domain.to_string(),
            attempts: 2,
        })
    }
}

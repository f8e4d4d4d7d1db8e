// src/sys/remove.rs

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tokio::fs;
use tracing::{error, info, warn};

use crate::error::{fs_err, ProvisionError, ProvisionResult};
use crate::sys::daemon::DaemonController;
use crate::sys::domain::Domain;
use crate::sys::files::{path_exists, purge_dir, remove_best_effort, set_owner_and_mode, write_atomic};
use crate::sys::layout::Layout;
use crate::sys::probe::ReachabilityProbe;
use crate::sys::traits::CommandRunner;
use crate::sys::user::{ServiceUser, UserResolver};

/// Drops every line in which `domain` appears as a whole hostname. Longer
/// names that merely contain it (`www.example.com`, `example.com.evil`,
/// `myexample.com`) are left alone. Returns the new text and the number of
/// lines removed.
pub fn strip_domain_references(content: &str, domain: &Domain) -> (String, usize) {
    let token = Regex::new(&format!(
        r"(?i)(?:^|[^a-z0-9.-]){}(?:$|[^a-z0-9.-])",
        regex::escape(domain.as_str())
    ));
    // A validated domain always yields a valid pattern.
    let Ok(token) = token else {
        return (content.to_string(), 0);
    };

    let mut removed = 0;
    let kept = content
        .split_inclusive('\n')
        .filter(|line| {
            let hit = token.is_match(line.trim_end_matches(['\n', '\r']));
            if hit {
                removed += 1;
            }
            !hit
        })
        .collect();
    (kept, removed)
}

pub struct RemoverSettings {
    pub grace: Duration,
    pub max_retries: u32,
}

/// Tears a site down and makes sure nginx stops answering for it.
pub struct SiteRemover {
    runner: Arc<dyn CommandRunner>,
    layout: Layout,
    users: Arc<UserResolver>,
    daemon: Arc<DaemonController>,
    probe: Arc<ReachabilityProbe>,
    settings: RemoverSettings,
}

impl SiteRemover {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        layout: Layout,
        users: Arc<UserResolver>,
        daemon: Arc<DaemonController>,
        probe: Arc<ReachabilityProbe>,
        settings: RemoverSettings,
    ) -> Self {
        Self {
            runner,
            layout,
            users,
            daemon,
            probe,
            settings,
        }
    }

    pub async fn delete_site(&self, raw_domain: &str) -> ProvisionResult<Domain> {
        let domain = Domain::parse(raw_domain)?;
        if let Err(e) = self.remove(&domain).await {
            error!(domain = %domain, error = %e, "site removal failed");
            // Availability over atomicity: never leave nginx down.
            if let Err(start_err) = self.daemon.start().await {
                warn!(error = %start_err, "could not bring nginx back up after failed removal");
            }
            return Err(e);
        }
        Ok(domain)
    }

    async fn remove(&self, domain: &Domain) -> ProvisionResult<()> {
        // Stop first so nothing is served from a half-deleted tree.
        self.daemon.stop().await?;
        self.daemon.wait_until_stopped(self.settings.grace).await;
        info!("nginx stopped");

        for path in self.layout.site_artifacts(domain) {
            remove_best_effort(&path).await;
        }

        for dir in &self.layout.cache_dirs {
            match purge_dir(dir).await {
                Ok(true) => info!(dir = %dir.display(), "purged cache directory"),
                Ok(false) => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "failed to purge cache directory"),
            }
        }

        let user = self.users.service_user().await;
        for dir in &self.layout.cache_dirs {
            if path_exists(dir).await {
                set_owner_and_mode(self.runner.as_ref(), dir, &user, "755", true).await?;
            }
        }

        self.strip_main_config(domain, &user).await?;

        self.cycle().await?;
        info!("nginx restarted");

        self.confirm_unreachable(domain).await
    }

    /// Backs up `nginx.conf`, removes lines naming the domain, and restores
    /// the backup if the result does not pass `nginx -t`. Only a backup taken
    /// by this call is ever restored.
    async fn strip_main_config(&self, domain: &Domain, user: &ServiceUser) -> ProvisionResult<()> {
        let main = self.layout.main_config();
        let backup = self.layout.main_config_backup();

        let mut backed_up = false;
        if path_exists(&main).await {
            fs::copy(&main, &backup).await.map_err(|e| fs_err(&backup, e))?;
            backed_up = true;

            let original = fs::read_to_string(&main).await.map_err(|e| fs_err(&main, e))?;
            let (stripped, removed) = strip_domain_references(&original, domain);
            if removed > 0 {
                let permissions = fs::metadata(&main)
                    .await
                    .map_err(|e| fs_err(&main, e))?
                    .permissions();
                write_atomic(&main, &stripped).await?;
                // The temp file lands with 0600; carry the old mode over.
                fs::set_permissions(&main, permissions)
                    .await
                    .map_err(|e| fs_err(&main, e))?;
                set_owner_and_mode(self.runner.as_ref(), &main, user, "644", false).await?;
                info!(domain = %domain, removed, "removed domain references from nginx.conf");
            }
        }

        if let Err(e) = self.daemon.test_config().await {
            if backed_up {
                fs::rename(&backup, &main).await.map_err(|e| fs_err(&main, e))?;
                warn!("restored nginx.conf from backup");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Full stop/start, not a reload.
    async fn cycle(&self) -> ProvisionResult<()> {
        self.daemon.stop().await?;
        self.daemon.wait_until_stopped(self.settings.grace).await;
        self.daemon.start().await?;
        self.users.invalidate();
        self.daemon.wait_until_running(self.settings.grace).await;
        Ok(())
    }

    async fn confirm_unreachable(&self, domain: &Domain) -> ProvisionResult<()> {
        let retries = self.settings.max_retries;
        for attempt in 0..=retries {
            if !self.probe.still_served(domain).await {
                info!(domain = %domain, "domain no longer served");
                return Ok(());
            }
            if attempt == retries {
                break;
            }
            warn!(domain = %domain, attempt = attempt + 1, "domain still served, forcing restart");
            self.cycle().await?;
        }
        Err(ProvisionError::StillReachable {
            domain: domain.to_string(),
            attempts: retries,
        })
    }
}

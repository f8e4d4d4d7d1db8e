// src/sys/init.rs

use std::sync::Arc;

use tokio::fs;
use tracing::{error, info};

use crate::error::{fs_err, ProvisionResult};
use crate::sys::files::{remove_path, set_owner_and_mode, write_atomic};
use crate::sys::layout::Layout;
use crate::sys::render::{render_default_server, render_main_config};
use crate::sys::traits::CommandRunner;
use crate::sys::user::{ServiceUser, UserResolver};

/// Lays down the base directory tree, the global `nginx.conf` and the
/// catch-all default server. Overwrites on every call.
pub struct ConfigInitializer {
    runner: Arc<dyn CommandRunner>,
    layout: Layout,
    users: Arc<UserResolver>,
}

impl ConfigInitializer {
    pub fn new(runner: Arc<dyn CommandRunner>, layout: Layout, users: Arc<UserResolver>) -> Self {
        Self { runner, layout, users }
    }

    pub async fn init_base_config(&self) -> ProvisionResult<ServiceUser> {
        self.run()
            .await
            .inspect_err(|e| error!(error = %e, "failed to initialise nginx base configuration"))
    }

    async fn run(&self) -> ProvisionResult<ServiceUser> {
        let user = self.users.service_user().await;
        info!(user = %user, "using nginx service user");

        for dir in self.layout.base_dirs() {
            fs::create_dir_all(&dir).await.map_err(|e| fs_err(&dir, e))?;
            set_owner_and_mode(self.runner.as_ref(), &dir, &user, "755", false).await?;
        }

        let main_config = self.layout.main_config();
        write_atomic(&main_config, &render_main_config(&user, &self.layout)).await?;
        set_owner_and_mode(self.runner.as_ref(), &main_config, &user, "644", false).await?;

        if remove_path(&self.layout.default_enabled_site()).await? {
            info!("disabled stock default site");
        }

        let default_conf = self.layout.default_server_conf();
        write_atomic(&default_conf, render_default_server()).await?;
        set_owner_and_mode(self.runner.as_ref(), &default_conf, &user, "644", false).await?;

        info!("nginx base configuration initialised");
        Ok(user)
    }
}

// src/sys/user.rs

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::sys::traits::CommandRunner;

const NOBODY: &str = "nobody";

/// The account nginx workers run as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUser {
    pub user: String,
    pub group: String,
}

impl ServiceUser {
    pub fn new(user: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            group: group.into(),
        }
    }

    pub fn nobody() -> Self {
        Self::new(NOBODY, NOBODY)
    }

    pub fn is_nobody(&self) -> bool {
        self.user == NOBODY
    }

    /// Argument for nginx's `user` directive (`user group`).
    pub fn nginx_directive(&self) -> String {
        format!("{} {}", self.user, self.group)
    }
}

/// `user:group`, as `chown` expects it.
impl fmt::Display for ServiceUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user, self.group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    RedHat,
    Debian,
}

impl OsFamily {
    pub fn default_account(self) -> &'static str {
        match self {
            OsFamily::RedHat => "nginx",
            OsFamily::Debian => "www-data",
        }
    }

    pub fn nologin_shell(self) -> &'static str {
        match self {
            OsFamily::RedHat => "/sbin/nologin",
            OsFamily::Debian => "/usr/sbin/nologin",
        }
    }
}

/// Owner of the first running nginx worker in `ps aux` output. The master
/// process runs as root and is skipped.
pub fn worker_owner(ps_output: &str) -> Option<String> {
    ps_output.lines().skip(1).find_map(|line| {
        let mut cols = line.split_whitespace();
        let user = cols.next()?;
        let command = cols.skip(9).collect::<Vec<_>>().join(" ");
        (command.starts_with("nginx: worker process") && user != "root").then(|| user.to_string())
    })
}

/// Works out which account the daemon should run as, creating it when the
/// distribution's default is missing. Never fails: every path falls back to
/// `nobody:nobody`.
pub struct UserResolver {
    runner: Arc<dyn CommandRunner>,
    redhat_release: PathBuf,
    cached: Mutex<Option<ServiceUser>>,
}

impl UserResolver {
    pub fn new(runner: Arc<dyn CommandRunner>, redhat_release: PathBuf) -> Self {
        Self {
            runner,
            redhat_release,
            cached: Mutex::new(None),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<ServiceUser>> {
        self.cached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn os_family(&self) -> OsFamily {
        if tokio::fs::try_exists(&self.redhat_release).await.unwrap_or(false) {
            OsFamily::RedHat
        } else {
            OsFamily::Debian
        }
    }

    async fn user_exists(&self, user: &str) -> bool {
        match self.runner.run("id", &[user]).await {
            Ok(out) => out.success(),
            Err(e) => {
                warn!(user, error = %e, "id lookup failed");
                false
            }
        }
    }

    /// Running workers win; otherwise the distribution default if it exists.
    pub async fn resolve_service_user(&self) -> ServiceUser {
        match self.runner.run("ps", &["aux"]).await {
            Ok(out) if out.success() => {
                if let Some(user) = worker_owner(&out.stdout) {
                    debug!(user = %user, "service user taken from running worker");
                    return ServiceUser::new(user.clone(), user);
                }
            }
            Ok(out) => warn!(code = ?out.code, "ps aux failed, falling back to distribution default"),
            Err(e) => warn!(error = %e, "ps aux failed, falling back to distribution default"),
        }

        let account = self.os_family().await.default_account();
        if self.user_exists(account).await {
            ServiceUser::new(account, account)
        } else {
            ServiceUser::nobody()
        }
    }

    /// Resolves the service user and creates it as a no-login system
    /// account if it is missing.
    pub async fn ensure_service_user(&self) -> ServiceUser {
        let resolved = self.resolve_service_user().await;
        if resolved.is_nobody() || self.user_exists(&resolved.user).await {
            return resolved;
        }

        let shell = self.os_family().await.nologin_shell();
        match self.runner.run_checked("useradd", &["-r", "-s", shell, &resolved.user]).await {
            Ok(_) => {
                info!(user = %resolved.user, "created service user");
                resolved
            }
            Err(e) => {
                error!(user = %resolved.user, error = %e, "failed to create service user, using nobody");
                ServiceUser::nobody()
            }
        }
    }

    /// Session-cached `ensure_service_user`.
    pub async fn service_user(&self) -> ServiceUser {
        let cached = self.cache().clone();
        if let Some(user) = cached {
            return user;
        }
        let user = self.ensure_service_user().await;
        *self.cache() = Some(user.clone());
        user
    }

    /// Forget the cached user; the next lookup shells out again.
    pub fn invalidate(&self) {
        self.cache().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sys::testing::{fail, ok, ScriptedRunner};
    use tempfile::TempDir;

    const PS_HEADER: &str = "USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND\n";

    fn resolver(runner: ScriptedRunner, redhat: bool) -> (UserResolver, Arc<ScriptedRunner>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let release = tmp.path().join("redhat-release");
        if redhat {
            std::fs::write(&release, "Rocky Linux release 9").unwrap();
        }
        let runner = Arc::new(runner);
        (UserResolver::new(runner.clone(), release), runner, tmp)
    }

    #[test]
    fn worker_owner_skips_master_and_grep() {
        let ps = format!(
            "{PS_HEADER}root 1 0.0 0.1 1 1 ? Ss 10:00 0:00 nginx: master process /usr/sbin/nginx\n\
             me 9 0.0 0.0 1 1 pts/0 S+ 10:01 0:00 grep nginx\n\
             www-data 2 0.0 0.1 1 1 ? S 10:00 0:00 nginx: worker process\n"
        );
        assert_eq!(worker_owner(&ps), Some("www-data".to_string()));
        assert_eq!(worker_owner(PS_HEADER), None);
    }

    #[tokio::test]
    async fn running_worker_owner_wins() {
        let ps = format!("{PS_HEADER}nginx 2 0.0 0.1 1 1 ? S 10:00 0:00 nginx: worker process\n");
        let (resolver, runner, _tmp) = resolver(ScriptedRunner::new().on("ps aux", ok(&ps)), false);
        assert_eq!(resolver.resolve_service_user().await, ServiceUser::new("nginx", "nginx"));
        assert_eq!(runner.count("id "), 0);
    }

    #[tokio::test]
    async fn debian_prefers_www_data() {
        let (resolver, runner, _tmp) = resolver(ScriptedRunner::new().on("ps aux", ok(PS_HEADER)), false);
        assert_eq!(resolver.resolve_service_user().await, ServiceUser::new("www-data", "www-data"));
        assert_eq!(runner.position("id www-data"), Some(1));
    }

    #[tokio::test]
    async fn redhat_falls_back_to_nobody_when_nginx_missing() {
        let (resolver, _runner, _tmp) = resolver(
            ScriptedRunner::new().on("ps aux", ok(PS_HEADER)).on("id nginx", fail(1, "no such user")),
            true,
        );
        assert_eq!(resolver.resolve_service_user().await, ServiceUser::nobody());
    }

    #[tokio::test]
    async fn ps_failure_is_absorbed() {
        let (resolver, _runner, _tmp) = resolver(
            ScriptedRunner::new().on("ps aux", fail(127, "ps: not found")),
            false,
        );
        assert_eq!(resolver.ensure_service_user().await, ServiceUser::new("www-data", "www-data"));
    }

    #[tokio::test]
    async fn missing_worker_account_is_created_with_family_shell() {
        let ps = format!("{PS_HEADER}nginx 2 0.0 0.1 1 1 ? S 10:00 0:00 nginx: worker process\n");
        let (resolver, runner, _tmp) = resolver(
            ScriptedRunner::new().on("ps aux", ok(&ps)).on("id nginx", fail(1, "no such user")),
            true,
        );
        assert_eq!(resolver.ensure_service_user().await, ServiceUser::new("nginx", "nginx"));
        assert!(runner.calls().contains(&"useradd -r -s /sbin/nologin nginx".to_string()));
    }

    #[tokio::test]
    async fn failed_useradd_degrades_to_nobody() {
        let ps = format!("{PS_HEADER}www-data 2 0.0 0.1 1 1 ? S 10:00 0:00 nginx: worker process\n");
        let (resolver, _runner, _tmp) = resolver(
            ScriptedRunner::new()
                .on("ps aux", ok(&ps))
                .on("id www-data", fail(1, "no such user"))
                .on("useradd", fail(9, "useradd: permission denied")),
            false,
        );
        assert_eq!(resolver.ensure_service_user().await, ServiceUser::nobody());
    }

    #[tokio::test]
    async fn service_user_is_cached_until_invalidated() {
        let (resolver, runner, _tmp) = resolver(ScriptedRunner::new().on("ps aux", ok(PS_HEADER)), false);

        resolver.service_user().await;
        resolver.service_user().await;
        assert_eq!(runner.count("ps aux"), 1);

        resolver.invalidate();
        resolver.service_user().await;
        assert_eq!(runner.count("ps aux"), 2);
    }

    #[test]
    fn display_and_directive_formats() {
        let user = ServiceUser::new("www-data", "www-data");
        assert_eq!(user.to_string(), "www-data:www-data");
        assert_eq!(user.nginx_directive(), "www-data www-data");
    }
}

// src/config.rs

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ProvisionError, ProvisionResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct ProvisionerConfig {
    // 📂 Host layout
    pub nginx_dir: PathBuf,
    pub web_root: PathBuf,
    pub log_dir: PathBuf,
    pub letsencrypt_dir: PathBuf,
    pub cache_dirs: Vec<PathBuf>,
    pub pid_file: PathBuf,
    pub redhat_release: PathBuf,

    // ⚙️ Daemon & verification
    pub service_name: String,
    pub status_marker: String,
    pub start_grace: Duration,
    pub reload_grace: Duration,
    pub probe_timeout: Duration,
    pub removal_retries: u32,
    pub command_timeout: Option<Duration>,

    pub log_format: LogFormat,
}

impl ProvisionerConfig {
    pub fn load() -> ProvisionResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Numeric values are
    /// parsed strictly: a typo in the environment is an error, not a default.
    pub fn from_lookup<F>(lookup: F) -> ProvisionResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let path = |key: &str, default: &str| PathBuf::from(string(key, default));

        let cache_dirs = string("SITEPROV_CACHE_DIRS", "/var/cache/nginx:/var/tmp/nginx:/run/nginx")
            .split(':')
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        let command_timeout = match parse::<u64, _>(&lookup, "SITEPROV_COMMAND_TIMEOUT_SECS", 120)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        let log_format = match string("SITEPROV_LOG_FORMAT", "text").to_ascii_lowercase().as_str() {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => {
                return Err(ProvisionError::Config(format!(
                    "SITEPROV_LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )));
            }
        };

        Ok(Self {
            nginx_dir: path("SITEPROV_NGINX_DIR", "/etc/nginx"),
            web_root: path("SITEPROV_WEB_ROOT", "/var/www"),
            log_dir: path("SITEPROV_LOG_DIR", "/var/log/nginx"),
            letsencrypt_dir: path("SITEPROV_LETSENCRYPT_DIR", "/etc/letsencrypt"),
            cache_dirs,
            pid_file: path("SITEPROV_PID_FILE", "/run/nginx.pid"),
            redhat_release: path("SITEPROV_REDHAT_RELEASE", "/etc/redhat-release"),

            service_name: string("SITEPROV_SERVICE", "nginx"),
            status_marker: string("SITEPROV_STATUS_MARKER", "Deployment Status"),
            start_grace: Duration::from_secs(parse(&lookup, "SITEPROV_START_GRACE_SECS", 3)?),
            reload_grace: Duration::from_secs(parse(&lookup, "SITEPROV_RELOAD_GRACE_SECS", 2)?),
            probe_timeout: Duration::from_secs(parse(&lookup, "SITEPROV_PROBE_TIMEOUT_SECS", 5)?),
            removal_retries: parse(&lookup, "SITEPROV_REMOVAL_RETRIES", 3)?,
            command_timeout,

            log_format,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> ProvisionResult<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ProvisionError::Config(format!("{key} must be a non-negative integer, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> ProvisionResult<ProvisionerConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ProvisionerConfig::from_lookup(move |k| map.get(k).cloned())
    }

    #[test]
    fn defaults_match_standard_host_layout() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.nginx_dir, PathBuf::from("/etc/nginx"));
        assert_eq!(cfg.web_root, PathBuf::from("/var/www"));
        assert_eq!(cfg.log_dir, PathBuf::from("/var/log/nginx"));
        assert_eq!(
            cfg.cache_dirs,
            vec![
                PathBuf::from("/var/cache/nginx"),
                PathBuf::from("/var/tmp/nginx"),
                PathBuf::from("/run/nginx"),
            ]
        );
        assert_eq!(cfg.start_grace, Duration::from_secs(3));
        assert_eq!(cfg.reload_grace, Duration::from_secs(2));
        assert_eq!(cfg.removal_retries, 3);
        assert_eq!(cfg.command_timeout, Some(Duration::from_secs(120)));
        assert_eq!(cfg.log_format, LogFormat::Text);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config_from(&[
            ("SITEPROV_NGINX_DIR", "/opt/nginx"),
            ("SITEPROV_CACHE_DIRS", "/a::/b"),
            ("SITEPROV_COMMAND_TIMEOUT_SECS", "0"),
            ("SITEPROV_LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(cfg.nginx_dir, PathBuf::from("/opt/nginx"));
        assert_eq!(cfg.cache_dirs, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(cfg.command_timeout, None);
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn command_timeout_is_read_in_seconds() {
        let cfg = config_from(&[("SITEPROV_COMMAND_TIMEOUT_SECS", "45")]).unwrap();
        assert_eq!(cfg.command_timeout, Some(Duration::from_secs(45)));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        let err = config_from(&[("SITEPROV_START_GRACE_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(msg) if msg.contains("SITEPROV_START_GRACE_SECS")));
    }
}

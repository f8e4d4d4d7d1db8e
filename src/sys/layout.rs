// src/sys/layout.rs

use std::path::PathBuf;

use crate::config::ProvisionerConfig;
use crate::sys::domain::Domain;

pub const MAIN_CONFIG: &str = "nginx.conf";
pub const DEFAULT_SERVER_CONF: &str = "default.conf";
pub const DEFAULT_ENABLED_SITE: &str = "default";
pub const PLACEHOLDER_PAGE: &str = "index.html";

/// Every filesystem location the provisioner reads or writes. Paths are only
/// ever derived from a validated `Domain`.
#[derive(Clone, Debug)]
pub struct Layout {
    pub nginx_dir: PathBuf,
    pub web_root: PathBuf,
    pub log_dir: PathBuf,
    pub letsencrypt_dir: PathBuf,
    pub cache_dirs: Vec<PathBuf>,
    pub pid_file: PathBuf,
}

impl Layout {
    pub fn from_config(config: &ProvisionerConfig) -> Self {
        Self {
            nginx_dir: config.nginx_dir.clone(),
            web_root: config.web_root.clone(),
            log_dir: config.log_dir.clone(),
            letsencrypt_dir: config.letsencrypt_dir.clone(),
            cache_dirs: config.cache_dirs.clone(),
            pid_file: config.pid_file.clone(),
        }
    }

    /// A layout with every root nested under `base`. Used to run the full
    /// flows against a scratch directory.
    #[cfg(test)]
    pub fn rooted_at(base: &std::path::Path) -> Self {
        Self {
            nginx_dir: base.join("etc/nginx"),
            web_root: base.join("var/www"),
            log_dir: base.join("var/log/nginx"),
            letsencrypt_dir: base.join("etc/letsencrypt"),
            cache_dirs: vec![
                base.join("var/cache/nginx"),
                base.join("var/tmp/nginx"),
                base.join("run/nginx"),
            ],
            pid_file: base.join("run/nginx.pid"),
        }
    }

    pub fn main_config(&self) -> PathBuf {
        self.nginx_dir.join(MAIN_CONFIG)
    }

    pub fn main_config_backup(&self) -> PathBuf {
        self.nginx_dir.join(format!("{MAIN_CONFIG}.bak"))
    }

    pub fn sites_available(&self) -> PathBuf {
        self.nginx_dir.join("sites-available")
    }

    pub fn sites_enabled(&self) -> PathBuf {
        self.nginx_dir.join("sites-enabled")
    }

    pub fn conf_d(&self) -> PathBuf {
        self.nginx_dir.join("conf.d")
    }

    pub fn default_server_conf(&self) -> PathBuf {
        self.conf_d().join(DEFAULT_SERVER_CONF)
    }

    pub fn default_enabled_site(&self) -> PathBuf {
        self.sites_enabled().join(DEFAULT_ENABLED_SITE)
    }

    /// Directories laid down by the base config initializer.
    pub fn base_dirs(&self) -> [PathBuf; 5] {
        [
            self.sites_available(),
            self.sites_enabled(),
            self.web_root.clone(),
            self.log_dir.clone(),
            self.conf_d(),
        ]
    }

    pub fn config_path(&self, domain: &Domain) -> PathBuf {
        self.sites_available().join(format!("{domain}.conf"))
    }

    pub fn enabled_path(&self, domain: &Domain) -> PathBuf {
        self.sites_enabled().join(format!("{domain}.conf"))
    }

    pub fn site_root(&self, domain: &Domain) -> PathBuf {
        self.web_root.join(domain.as_str())
    }

    pub fn placeholder_page(&self, domain: &Domain) -> PathBuf {
        self.site_root(domain).join(PLACEHOLDER_PAGE)
    }

    pub fn access_log(&self, domain: &Domain) -> PathBuf {
        self.log_dir.join(format!("{domain}.access.log"))
    }

    pub fn error_log(&self, domain: &Domain) -> PathBuf {
        self.log_dir.join(format!("{domain}.error.log"))
    }

    /// certbot's live/archive/renewal layout for one domain.
    pub fn certificate_paths(&self, domain: &Domain) -> [PathBuf; 3] {
        [
            self.letsencrypt_dir.join("live").join(domain.as_str()),
            self.letsencrypt_dir.join("archive").join(domain.as_str()),
            self.letsencrypt_dir.join("renewal").join(format!("{domain}.conf")),
        ]
    }

    /// Everything a site owns on disk, in removal order.
    pub fn site_artifacts(&self, domain: &Domain) -> Vec<PathBuf> {
        let mut paths = vec![
            self.config_path(domain),
            self.enabled_path(domain),
            self.site_root(domain),
            self.access_log(domain),
            self.error_log(domain),
        ];
        paths.extend(self.certificate_paths(domain));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn domain() -> Domain {
        Domain::parse("example.com").unwrap()
    }

    #[test]
    fn default_layout_matches_host_paths() {
        let cfg = ProvisionerConfig::from_lookup(|_| None).unwrap();
        let layout = Layout::from_config(&cfg);
        let d = domain();

        assert_eq!(layout.main_config(), PathBuf::from("/etc/nginx/nginx.conf"));
        assert_eq!(
            layout.config_path(&d),
            PathBuf::from("/etc/nginx/sites-available/example.com.conf")
        );
        assert_eq!(
            layout.enabled_path(&d),
            PathBuf::from("/etc/nginx/sites-enabled/example.com.conf")
        );
        assert_eq!(layout.site_root(&d), PathBuf::from("/var/www/example.com"));
        assert_eq!(
            layout.access_log(&d),
            PathBuf::from("/var/log/nginx/example.com.access.log")
        );
        assert_eq!(
            layout.certificate_paths(&d)[2],
            PathBuf::from("/etc/letsencrypt/renewal/example.com.conf")
        );
    }

    #[test]
    fn rooted_layout_stays_under_base() {
        let base = Path::new("/tmp/scratch");
        let layout = Layout::rooted_at(base);
        for path in layout.site_artifacts(&domain()) {
            assert!(path.starts_with(base), "{} escaped base", path.display());
        }
        for dir in &layout.cache_dirs {
            assert!(dir.starts_with(base));
        }
    }
}

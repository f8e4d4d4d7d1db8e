// src/sys/render.rs

use std::fmt::Write as _;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};
use crate::sys::domain::Domain;
use crate::sys::layout::Layout;
use crate::sys::traits::SiteRenderer;
use crate::sys::user::ServiceUser;

/// One location block forwarded to an upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyLocation {
    pub path: String,
    pub upstream: String,
}

/// Describes a virtual host to install. Everything except `domain` only
/// feeds the rendered server block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSpec {
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default = "default_index")]
    pub index: Vec<String>,
    #[serde(default)]
    pub client_max_body_size: Option<String>,
    #[serde(default)]
    pub proxy_locations: Vec<ProxyLocation>,
}

fn default_index() -> Vec<String> {
    vec!["index.html".to_string(), "index.htm".to_string()]
}

impl SiteSpec {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            aliases: Vec::new(),
            index: default_index(),
            client_max_body_size: None,
            proxy_locations: Vec::new(),
        }
    }
}

fn pattern(cell: &'static OnceLock<Regex>, re: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(re).expect("static render regex"))
}

fn index_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^[A-Za-z0-9][A-Za-z0-9._-]*$")
}

fn body_size_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^[0-9]+[kKmMgG]?$")
}

fn location_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^/[A-Za-z0-9._~/-]*$")
}

fn upstream_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, r"^https?://[A-Za-z0-9.-]+(:[0-9]{1,5})?(/[A-Za-z0-9._~/-]*)?$")
}

fn reject(field: &str, value: &str) -> ProvisionError {
    ProvisionError::InvalidSpec(format!("{field} '{value}'"))
}

/// Renders plain `server {}` blocks for nginx.
pub struct NginxRenderer;

impl SiteRenderer for NginxRenderer {
    fn render_site(&self, spec: &SiteSpec, layout: &Layout) -> ProvisionResult<String> {
        // 🛡️ Zero-Trust: every field is allow-listed before it is written
        // into a file that the daemon will parse.
        let domain = Domain::parse(&spec.domain)?;
        let aliases = spec
            .aliases
            .iter()
            .map(|a| Domain::parse(a))
            .collect::<ProvisionResult<Vec<_>>>()?;

        if spec.index.is_empty() {
            return Err(reject("index", ""));
        }
        if let Some(bad) = spec.index.iter().find(|i| !index_pattern().is_match(i)) {
            return Err(reject("index", bad));
        }
        if let Some(size) = &spec.client_max_body_size {
            if !body_size_pattern().is_match(size) {
                return Err(reject("client_max_body_size", size));
            }
        }
        for loc in &spec.proxy_locations {
            if !location_pattern().is_match(&loc.path) || loc.path == "/" {
                return Err(reject("proxy location", &loc.path));
            }
            if !upstream_pattern().is_match(&loc.upstream) {
                return Err(reject("proxy upstream", &loc.upstream));
            }
        }

        let mut server_names = domain.to_string();
        for alias in &aliases {
            server_names.push(' ');
            server_names.push_str(alias.as_str());
        }

        let mut extra = String::new();
        if let Some(size) = &spec.client_max_body_size {
            let _ = writeln!(extra, "    client_max_body_size {size};");
        }
        for loc in &spec.proxy_locations {
            let _ = write!(
                extra,
                r#"
    location {path} {{
        proxy_pass {upstream};
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
    }}
"#,
                path = loc.path,
                upstream = loc.upstream,
            );
        }

        Ok(format!(
            r#"server {{
    listen 80;
    listen [::]:80;
    server_name {server_names};

    root {root};
    index {index};

    access_log {access_log} main;
    error_log {error_log} warn;
{extra}
    location / {{
        try_files $uri $uri/ =404;
        add_header X-Content-Type-Options "nosniff" always;
    }}
}}
"#,
            root = layout.site_root(&domain).display(),
            index = spec.index.join(" "),
            access_log = layout.access_log(&domain).display(),
            error_log = layout.error_log(&domain).display(),
        ))
    }
}

/// Global daemon config: worker/event/http blocks, log format, gzip and the
/// include lines for `conf.d` and `sites-enabled`.
pub fn render_main_config(user: &ServiceUser, layout: &Layout) -> String {
    format!(
        r#"user {user};
worker_processes auto;
pid {pid_file};

events {{
    worker_connections 1024;
    multi_accept on;
    use epoll;
}}

http {{
    sendfile on;
    tcp_nopush on;
    tcp_nodelay on;
    keepalive_timeout 65;
    types_hash_max_size 2048;
    server_tokens off;

    include {nginx_dir}/mime.types;
    default_type application/octet-stream;

    log_format main '$remote_addr - $remote_user [$time_local] "$request" '
                    '$status $body_bytes_sent "$http_referer" '
                    '"$http_user_agent" "$http_x_forwarded_for"';

    access_log {log_dir}/access.log main;
    error_log {log_dir}/error.log warn;

    gzip on;
    gzip_disable "msie6";
    gzip_vary on;
    gzip_proxied any;
    gzip_comp_level 6;
    gzip_types text/plain text/css application/json application/javascript text/xml application/xml application/xml+rss text/javascript;

    include {conf_d}/*.conf;
    include {sites_enabled}/*;
}}
"#,
        user = user.nginx_directive(),
        pid_file = layout.pid_file.display(),
        nginx_dir = layout.nginx_dir.display(),
        log_dir = layout.log_dir.display(),
        conf_d = layout.conf_d().display(),
        sites_enabled = layout.sites_enabled().display(),
    )
}

/// Catch-all server: any Host header we do not manage gets 444.
pub fn render_default_server() -> &'static str {
    r#"server {
    listen 80 default_server;
    listen [::]:80 default_server;
    server_name _;
    return 444;
}
"#
}

/// The page reachability verification looks for.
pub fn render_placeholder_page(domain: &Domain, marker: &str, deployed_at: DateTime<Utc>) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{domain}</title>
</head>
<body>
    <h1>{domain}</h1>
    <p>{marker}: deployed</p>
    <p>{timestamp}</p>
</body>
</html>
"#,
        timestamp = deployed_at.to_rfc3339(),
    )
}

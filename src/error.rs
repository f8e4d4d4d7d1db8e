// src/error.rs

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Error surface for every provisioning operation.
///
/// User resolution never produces one of these (it falls back to
/// `nobody:nobody`); best-effort cleanup logs them and moves on.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("invalid site spec: {0}")]
    InvalidSpec(String),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with code {code:?}: {stderr}")]
    ProcessExecution {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("'{command}' timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("nginx configuration test failed: {0}")]
    ConfigValidation(String),

    #[error("site {domain} unreachable after {attempts} verification attempt(s)")]
    VerificationTimeout { domain: String, attempts: u32 },

    #[error("site {domain} still reachable after {attempts} restart attempt(s)")]
    StillReachable { domain: String, attempts: u32 },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

pub(crate) fn fs_err(path: impl Into<PathBuf>, source: std::io::Error) -> ProvisionError {
    ProvisionError::Filesystem {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_error_renders_command_and_stderr() {
        let err = ProvisionError::ProcessExecution {
            command: "systemctl restart nginx".into(),
            code: Some(1),
            stderr: "Unit nginx.service not found.".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("systemctl restart nginx"));
        assert!(msg.contains("Some(1)"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn fs_err_keeps_path() {
        let err = fs_err("/etc/nginx/nginx.conf", std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        match err {
            ProvisionError::Filesystem { path, .. } => assert_eq!(path, PathBuf::from("/etc/nginx/nginx.conf")),
            other => panic!("unexpected error: {other}"),
        }
    }
}

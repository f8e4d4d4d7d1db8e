// src/sys/command.rs

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult};
use crate::sys::traits::{render_command, CommandOutput, CommandRunner};

/// Executes host binaries through `tokio::process`.
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> ProvisionResult<CommandOutput> {
        debug!(command = %render_command(program, args), "exec");

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child).await.map_err(|_| {
                ProvisionError::CommandTimeout {
                    command: render_command(program, args),
                    timeout: limit,
                }
            })?,
            None => child.await,
        };

        let output = result.map_err(|source| ProvisionError::Spawn {
            program: program.to_string(),
            source,
        })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

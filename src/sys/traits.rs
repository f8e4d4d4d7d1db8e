use async_trait::async_trait;

use crate::error::{ProvisionError, ProvisionResult};
use crate::sys::layout::Layout;
use crate::sys::render::SiteSpec;

// ==============================================================================
// 1. Process Execution (Argument Arrays Only)
// ==============================================================================

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Converts a non-zero exit into `ProcessExecution`.
    pub fn check(self, program: &str, args: &[&str]) -> ProvisionResult<Self> {
        if self.success() {
            return Ok(self);
        }
        Err(ProvisionError::ProcessExecution {
            command: render_command(program, args),
            code: self.code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

pub fn render_command(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with discrete `args`. 🛡️ There is no shell in between:
    /// a hostile argument cannot become a second command.
    ///
    /// Returns `Err` only when the process could not be run at all; a
    /// non-zero exit is reported through `CommandOutput::code`.
    async fn run(&self, program: &str, args: &[&str]) -> ProvisionResult<CommandOutput>;

    /// Like `run`, but a non-zero exit is an error.
    async fn run_checked(&self, program: &str, args: &[&str]) -> ProvisionResult<CommandOutput> {
        self.run(program, args).await?.check(program, args)
    }
}

// ==============================================================================
// 2. Site Config Rendering
// ==============================================================================

pub trait SiteRenderer: Send + Sync {
    /// Produces the server block written to `sites-available/{domain}.conf`.
    fn render_site(&self, spec: &SiteSpec, layout: &Layout) -> ProvisionResult<String>;
}

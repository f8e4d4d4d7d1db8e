// src/sys/testing.rs
//
// Scripted stand-in for the host's binaries. Flows run against a temp
// directory layout while every external command is recorded and answered
// from rules.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProvisionResult;
use crate::sys::traits::{render_command, CommandOutput, CommandRunner};

struct Rule {
    prefix: String,
    responses: VecDeque<CommandOutput>,
}

#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every command starting with `prefix` with `output`.
    pub fn on(self, prefix: &str, output: CommandOutput) -> Self {
        self.on_sequence(prefix, vec![output])
    }

    /// Answers successive matching commands in order; the last answer repeats.
    pub fn on_sequence(self, prefix: &str, outputs: Vec<CommandOutput>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            responses: outputs.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> ProvisionResult<CommandOutput> {
        let line = render_command(program, args);
        self.calls.lock().unwrap().push(line.clone());

        let mut rules = self.rules.lock().unwrap();
        // Longest prefix wins so "curl -s -I" beats "curl -s".
        let rule = rules
            .iter_mut()
            .filter(|r| line.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len());

        let output = match rule {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap_or_default(),
            Some(rule) => rule.responses.front().cloned().unwrap_or_default(),
            None => ok(""),
        };
        Ok(output)
    }
}

//! External process execution boundary
//!
//! The only I/O boundary the build engine depends on. Callers hand over a
//! full command line plus environment additions and get back the exit code
//! and the merged stdout/stderr. Exit codes are data, not errors: retry
//! policy belongs to the decision engine, not to the runner.

use crate::error::{WheelhouseError, WheelhouseResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// One external command invocation
#[derive(Debug, Clone, Default)]
pub struct ExecSpec {
    /// Program followed by its arguments
    pub command_line: Vec<String>,
    /// Environment variables added on top of the inherited environment
    pub environment: HashMap<String, String>,
}

impl ExecSpec {
    pub fn new(command_line: Vec<String>, environment: HashMap<String, String>) -> Self {
        Self {
            command_line,
            environment,
        }
    }

    /// The command line as one display string
    pub fn rendered(&self) -> String {
        self.command_line.join(" ")
    }
}

/// Exit status and captured output of a finished command
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// Process exit code; `-1` when terminated by a signal
    pub exit_code: i32,
    /// Merged stdout and stderr
    pub output: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstract process runner.
///
/// Production code uses [`TokioExec`]; tests substitute scripted fakes.
#[async_trait]
pub trait ExternalExec: Send + Sync {
    /// Run the command to completion, capturing its output.
    ///
    /// A nonzero exit code is reported in the outcome; only a failure to
    /// run the command at all is an `Err`.
    async fn exec(&self, spec: &ExecSpec) -> WheelhouseResult<ExecOutcome>;
}

/// Default runner backed by `tokio::process`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExec;

#[async_trait]
impl ExternalExec for TokioExec {
    async fn exec(&self, spec: &ExecSpec) -> WheelhouseResult<ExecOutcome> {
        let (program, args) = spec
            .command_line
            .split_first()
            .ok_or_else(|| WheelhouseError::Internal("empty command line".to_string()))?;

        debug!("Running: {}", spec.rendered());

        let output = Command::new(program)
            .args(args)
            .envs(&spec.environment)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WheelhouseError::command_failed(spec.rendered(), e))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&output.stderr));
        }

        Ok(ExecOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

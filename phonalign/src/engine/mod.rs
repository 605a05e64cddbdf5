//! External engine port
//!
//! Every acoustic-modeling tool is reached through [`Engine::invoke`]. The
//! port carries typed argument vectors, never shell strings, and the
//! process-backed implementation lives in [`process`].

pub mod process;

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

pub use process::ProcessEngine;

/// Tools of the acoustic-modeling engine driven by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    HCompV,
    HInit,
    HRest,
    HERest,
    HHEd,
    HVite,
    HLEd,
    HDMan,
    HCopy,
}

impl Tool {
    /// Executable name
    pub fn binary_name(&self) -> &'static str {
        match self {
            Tool::HCompV => "HCompV",
            Tool::HInit => "HInit",
            Tool::HRest => "HRest",
            Tool::HERest => "HERest",
            Tool::HHEd => "HHEd",
            Tool::HVite => "HVite",
            Tool::HLEd => "HLEd",
            Tool::HDMan => "HDMan",
            Tool::HCopy => "HCopy",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Trace flags passed to every tool ahead of its own arguments
pub const STANDARD_FLAGS: [&str; 5] = ["-A", "-D", "-V", "-T", "1"];

/// A single request to the engine: tool identity plus argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    tool: Tool,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
}

impl Invocation {
    /// Start an invocation carrying the standard trace flags
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: STANDARD_FLAGS.iter().map(OsString::from).collect(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    /// Append `flag value` when `value` is present
    pub fn opt(self, flag: &str, value: Option<impl AsRef<OsStr>>) -> Self {
        match value {
            Some(v) => self.arg(flag).arg(v),
            None => self,
        }
    }

    /// Bytes fed to the tool's standard input
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    /// Value following the first occurrence of `flag`
    pub fn flag_value(&self, flag: &str) -> Option<&OsStr> {
        self.flag_values(flag).into_iter().next()
    }

    /// Values following every occurrence of `flag`
    pub fn flag_values(&self, flag: &str) -> Vec<&OsStr> {
        self.args
            .windows(2)
            .filter(|pair| pair[0] == flag)
            .map(|pair| pair[1].as_os_str())
            .collect()
    }

    /// The last `n` arguments (positional operands for every tool used here)
    pub fn trailing(&self, n: usize) -> &[OsString] {
        let start = self.args.len().saturating_sub(n);
        &self.args[start..]
    }

    /// Argument vector rendered for logs
    pub fn command_line(&self) -> String {
        let mut line = self.tool.binary_name().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Captured result of a finished tool process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Engine port errors
#[derive(Debug, Error)]
pub enum EngineError {
    /// Tool executable could not be located
    #[error("Engine binary not found: {0}")]
    BinaryNotFound(String),

    /// Tool could not be started
    #[error("Failed to execute {tool}: {message}")]
    Spawn { tool: Tool, message: String },

    /// Tool ran and exited unsuccessfully
    #[error("{tool} failed with code: {}", describe_status(.code))]
    ToolFailed {
        tool: Tool,
        code: Option<i32>,
        stderr: String,
    },

    /// Blocking task running the tool panicked or was aborted
    #[error("Task join error: {0}")]
    Join(String),
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "terminated by signal".to_string(),
    }
}

/// Port to the external acoustic-modeling engine
#[async_trait]
pub trait Engine: Send + Sync {
    /// Run the tool to completion and capture its output
    async fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, EngineError>;
}

/// Invoke a tool, log its diagnostics and reject a nonzero exit status
pub async fn run_checked(
    engine: &dyn Engine,
    invocation: &Invocation,
) -> Result<ToolOutput, EngineError> {
    let tool = invocation.tool();
    tracing::debug!(tool = %tool, command = %invocation.command_line(), "Invoking engine");

    let output = engine.invoke(invocation).await?;

    if !output.stdout.trim().is_empty() {
        info!(tool = %tool, "{}", output.stdout.trim_end());
    }
    if !output.stderr.trim().is_empty() {
        warn!(tool = %tool, "{}", output.stderr.trim_end());
    }

    if !output.success() {
        return Err(EngineError::ToolFailed {
            tool,
            code: output.code,
            stderr: output.stderr,
        });
    }

    Ok(output)
}

//! External process invocation.
//!
//! [`ProcessRunner`] is the narrow capability every tool-driving stage goes
//! through: run one command, wait for it, hand back stdout or a
//! [`ProcessError`] carrying the diagnostic stderr. It adds no retry policy;
//! the transcoder and extractor layer their own policies on top.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Maximum number of stderr bytes quoted in `Display` output.
const DISPLAY_STDERR_BYTES: usize = 512;

/// A program plus its arguments, spawned without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandLine {
    /// Create a command line for `program` with no arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The argument list.
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Returns true if any argument equals `needle`.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Returns the argument following `flag`, if present.
    pub fn value_after(&self, flag: &str) -> Option<&OsStr> {
        let pos = self.args.iter().position(|a| a == flag)?;
        self.args.get(pos + 1).map(OsString::as_os_str)
    }

    /// Short program name used in logs and error messages.
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Failure of a single process invocation.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The process could not be started.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("`{program}` exited with {}: {}", exit_label(.exit_code), tail(.stderr, DISPLAY_STDERR_BYTES))]
    Failed {
        /// Program name.
        program: String,
        /// Exit code, or `None` when terminated by a signal.
        exit_code: Option<i32>,
        /// Captured stderr.
        stderr: String,
        /// Stdout captured before the process exited.
        stdout: String,
    },

    /// The process exceeded its deadline and was killed.
    #[error("`{program}` timed out after {timeout_secs}s")]
    TimedOut {
        /// Program name.
        program: String,
        /// Deadline in seconds.
        timeout_secs: u64,
    },
}

impl ProcessError {
    /// Returns true if the program itself could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }

    /// Full diagnostic text: the error message followed by complete stderr.
    ///
    /// This is what error classifiers should pattern-match against.
    pub fn diagnostic_text(&self) -> String {
        match self {
            Self::Failed { stderr, stdout, .. } => {
                let mut text = self.to_string();
                if !stderr.is_empty() {
                    text.push('\n');
                    text.push_str(stderr);
                }
                if !stdout.is_empty() {
                    text.push('\n');
                    text.push_str(stdout);
                }
                text
            }
            _ => self.to_string(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_owned(), |c| format!("code {c}"))
}

fn tail(text: &str, max_bytes: usize) -> &str {
    let trimmed = text.trim();
    if trimmed.len() <= max_bytes {
        return trimmed;
    }
    let mut start = trimmed.len() - max_bytes;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

/// Capability for running an external command to completion.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` and return its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] if the process cannot be spawned, exits
    /// non-zero, or exceeds the runner's deadline.
    async fn run(&self, command: &CommandLine) -> Result<String, ProcessError>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner {
    timeout: Option<Duration>,
}

impl SystemProcessRunner {
    /// Runner with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runner that kills any process still running after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, command: &CommandLine) -> Result<String, ProcessError> {
        let program = command.program_name();
        debug!(command = %command, "spawning process");

        let mut cmd = tokio::process::Command::new(command.program());
        cmd.args(command.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ProcessError::TimedOut {
                    program: program.clone(),
                    timeout_secs: limit.as_secs(),
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            return Err(ProcessError::Failed {
                program,
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                stdout,
            });
        }
        Ok(stdout)
    }
}

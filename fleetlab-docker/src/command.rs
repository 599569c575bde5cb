//! Subprocess execution for the docker CLI
//!
//! Short queries always run with their output captured. Long-running
//! operations (building and starting units, tearing them down) either stream
//! their output straight to the terminal in verbose mode, or run captured
//! behind a progress ticker so the output can be shown only when they fail.

use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        }
    }
}

/// Trait for executing commands - allows mocking in tests
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run to completion with stdout and stderr captured
    async fn execute(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput>;

    /// Run a long operation; `label` describes it to the user while it runs
    async fn execute_long(
        &self,
        program: &str,
        args: &[String],
        label: &str,
    ) -> std::io::Result<CommandOutput>;
}

/// Runs real processes
pub struct SystemCommandExecutor {
    verbose: bool,
}

impl SystemCommandExecutor {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    #[instrument(skip(self, args), fields(args = %args.join(" ")))]
    async fn execute(&self, program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        debug!("{} exited with {:?}", program, output.status.code());
        Ok(output.into())
    }

    async fn execute_long(
        &self,
        program: &str,
        args: &[String],
        label: &str,
    ) -> std::io::Result<CommandOutput> {
        debug!("Executing command: {} {}", program, args.join(" "));
        if self.verbose {
            let status = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await?;
            return Ok(CommandOutput {
                code: status.code(),
                ..Default::default()
            });
        }

        let _ticker = ProgressTicker::start(label);
        self.execute(program, args).await
    }
}

/// Elapsed-time indicator on stderr, stopped when dropped
pub struct ProgressTicker {
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    const INTERVAL: Duration = Duration::from_millis(500);

    pub fn start(label: &str) -> Self {
        let label = label.to_string();
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let frames = ['|', '/', '-', '\\'];
            let mut ticks = 0usize;
            loop {
                eprint!(
                    "\r{} {} ({}s)",
                    frames[ticks % frames.len()],
                    label,
                    started.elapsed().as_secs()
                );
                let _ = std::io::stderr().flush();
                ticks += 1;
                tokio::time::sleep(Self::INTERVAL).await;
            }
        });
        Self { handle }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
        eprint!("\r\x1b[2K");
        let _ = std::io::stderr().flush();
    }
}

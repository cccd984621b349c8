//! Runs one child process and shuts it down gracefully, then forcefully.
//!
//! The supervisor moves through:
//!
//! ```text
//! NotStarted -> Running -> ExitedNormally
//!                       -> InterruptRequested -> GracefullyStopped
//!                                             -> ForceKilled
//! ```
//!
//! While running it races the child's exit against the host's shutdown
//! request. Once shutdown is requested the child gets SIGINT and a grace
//! period to exit before it is killed.

use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};

use crate::signal::send_interrupt;

/// Delivers the interrupt that opens the grace period.
pub type InterruptFn = fn(&Child) -> io::Result<()>;

/// Time the child gets to exit after SIGINT before it is killed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Fatal supervisor failures.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("failed to start {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for child process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    NotStarted,
    Running,
    InterruptRequested,
    ExitedNormally,
    GracefullyStopped,
    ForceKilled,
}

impl SupervisorState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ExitedNormally | Self::GracefullyStopped | Self::ForceKilled
        )
    }
}

/// How the child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The child exited without being asked to.
    ExitedNormally,
    /// The child exited within the grace period after SIGINT.
    GracefullyStopped,
    /// The child outlived the grace period and was killed.
    ForceKilled,
}

impl From<Disposition> for SupervisorState {
    fn from(disposition: Disposition) -> Self {
        match disposition {
            Disposition::ExitedNormally => Self::ExitedNormally,
            Disposition::GracefullyStopped => Self::GracefullyStopped,
            Disposition::ForceKilled => Self::ForceKilled,
        }
    }
}

/// Final report of a supervised run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSummary {
    pub disposition: Disposition,
    /// Exit status, if the child could be reaped.
    pub status: Option<ExitStatus>,
}

impl ExitSummary {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    /// Exited on its own with a non-zero code, or was killed.
    pub fn is_abnormal(&self) -> bool {
        match self.disposition {
            Disposition::ForceKilled => true,
            Disposition::ExitedNormally | Disposition::GracefullyStopped => {
                !self.status.is_some_and(|s| s.success())
            }
        }
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.disposition {
            Disposition::ExitedNormally if !self.is_abnormal() => {
                write!(f, "binary stopped successfully")
            }
            Disposition::ExitedNormally => match self.status {
                Some(status) => write!(f, "binary exited with {}", status),
                None => write!(f, "binary exited with unknown status"),
            },
            Disposition::GracefullyStopped => {
                write!(f, "binary stopped after interrupt")?;
                match self.exit_code() {
                    Some(0) | None => Ok(()),
                    Some(code) => write!(f, " (exit code {})", code),
                }
            }
            Disposition::ForceKilled => {
                write!(f, "binary did not stop in time and was forcefully terminated")
            }
        }
    }
}

/// The working directory to launch with: ours, or `.` if it cannot be read.
pub fn current_dir_or_dot() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|e| {
        log::warn!("Could not determine working directory ({}), using '.'", e);
        PathBuf::from(".")
    })
}

/// Settings for a supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Executable to launch (no arguments are passed).
    pub program: PathBuf,
    pub working_dir: PathBuf,
    pub grace_period: Duration,
    /// Defaults to [`send_interrupt`] (SIGINT on Unix).
    pub interrupt: InterruptFn,
}

impl SupervisorConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: current_dir_or_dot(),
            grace_period: DEFAULT_GRACE_PERIOD,
            interrupt: send_interrupt,
        }
    }

    #[must_use]
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    #[must_use]
    pub fn with_interrupt(mut self, interrupt: InterruptFn) -> Self {
        self.interrupt = interrupt;
        self
    }
}

/// Owns the single supervised child for the duration of a run.
#[derive(Debug)]
pub struct Supervisor {
    config: SupervisorConfig,
    state: SupervisorState,
}

impl Supervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: SupervisorState::NotStarted,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launch the child and supervise it until it ends.
    ///
    /// `shutdown` resolves when the host asks us to stop; in production that
    /// is [`crate::ShutdownSignal::recv`].
    pub async fn run<F>(&mut self, shutdown: F) -> Result<ExitSummary, SupervisorError>
    where
        F: Future<Output = ()>,
    {
        let mut child = self.spawn()?;

        tokio::select! {
            status = child.wait() => {
                let status = status.map_err(SupervisorError::Wait)?;
                return Ok(self.finish(Disposition::ExitedNormally, Some(status)));
            }
            () = shutdown => {}
        }

        self.transition(SupervisorState::InterruptRequested);
        self.stop(child).await
    }

    fn spawn(&mut self) -> Result<Child, SupervisorError> {
        let program = &self.config.program;
        log::info!(
            "Starting {} in {}",
            program.display(),
            self.config.working_dir.display()
        );

        let child = Command::new(program)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                path: program.clone(),
                source,
            })?;

        log::debug!("Child started (pid {:?})", child.id());
        self.transition(SupervisorState::Running);
        Ok(child)
    }

    /// Interrupt the child, wait out the grace period, then kill it.
    async fn stop(&mut self, mut child: Child) -> Result<ExitSummary, SupervisorError> {
        let grace = self.config.grace_period;

        match (self.config.interrupt)(&child) {
            Ok(()) => {
                log::info!(
                    "Sent interrupt to binary, waiting up to {:?} for it to stop",
                    grace
                );
                tokio::select! {
                    status = child.wait() => {
                        let status = status.map_err(SupervisorError::Wait)?;
                        return Ok(self.finish(Disposition::GracefullyStopped, Some(status)));
                    }
                    () = tokio::time::sleep(grace) => {}
                }
            }
            Err(e) => {
                log::warn!("Failed to send interrupt signal to binary: {}", e);
                tokio::time::sleep(grace).await;
            }
        }

        log::warn!("Binary did not stop in time, forcefully terminating.");
        let status = kill(&mut child).await;
        Ok(self.finish(Disposition::ForceKilled, status))
    }

    fn finish(&mut self, disposition: Disposition, status: Option<ExitStatus>) -> ExitSummary {
        self.transition(disposition.into());
        ExitSummary {
            disposition,
            status,
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        log::debug!("Supervisor state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

/// Kill the child and reap it. Returns the exit status if it could be read.
async fn kill(child: &mut Child) -> Option<ExitStatus> {
    if let Err(e) = child.start_kill() {
        log::warn!("Failed to kill binary: {}", e);
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            log::warn!("Failed to reap killed binary: {}", e);
            None
        }
    }
}

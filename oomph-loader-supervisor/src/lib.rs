//! Child process supervision for the Oomph loader.
//!
//! Provides:
//! - `supervisor`: Launch one binary and drive its graceful-then-forced shutdown
//! - `signal`: Host shutdown signals and interrupt delivery to the child

pub mod signal;
pub mod supervisor;

pub use signal::{ShutdownSignal, send_interrupt};
pub use supervisor::{
    DEFAULT_GRACE_PERIOD, Disposition, ExitSummary, InterruptFn, Supervisor, SupervisorConfig,
    SupervisorError, SupervisorState, current_dir_or_dot,
};

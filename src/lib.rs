// Library exports for testing and potential library use

/// Loader version, sent to the asset service in the User-Agent header.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod debug;
pub mod launcher;

pub use oomph_loader_supervisor as supervisor;
pub use oomph_loader_update as update;

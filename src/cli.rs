//! Command-line interface for oomph-loader.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use crate::config::{
    DEFAULT_BRANCH, DEFAULT_CACHE_DIR, DEFAULT_CLIENT_CERT, DEFAULT_CLIENT_KEY, LauncherConfig,
};
use oomph_loader_update::asset::DEFAULT_ENDPOINT;

/// oomph-loader - fetch the latest Oomph proxy binary and run it
#[derive(Parser, Debug)]
#[command(name = "oomph-loader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The branch to download the Oomph binary from
    #[arg(long, value_name = "NAME", default_value = DEFAULT_BRANCH)]
    pub branch: String,

    /// Only use the local cache and do not attempt to download the latest binary
    #[arg(long)]
    pub use_cache: bool,

    /// Directory holding cached binaries
    #[arg(long, value_name = "DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Asset service endpoint (HTTPS only)
    #[arg(long, value_name = "URL", default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,

    /// PEM client certificate for the asset service
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CLIENT_CERT)]
    pub client_cert: PathBuf,

    /// PEM private key for the client certificate
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CLIENT_KEY)]
    pub client_key: PathBuf,

    /// Seconds the binary gets to exit after an interrupt before it is killed
    #[arg(long, value_name = "SECONDS", default_value_t = 5)]
    pub grace_period: u64,

    /// Log level (off, error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<LevelFilter>,
}

impl Cli {
    /// Resolve the parsed flags into launcher settings.
    pub fn to_config(&self) -> LauncherConfig {
        LauncherConfig {
            branch: self.branch.clone(),
            use_cache: self.use_cache,
            cache_dir: self.cache_dir.clone(),
            endpoint: self.endpoint.clone(),
            client_cert: self.client_cert.clone(),
            client_key: self.client_key.clone(),
            grace_period: Duration::from_secs(self.grace_period),
        }
    }
}

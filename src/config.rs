//! Resolved launcher settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use oomph_loader_supervisor::DEFAULT_GRACE_PERIOD;
use oomph_loader_update::asset::{AssetId, DEFAULT_ENDPOINT};
use oomph_loader_update::http::validate_endpoint;
use oomph_loader_update::TransportError;

/// Default release channel.
pub const DEFAULT_BRANCH: &str = "stable";

/// Directory holding cached binaries, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".oomph-cache";

/// Client certificate presented to the asset service.
pub const DEFAULT_CLIENT_CERT: &str = "oomph-api-client.crt";

/// Private key for [`DEFAULT_CLIENT_CERT`].
pub const DEFAULT_CLIENT_KEY: &str = "oomph-api-client.key";

/// Everything a run needs, resolved once from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Release channel to fetch.
    pub branch: String,
    /// Skip the network and run from the cache only.
    pub use_cache: bool,
    pub cache_dir: PathBuf,
    pub endpoint: String,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
    /// Time the binary gets to exit after an interrupt before it is killed.
    pub grace_period: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            branch: DEFAULT_BRANCH.to_string(),
            use_cache: false,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            client_cert: PathBuf::from(DEFAULT_CLIENT_CERT),
            client_key: PathBuf::from(DEFAULT_CLIENT_KEY),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl LauncherConfig {
    /// Identifier of the binary for this branch and platform.
    pub fn asset_id(&self) -> AssetId {
        AssetId::for_platform(&self.branch)
    }

    /// Where the binary for [`LauncherConfig::asset_id`] is cached.
    pub fn cache_path(&self) -> PathBuf {
        cache_path_for(&self.cache_dir, &self.asset_id())
    }

    /// Reject settings that can never work.
    ///
    /// The endpoint is only checked when the network will be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.branch.is_empty()
            || self
                .branch
                .contains(|c: char| std::path::is_separator(c) || c.is_whitespace())
        {
            return Err(ConfigError::Branch(self.branch.clone()));
        }
        if !self.use_cache {
            validate_endpoint(&self.endpoint).map_err(ConfigError::Endpoint)?;
        }
        Ok(())
    }
}

/// Cache file path of `asset_id` inside `cache_dir`.
pub fn cache_path_for(cache_dir: &Path, asset_id: &AssetId) -> PathBuf {
    cache_dir.join(asset_id.as_str())
}

/// Invalid launcher settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid branch name '{0}'")]
    Branch(String),

    #[error(transparent)]
    Endpoint(TransportError),
}

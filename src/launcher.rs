//! The update-and-supervise pipeline.
//!
//! [`run`] resolves the asset for this platform, refreshes the cache from the
//! asset service (unless running cache-only), and then supervises whichever
//! binary ended up in the cache.

use std::path::{Path, PathBuf};

use oomph_loader_supervisor::{
    ExitSummary, ShutdownSignal, Supervisor, SupervisorConfig, SupervisorError,
};
use oomph_loader_update::asset::{self, AssetId};
use oomph_loader_update::cache::{self, Reconciliation};
use oomph_loader_update::http::{self, HttpClient, UreqClient};
use oomph_loader_update::Transport;

use crate::config::LauncherConfig;

/// Failures that stop the loader.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("no proxy binary found in local cache for {asset_id}, please try again later")]
    NoCacheAvailable { asset_id: AssetId },

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("failed to start async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Fetch (or reuse) the binary and run it until it ends.
pub fn run(config: &LauncherConfig) -> Result<ExitSummary, LaunchError> {
    let cache_path = prepare_binary(config, || Transport::new(build_client(config)))?;
    supervise(config, &cache_path)
}

/// Build the mutual-TLS client for the asset service.
///
/// A missing or unreadable certificate is not fatal: the call is still made
/// and the service decides.
pub fn build_client(config: &LauncherConfig) -> UreqClient {
    let client_cert = match http::load_client_cert(&config.client_cert, &config.client_key) {
        Ok(cert) => Some(cert),
        Err(e) => {
            log::warn!("Failed to load TLS certificate: {}", e);
            None
        }
    };
    UreqClient::new(client_cert, format!("oomph-loader/{}", crate::VERSION))
}

/// Make sure a runnable binary is in the cache and return its path.
///
/// `make_transport` is only called when the network is used.
pub fn prepare_binary<C, F>(config: &LauncherConfig, make_transport: F) -> Result<PathBuf, LaunchError>
where
    C: HttpClient,
    F: FnOnce() -> Transport<C>,
{
    if let Err(e) = std::fs::create_dir_all(&config.cache_dir) {
        log::warn!(
            "Could not create cache directory {}: {}",
            config.cache_dir.display(),
            e
        );
    }

    let asset_id = config.asset_id();
    let cache_path = config.cache_path();
    log::info!("Searching for {}", asset_id);

    let reconciliation = if config.use_cache {
        cache::offline(&cache_path)
    } else {
        update_cache(&make_transport(), &config.endpoint, &asset_id, &cache_path)
    };

    ensure_usable(&reconciliation, &asset_id)?;
    Ok(cache_path)
}

/// Ask the asset service for a newer build and apply the answer to the cache.
pub fn update_cache<C: HttpClient>(
    transport: &Transport<C>,
    endpoint: &str,
    asset_id: &AssetId,
    cache_path: &Path,
) -> Reconciliation {
    let local_hash = cache::compute_file_hash(cache_path);
    let outcome = asset::resolve(transport, endpoint, asset_id, &local_hash);
    cache::reconcile(outcome, cache_path)
}

/// Fail with [`LaunchError::NoCacheAvailable`] if nothing can be launched.
pub fn ensure_usable(reconciliation: &Reconciliation, asset_id: &AssetId) -> Result<(), LaunchError> {
    if !reconciliation.usable() {
        return Err(LaunchError::NoCacheAvailable {
            asset_id: asset_id.clone(),
        });
    }
    if reconciliation.is_fallback() {
        log::warn!("Download failed, resorting to local cache.");
    }
    Ok(())
}

/// Run the cached binary under the supervisor on a fresh Tokio runtime.
pub fn supervise(config: &LauncherConfig, cache_path: &Path) -> Result<ExitSummary, LaunchError> {
    // Spawning a relative path is resolved against the child's working
    // directory, so pin it down first.
    let program = std::path::absolute(cache_path).unwrap_or_else(|_| cache_path.to_path_buf());
    let supervisor_config =
        SupervisorConfig::new(program).with_grace_period(config.grace_period);

    let runtime = tokio::runtime::Runtime::new().map_err(LaunchError::Runtime)?;
    let summary = runtime.block_on(supervise_async(supervisor_config))?;

    if summary.is_abnormal() {
        log::warn!("{}", summary);
    } else {
        log::info!("{}", summary);
    }
    Ok(summary)
}

async fn supervise_async(config: SupervisorConfig) -> Result<ExitSummary, SupervisorError> {
    let mut signals = match ShutdownSignal::install() {
        Ok(signals) => Some(signals),
        Err(e) => {
            log::error!(
                "Failed to install signal handlers ({}); shutdown requests will not reach the binary",
                e
            );
            None
        }
    };
    let shutdown = async move {
        match signals.as_mut() {
            Some(signals) => signals.recv().await,
            None => std::future::pending().await,
        }
    };

    let mut supervisor = Supervisor::new(config);
    supervisor.run(shutdown).await
}

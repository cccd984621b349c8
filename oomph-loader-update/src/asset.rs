//! Asset identifiers and the asset-service request/response contract.
//!
//! This module is responsible for:
//! - Building the platform-specific asset identifier
//! - The JSON request and response shapes of the asset endpoint
//! - Asking the service whether a newer asset exists

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::http::HttpClient;
use crate::transport::{CallOutcome, Transport};

/// Default asset service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.oomph.ac/assets";

/// Prefix shared by every proxy binary asset.
const ASSET_PREFIX: &str = "production_binary";

/// Operating system name as the asset service spells it.
pub fn platform_os() -> &'static str {
    service_os_name(std::env::consts::OS)
}

/// CPU architecture name as the asset service spells it.
pub fn platform_arch() -> &'static str {
    service_arch_name(std::env::consts::ARCH)
}

/// Map a Rust `target_os` name to the service's naming. Unknown names pass through.
pub fn service_os_name(os: &'static str) -> &'static str {
    match os {
        "macos" => "darwin",
        other => other,
    }
}

/// Map a Rust `target_arch` name to the service's naming. Unknown names pass through.
pub fn service_arch_name(arch: &'static str) -> &'static str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Identifier of one proxy binary: branch x OS x architecture.
///
/// Used both as the remote lookup key and the local cache file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(branch: &str, os: &str, arch: &str) -> Self {
        Self(format!("{ASSET_PREFIX}_{branch}_{os}_{arch}"))
    }

    /// Identifier for `branch` on the platform this loader was built for.
    pub fn for_platform(branch: &str) -> Self {
        Self::new(branch, platform_os(), platform_arch())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body of an asset lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRequest {
    pub asset_id: String,
    /// Hash of the binary the caller already has; empty if none.
    #[serde(rename = "asset_hash")]
    pub local_asset_hash: String,
}

/// Compression applied to the payload after base64 decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadCompression {
    None,
    Zlib,
}

/// Successful asset lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    /// Base64 of the binary, possibly compressed. Empty on a cache hit.
    #[serde(default)]
    pub asset_payload: String,
    #[serde(default)]
    pub cache_hit: bool,
    /// Absent for servers that predate the flag; see [`crate::cache::decode_payload`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<PayloadCompression>,
}

/// Ask the asset service whether a newer build of `asset_id` exists.
pub fn resolve<C: HttpClient>(
    transport: &Transport<C>,
    endpoint: &str,
    asset_id: &AssetId,
    local_asset_hash: &str,
) -> CallOutcome<AssetResponse> {
    let request = AssetRequest {
        asset_id: asset_id.to_string(),
        local_asset_hash: local_asset_hash.to_string(),
    };
    log::debug!(
        "Requesting {} from {} (local hash: {})",
        asset_id,
        endpoint,
        if local_asset_hash.is_empty() {
            "<none>"
        } else {
            local_asset_hash
        }
    );
    transport.call_endpoint(endpoint, &request)
}

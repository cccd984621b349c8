//! Local binary cache: hashing, payload decoding, and reconciliation with the
//! asset service's answer.
//!
//! The cache is stateless. Each run recomputes the cached file's hash, and the
//! canonical file is only ever replaced by a rename of a fully written sibling,
//! so an interrupted or failed write leaves the previous binary intact.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use sha2::{Digest, Sha256};

use crate::asset::{AssetResponse, PayloadCompression};
use crate::error::CacheError;
use crate::transport::CallOutcome;

/// Compute the SHA-256 of in-memory data as upper-case hex, the form the asset
/// service compares against.
pub fn compute_data_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:X}", hasher.finalize())
}

/// Hash of the cached binary at `path`, or an empty string if it is absent or
/// unreadable.
pub fn compute_file_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(data) => compute_data_hash(&data),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not read cached binary {}: {}", path.display(), e);
            }
            String::new()
        }
    }
}

/// What the update stage did with the cache, and whether a binary can be run.
#[derive(Debug)]
pub enum Reconciliation {
    /// The network was skipped on request.
    Offline { cache_present: bool },
    /// The call failed; the cache was not touched.
    FetchFailed { cache_present: bool },
    /// The cached binary is already the latest.
    CacheHit,
    /// A new binary was written to the cache.
    Updated { size: usize },
    /// A new binary arrived but could not be decoded or stored.
    UpdateFailed {
        error: CacheError,
        cache_present: bool,
    },
}

impl Reconciliation {
    /// Whether a binary is available at the cache path.
    pub fn usable(&self) -> bool {
        match self {
            Self::CacheHit | Self::Updated { .. } => true,
            Self::Offline { cache_present }
            | Self::FetchFailed { cache_present }
            | Self::UpdateFailed { cache_present, .. } => *cache_present,
        }
    }

    /// Whether the run falls back to an older cached binary.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::UpdateFailed { .. }
        )
    }
}

/// Reconcile the cache without contacting the service.
pub fn offline(cache_path: &Path) -> Reconciliation {
    Reconciliation::Offline {
        cache_present: cache_path.is_file(),
    }
}

/// Apply the outcome of an asset lookup to the cache at `cache_path`.
///
/// Nothing is written unless the payload fully decodes first.
pub fn reconcile(outcome: CallOutcome<AssetResponse>, cache_path: &Path) -> Reconciliation {
    let response = match outcome {
        CallOutcome::Success(response) => response,
        CallOutcome::Failure(message) => {
            log::warn!("Unable to retrieve latest binary: {}", message);
            return Reconciliation::FetchFailed {
                cache_present: cache_path.is_file(),
            };
        }
        CallOutcome::Error(e) => {
            log::warn!("Error occurred while retrieving latest binary: {}", e);
            return Reconciliation::FetchFailed {
                cache_present: cache_path.is_file(),
            };
        }
    };

    if response.cache_hit {
        log::info!("Latest version is already installed.");
        return Reconciliation::CacheHit;
    }

    log::info!(
        "Received asset response ({:.2}MB)",
        megabytes(response.asset_payload.len())
    );

    let result = decode_payload(&response).and_then(|binary| {
        write_cache(cache_path, &binary)?;
        Ok(binary.len())
    });

    match result {
        Ok(size) => {
            log::info!(
                "Latest version downloaded successfully ({:.2}MB)",
                megabytes(size)
            );
            Reconciliation::Updated { size }
        }
        Err(error) => {
            log::warn!("{}; resorting to cache", error);
            Reconciliation::UpdateFailed {
                error,
                cache_present: cache_path.is_file(),
            }
        }
    }
}

/// Decode an asset payload: base64, then decompress per the response's flag.
///
/// Without a flag the bytes are inflated only if they start with a valid zlib
/// header, and kept as-is if that guess turns out wrong.
pub fn decode_payload(response: &AssetResponse) -> Result<Vec<u8>, CacheError> {
    let decoded = STANDARD.decode(response.asset_payload.as_bytes())?;

    match response.compression {
        Some(PayloadCompression::None) => Ok(decoded),
        Some(PayloadCompression::Zlib) => inflate(&decoded),
        None if has_zlib_header(&decoded) => match inflate(&decoded) {
            Ok(inflated) => Ok(inflated),
            Err(e) => {
                log::debug!("Payload looked like zlib but did not inflate ({}); using it raw", e);
                Ok(decoded)
            }
        },
        None => Ok(decoded),
    }
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::with_capacity(data.len().saturating_mul(2));
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(CacheError::Decompress)?;
    Ok(out)
}

/// RFC 1950 header check: deflate method, window <= 32K, and FCHECK valid.
fn has_zlib_header(data: &[u8]) -> bool {
    let [cmf, flg, ..] = *data else {
        return false;
    };
    cmf & 0x0f == 8 && cmf >> 4 <= 7 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

/// Replace the cached binary with `data`.
///
/// The bytes go to a `.new` sibling first, which is made executable and then
/// renamed over `cache_path`.
pub fn write_cache(cache_path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let new_path = staging_path(cache_path);
    let write_err = |source: std::io::Error| CacheError::Write {
        path: cache_path.to_path_buf(),
        source,
    };

    if let Err(e) = write_staged(&new_path, data) {
        let _ = std::fs::remove_file(&new_path);
        return Err(write_err(e));
    }

    std::fs::rename(&new_path, cache_path).map_err(|e| {
        let _ = std::fs::remove_file(&new_path);
        write_err(e)
    })
}

fn write_staged(path: &Path, data: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    }

    Ok(())
}

fn staging_path(cache_path: &Path) -> PathBuf {
    let mut name: OsString = cache_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".new");
    cache_path.with_file_name(name)
}

fn megabytes(len: usize) -> f64 {
    len as f64 / 1024.0 / 1024.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use flate2::Compression;
    use flate2::write::ZlibEncoder;
    use std::io::Write;

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn payload_response(bytes: &[u8], compression: Option<PayloadCompression>) -> AssetResponse {
        AssetResponse {
            asset_payload: STANDARD.encode(bytes),
            cache_hit: false,
            compression,
        }
    }

    #[test]
    fn test_compute_data_hash_known_value() {
        // SHA256 of "hello world"
        assert_eq!(
            compute_data_hash(b"hello world"),
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        );
    }

    #[test]
    fn test_compute_file_hash_absent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(compute_file_hash(&dir.path().join("nope")), "");
    }

    #[test]
    fn test_compute_file_hash_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"hello world").unwrap();
        assert_eq!(compute_file_hash(&path), compute_data_hash(b"hello world"));
    }

    #[test]
    fn test_decode_plain_payload() {
        let response = payload_response(b"XYZ", None);
        assert_eq!(decode_payload(&response).unwrap(), b"XYZ");
    }

    #[test]
    fn test_decode_flagged_zlib_payload() {
        let binary = b"\x7fELF pretend binary".repeat(50);
        let response = payload_response(&zlib(&binary), Some(PayloadCompression::Zlib));
        assert_eq!(decode_payload(&response).unwrap(), binary);
    }

    #[test]
    fn test_decode_sniffed_zlib_payload() {
        let binary = b"MZ pretend binary".repeat(50);
        let response = payload_response(&zlib(&binary), None);
        assert_eq!(decode_payload(&response).unwrap(), binary);
    }

    #[test]
    fn test_explicit_none_skips_inflate() {
        let compressed = zlib(b"abc");
        let response = payload_response(&compressed, Some(PayloadCompression::None));
        assert_eq!(decode_payload(&response).unwrap(), compressed);
    }

    #[test]
    fn test_decode_bad_base64() {
        let response = AssetResponse {
            asset_payload: "not base64!!".to_string(),
            cache_hit: false,
            compression: None,
        };
        assert!(matches!(decode_payload(&response), Err(CacheError::Decode(_))));
    }

    #[test]
    fn test_decode_bad_zlib() {
        let response = payload_response(b"\x78\x9c garbage", Some(PayloadCompression::Zlib));
        assert!(matches!(
            decode_payload(&response),
            Err(CacheError::Decompress(_))
        ));
    }

    #[test]
    fn test_unflagged_raw_payload_with_zlib_like_prefix() {
        let raw = b"x^raw uncompressed payload";
        assert!(has_zlib_header(raw));
        let response = payload_response(raw, None);
        assert_eq!(decode_payload(&response).unwrap(), raw);

        let raw = b"\x78\x9c not actually deflate";
        assert_eq!(decode_payload(&payload_response(raw, None)).unwrap(), raw);
    }

    #[test]
    fn test_zlib_header_detection() {
        assert!(has_zlib_header(&[0x78, 0x9c]));
        assert!(has_zlib_header(&[0x78, 0x01]));
        assert!(has_zlib_header(&[0x78, 0xda]));
        assert!(!has_zlib_header(b"\x7fELF"));
        assert!(!has_zlib_header(b"MZ"));
        assert!(!has_zlib_header(b"X"));
        assert!(!has_zlib_header(b""));
    }

    #[test]
    fn test_fetch_failure_keeps_existing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"old").unwrap();

        let result = reconcile(CallOutcome::Failure("maintenance".to_string()), &path);
        assert!(matches!(result, Reconciliation::FetchFailed { cache_present: true }));
        assert!(result.usable());
        assert!(result.is_fallback());
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn test_fetch_error_without_cache_is_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");

        let result = reconcile(
            CallOutcome::Error(TransportError::Request("timed out".to_string())),
            &path,
        );
        assert!(!result.usable());
        assert!(!path.exists());
    }

    #[test]
    fn test_cache_hit_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"current").unwrap();

        let response = AssetResponse {
            asset_payload: String::new(),
            cache_hit: true,
            compression: None,
        };
        let result = reconcile(CallOutcome::Success(response), &path);
        assert!(matches!(result, Reconciliation::CacheHit));
        assert!(result.usable());
        assert_eq!(std::fs::read(&path).unwrap(), b"current");
    }

    #[test]
    fn test_new_payload_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("production_binary_beta_linux_amd64");

        let result = reconcile(CallOutcome::Success(payload_response(b"XYZ", None)), &path);
        assert!(matches!(result, Reconciliation::Updated { size: 3 }));
        assert!(result.usable());
        assert_eq!(std::fs::read(&path).unwrap(), b"XYZ");
        assert!(!staging_path(&path).exists(), "Staging file must not linger");
    }

    #[test]
    fn test_bad_payload_keeps_existing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"old").unwrap();

        let response = AssetResponse {
            asset_payload: "%%%".to_string(),
            cache_hit: false,
            compression: None,
        };
        let result = reconcile(CallOutcome::Success(response), &path);
        assert!(matches!(
            result,
            Reconciliation::UpdateFailed {
                error: CacheError::Decode(_),
                cache_present: true
            }
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"old");
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("bin");

        let result = reconcile(CallOutcome::Success(payload_response(b"XYZ", None)), &path);
        assert!(matches!(
            result,
            Reconciliation::UpdateFailed {
                error: CacheError::Write { .. },
                cache_present: false
            }
        ));
        assert!(!result.usable());
    }

    #[test]
    fn test_write_cache_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, b"old contents that are longer").unwrap();

        write_cache(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    #[cfg(unix)]
    fn test_write_cache_marks_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");

        write_cache(&path, b"#!/bin/sh\n").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_offline_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        assert!(!offline(&path).usable());
        std::fs::write(&path, b"x").unwrap();
        assert!(offline(&path).usable());
    }
}

//! HTTP client for the asset service, with native-tls and client certificates.

use std::path::Path;
use std::time::Duration;

use ureq::Agent;
use ureq::tls::{
    Certificate, ClientCert, PemItem, PrivateKey, RootCerts, TlsConfig, TlsProvider, parse_pem,
};

use crate::error::{ClientConfigError, TransportError};

/// Global timeout for a whole asset call (60 seconds).
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum response body size (256 MB). Asset payloads are whole binaries,
/// base64-encoded, so this is far above the API-style limits.
pub const MAX_RESPONSE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate that an endpoint URL is safe to send the client certificate to.
///
/// Only `https://` URLs with a host are accepted.
pub fn validate_endpoint(url: &str) -> Result<(), TransportError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| TransportError::InvalidEndpoint(format!("Invalid URL '{}': {}", url, e)))?;

    match parsed.scheme() {
        "https" => {}
        scheme => {
            return Err(TransportError::InvalidEndpoint(format!(
                "Insecure URL scheme '{}' rejected; only HTTPS is allowed. URL: {}",
                scheme, url
            )));
        }
    }

    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(TransportError::InvalidEndpoint(format!(
            "URL has no host: {}",
            url
        )));
    }

    Ok(())
}

/// Status code and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// The single network seam of the loader.
///
/// Implementations perform exactly one POST per call and never retry.
pub trait HttpClient {
    fn post_json(&self, endpoint: &str, body: &[u8]) -> Result<RawResponse, TransportError>;
}

/// Load a PEM client certificate chain and private key for mutual TLS.
///
/// Every certificate block in the certificate file is kept, leaf first.
pub fn load_client_cert(cert_path: &Path, key_path: &Path) -> Result<ClientCert, ClientConfigError> {
    let cert_pem = read_pem(cert_path)?;
    let key_pem = read_pem(key_path)?;

    let chain = parse_cert_chain(&cert_pem).map_err(|reason| ClientConfigError::Parse {
        path: cert_path.to_path_buf(),
        reason,
    })?;
    let key = PrivateKey::from_pem(&key_pem).map_err(|e| ClientConfigError::Parse {
        path: key_path.to_path_buf(),
        reason: e.to_string(),
    })?;

    Ok(ClientCert::new_with_certs(&chain, key))
}

fn parse_cert_chain(pem: &[u8]) -> Result<Vec<Certificate<'static>>, String> {
    let mut chain = Vec::new();
    for item in parse_pem(pem) {
        if let PemItem::Certificate(cert) = item.map_err(|e| e.to_string())? {
            chain.push(cert.to_owned());
        }
    }
    if chain.is_empty() {
        return Err("no certificate found in PEM data".to_string());
    }
    Ok(chain)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ClientConfigError> {
    std::fs::read(path).map_err(|source| ClientConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Create a new HTTP agent configured with native-tls and a global timeout.
///
/// Non-2xx statuses come back as ordinary responses so the caller can read
/// the server's error body.
pub fn agent(client_cert: Option<ClientCert>) -> Agent {
    let tls_config = TlsConfig::builder()
        .provider(TlsProvider::NativeTls)
        .root_certs(RootCerts::PlatformVerifier)
        .client_cert(client_cert)
        .build();

    Agent::config_builder()
        .tls_config(tls_config)
        .timeout_global(Some(HTTP_TIMEOUT))
        .http_status_as_error(false)
        .build()
        .into()
}

/// [`HttpClient`] backed by a `ureq` agent.
///
/// Built once at start-up and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct UreqClient {
    agent: Agent,
    user_agent: String,
}

impl UreqClient {
    pub fn new(client_cert: Option<ClientCert>, user_agent: impl Into<String>) -> Self {
        Self {
            agent: agent(client_cert),
            user_agent: user_agent.into(),
        }
    }
}

impl HttpClient for UreqClient {
    fn post_json(&self, endpoint: &str, body: &[u8]) -> Result<RawResponse, TransportError> {
        validate_endpoint(endpoint)?;

        let response = self
            .agent
            .post(endpoint)
            .header("Content-Type", "application/json")
            .header("User-Agent", self.user_agent.as_str())
            .send(body)
            .map_err(|e| TransportError::Request(format!("{}: {}", endpoint, e)))?;

        let status = response.status().as_u16();
        let body = response
            .into_body()
            .with_config()
            .limit(MAX_RESPONSE_SIZE)
            .read_to_vec()
            .map_err(|e| TransportError::ReadBody(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}

/// Format the first few bytes of a buffer as a human-readable hex + ASCII preview.
///
/// Used in diagnostics to show what the server actually sent.
pub fn format_bytes_preview(data: &[u8]) -> String {
    let take = data.len().min(16);
    let hex: Vec<String> = data[..take].iter().map(|b| format!("{:02x}", b)).collect();
    let ascii: String = data[..take]
        .iter()
        .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
        .collect();
    format!("[{}] \"{}\"", hex.join(" "), ascii)
}

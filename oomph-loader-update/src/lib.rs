//! Asset fetch and local binary cache for the Oomph loader.
//!
//! Provides:
//! - `pool`: Bounded pool of reusable request buffers
//! - `http`: `HttpClient` seam and the mutual-TLS `ureq` client
//! - `transport`: One-shot JSON calls with a three-way outcome
//! - `asset`: Asset identifiers and the asset-service contract
//! - `cache`: Cached-binary hashing, payload decoding, and reconciliation

pub mod asset;
pub mod cache;
pub mod error;
pub mod http;
pub mod pool;
pub mod transport;

pub use asset::{AssetId, AssetRequest, AssetResponse, PayloadCompression};
pub use cache::Reconciliation;
pub use error::{CacheError, ClientConfigError, TransportError};
pub use http::{HttpClient, RawResponse, UreqClient};
pub use pool::BufferPool;
pub use transport::{CallOutcome, Transport};

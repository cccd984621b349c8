//! One-shot JSON calls against the asset service.
//!
//! A call serializes the request into a pooled buffer, POSTs it once through
//! an [`HttpClient`], and resolves to exactly one [`CallOutcome`].

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;
use crate::http::{HttpClient, RawResponse, format_bytes_preview};
use crate::pool::BufferPool;

/// Body the service sends alongside a non-200 status.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Result of a single endpoint call.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// HTTP 200 with a body that decoded as `T`.
    Success(T),
    /// Non-200 with a server-supplied reason.
    Failure(String),
    /// The call could not be completed or its response could not be understood.
    Error(TransportError),
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Issues calls through a shared, pre-configured client.
#[derive(Debug)]
pub struct Transport<C> {
    client: C,
    pool: BufferPool,
}

impl<C: HttpClient> Transport<C> {
    pub fn new(client: C) -> Self {
        Self::with_pool(client, BufferPool::default())
    }

    pub fn with_pool(client: C, pool: BufferPool) -> Self {
        Self { client, pool }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// POST `request` as JSON to `endpoint` and classify the response.
    ///
    /// Performs exactly one network call; failures are returned, never retried.
    pub fn call_endpoint<Req, T>(&self, endpoint: &str, request: &Req) -> CallOutcome<T>
    where
        Req: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut body = self.pool.get();
        if let Err(e) = serde_json::to_writer(&mut *body, request) {
            return CallOutcome::Error(TransportError::Encode(e));
        }

        match self.client.post_json(endpoint, &body) {
            Ok(response) => dispatch(response),
            Err(e) => CallOutcome::Error(e),
        }
    }
}

/// Map a raw response to an outcome: 200 decodes as `T`, anything else as an
/// [`ErrorResponse`].
pub fn dispatch<T: DeserializeOwned>(response: RawResponse) -> CallOutcome<T> {
    if response.status == 200 {
        return match serde_json::from_slice(&response.body) {
            Ok(data) => CallOutcome::Success(data),
            Err(e) => CallOutcome::Error(TransportError::Decode(e)),
        };
    }

    match serde_json::from_slice::<ErrorResponse>(&response.body) {
        Ok(err) => CallOutcome::Failure(err.message),
        Err(_) => {
            log::debug!(
                "Unreadable error body for status {}: {}",
                response.status,
                format_bytes_preview(&response.body)
            );
            CallOutcome::Error(TransportError::NoMessage {
                status: response.status,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pong {
        value: u32,
    }

    /// Replays one canned reply and records what was sent.
    struct ScriptedClient {
        reply: Mutex<Option<Result<RawResponse, TransportError>>>,
        sent: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl ScriptedClient {
        fn replying(status: u16, body: &str) -> Self {
            Self {
                reply: Mutex::new(Some(Ok(RawResponse {
                    status,
                    body: body.as_bytes().to_vec(),
                }))),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing(err: TransportError) -> Self {
            Self {
                reply: Mutex::new(Some(Err(err))),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpClient for ScriptedClient {
        fn post_json(&self, endpoint: &str, body: &[u8]) -> Result<RawResponse, TransportError> {
            self.sent.lock().push((endpoint.to_string(), body.to_vec()));
            self.reply.lock().take().expect("client called more than once")
        }
    }

    #[test]
    fn test_success_decodes_body() {
        let transport = Transport::new(ScriptedClient::replying(200, r#"{"value": 7}"#));
        let outcome: CallOutcome<Pong> =
            transport.call_endpoint("https://example.test/ping", &serde_json::json!({"a": 1}));
        match outcome {
            CallOutcome::Success(pong) => assert_eq!(pong, Pong { value: 7 }),
            other => panic!("expected success, got {other:?}"),
        }

        let sent = transport.client().sent.lock();
        assert_eq!(sent.len(), 1, "Exactly one request must be sent");
        assert_eq!(sent[0].0, "https://example.test/ping");
        let body: serde_json::Value = serde_json::from_slice(&sent[0].1).unwrap();
        assert_eq!(body, serde_json::json!({"a": 1}));
    }

    #[test]
    fn test_success_with_bad_body_is_error() {
        let transport = Transport::new(ScriptedClient::replying(200, "<html>oops</html>"));
        let outcome: CallOutcome<Pong> = transport.call_endpoint("https://example.test", &());
        assert!(matches!(outcome, CallOutcome::Error(TransportError::Decode(_))));
    }

    #[test]
    fn test_non_200_with_message_is_failure() {
        let transport = Transport::new(ScriptedClient::replying(
            403,
            r#"{"message": "certificate revoked"}"#,
        ));
        let outcome: CallOutcome<Pong> = transport.call_endpoint("https://example.test", &());
        match outcome {
            CallOutcome::Failure(msg) => assert_eq!(msg, "certificate revoked"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_non_200_without_message_is_error() {
        let transport = Transport::new(ScriptedClient::replying(502, "Bad Gateway"));
        let outcome: CallOutcome<Pong> = transport.call_endpoint("https://example.test", &());
        match outcome {
            CallOutcome::Error(err) => {
                assert!(matches!(err, TransportError::NoMessage { status: 502 }));
                assert_eq!(
                    err.to_string(),
                    "server responded with status code 502 with no message"
                );
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_transport_error_passes_through() {
        let transport = Transport::new(ScriptedClient::failing(TransportError::Request(
            "connection refused".to_string(),
        )));
        let outcome: CallOutcome<Pong> = transport.call_endpoint("https://example.test", &());
        assert!(matches!(outcome, CallOutcome::Error(TransportError::Request(_))));
    }

    #[test]
    fn test_request_buffer_returns_to_pool() {
        let transport = Transport::with_pool(
            ScriptedClient::replying(200, r#"{"value": 1}"#),
            BufferPool::with_initial_capacity(2, 1024, 64),
        );
        let _: CallOutcome<Pong> = transport.call_endpoint("https://example.test", &"hi");
        assert_eq!(transport.pool().idle(), 1);
    }
}

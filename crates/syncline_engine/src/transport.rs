//! Transport abstraction for dispatching operations.
//!
//! The engine issues one request per operation and interprets the status
//! code. How the request reaches the server is up to the implementation.

use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use syncline_protocol::{HttpMethod, Payload};

/// Optional request features the transport may honor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportHints {
    /// Compress the request body.
    pub compression: bool,
    /// Send a delta instead of the full payload where supported.
    pub delta_sync: bool,
}

/// A request issued by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: HttpMethod,
    /// Target path or URL.
    pub url: String,
    /// Request body.
    pub data: Option<Payload>,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Per-request timeout. Enforcing it is the transport's job.
    pub timeout: Option<Duration>,
    /// Optional features.
    pub hints: TransportHints,
}

impl TransportRequest {
    /// Creates a bodiless `GET` request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            data: None,
            headers: BTreeMap::new(),
            timeout: None,
            hints: TransportHints::default(),
        }
    }

    /// Size of the serialized request body in bytes.
    pub fn body_size(&self) -> usize {
        self.data
            .as_ref()
            .and_then(|d| serde_json::to_vec(d).ok())
            .map_or(0, |b| b.len())
    }
}

/// A response from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub data: Payload,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
}

impl TransportResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, data: Payload) -> Self {
        Self {
            status,
            data,
            headers: BTreeMap::new(),
        }
    }

    /// `200 OK` with the given body.
    pub fn ok(data: Payload) -> Self {
        Self::new(200, data)
    }

    /// `409 Conflict` carrying the server's version of the resource.
    pub fn conflict(server_version: Payload) -> Self {
        Self::new(409, serde_json::json!({ "serverVersion": server_version }))
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true for 409.
    pub fn is_conflict(&self) -> bool {
        self.status == 409
    }

    /// Server version carried in a conflict body, under `serverVersion` or
    /// `server_version`.
    pub fn server_version(&self) -> Option<&Payload> {
        self.data
            .get("serverVersion")
            .or_else(|| self.data.get("server_version"))
    }

    /// Size of the serialized response body in bytes.
    pub fn body_size(&self) -> usize {
        if self.data.is_null() {
            return 0;
        }
        serde_json::to_vec(&self.data).map_or(0, |b| b.len())
    }

    /// Short description of an error response, for error records.
    pub fn error_message(&self) -> String {
        self.data
            .get("message")
            .or_else(|| self.data.get("error"))
            .and_then(Payload::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", self.status))
    }
}

/// A transport carries engine requests to the server.
///
/// Implementations return `Err` only when no response was received
/// (network failure, timeout). Any HTTP status, including errors, is an
/// `Ok` response.
pub trait Transport: Send + Sync + 'static {
    /// Sends one request.
    fn request(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = SyncResult<TransportResponse>> + Send;
}

type Handler = Box<dyn Fn(&TransportRequest) -> SyncResult<TransportResponse> + Send + Sync>;

/// A scripted transport for testing.
///
/// Answers from a FIFO of queued results, then from the handler if one is
/// set, otherwise with `200 {}`. Every request is recorded when it is
/// issued.
#[derive(Default)]
pub struct MockTransport {
    offline: AtomicBool,
    script: Mutex<VecDeque<SyncResult<TransportResponse>>>,
    handler: Mutex<Option<Handler>>,
    delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    /// Creates a transport that answers `200 {}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: TransportResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues an error.
    pub fn push_error(&self, error: SyncError) {
        self.script.lock().push_back(Err(error));
    }

    /// Answers requests with `handler` once the script is exhausted.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&TransportRequest) -> SyncResult<TransportResponse> + Send + Sync + 'static,
    {
        *self.handler.lock() = Some(Box::new(handler));
    }

    /// Makes every request fail with a retryable network error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delays every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Returns the requests issued so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// Returns the number of requests issued so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn answer(&self, request: &TransportRequest) -> SyncResult<TransportResponse> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("network unreachable"));
        }
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        match self.handler.lock().as_ref() {
            Some(handler) => handler(request),
            None => Ok(TransportResponse::ok(serde_json::json!({}))),
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("offline", &self.offline.load(Ordering::SeqCst))
            .field("scripted", &self.script.lock().len())
            .field("requests", &self.request_count())
            .finish()
    }
}

impl Transport for MockTransport {
    fn request(
        &self,
        request: TransportRequest,
    ) -> impl Future<Output = SyncResult<TransportResponse>> + Send {
        let outcome = self.answer(&request);
        self.requests.lock().push(request);
        let delay = *self.delay.lock();

        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_defaults_to_ok() {
        let transport = MockTransport::new();
        let response = transport
            .request(TransportRequest::get("/health"))
            .await
            .unwrap();
        assert!(response.is_success());
        assert_eq!(transport.request_count(), 1);
        assert_eq!(transport.requests()[0].url, "/health");
    }

    #[tokio::test]
    async fn mock_script_then_handler() {
        let transport = MockTransport::new();
        transport.push_response(TransportResponse::new(503, json!({})));
        transport.push_error(SyncError::Timeout);
        transport.set_handler(|req| Ok(TransportResponse::ok(json!({ "echo": req.url }))));

        let first = transport.request(TransportRequest::get("/a")).await.unwrap();
        assert_eq!(first.status, 503);

        let second = transport.request(TransportRequest::get("/b")).await;
        assert!(matches!(second, Err(SyncError::Timeout)));

        let third = transport.request(TransportRequest::get("/c")).await.unwrap();
        assert_eq!(third.data, json!({ "echo": "/c" }));
    }

    #[tokio::test]
    async fn mock_offline_fails_retryably() {
        let transport = MockTransport::new();
        transport.set_offline(true);

        let err = transport
            .request(TransportRequest::get("/a"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn response_server_version() {
        let response = TransportResponse::conflict(json!({"v": 2}));
        assert!(response.is_conflict());
        assert_eq!(response.server_version(), Some(&json!({"v": 2})));

        let snake = TransportResponse::new(409, json!({"server_version": 3}));
        assert_eq!(snake.server_version(), Some(&json!(3)));

        let bare = TransportResponse::new(409, json!({"message": "stale"}));
        assert_eq!(bare.server_version(), None);
        assert_eq!(bare.error_message(), "stale");
    }

    #[test]
    fn body_sizes() {
        let mut request = TransportRequest::get("/a");
        assert_eq!(request.body_size(), 0);
        request.data = Some(json!({"a": 1}));
        assert_eq!(request.body_size(), br#"{"a":1}"#.len());

        assert_eq!(TransportResponse::new(204, Payload::Null).body_size(), 0);
        assert_eq!(TransportResponse::ok(json!([1, 2])).body_size(), 5);
    }
}

//! Mock HTTP transport for testing.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ApiError;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// A recorded exchange for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request: ApiRequest,
    pub access_token: Option<String>,
}

type Handler = dyn Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, ApiError> + Send + Sync;

/// Mock implementation of the `HttpTransport` trait.
///
/// Behavior is a handler function over the request and attached token;
/// every exchange is recorded for assertions and a one-shot error can be
/// injected ahead of the next call.
///
/// # Example
///
/// ```rust,ignore
/// let transport = MockTransport::new(|request, token| {
///     match token {
///         Some("fresh") => Ok(ApiResponse::new(200, json!({"ok": true}))),
///         _ => Ok(ApiResponse::new(401, Value::Null)),
///     }
/// });
///
/// // ... drive the pipeline ...
///
/// assert_eq!(transport.request_count(), 2);
/// ```
pub struct MockTransport {
    handler: Box<Handler>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    next_error: Arc<RwLock<Option<ApiError>>>,
}

impl MockTransport {
    /// Create a mock transport driven by the given handler.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest, Option<&str>) -> Result<ApiResponse, ApiError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// A transport answering every request with the same status and body.
    pub fn always(status: u16, body: Value) -> Self {
        Self::new(move |_, _| Ok(ApiResponse::new(status, body.clone())))
    }

    /// Configure the next call to fail with the given error.
    pub fn set_next_error(&self, error: ApiError) {
        *self.next_error.write().expect("mock lock poisoned") = Some(error);
    }

    /// All recorded exchanges.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().expect("mock lock poisoned").clone()
    }

    /// Number of executed exchanges.
    pub fn request_count(&self) -> usize {
        self.requests.read().expect("mock lock poisoned").len()
    }

    /// Recorded exchanges whose path matches exactly.
    pub fn requests_for(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .read()
            .expect("mock lock poisoned")
            .iter()
            .filter(|recorded| recorded.request.path == path)
            .cloned()
            .collect()
    }

    /// Clear recorded exchanges.
    pub fn clear_recorded(&self) {
        self.requests.write().expect("mock lock poisoned").clear();
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        self.requests
            .write()
            .expect("mock lock poisoned")
            .push(RecordedRequest {
                request: request.clone(),
                access_token: access_token.map(|t| t.to_string()),
            });

        if let Some(error) = self
            .next_error
            .write()
            .expect("mock lock poisoned")
            .take()
        {
            return Err(error);
        }

        (self.handler)(request, access_token)
    }
}

//! The outbound call pipeline.
//!
//! Every call goes: attach current access token -> execute -> map status.
//! A 401 triggers one session renewal and one replay with the fresh token;
//! a second 401 for the same call forces logout and surfaces
//! `SessionExpired`. No other status is ever retried.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics;
use crate::session::SessionManager;

use super::{ApiRequest, HttpTransport};

/// Wraps every outbound call with credential attachment and the
/// single-replay authorization recovery.
pub struct TransportPipeline {
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionManager>,
}

impl TransportPipeline {
    pub fn new(transport: Arc<dyn HttpTransport>, session: Arc<SessionManager>) -> Self {
        Self { transport, session }
    }

    /// Execute a call, returning the response body on 2xx.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let correlation_id = Uuid::new_v4();
        // Replay state lives here, never on the request object.
        let mut replays: u8 = 0;

        loop {
            let token = self.session.access_token();
            let response = self.transport.execute(&request, token.as_deref()).await?;

            let status_label = response.status.to_string();
            metrics::TRANSPORT_REQUESTS
                .with_label_values(&[request.method.as_str(), status_label.as_str()])
                .inc();

            if response.status == 401 {
                if replays >= 1 {
                    warn!(
                        correlation_id = %correlation_id,
                        path = %request.path,
                        "authorization failed after replay, forcing logout"
                    );
                    self.session.force_logout();
                    return Err(ApiError::SessionExpired);
                }
                replays += 1;
                debug!(
                    correlation_id = %correlation_id,
                    path = %request.path,
                    "authorization failure, renewing session"
                );
                metrics::TRANSPORT_REPLAYS.inc();
                // A renewal already in flight is awaited, not duplicated;
                // renewal failure has forced logout before this returns.
                self.session.renew().await?;
                continue;
            }

            if response.is_success() {
                return Ok(response.body);
            }

            debug!(
                correlation_id = %correlation_id,
                method = %request.method,
                path = %request.path,
                status = response.status,
                "request rejected"
            );
            return Err(status_error(response.status, &response.body));
        }
    }
}

/// Map a non-2xx, non-401 response to the error taxonomy.
pub fn status_error(status: u16, body: &Value) -> ApiError {
    match status {
        403 => ApiError::PermissionDenied(error_message(body).unwrap_or_else(|| "forbidden".to_string())),
        404 => ApiError::NotFound(error_message(body).unwrap_or_else(|| "resource not found".to_string())),
        400 | 422 => ApiError::ValidationFailed {
            message: error_message(body).unwrap_or_else(|| "invalid request".to_string()),
            fields: validation_fields(body),
        },
        409 => ApiError::ConcurrentModification(
            error_message(body).unwrap_or_else(|| "resource was modified".to_string()),
        ),
        _ => ApiError::Transport(format!("HTTP {}", status)),
    }
}

/// Extract a human-readable message from an error body, accepting the
/// `detail` and `message` conventions.
fn error_message(body: &Value) -> Option<String> {
    body.get("detail")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

/// Extract per-field validation detail from an `{errors: {field: msg}}` body.
fn validation_fields(body: &Value) -> BTreeMap<String, String> {
    body.get("errors")
        .and_then(Value::as_object)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|msg| (k.clone(), msg.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

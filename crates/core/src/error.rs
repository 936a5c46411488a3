//! Error taxonomy shared by all components.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::resource::TicketStatus;

/// Errors surfaced by the session, transport, resource, workflow and
/// monitor components.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Session expired")]
    SessionExpired,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {message}")]
    ValidationFailed {
        message: String,
        /// Per-field detail, when the server provided it.
        fields: BTreeMap<String, String>,
    },

    #[error("Invalid ticket transition: {from} -> {to}")]
    InvalidTransition {
        from: TicketStatus,
        to: TicketStatus,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl ApiError {
    /// Build a validation error without field detail.
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::ValidationFailed {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// True for failures to complete a call at all (network error, timeout,
    /// unexpected server status), as opposed to application-level rejections.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Timeout | ApiError::ConnectionFailed(_) | ApiError::Transport(_)
        )
    }
}

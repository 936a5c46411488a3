//! Session endpoint access.
//!
//! Renewal traffic goes straight to the transport, never through the
//! 401-replay pipeline, so a renewal can never trigger another renewal.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::resource::envelope::decode_entity;
use crate::transport::{status_error, ApiRequest, HttpTransport};

use super::types::{CredentialPair, Identity, LoginSuccess, RenewedCredentials};

/// The session endpoints: login, refresh, logout, current user.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginSuccess, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RenewedCredentials, ApiError>;

    async fn logout(&self, access_token: &str) -> Result<(), ApiError>;

    async fn current_user(&self, access_token: &str) -> Result<Identity, ApiError>;
}

/// Auth backend over the raw HTTP transport.
pub struct HttpAuthBackend {
    transport: Arc<dyn HttpTransport>,
}

impl HttpAuthBackend {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponseWire {
    access_token: String,
    refresh_token: String,
    user: Identity,
}

#[derive(Debug, Deserialize)]
struct RefreshResponseWire {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[async_trait]
impl AuthBackend for HttpAuthBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginSuccess, ApiError> {
        let request = ApiRequest::post("/auth/login")
            .with_json(json!({"username": username, "password": password}));
        let response = self.transport.execute(&request, None).await?;

        if response.status == 401 {
            return Err(ApiError::InvalidCredentials);
        }
        if !response.is_success() {
            return Err(status_error(response.status, &response.body));
        }

        let wire: LoginResponseWire = decode_entity(response.body, None)?;
        Ok(LoginSuccess {
            credentials: CredentialPair {
                access_token: wire.access_token,
                refresh_token: wire.refresh_token,
            },
            user: wire.user,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RenewedCredentials, ApiError> {
        let request =
            ApiRequest::post("/auth/refresh").with_json(json!({"refresh_token": refresh_token}));
        let response = self.transport.execute(&request, None).await?;

        if response.status == 401 {
            return Err(ApiError::SessionExpired);
        }
        if !response.is_success() {
            return Err(status_error(response.status, &response.body));
        }

        let wire: RefreshResponseWire = decode_entity(response.body, None)?;
        Ok(RenewedCredentials {
            access_token: wire.access_token,
            refresh_token: wire.refresh_token,
        })
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/logout");
        let response = self.transport.execute(&request, Some(access_token)).await?;

        // A 401 here just means the session is already dead server-side.
        if response.is_success() || response.status == 401 {
            Ok(())
        } else {
            Err(status_error(response.status, &response.body))
        }
    }

    async fn current_user(&self, access_token: &str) -> Result<Identity, ApiError> {
        let request = ApiRequest::get("/auth/me");
        let response = self.transport.execute(&request, Some(access_token)).await?;

        if response.status == 401 {
            return Err(ApiError::SessionExpired);
        }
        if !response.is_success() {
            return Err(status_error(response.status, &response.body));
        }

        decode_entity(response.body, None)
    }
}

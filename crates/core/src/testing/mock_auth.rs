//! Mock auth backend for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::session::{
    AuthBackend, CredentialPair, Identity, LoginSuccess, RenewedCredentials,
};

/// Mock implementation of the `AuthBackend` trait.
///
/// Issues sequential token pairs (`access-1`, `refresh-1`, ...), counts
/// every call, and can be configured to fail or delay refreshes.
pub struct MockAuthBackend {
    users: RwLock<HashMap<String, (String, Identity)>>,
    issued_access: RwLock<Option<String>>,
    issued_refresh: RwLock<Option<String>>,
    current: RwLock<Option<Identity>>,
    token_counter: AtomicU64,
    login_calls: AtomicU64,
    refresh_calls: AtomicU64,
    logout_calls: AtomicU64,
    current_user_calls: AtomicU64,
    fail_refresh: AtomicBool,
    fail_logout: AtomicBool,
    rotate_refresh: AtomicBool,
    refresh_delay_ms: AtomicU64,
}

impl Default for MockAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthBackend {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            issued_access: RwLock::new(None),
            issued_refresh: RwLock::new(None),
            current: RwLock::new(None),
            token_counter: AtomicU64::new(0),
            login_calls: AtomicU64::new(0),
            refresh_calls: AtomicU64::new(0),
            logout_calls: AtomicU64::new(0),
            current_user_calls: AtomicU64::new(0),
            fail_refresh: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            rotate_refresh: AtomicBool::new(false),
            refresh_delay_ms: AtomicU64::new(0),
        }
    }

    /// Register a user accepted by `login`.
    pub fn with_user(self, username: &str, password: &str, identity: Identity) -> Self {
        self.users
            .write()
            .expect("mock lock poisoned")
            .insert(username.to_string(), (password.to_string(), identity));
        self
    }

    /// Make every refresh fail (expired refresh token).
    pub fn with_failing_refresh(self) -> Self {
        self.fail_refresh.store(true, Ordering::SeqCst);
        self
    }

    /// Make server-side logout fail.
    pub fn with_failing_logout(self) -> Self {
        self.fail_logout.store(true, Ordering::SeqCst);
        self
    }

    /// Rotate the refresh token on every refresh.
    pub fn with_rotating_refresh(self) -> Self {
        self.rotate_refresh.store(true, Ordering::SeqCst);
        self
    }

    /// Delay refreshes so concurrent renewals overlap deterministically.
    pub fn with_slow_refresh(self) -> Self {
        self.refresh_delay_ms.store(50, Ordering::SeqCst);
        self
    }

    pub fn login_calls(&self) -> u64 {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u64 {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn current_user_calls(&self) -> u64 {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    /// The most recently issued access token, if any.
    pub fn issued_access_token(&self) -> Option<String> {
        self.issued_access
            .read()
            .expect("mock lock poisoned")
            .clone()
    }

    fn next_pair(&self) -> CredentialPair {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst) + 1;
        CredentialPair {
            access_token: format!("access-{}", n),
            refresh_token: format!("refresh-{}", n),
        }
    }
}

#[async_trait]
impl AuthBackend for MockAuthBackend {
    async fn login(&self, username: &str, password: &str) -> Result<LoginSuccess, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);

        let identity = {
            let users = self.users.read().expect("mock lock poisoned");
            match users.get(username) {
                Some((expected, identity)) if expected == password => identity.clone(),
                _ => return Err(ApiError::InvalidCredentials),
            }
        };

        let pair = self.next_pair();
        *self.issued_access.write().expect("mock lock poisoned") =
            Some(pair.access_token.clone());
        *self.issued_refresh.write().expect("mock lock poisoned") =
            Some(pair.refresh_token.clone());
        *self.current.write().expect("mock lock poisoned") = Some(identity.clone());

        Ok(LoginSuccess {
            credentials: pair,
            user: identity,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RenewedCredentials, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.refresh_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ApiError::SessionExpired);
        }

        let valid = self
            .issued_refresh
            .read()
            .expect("mock lock poisoned")
            .as_deref()
            == Some(refresh_token);
        if !valid {
            return Err(ApiError::SessionExpired);
        }

        let pair = self.next_pair();
        *self.issued_access.write().expect("mock lock poisoned") =
            Some(pair.access_token.clone());

        let refresh_token = if self.rotate_refresh.load(Ordering::SeqCst) {
            *self.issued_refresh.write().expect("mock lock poisoned") =
                Some(pair.refresh_token.clone());
            Some(pair.refresh_token)
        } else {
            None
        };

        Ok(RenewedCredentials {
            access_token: pair.access_token,
            refresh_token,
        })
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(ApiError::Transport("logout endpoint unavailable".to_string()));
        }

        *self.issued_access.write().expect("mock lock poisoned") = None;
        *self.issued_refresh.write().expect("mock lock poisoned") = None;
        Ok(())
    }

    async fn current_user(&self, access_token: &str) -> Result<Identity, ApiError> {
        self.current_user_calls.fetch_add(1, Ordering::SeqCst);

        let valid = self
            .issued_access
            .read()
            .expect("mock lock poisoned")
            .as_deref()
            == Some(access_token);
        if !valid {
            return Err(ApiError::SessionExpired);
        }

        self.current
            .read()
            .expect("mock lock poisoned")
            .clone()
            .ok_or(ApiError::SessionExpired)
    }
}

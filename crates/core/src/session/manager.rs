//! Session lifecycle management.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::metrics;

use super::backend::AuthBackend;
use super::store::CredentialStore;
use super::types::{CredentialPair, Identity, SessionEvent};

/// Owns the credential pair and its lifecycle.
///
/// All credential writes (login, renew, logout) are serialized here; reads
/// go through `access_token()`. At most one renewal is in flight at any
/// time: concurrent callers await the winner's outcome instead of issuing
/// their own refresh request.
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    store: Arc<dyn CredentialStore>,
    credentials: RwLock<Option<CredentialPair>>,
    identity: RwLock<Option<Identity>>,
    /// Bumped on every credential write; lets queued renewers detect that
    /// the pair already rotated while they waited.
    generation: AtomicU64,
    renew_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AuthBackend>, store: Arc<dyn CredentialStore>) -> Self {
        let (events, _) = broadcast::channel(16);

        Self {
            backend,
            store,
            credentials: RwLock::new(None),
            identity: RwLock::new(None),
            generation: AtomicU64::new(0),
            renew_lock: Mutex::new(()),
            events,
        }
    }

    /// Startup session check: load any persisted pair into memory.
    /// Returns whether a session exists.
    pub fn restore(&self) -> Result<bool, ApiError> {
        let persisted = self
            .store
            .load()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        match persisted {
            Some(pair) => {
                self.set_credentials(pair);
                debug!("restored persisted session");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Synchronous read of the current access token. No network access.
    pub fn access_token(&self) -> Option<String> {
        self.credentials
            .read()
            .expect("credentials lock poisoned")
            .as_ref()
            .map(|pair| pair.access_token.clone())
    }

    /// Current credential pair, if logged in.
    pub fn credentials(&self) -> Option<CredentialPair> {
        self.credentials
            .read()
            .expect("credentials lock poisoned")
            .clone()
    }

    /// Cached identity of the logged-in user, if known.
    pub fn identity(&self) -> Option<Identity> {
        self.identity.read().expect("identity lock poisoned").clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials
            .read()
            .expect("credentials lock poisoned")
            .is_some()
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Authenticate and store the credential pair.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ApiError> {
        let success = self.backend.login(username, password).await?;

        if let Err(e) = self.store.save(&success.credentials) {
            warn!("failed to persist credentials: {}", e);
        }
        self.set_credentials(success.credentials);
        *self.identity.write().expect("identity lock poisoned") = Some(success.user.clone());

        info!(username = username, role = %success.user.role, "logged in");
        let _ = self.events.send(SessionEvent::LoggedIn(success.user.clone()));
        Ok(success.user)
    }

    /// Best-effort server invalidation, then unconditionally clear local
    /// credentials and notify subscribers.
    pub async fn logout(&self) {
        if let Some(token) = self.access_token() {
            if let Err(e) = self.backend.logout(&token).await {
                warn!("server-side logout failed: {}", e);
            }
        }
        self.force_logout();
    }

    /// Clear local credentials without contacting the server and notify
    /// subscribers. Used for unrecoverable authorization failures.
    pub fn force_logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!("failed to clear credential store: {}", e);
        }

        let had_session = self
            .credentials
            .write()
            .expect("credentials lock poisoned")
            .take()
            .is_some();
        *self.identity.write().expect("identity lock poisoned") = None;
        self.generation.fetch_add(1, Ordering::SeqCst);

        if had_session {
            info!("logged out");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
    }

    /// Rotate the credential pair.
    ///
    /// Collapses concurrent calls: if a renewal is already in flight the
    /// caller waits for it and returns its result instead of issuing a
    /// second refresh request. Failure forces logout and surfaces
    /// `SessionExpired`.
    pub async fn renew(&self) -> Result<CredentialPair, ApiError> {
        let entry_generation = self.generation.load(Ordering::SeqCst);
        let _guard = self.renew_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != entry_generation {
            // The pair rotated while we waited for the lock.
            metrics::SESSION_RENEWALS.with_label_values(&["collapsed"]).inc();
            return self.credentials().ok_or(ApiError::SessionExpired);
        }

        let refresh_token = match self.credentials() {
            Some(pair) => pair.refresh_token,
            None => return Err(ApiError::SessionExpired),
        };

        match self.backend.refresh(&refresh_token).await {
            Ok(renewed) => {
                let pair = CredentialPair {
                    access_token: renewed.access_token,
                    // Rotation is optional server-side.
                    refresh_token: renewed.refresh_token.unwrap_or(refresh_token),
                };
                if let Err(e) = self.store.save(&pair) {
                    warn!("failed to persist renewed credentials: {}", e);
                }
                self.set_credentials(pair.clone());
                metrics::SESSION_RENEWALS.with_label_values(&["success"]).inc();
                debug!("session renewed");
                Ok(pair)
            }
            Err(e) => {
                warn!("session renewal failed: {}", e);
                metrics::SESSION_RENEWALS.with_label_values(&["failed"]).inc();
                self.force_logout();
                Err(ApiError::SessionExpired)
            }
        }
    }

    /// Fetch the authenticated user from the server. Does not re-login.
    pub async fn current_user(&self) -> Result<Identity, ApiError> {
        let token = self.access_token().ok_or(ApiError::SessionExpired)?;
        let user = self.backend.current_user(&token).await?;
        *self.identity.write().expect("identity lock poisoned") = Some(user.clone());
        Ok(user)
    }

    fn set_credentials(&self, pair: CredentialPair) {
        *self
            .credentials
            .write()
            .expect("credentials lock poisoned") = Some(pair);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

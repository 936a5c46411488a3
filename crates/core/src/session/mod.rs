//! Session and credential lifecycle.
//!
//! `SessionManager` owns the access/refresh pair, persists it across
//! reloads, and guarantees at most one renewal in flight. Auth endpoints
//! are reached through the `AuthBackend` trait so the manager can be
//! tested against a fake backend.

mod backend;
mod manager;
mod store;
mod types;

pub use backend::{AuthBackend, HttpAuthBackend};
pub use manager::SessionManager;
pub use store::{CredentialStore, CredentialStoreError, SqliteCredentialStore};
pub use types::*;

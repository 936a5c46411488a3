//! Local credential persistence.
//!
//! The credential pair survives application reloads; absence of either key
//! means logged out and drives the initial session check at startup.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use super::types::CredentialPair;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum CredentialStoreError {
    #[error("Credential store error: {0}")]
    Database(String),
}

/// Trait for credential storage backends.
pub trait CredentialStore: Send + Sync {
    /// Load the persisted pair. `None` when either key is absent.
    fn load(&self) -> Result<Option<CredentialPair>, CredentialStoreError>;

    /// Persist both tokens atomically.
    fn save(&self, pair: &CredentialPair) -> Result<(), CredentialStoreError>;

    /// Remove both tokens atomically.
    fn clear(&self) -> Result<(), CredentialStoreError>;
}

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the store at the given path.
    pub fn new(path: &Path) -> Result<Self, CredentialStoreError> {
        let conn =
            Connection::open(path).map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, CredentialStoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CredentialStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        Ok(())
    }

    fn get_value(conn: &Connection, key: &str) -> Result<Option<String>, CredentialStoreError> {
        conn.query_row(
            "SELECT value FROM credentials WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| CredentialStoreError::Database(e.to_string()))
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn load(&self) -> Result<Option<CredentialPair>, CredentialStoreError> {
        let conn = self.conn.lock().expect("credential store lock poisoned");
        let access = Self::get_value(&conn, ACCESS_TOKEN_KEY)?;
        let refresh = Self::get_value(&conn, REFRESH_TOKEN_KEY)?;

        match (access, refresh) {
            (Some(access_token), Some(refresh_token)) => Ok(Some(CredentialPair {
                access_token,
                refresh_token,
            })),
            _ => Ok(None),
        }
    }

    fn save(&self, pair: &CredentialPair) -> Result<(), CredentialStoreError> {
        let mut conn = self.conn.lock().expect("credential store lock poisoned");
        let tx = conn
            .transaction()
            .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        tx.execute(
            "INSERT OR REPLACE INTO credentials (key, value) VALUES (?1, ?2)",
            params![ACCESS_TOKEN_KEY, pair.access_token],
        )
        .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        tx.execute(
            "INSERT OR REPLACE INTO credentials (key, value) VALUES (?1, ?2)",
            params![REFRESH_TOKEN_KEY, pair.refresh_token],
        )
        .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| CredentialStoreError::Database(e.to_string()))
    }

    fn clear(&self) -> Result<(), CredentialStoreError> {
        let mut conn = self.conn.lock().expect("credential store lock poisoned");
        let tx = conn
            .transaction()
            .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        tx.execute(
            "DELETE FROM credentials WHERE key IN (?1, ?2)",
            params![ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY],
        )
        .map_err(|e| CredentialStoreError::Database(e.to_string()))?;
        tx.commit()
            .map_err(|e| CredentialStoreError::Database(e.to_string()))
    }
}

//! Session lifecycle integration tests: login, restore, renewal, logout.

use std::sync::Arc;

use botdesk_core::error::ApiError;
use botdesk_core::session::{
    CredentialStore, Identity, Role, SessionEvent, SessionManager, SqliteCredentialStore,
};
use botdesk_core::testing::MockAuthBackend;

fn superadmin() -> Identity {
    Identity {
        id: 1,
        username: "superadmin".to_string(),
        role: Role::SuperAdmin,
        is_active: true,
        is_available: None,
    }
}

fn wire(
    backend: MockAuthBackend,
) -> (
    Arc<SessionManager>,
    Arc<MockAuthBackend>,
    Arc<SqliteCredentialStore>,
) {
    let backend = Arc::new(backend);
    let store = Arc::new(SqliteCredentialStore::in_memory().unwrap());
    let manager = Arc::new(SessionManager::new(backend.clone(), store.clone()));
    (manager, backend, store)
}

#[tokio::test]
async fn login_as_superadmin_then_current_user_does_not_relogin() {
    let (manager, backend, _) =
        wire(MockAuthBackend::new().with_user("superadmin", "pw", superadmin()));

    let user = manager.login("superadmin", "pw").await.unwrap();
    assert_eq!(user.role, Role::SuperAdmin);

    let me = manager.current_user().await.unwrap();
    assert_eq!(me.id, user.id);

    assert_eq!(backend.login_calls(), 1);
    assert_eq!(backend.current_user_calls(), 1);
}

#[tokio::test]
async fn login_persists_credentials_to_store() {
    let (manager, _, store) =
        wire(MockAuthBackend::new().with_user("superadmin", "pw", superadmin()));

    manager.login("superadmin", "pw").await.unwrap();

    let persisted = store.load().unwrap().unwrap();
    assert_eq!(persisted.access_token, manager.access_token().unwrap());
}

#[tokio::test]
async fn restore_resumes_a_persisted_session() {
    let backend = Arc::new(MockAuthBackend::new().with_user("superadmin", "pw", superadmin()));
    let store = Arc::new(SqliteCredentialStore::in_memory().unwrap());

    // First "app run": login and persist.
    {
        let manager = SessionManager::new(backend.clone(), store.clone());
        manager.login("superadmin", "pw").await.unwrap();
    }

    // Second "app run": no login, just restore.
    let manager = SessionManager::new(backend.clone(), store.clone());
    assert!(manager.restore().unwrap());
    assert!(manager.is_logged_in());
    assert_eq!(backend.login_calls(), 1);
}

#[tokio::test]
async fn absent_store_keys_mean_logged_out() {
    let (manager, _, _) = wire(MockAuthBackend::new());
    assert!(!manager.restore().unwrap());
    assert!(manager.access_token().is_none());
}

#[tokio::test]
async fn renew_persists_the_rotated_pair() {
    let (manager, _, store) = wire(
        MockAuthBackend::new()
            .with_user("superadmin", "pw", superadmin())
            .with_rotating_refresh(),
    );

    manager.login("superadmin", "pw").await.unwrap();
    let before = store.load().unwrap().unwrap();

    let renewed = manager.renew().await.unwrap();

    let after = store.load().unwrap().unwrap();
    assert_eq!(after, renewed);
    assert_ne!(after.access_token, before.access_token);
    assert_ne!(after.refresh_token, before.refresh_token);
}

#[tokio::test]
async fn logout_clears_store_and_notifies_subscribers() {
    let (manager, backend, store) =
        wire(MockAuthBackend::new().with_user("superadmin", "pw", superadmin()));
    let mut events = manager.subscribe();

    manager.login("superadmin", "pw").await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::LoggedIn(_)
    ));

    manager.logout().await;

    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
    assert!(!manager.is_logged_in());
    assert!(store.load().unwrap().is_none());
    assert_eq!(backend.logout_calls(), 1);
}

#[tokio::test]
async fn failed_renewal_forces_exactly_one_logout() {
    let (manager, backend, store) = wire(
        MockAuthBackend::new()
            .with_user("superadmin", "pw", superadmin())
            .with_failing_refresh(),
    );
    let mut events = manager.subscribe();

    manager.login("superadmin", "pw").await.unwrap();
    let _ = events.recv().await.unwrap(); // LoggedIn

    assert_eq!(manager.renew().await.unwrap_err(), ApiError::SessionExpired);

    assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
    assert!(events.try_recv().is_err(), "no second logout event");
    assert!(store.load().unwrap().is_none());
    assert_eq!(backend.refresh_calls(), 1);
}

#[tokio::test]
async fn concurrent_renewals_share_one_refresh_call() {
    let (manager, backend, _) = wire(
        MockAuthBackend::new()
            .with_user("superadmin", "pw", superadmin())
            .with_slow_refresh(),
    );
    manager.login("superadmin", "pw").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move { manager.renew().await }));
    }

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap().access_token);
    }

    assert_eq!(backend.refresh_calls(), 1);
    assert!(tokens.iter().all(|token| token == &tokens[0]));
}

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::AdminProfile;
use crate::storage::{Storage, ADMIN_KEY, TOKEN_KEY};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthState {
    pub token: Option<String>,
    pub admin: Option<AdminProfile>,
    pub loading: bool,
    pub error: Option<String>,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

fn deserialize_admin(value: Option<String>) -> Option<AdminProfile> {
    let raw = value.filter(|v| !v.is_empty())?;
    match serde_json::from_str(&raw) {
        Ok(admin) => Some(admin),
        Err(e) => {
            warn!("Ignoring unreadable persisted admin profile: {}", e);
            None
        }
    }
}

/// Current session, mirrored to durable storage. Subscribers are notified on
/// every mutation. Without storage (headless tests, one-shot tools) the store
/// still works but nothing is persisted or rehydrated.
#[derive(Clone)]
pub struct AuthStore {
    state: Arc<watch::Sender<AuthState>>,
    storage: Option<Storage>,
}

impl AuthStore {
    pub fn new(storage: Option<Storage>) -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self {
            state: Arc::new(tx),
            storage,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub async fn initialize(&self) -> Result<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let token = storage.get(TOKEN_KEY).await?.filter(|t| !t.is_empty());
        let admin = deserialize_admin(storage.get(ADMIN_KEY).await?);
        if token.is_some() {
            info!("Restored persisted session");
        }
        self.state.send_replace(AuthState {
            token,
            admin,
            loading: false,
            error: None,
        });
        Ok(())
    }

    pub async fn login(&self, token: String, admin: AdminProfile) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.set(TOKEN_KEY, &token).await?;
            storage.set(ADMIN_KEY, &serde_json::to_string(&admin)?).await?;
        }
        info!("Signed in as {}", admin.username);
        self.state.send_replace(AuthState {
            token: Some(token),
            admin: Some(admin),
            loading: false,
            error: None,
        });
        Ok(())
    }

    /// Published state is cleared even when storage cleanup fails.
    pub async fn logout(&self) -> Result<()> {
        self.state.send_replace(AuthState::default());
        info!("Signed out");
        if let Some(storage) = &self.storage {
            storage.remove(TOKEN_KEY).await?;
            storage.remove(ADMIN_KEY).await?;
        }
        Ok(())
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.loading = loading);
    }

    pub fn set_error(&self, error: Option<String>) {
        self.state.send_modify(|s| s.error = error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> AdminProfile {
        AdminProfile {
            id: 1,
            username: "ops".into(),
            role: Some("owner".into()),
        }
    }

    #[tokio::test]
    async fn login_persists_and_initialize_rehydrates() {
        let storage = Storage::in_memory().await.unwrap();
        let store = AuthStore::new(Some(storage.clone()));
        store.login("t-1".into(), admin()).await.unwrap();
        assert!(store.is_authenticated());

        let fresh = AuthStore::new(Some(storage));
        assert!(!fresh.is_authenticated());
        fresh.initialize().await.unwrap();

        let state = fresh.snapshot();
        assert_eq!(state.token.as_deref(), Some("t-1"));
        assert_eq!(state.admin, Some(admin()));
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn logout_clears_published_and_persisted_state() {
        let storage = Storage::in_memory().await.unwrap();
        let store = AuthStore::new(Some(storage.clone()));
        store.login("t-1".into(), admin()).await.unwrap();
        store.set_error(Some("stale".into()));

        store.logout().await.unwrap();
        assert_eq!(store.snapshot(), AuthState::default());
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(storage.get(ADMIN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_admin_rehydrates_as_none() {
        let storage = Storage::in_memory().await.unwrap();
        storage.set(TOKEN_KEY, "t-2").await.unwrap();
        storage.set(ADMIN_KEY, "{not json").await.unwrap();

        let store = AuthStore::new(Some(storage));
        store.initialize().await.unwrap();
        assert!(store.is_authenticated());
        assert_eq!(store.snapshot().admin, None);
    }

    #[tokio::test]
    async fn without_storage_initialize_is_a_noop() {
        let store = AuthStore::new(None);
        store.set_loading(true);
        store.initialize().await.unwrap();
        assert!(store.snapshot().loading);

        store.login("t-3".into(), admin()).await.unwrap();
        assert!(store.is_authenticated());
    }

    #[tokio::test]
    async fn subscribers_see_every_mutation() {
        let store = AuthStore::new(None);
        let mut rx = store.subscribe();

        store.set_loading(true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().loading);

        store.set_error(Some("bad password".into()));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().error.as_deref(), Some("bad password"));

        store.login("t".into(), admin()).await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated());
        assert!(!rx.borrow().loading);
    }
}

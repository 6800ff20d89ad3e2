use crate::api_client::ApiClient;
use crate::auth::AuthStore;
use crate::config::Config;
use crate::dashboard::DashboardStore;
use crate::storage::Storage;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Storage,
    pub client: ApiClient,
    pub auth: AuthStore,
    pub dashboard: DashboardStore,
}

impl AppState {
    pub async fn build(config: Config) -> Result<Self> {
        let storage = Storage::open(&config.storage.path).await?;
        let client = ApiClient::from_config(&config.api, Some(storage.clone()));
        let auth = AuthStore::new(Some(storage.clone()));
        let dashboard = DashboardStore::new(
            client.clone(),
            auth.clone(),
            Duration::from_millis(config.poller.refresh_ms),
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            client,
            auth,
            dashboard,
        })
    }
}

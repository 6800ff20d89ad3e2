use config::{Config as ConfigLoader, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REFRESH_MS: u64 = 10_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub poller: PollerConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub use_mock: bool,
    pub timeout_seconds: Option<u64>,
    pub skip_invalid_certs: Option<bool>,
    /// Simulated latency for the in-memory fixture responder.
    pub mock_latency_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollerConfig {
    pub refresh_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: String,
}

/// Credentials used to sign in at startup when no persisted session exists.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub totp_code: Option<String>,
}

impl Config {
    /// Loads `config.toml` (optional) and `DASHBOARD__*` environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::build(
            ConfigLoader::builder()
                .add_source(File::with_name("config").required(false))
                .add_source(
                    Environment::with_prefix("DASHBOARD")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let s = builder
            .set_default("api.base_url", DEFAULT_API_BASE_URL)?
            .set_default("api.use_mock", false)?
            .set_default("poller.refresh_ms", DEFAULT_REFRESH_MS as i64)?
            .set_default("storage.path", "dashboard.db")?
            .build()?;

        s.try_deserialize()
    }
}

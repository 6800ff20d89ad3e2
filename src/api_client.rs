use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::mock_api::MockTransport;
use crate::storage::{Storage, TOKEN_KEY};

/// A request after token resolution, ready for a transport.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub token: Option<String>,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub status_text: String,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Where requests actually go: the network or the fixture responder.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Option<Method>,
    pub data: Option<Value>,
    pub token: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn post<B: Serialize>(data: &B) -> Result<Self, ApiError> {
        let data = serde_json::to_value(data).map_err(|e| ApiError::Decode {
            path: "<request body>".to_string(),
            source: e,
        })?;
        Ok(Self {
            method: Some(Method::POST),
            data: Some(data),
            ..Self::default()
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: String, timeout: u64, skip_invalid_certs: bool) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .danger_accept_invalid_certs(skip_invalid_certs)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method.clone(), self.url(&request.path))
            .header(CONTENT_TYPE, "application/json");

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| ApiError::Transport {
            path: request.path.clone(),
            source: e,
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport {
                path: request.path.clone(),
                source: e,
            })?
            .to_vec();

        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }
}

/// Thin JSON client: token resolution, error normalization, decoding.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    storage: Option<Storage>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, storage: Option<Storage>) -> Self {
        Self { transport, storage }
    }

    pub fn from_config(config: &ApiConfig, storage: Option<Storage>) -> Self {
        let transport: Arc<dyn Transport> = if config.use_mock {
            let latency = Duration::from_millis(config.mock_latency_ms.unwrap_or(200));
            Arc::new(MockTransport::new(latency))
        } else {
            Arc::new(HttpTransport::new(
                config.base_url.clone(),
                config.timeout_seconds.unwrap_or(30),
                config.skip_invalid_certs.unwrap_or(false),
            ))
        };
        Self::new(transport, storage)
    }

    async fn stored_token(&self) -> Option<String> {
        let storage = self.storage.as_ref()?;
        match storage.get(TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read stored token: {}", e);
                None
            }
        }
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let token = match options.token {
            Some(token) => Some(token),
            None => self.stored_token().await,
        };
        let method = options.method.unwrap_or(Method::GET);
        debug!("{} {}", method, path);

        let response = self
            .transport
            .send(ApiRequest {
                method,
                path: path.to_string(),
                body: options.data,
                token,
                headers: options.headers,
            })
            .await?;

        if !response.is_success() {
            return Err(ApiError::Http {
                status: response.status,
                message: error_message(&response),
            });
        }

        let decoded = if response.status == 204 {
            serde_json::from_value(Value::Object(Default::default()))
        } else {
            serde_json::from_slice(&response.body)
        };
        decoded.map_err(|e| ApiError::Decode {
            path: path.to_string(),
            source: e,
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request(path, RequestOptions::default()).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request(path, RequestOptions::post(body)?).await
    }
}

fn error_message(response: &ApiResponse) -> String {
    let payload: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
    let field = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };

    field("message")
        .or_else(|| field("error"))
        .or_else(|| Some(response.status_text.clone()).filter(|s| !s.is_empty()))
        .unwrap_or_else(|| "Request failed".to_string())
}

use tracing::{error, warn};

use crate::api_client::ApiClient;
use crate::api_types::{AccessRequestResponse, AuthResponse, LoginPayload, RegisterPayload};
use crate::auth::AuthStore;
use crate::error::ApiError;

pub async fn login(client: &ApiClient, payload: &LoginPayload) -> Result<AuthResponse, ApiError> {
    client.post("/api/auth/login", payload).await
}

pub async fn register(
    client: &ApiClient,
    payload: &RegisterPayload,
) -> Result<AuthResponse, ApiError> {
    client.post("/api/auth/register", payload).await
}

pub async fn request_access(
    client: &ApiClient,
    payload: &RegisterPayload,
) -> Result<AccessRequestResponse, ApiError> {
    client.post("/api/auth/register/request", payload).await
}

/// Logs in and publishes the session, keeping the store's loading and error
/// flags in step so observers can render progress.
pub async fn sign_in(
    client: &ApiClient,
    auth: &AuthStore,
    payload: &LoginPayload,
) -> Result<(), ApiError> {
    auth.set_loading(true);
    auth.set_error(None);

    match login(client, payload).await {
        Ok(resp) => {
            if let Err(e) = auth.login(resp.token, resp.admin).await {
                // the session is live in memory even if it can't be persisted
                warn!("Failed to persist session: {}", e);
            }
            Ok(())
        }
        Err(e) => {
            error!("Sign-in failed for {}: {}", payload.username, e);
            auth.set_error(Some(e.to_string()));
            auth.set_loading(false);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::HttpTransport;
    use crate::mock_api::{MockTransport, MOCK_TOKEN};
    use crate::storage::{Storage, TOKEN_KEY};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn payload() -> LoginPayload {
        LoginPayload {
            username: "ops".into(),
            password: "secret".into(),
            totp_code: None,
        }
    }

    #[tokio::test]
    async fn sign_in_publishes_and_persists_session() {
        let storage = Storage::in_memory().await.unwrap();
        let client = ApiClient::new(Arc::new(MockTransport::new(Duration::ZERO)), None);
        let auth = AuthStore::new(Some(storage.clone()));

        sign_in(&client, &auth, &payload()).await.unwrap();

        let state = auth.snapshot();
        assert_eq!(state.token.as_deref(), Some(MOCK_TOKEN));
        assert!(!state.loading);
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap().as_deref(), Some(MOCK_TOKEN));
    }

    #[tokio::test]
    async fn sign_in_failure_sets_error_and_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"username": "ops", "password": "secret", "totp_code": null})))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials."})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(Arc::new(HttpTransport::new(server.uri(), 5, false)), None);
        let auth = AuthStore::new(None);

        let err = sign_in(&client, &auth, &payload()).await.unwrap_err();
        assert_eq!(err.status(), Some(401));

        let state = auth.snapshot();
        assert!(!state.loading);
        assert!(!state.is_authenticated());
        assert_eq!(state.error.as_deref(), Some("Invalid credentials."));
    }

    #[tokio::test]
    async fn request_access_returns_request_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register/request"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "message": "Request received", "request": {"id": 42}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(Arc::new(HttpTransport::new(server.uri(), 5, false)), None);
        let resp = request_access(
            &client,
            &RegisterPayload {
                username: "new".into(),
                password: "pw".into(),
                totp_code: None,
                invite_code: None,
                reason: Some("on-call rotation".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(resp.request.id, 42);
    }
}

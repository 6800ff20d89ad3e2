use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::debug;

use crate::api_client::{ApiRequest, ApiResponse, Transport};
use crate::error::ApiError;

pub const MOCK_TOKEN: &str = "mock-token";

/// In-process fixture responder. Routes answer the same method/path/token
/// contract as the real backend without any network I/O.
#[derive(Clone)]
pub struct MockTransport {
    router: Router,
    latency: Duration,
}

impl MockTransport {
    pub fn new(latency: Duration) -> Self {
        Self {
            router: mock_router(Fixtures::seeded(Utc::now())),
            latency,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let uri = normalize_path(&request.path);
        let method = Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ApiError::Mock(e.to_string()))?;

        let mut builder = Request::builder()
            .method(method)
            .uri(uri.as_str())
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &request.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let body = match &request.body {
            Some(v) => Body::from(serde_json::to_vec(v).map_err(|e| ApiError::Mock(e.to_string()))?),
            None => Body::empty(),
        };
        let req = builder.body(body).map_err(|e| ApiError::Mock(e.to_string()))?;

        let response = match self.router.clone().oneshot(req).await {
            Ok(r) => r,
            Err(never) => match never {},
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| ApiError::Mock(e.to_string()))?;

        debug!("mock {} {} -> {}", request.method, uri, status.as_u16());
        Ok(ApiResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body: bytes.to_vec(),
        })
    }
}

/// Absolute URLs are reduced to their path so fixtures match either form.
fn normalize_path(path: &str) -> String {
    let stripped = path
        .strip_prefix("https://")
        .or_else(|| path.strip_prefix("http://"))
        .map(|rest| rest.find('/').map(|i| &rest[i..]).unwrap_or("/"))
        .unwrap_or(path);
    if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{}", stripped)
    }
}

struct Fixtures {
    generated_at: DateTime<Utc>,
    pipelines: Vec<Value>,
    logs: Vec<Value>,
}

impl Fixtures {
    fn seeded(now: DateTime<Utc>) -> Self {
        let ago = |minutes: i64| (now - ChronoDuration::minutes(minutes)).to_rfc3339();

        let pipelines = vec![
            json!({
                "id": 101, "name": "Production deploy", "description": "Blue/green rollout",
                "status": "success", "owner": "release-bot",
                "startedAt": ago(300), "completedAt": ago(270), "durationMinutes": 30.0
            }),
            json!({
                "id": 102, "name": "Staging deploy", "description": "Regression suite + smoke tests",
                "status": "running", "owner": "qa-team",
                "startedAt": ago(90), "completedAt": null, "durationMinutes": null
            }),
            json!({
                "id": 103, "name": "QA deploy", "description": "Feature branches aggregated",
                "status": "queued", "owner": "qa-team",
                "startedAt": null, "completedAt": null, "durationMinutes": null
            }),
            json!({
                "id": 104, "name": "Nightly build", "description": null,
                "status": "failed", "owner": "ci",
                "startedAt": ago(1500), "completedAt": ago(1488), "durationMinutes": 12.0
            }),
        ];

        let logs = vec![
            json!({
                "id": 1, "level": "info",
                "message": "Deployed api@main build #451 to production",
                "timestamp": now.to_rfc3339()
            }),
            json!({
                "id": 2, "level": "warning",
                "message": "Queued staging deployment waiting on approvals",
                "timestamp": ago(5)
            }),
        ];

        Self {
            generated_at: now,
            pipelines,
            logs,
        }
    }

    fn count_status(&self, status: &str) -> usize {
        self.pipelines
            .iter()
            .filter(|p| p["status"].as_str() == Some(status))
            .count()
    }
}

type MockState = Arc<Fixtures>;

fn mock_router(fixtures: Fixtures) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/pipelines", get(list_pipelines))
        .route("/api/pipelines/stats", get(pipeline_stats))
        .route("/api/pipelines/history", get(pipeline_history))
        .route("/api/pipelines/logs", get(pipeline_logs))
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/register/request", post(request_access))
        .fallback(not_found)
        .with_state(Arc::new(fixtures))
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn require_token(headers: &HeaderMap) -> Result<(), Response> {
    match bearer(headers) {
        Some(_) => Ok(()),
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Authentication required."})),
        )
            .into_response()),
    }
}

fn mock_admin(username: &str) -> Value {
    json!({"id": 1, "username": username, "role": "owner"})
}

async fn health() -> Json<Value> {
    Json(json!({"status": "healthy"}))
}

async fn status(State(state): State<MockState>) -> Json<Value> {
    Json(json!({
        "status": "operational",
        "successful_deployments": state.count_status("success"),
        "failed_deployments": state.count_status("failed"),
        "active_pipelines": state.pipelines.len(),
        "avg_build_time": 12.4,
        "logs": state.logs,
    }))
}

async fn list_pipelines(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_token(&headers) {
        return resp;
    }
    Json(json!({"pipelines": state.pipelines, "total": state.pipelines.len()})).into_response()
}

async fn pipeline_stats(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_token(&headers) {
        return resp;
    }
    let durations: Vec<f64> = state
        .pipelines
        .iter()
        .filter(|p| matches!(p["status"].as_str(), Some("success") | Some("failed")))
        .filter_map(|p| p["durationMinutes"].as_f64())
        .collect();
    let avg = if durations.is_empty() {
        0.0
    } else {
        (durations.iter().sum::<f64>() / durations.len() as f64 * 10.0).round() / 10.0
    };

    Json(json!({
        "total": state.pipelines.len(),
        "successful": state.count_status("success"),
        "failed": state.count_status("failed"),
        "active": state.count_status("running"),
        "avgBuildTime": avg,
    }))
    .into_response()
}

async fn pipeline_history(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_token(&headers) {
        return resp;
    }
    let today = state.generated_at.date_naive();
    let history: Vec<Value> = (0..7)
        .map(|i| {
            let day = today - ChronoDuration::days(6 - i);
            let on_day = |status: &str| {
                state
                    .pipelines
                    .iter()
                    .filter(|p| p["status"].as_str() == Some(status))
                    .filter(|p| {
                        p["startedAt"]
                            .as_str()
                            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                            .map(|dt| dt.with_timezone(&Utc).date_naive() == day)
                            .unwrap_or(false)
                    })
                    .count()
            };
            json!({
                "date": day.format("%Y-%m-%d").to_string(),
                "successful": on_day("success"),
                "failed": on_day("failed"),
            })
        })
        .collect();

    Json(json!({"history": history})).into_response()
}

async fn pipeline_logs(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if let Err(resp) = require_token(&headers) {
        return resp;
    }
    Json(json!({"logs": state.logs})).into_response()
}

async fn login() -> Json<Value> {
    Json(json!({"token": MOCK_TOKEN, "admin": mock_admin("demo-admin")}))
}

async fn register(body: Bytes) -> Json<Value> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let username = payload["username"].as_str().unwrap_or("mock");
    Json(json!({"token": MOCK_TOKEN, "admin": mock_admin(username)}))
}

async fn request_access() -> (StatusCode, Json<Value>) {
    (
        StatusCode::CREATED,
        Json(json!({"message": "Access request submitted", "request": {"id": 1}})),
    )
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({"error": "Not found"})))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::{ApiClient, RequestOptions};
    use crate::api_types::{AuthResponse, PipelinesEnvelope, RegisterPayload};
    use crate::models::DeploymentStats;

    fn client() -> ApiClient {
        ApiClient::new(Arc::new(MockTransport::new(Duration::ZERO)), None)
    }

    #[test]
    fn absolute_urls_reduce_to_paths() {
        assert_eq!(normalize_path("http://localhost:8000/api/pipelines"), "/api/pipelines");
        assert_eq!(normalize_path("api/pipelines"), "/api/pipelines");
        assert_eq!(normalize_path("https://host"), "/");
    }

    #[tokio::test]
    async fn login_returns_mock_session() {
        let resp: AuthResponse = client()
            .post("/api/auth/login", &json!({"username": "x", "password": "y"}))
            .await
            .unwrap();
        assert_eq!(resp.token, MOCK_TOKEN);
        assert_eq!(resp.admin.username, "demo-admin");
        assert_eq!(resp.admin.role.as_deref(), Some("owner"));
    }

    #[tokio::test]
    async fn register_echoes_username() {
        let payload = RegisterPayload {
            username: "new-admin".into(),
            password: "pw".into(),
            totp_code: None,
            invite_code: Some("invite".into()),
            reason: None,
        };
        let resp: AuthResponse = client().post("/api/auth/register", &payload).await.unwrap();
        assert_eq!(resp.admin.username, "new-admin");
    }

    #[tokio::test]
    async fn pipeline_reads_require_a_token() {
        let err = client()
            .get::<PipelinesEnvelope>("/api/pipelines")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert!(err.is_auth_failure());
        assert_eq!(err.to_string(), "Authentication required.");

        let envelope: PipelinesEnvelope = client()
            .request("/api/pipelines", RequestOptions::default().with_token(MOCK_TOKEN))
            .await
            .unwrap();
        assert_eq!(envelope.pipelines.len(), 4);
    }

    #[tokio::test]
    async fn stats_fixture_matches_pipeline_fixture() {
        let stats: DeploymentStats = client()
            .request("/api/pipelines/stats", RequestOptions::default().with_token(MOCK_TOKEN))
            .await
            .unwrap();
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.avg_build_time, 21.0);
    }

    #[tokio::test]
    async fn unknown_routes_are_404() {
        let err = client().get::<Value>("/api/nope").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "Not found");
    }
}

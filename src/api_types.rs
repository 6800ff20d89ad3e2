use serde::{Deserialize, Serialize};

use crate::models::{AdminProfile, Pipeline, PipelineStatus};

/// Pipeline record as the backend serializes it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendPipeline {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
}

impl BackendPipeline {
    pub fn to_pipeline(&self) -> Pipeline {
        let last_run = [&self.completed_at, &self.started_at]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned();
        // a zero duration means "not measured" on the backend
        let duration_minutes = self.duration_minutes.filter(|d| *d != 0.0 && !d.is_nan());

        Pipeline {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            status: PipelineStatus::from_backend(&self.status),
            owner: self.owner.clone(),
            last_run,
            duration_minutes,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PipelinesEnvelope {
    pub pipelines: Vec<BackendPipeline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub admin: AdminProfile,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessRequestResponse {
    pub message: String,
    pub request: AccessRequestRef,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessRequestRef {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
    pub totp_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totp_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: &str) -> BackendPipeline {
        BackendPipeline {
            id: 7,
            name: "api".into(),
            description: None,
            status: status.into(),
            owner: "ops".into(),
            completed_at: None,
            started_at: None,
            duration_minutes: None,
        }
    }

    #[test]
    fn unknown_status_defaults_to_queued() {
        assert_eq!(record("").to_pipeline().status, PipelineStatus::Queued);
        assert_eq!(record("cancelled").to_pipeline().status, PipelineStatus::Queued);
        assert_eq!(record("failed").to_pipeline().status, PipelineStatus::Failed);
    }

    #[test]
    fn last_run_prefers_completion_then_start() {
        let mut r = record("success");
        assert_eq!(r.to_pipeline().last_run, None);

        r.started_at = Some("2024-05-01T10:00:00Z".into());
        assert_eq!(r.to_pipeline().last_run.as_deref(), Some("2024-05-01T10:00:00Z"));

        r.completed_at = Some("2024-05-01T10:12:00Z".into());
        assert_eq!(r.to_pipeline().last_run.as_deref(), Some("2024-05-01T10:12:00Z"));
    }

    #[test]
    fn zero_duration_becomes_unknown() {
        let mut r = record("success");
        r.duration_minutes = Some(0.0);
        assert_eq!(r.to_pipeline().duration_minutes, None);
        r.duration_minutes = Some(12.5);
        assert_eq!(r.to_pipeline().duration_minutes, Some(12.5));
    }

    #[test]
    fn parses_camel_case_wire_record() {
        let raw = r#"{"id":3,"name":"web","status":"running","owner":"ci",
            "startedAt":"2024-05-01T09:00:00","completedAt":null,"durationMinutes":null,
            "branch":"main"}"#;
        let p: BackendPipeline = serde_json::from_str(raw).unwrap();
        let mapped = p.to_pipeline();
        assert_eq!(mapped.status, PipelineStatus::Running);
        assert_eq!(mapped.last_run.as_deref(), Some("2024-05-01T09:00:00"));
    }

    #[test]
    fn login_payload_uses_snake_case_totp() {
        let body = serde_json::to_value(LoginPayload {
            username: "a".into(),
            password: "b".into(),
            totp_code: Some("123456".into()),
        })
        .unwrap();
        assert_eq!(body["totp_code"], "123456");
    }
}

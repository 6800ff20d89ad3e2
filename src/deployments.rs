use chrono::{Duration, NaiveDate, Utc};
use serde_json::Value;
use tracing::error;

use crate::api_client::ApiClient;
use crate::models::{DeploymentHistoryPoint, DeploymentLog, DeploymentStats, Pipeline, PipelineStatus};

pub const HISTORY_DAYS: i64 = 7;

/// Local stand-in for `/api/pipelines/stats`. Every pipeline lands in exactly
/// one bucket: success, active (queued/running), or failed.
pub fn derive_stats_from_pipelines(pipelines: &[Pipeline]) -> DeploymentStats {
    let successful = pipelines
        .iter()
        .filter(|p| p.status == PipelineStatus::Success)
        .count();
    let active = pipelines.iter().filter(|p| p.status.is_active()).count();
    let failed = pipelines.len().saturating_sub(successful + active);

    let durations: Vec<f64> = pipelines
        .iter()
        .filter_map(|p| p.duration_minutes)
        .filter(|d| *d != 0.0 && !d.is_nan())
        .collect();
    let avg_build_time = if durations.is_empty() {
        0.0
    } else {
        round_one_decimal(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    DeploymentStats {
        successful: successful as u64,
        failed: failed as u64,
        active: active as u64,
        avg_build_time,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Seven zero-count days, oldest first, ending on `today`.
pub fn fallback_history(today: NaiveDate) -> Vec<DeploymentHistoryPoint> {
    (0..HISTORY_DAYS)
        .map(|i| DeploymentHistoryPoint {
            date: (today - Duration::days(HISTORY_DAYS - 1 - i))
                .format("%Y-%m-%d")
                .to_string(),
            successful: 0,
            failed: 0,
        })
        .collect()
}

pub async fn fetch_deployment_stats(
    client: &ApiClient,
    pipelines: Option<&[Pipeline]>,
) -> DeploymentStats {
    match client.get::<DeploymentStats>("/api/pipelines/stats").await {
        Ok(stats) => stats,
        Err(e) => {
            error!("Failed to fetch deployment stats: {}", e);
            derive_stats_from_pipelines(pipelines.unwrap_or_default())
        }
    }
}

pub async fn fetch_deployment_history(
    client: &ApiClient,
    _pipelines: Option<&[Pipeline]>,
) -> Vec<DeploymentHistoryPoint> {
    match client.get::<Value>("/api/pipelines/history").await {
        Ok(mut body) => match body.get_mut("history").map(Value::take) {
            Some(history @ Value::Array(_)) => match serde_json::from_value(history) {
                Ok(points) => return points,
                Err(e) => error!("Malformed deployment history entries: {}", e),
            },
            _ => error!("Deployment history response has no history array"),
        },
        Err(e) => error!("Failed to fetch deployment history: {}", e),
    }

    fallback_history(Utc::now().date_naive())
}

pub async fn fetch_deployment_logs(client: &ApiClient) -> Vec<DeploymentLog> {
    match client.get::<Value>("/api/pipelines/logs").await {
        Ok(mut body) => match body.get_mut("logs").map(Value::take) {
            Some(logs @ Value::Array(_)) => match serde_json::from_value(logs) {
                Ok(entries) => return entries,
                Err(e) => error!("Malformed deployment log entries: {}", e),
            },
            _ => error!("Deployment logs response has no logs array"),
        },
        Err(e) => error!("Failed to fetch deployment logs: {}", e),
    }

    Vec::new()
}

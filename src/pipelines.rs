use tracing::error;

use crate::api_client::ApiClient;
use crate::api_types::PipelinesEnvelope;
use crate::error::ApiError;
use crate::models::{Pipeline, PipelineMetrics, PipelineStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFeed {
    pub pipelines: Vec<Pipeline>,
    pub metrics: PipelineMetrics,
}

pub fn count_metrics(pipelines: &[Pipeline]) -> PipelineMetrics {
    let count = |status| pipelines.iter().filter(|p| p.status == status).count();
    PipelineMetrics {
        successful: count(PipelineStatus::Success),
        failed: count(PipelineStatus::Failed),
        active: count(PipelineStatus::Running),
    }
}

/// Fetches and maps the pipeline list. Unlike the other dashboard reads this
/// one has no fallback: failures propagate so the refresh cycle can stop.
pub async fn fetch_pipelines(client: &ApiClient) -> Result<PipelineFeed, ApiError> {
    let envelope: PipelinesEnvelope = match client.get("/api/pipelines").await {
        Ok(e) => e,
        Err(e) => {
            error!("Failed to fetch pipelines: {}", e);
            return Err(e);
        }
    };

    let pipelines: Vec<Pipeline> = envelope.pipelines.iter().map(|p| p.to_pipeline()).collect();
    let metrics = count_metrics(&pipelines);

    Ok(PipelineFeed { pipelines, metrics })
}

//! In-memory transport double for store tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::api_client::{ApiRequest, ApiResponse, Transport};
use crate::error::ApiError;

#[derive(Clone)]
struct Scripted {
    status: u16,
    body: Value,
    delay: Duration,
}

/// Answers by path: queued one-shot responses first, then the standing
/// response for that path, else 404. Records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    queued: Mutex<HashMap<String, VecDeque<Scripted>>>,
    standing: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: Value) {
        self.standing.lock().unwrap().insert(
            path.to_string(),
            Scripted {
                status,
                body,
                delay: Duration::ZERO,
            },
        );
    }

    pub fn enqueue(&self, path: &str, status: u16, body: Value, delay: Duration) {
        self.queued
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted {
                status,
                body,
                delay,
            });
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.calls.lock().unwrap().push(request.path.clone());

        let queued = self
            .queued
            .lock()
            .unwrap()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);
        let scripted = queued
            .or_else(|| self.standing.lock().unwrap().get(&request.path).cloned())
            .unwrap_or(Scripted {
                status: 404,
                body: json!({"error": "Not found"}),
                delay: Duration::ZERO,
            });

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }

        Ok(ApiResponse {
            status: scripted.status,
            status_text: String::new(),
            body: serde_json::to_vec(&scripted.body).unwrap(),
        })
    }
}

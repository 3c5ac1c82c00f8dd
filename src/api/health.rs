use std::time::Instant;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::routes::ApiState;

/// Process start marker for the /health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct HealthState {
    started_at: Instant,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub keywords: usize,
    pub runs_recorded: usize,
}

pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.health.uptime_secs(),
        keywords: state.registry.len(),
        runs_recorded: state.run_log.len(),
    })
}

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::pipeline::{HarvestJob, JobReport, JobState};
use crate::storage::CheckpointStore;

#[derive(Clone)]
pub struct AppState {
    pub job: Arc<HarvestJob>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub job: String,
    pub sink: String,
    pub record_kind: String,
    pub state: JobState,
    pub emitted: u64,
    pub last_report: Option<JobReport>,
    pub last_error: Option<String>,
    pub checkpoints: CheckpointStore,
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let job = &state.job;
    let status = job.status().await;

    Json(StatusResponse {
        job: job.name().to_string(),
        sink: job.sink_kind().to_string(),
        record_kind: job.options().record_kind.to_string(),
        state: status.state,
        emitted: job.emitted(),
        last_report: status.last_report,
        last_error: status.last_error,
        checkpoints: status.checkpoints,
    })
}

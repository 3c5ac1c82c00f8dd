use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::api::health::{self, HealthState};
use crate::db::models::SeenListingRow;
use crate::db::ResultStore;
use crate::error::AppError;
use crate::scheduler::SchedulerState;
use crate::state::{KeywordRegistry, RunLog};
use crate::throttle::{self, NightPolicy};
use crate::types::{normalize_term, Keyword, RunRecord};

/// Defaults applied to keyword fields the caller leaves out.
#[derive(Debug, Clone, Copy)]
pub struct KeywordDefaults {
    pub interval_minutes: u32,
    pub result_limit: usize,
}

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<KeywordRegistry>,
    pub scheduler: Arc<SchedulerState>,
    pub run_log: Arc<RunLog>,
    pub store: ResultStore,
    pub manual_tx: mpsc::Sender<String>,
    pub night: NightPolicy,
    pub defaults: KeywordDefaults,
    pub health: HealthState,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health::get_health))
        .route("/keywords", get(list_keywords).post(create_keyword))
        .route("/keywords/:id", put(update_keyword).delete(delete_keyword))
        .route("/keywords/:id/run", post(trigger_run))
        .route("/keywords/:id/reset", post(reset_results))
        .route("/keywords/:id/results", get(get_results))
        .route("/runs", get(get_runs))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct KeywordRequest {
    pub term: String,
    pub interval_minutes: Option<u32>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub result_limit: Option<usize>,
    pub night_mode: Option<bool>,
}

/// A keyword plus its live scheduling state, for GUI display.
#[derive(Serialize)]
pub struct KeywordView {
    #[serde(flatten)]
    pub keyword: Keyword,
    pub last_run_at: Option<NaiveDateTime>,
    pub running: bool,
    pub manual_pending: bool,
    pub due: bool,
    pub next_due_at: Option<NaiveDateTime>,
    pub seen_count: i64,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub keyword_id: String,
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub keyword_id: String,
    pub deleted: u64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_keywords(State(state): State<ApiState>) -> Result<Json<Vec<KeywordView>>, AppError> {
    let now = Local::now().naive_local();
    let mut views = Vec::new();
    for keyword in state.registry.snapshot() {
        views.push(view(&state, keyword, now).await?);
    }
    Ok(Json(views))
}

async fn create_keyword(
    State(state): State<ApiState>,
    Json(req): Json<KeywordRequest>,
) -> Result<(StatusCode, Json<Keyword>), AppError> {
    let keyword = build_keyword(&state, req);
    if state.registry.contains(&keyword.id) {
        return Err(AppError::InvalidKeyword(format!(
            "keyword {:?} already exists",
            keyword.id
        )));
    }
    let keyword = state.registry.upsert(keyword)?;
    info!(keyword = %keyword.id, "keyword created");
    Ok((StatusCode::CREATED, Json(keyword)))
}

/// Full replace. Renaming a keyword clears its old scheduling state and
/// stored results; the new term starts fresh, like the original did when a
/// keyword was deleted and re-added.
async fn update_keyword(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<KeywordRequest>,
) -> Result<Json<Keyword>, AppError> {
    if !state.registry.contains(&id) {
        return Err(AppError::KeywordNotFound(id));
    }
    // Validate (inside upsert) before touching the old keyword's state: a
    // rejected update must leave registry, last_run and dedup history intact.
    let keyword = state.registry.upsert(build_keyword(&state, req))?;
    if keyword.id != id {
        state.registry.remove(&id);
        state.scheduler.clear_last_run(&id);
        state.store.reset_keyword(&id).await?;
    }
    info!(keyword = %keyword.id, "keyword updated");
    Ok(Json(keyword))
}

async fn delete_keyword(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.registry.remove(&id).is_none() {
        return Err(AppError::KeywordNotFound(id));
    }
    state.scheduler.clear_last_run(&id);
    state.store.reset_keyword(&id).await?;
    info!(keyword = %id, "keyword deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Queue a manual run. Never blocks: the scheduler picks the request up on
/// its channel; repeat requests while a run is in flight coalesce into one.
async fn trigger_run(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    if !state.registry.contains(&id) {
        return Err(AppError::KeywordNotFound(id));
    }
    state
        .manual_tx
        .try_send(id.clone())
        .map_err(|e| AppError::ChannelSend(e.to_string()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            status: "queued",
            keyword_id: id,
        }),
    ))
}

async fn reset_results(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<ResetResponse>, AppError> {
    if !state.registry.contains(&id) {
        return Err(AppError::KeywordNotFound(id));
    }
    let deleted = state.store.reset_keyword(&id).await?;
    state.scheduler.clear_last_run(&id);
    info!(keyword = %id, deleted, "results reset");
    Ok(Json(ResetResponse {
        keyword_id: id,
        deleted,
    }))
}

async fn get_results(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<SeenListingRow>>, AppError> {
    if !state.registry.contains(&id) {
        return Err(AppError::KeywordNotFound(id));
    }
    let limit = params.limit.unwrap_or(100).clamp(1, 500);
    let rows = state.store.results_for_keyword(&id, limit).await?;
    Ok(Json(rows))
}

async fn get_runs(
    State(state): State<ApiState>,
    Query(params): Query<LimitQuery>,
) -> Json<Vec<RunRecord>> {
    let limit = params.limit.unwrap_or(50).clamp(1, 500) as usize;
    Json(state.run_log.recent(limit))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_keyword(state: &ApiState, req: KeywordRequest) -> Keyword {
    Keyword {
        id: normalize_term(&req.term),
        term: req.term.trim().to_string(),
        interval_minutes: req.interval_minutes.unwrap_or(state.defaults.interval_minutes),
        min_price: req.min_price,
        max_price: req.max_price,
        result_limit: req.result_limit.unwrap_or(state.defaults.result_limit),
        night_mode: req.night_mode,
    }
}

async fn view(
    state: &ApiState,
    keyword: Keyword,
    now: NaiveDateTime,
) -> Result<KeywordView, AppError> {
    let last_run_at = state.scheduler.last_run_at(&keyword.id);
    let due = throttle::is_due(&keyword, &state.night, now, last_run_at);
    let next_due_at = throttle::next_due_at(&keyword, &state.night, now, last_run_at);
    let seen_count = state.store.seen_count(&keyword.id).await?;
    Ok(KeywordView {
        running: state.scheduler.is_running(&keyword.id),
        manual_pending: state.scheduler.manual_pending(&keyword.id),
        last_run_at,
        due,
        next_due_at,
        seen_count,
        keyword,
    })
}

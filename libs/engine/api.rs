//! Internal HTTP surface (dashboard <-> engine)
//!
//! Thin request/response adapters over the scheduler and the position
//! engine; all semantics live in those subsystems. Guarded by a bearer
//! token when one is configured.

use crate::domain::{MappingStore, Outcome, Task, TaskKind, TaskParams, TaskStrategy};
use crate::positions::{close_opportunities, match_positions, PositionReconciler};
use crate::sched::{QueueError, Scheduler, ValidationError};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use books::BookCache;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct ApiState {
    pub scheduler: Arc<Scheduler>,
    pub reconciler: Arc<PositionReconciler>,
    pub mappings: Arc<MappingStore>,
    pub cache: Arc<BookCache>,
    pub bearer_token: Option<String>,
}

/// Build the router.
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/tasks", post(create_task))
        .route("/api/tasks/:id", get(get_task))
        .route("/api/tasks/:id/cancel", post(cancel_task))
        .route("/api/close-opportunities", get(get_close_opportunities))
        .route("/api/positions", get(get_positions))
        .with_state(state)
}

/// Serve the API until the process exits.
pub async fn serve(state: ApiState, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("[Api] Listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn authorize(state: &ApiState, headers: &HeaderMap) -> Result<(), (StatusCode, Json<serde_json::Value>)> {
    let Some(expected) = &state.bearer_token else {
        return Ok(());
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if provided == Some(expected.as_str()) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    kind: TaskKind,
    strategy: TaskStrategy,
    predict_market_id: String,
    condition_id: String,
    arb_side: Outcome,
    quantity: f64,
    #[serde(default)]
    params: TaskParams,
    #[serde(default)]
    fee_rate_bps: Option<u64>,
    #[serde(default)]
    order_timeout_secs: Option<u64>,
    #[serde(default)]
    max_hedge_retries: Option<u32>,
}

async fn create_task(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<CreateTaskRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let mut task = Task::new(
        request.kind,
        request.strategy,
        request.predict_market_id,
        request.condition_id,
        request.arb_side,
        request.quantity,
        request.params,
    );
    if let Some(bps) = request.fee_rate_bps {
        task.fee_rate_bps = bps;
    } else if let Some(mapping) = state.mappings.get(&task.market_key()) {
        task.fee_rate_bps = mapping.fee_rate_bps;
    }
    if let Some(timeout) = request.order_timeout_secs {
        task.order_timeout_secs = timeout;
    }
    if let Some(retries) = request.max_hedge_retries {
        task.max_hedge_retries = retries;
    }

    match state.scheduler.submit(task) {
        Ok(task_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"taskId": task_id})),
        ),
        Err(QueueError::MarketBusy(key)) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "MARKET_BUSY", "market": key})),
        ),
        Err(QueueError::Validation(ValidationError::MissingField(field))) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "MISSING_FIELD", "field": field})),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

async fn get_task(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.scheduler.queue().get(&task_id) {
        Some(task) => (StatusCode::OK, Json(serde_json::json!({"task": task}))),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "unknown task"})),
        ),
    }
}

async fn cancel_task(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    match state.scheduler.cancel(&task_id) {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"cancelled": true}))),
        Err(QueueError::UnknownTask(_)) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "unknown task"})),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

async fn get_close_opportunities(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let snapshot = state.reconciler.snapshot().await;
    let report = match_positions(&state.mappings, &snapshot.predict, &snapshot.poly);
    let opportunities = close_opportunities(&state.mappings, &state.cache, &report.pairs);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "opportunities": opportunities,
            "unmatched": report.unmatched,
            "predictAsOfMs": snapshot.predict_as_of_ms,
            "polyAsOfMs": snapshot.poly_as_of_ms,
        })),
    )
}

async fn get_positions(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> (StatusCode, Json<serde_json::Value>) {
    if let Err(rejection) = authorize(&state, &headers) {
        return rejection;
    }

    let snapshot = state.reconciler.snapshot().await;
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "predict": snapshot.predict,
            "poly": snapshot.poly,
            "predictAsOfMs": snapshot.predict_as_of_ms,
            "polyAsOfMs": snapshot.poly_as_of_ms,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::PositionSource;
    use crate::sched::{ExecOutcome, TaskContext, TaskExecutor, TaskLog, TaskQueue};
    use async_trait::async_trait;
    use std::time::Duration;
    use tempfile::TempDir;

    struct NoopExecutor;

    #[async_trait]
    impl TaskExecutor for NoopExecutor {
        async fn execute(&self, _ctx: &mut TaskContext) -> ExecOutcome {
            ExecOutcome::Completed
        }
    }

    struct EmptySource;

    #[async_trait]
    impl PositionSource for EmptySource {
        async fn predict_positions(&self) -> anyhow::Result<Vec<crate::domain::Position>> {
            Ok(Vec::new())
        }
        async fn poly_positions(&self) -> anyhow::Result<Vec<crate::domain::Position>> {
            Ok(Vec::new())
        }
    }

    fn state(token: Option<&str>) -> (TempDir, ApiState) {
        let dir = TempDir::new().unwrap();
        let scheduler = Arc::new(Scheduler::new(
            Arc::new(TaskQueue::new()),
            Arc::new(TaskLog::new(dir.path())),
            Arc::new(NoopExecutor),
        ));
        let state = ApiState {
            scheduler,
            reconciler: Arc::new(PositionReconciler::new(
                Arc::new(EmptySource),
                Duration::from_secs(60),
            )),
            mappings: Arc::new(MappingStore::new()),
            cache: Arc::new(BookCache::new()),
            bearer_token: token.map(|t| t.to_string()),
        };
        (dir, state)
    }

    fn buy_request() -> CreateTaskRequest {
        CreateTaskRequest {
            kind: TaskKind::Buy,
            strategy: TaskStrategy::Maker,
            predict_market_id: "pm-1".to_string(),
            condition_id: "0xcond".to_string(),
            arb_side: Outcome::Yes,
            quantity: 50.0,
            params: TaskParams {
                predict_price: Some(0.45),
                polymarket_max_ask: Some(0.55),
                min_profit_buffer: Some(0.01),
                ..Default::default()
            },
            fee_rate_bps: None,
            order_timeout_secs: None,
            max_hedge_retries: None,
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {}", token).parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_create_task_ok() {
        let (_dir, state) = state(None);
        let (status, body) =
            create_task(State(state), HeaderMap::new(), Json(buy_request())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["taskId"].as_str().unwrap().starts_with('t'));
    }

    #[tokio::test]
    async fn test_create_task_missing_field() {
        let (_dir, state) = state(None);
        let mut request = buy_request();
        request.params.min_profit_buffer = None;
        let (status, body) = create_task(State(state), HeaderMap::new(), Json(request)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "minProfitBuffer");
    }

    #[tokio::test]
    async fn test_create_task_market_busy() {
        let (_dir, state) = state(None);
        let (status, _) =
            create_task(State(state.clone()), HeaderMap::new(), Json(buy_request())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = create_task(State(state), HeaderMap::new(), Json(buy_request())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "MARKET_BUSY");
    }

    #[tokio::test]
    async fn test_bearer_guard() {
        let (_dir, state) = state(Some("secret"));

        let (status, _) =
            create_task(State(state.clone()), HeaderMap::new(), Json(buy_request())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = create_task(
            State(state.clone()),
            bearer("wrong"),
            Json(buy_request()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            create_task(State(state), bearer("secret"), Json(buy_request())).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_close_opportunities_reports_staleness() {
        let (_dir, state) = state(None);
        let (status, body) = get_close_opportunities(State(state), HeaderMap::new()).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["predictAsOfMs"].is_number());
        assert!(body["opportunities"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_task_not_found() {
        let (_dir, state) = state(None);
        let (status, _) = get_task(State(state), HeaderMap::new(), Path("nope".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

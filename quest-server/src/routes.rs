use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::error::{QuestError, QuestResult};
use crate::quest::condition::normalize_condition;
use crate::quest::command::normalize_command;
use crate::quest::trigger::normalize_trigger_config;
use crate::quest::{
    ConditionOperator, EvaluationResult, Quest, QuestRegistry, RawQuest, SampleEvent, TriggerType,
};

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<QuestRegistry>,
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn respond<T>(status: StatusCode, data: T) -> Reply<T> {
    (
        status,
        Json(ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }),
    )
}

fn reject<T>(err: QuestError) -> Reply<T> {
    let status = match &err {
        QuestError::NotFound(_) => StatusCode::NOT_FOUND,
        QuestError::AlreadyExists(_) => StatusCode::CONFLICT,
        QuestError::Database(_) | QuestError::Io { .. } | QuestError::Parse { .. } => {
            error!("Quest request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }),
    )
}

fn quest_reply(result: QuestResult<Arc<Quest>>) -> Reply<Quest> {
    match result {
        Ok(quest) => respond(StatusCode::OK, Quest::clone(&quest)),
        Err(e) => reject(e),
    }
}

#[derive(Serialize)]
struct QuestEvaluation {
    title: String,
    #[serde(flatten)]
    result: EvaluationResult,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Deserialize)]
struct CreateQuestRequest {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct UpdateQuestRequest {
    description: Option<String>,
    enabled: Option<bool>,
}

#[derive(Deserialize)]
struct RenameQuestRequest {
    title: String,
}

#[derive(Deserialize)]
struct SetTriggerRequest {
    trigger_type: String,
    trigger_config: Option<Value>,
}

#[derive(Deserialize)]
struct SetOperatorRequest {
    condition_operator: String,
}

#[derive(Deserialize)]
struct DraftDryRunRequest {
    quest: RawQuest,
    #[serde(default)]
    sample: SampleEvent,
}

// ============================================================================
// HTTP Handlers - Quests
// ============================================================================

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "quests": state.registry.count().await,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/quests - List all quests
async fn list_quests(State(state): State<AppState>) -> Reply<Vec<Quest>> {
    let quests = state
        .registry
        .list()
        .await
        .iter()
        .map(|quest| Quest::clone(quest))
        .collect();
    respond(StatusCode::OK, quests)
}

/// POST /api/quests - Create a quest with a single `any_reply` condition
async fn create_quest(
    State(state): State<AppState>,
    Json(req): Json<CreateQuestRequest>,
) -> Reply<Quest> {
    match state.registry.create(&req.title, &req.description).await {
        Ok(quest) => respond(StatusCode::CREATED, Quest::clone(&quest)),
        Err(e) => reject(e),
    }
}

async fn get_quest(State(state): State<AppState>, Path(title): Path<String>) -> Reply<Quest> {
    match state.registry.get(&title).await {
        Some(quest) => respond(StatusCode::OK, Quest::clone(&quest)),
        None => reject(QuestError::NotFound(title)),
    }
}

/// PATCH /api/quests/:title - Update description and/or enabled flag
async fn update_quest(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(req): Json<UpdateQuestRequest>,
) -> Reply<Quest> {
    quest_reply(
        state
            .registry
            .update_details(&title, req.description, req.enabled)
            .await,
    )
}

async fn delete_quest(State(state): State<AppState>, Path(title): Path<String>) -> Reply<()> {
    match state.registry.delete(&title).await {
        Ok(()) => respond(StatusCode::OK, ()),
        Err(e) => reject(e),
    }
}

async fn rename_quest(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(req): Json<RenameQuestRequest>,
) -> Reply<Quest> {
    quest_reply(state.registry.rename(&title, &req.title).await)
}

/// PUT /api/quests/:title/trigger - Change trigger type and/or config
async fn set_trigger(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(req): Json<SetTriggerRequest>,
) -> Reply<Quest> {
    let trigger_type = match TriggerType::from_str(&req.trigger_type) {
        Ok(trigger_type) => trigger_type,
        Err(e) => return reject(e),
    };
    let config = req
        .trigger_config
        .as_ref()
        .map(|value| normalize_trigger_config(Some(value)));

    quest_reply(state.registry.set_trigger(&title, trigger_type, config).await)
}

async fn set_operator(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(req): Json<SetOperatorRequest>,
) -> Reply<Quest> {
    let operator = ConditionOperator::parse(&req.condition_operator);
    if let ConditionOperator::Unrecognized(raw) = &operator {
        return reject(QuestError::Invalid(format!("condition operator '{}'", raw)));
    }
    quest_reply(state.registry.set_condition_operator(&title, operator).await)
}

// ============================================================================
// HTTP Handlers - Conditions and Commands
// ============================================================================

async fn add_condition(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(body): Json<Value>,
) -> Reply<Quest> {
    match normalize_condition(&body) {
        Some(condition) => quest_reply(state.registry.add_condition(&title, condition).await),
        None => reject(QuestError::Invalid("condition".to_string())),
    }
}

async fn update_condition(
    State(state): State<AppState>,
    Path((title, index)): Path<(String, usize)>,
    Json(body): Json<Value>,
) -> Reply<Quest> {
    match normalize_condition(&body) {
        Some(condition) => {
            quest_reply(state.registry.update_condition(&title, index, condition).await)
        }
        None => reject(QuestError::Invalid("condition".to_string())),
    }
}

async fn remove_condition(
    State(state): State<AppState>,
    Path((title, index)): Path<(String, usize)>,
) -> Reply<Quest> {
    quest_reply(state.registry.remove_condition(&title, index).await)
}

async fn add_command(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(body): Json<Value>,
) -> Reply<Quest> {
    match normalize_command(&body) {
        Some(command) => quest_reply(state.registry.add_command(&title, command).await),
        None => reject(QuestError::Invalid("command".to_string())),
    }
}

async fn update_command(
    State(state): State<AppState>,
    Path((title, index)): Path<(String, usize)>,
    Json(body): Json<Value>,
) -> Reply<Quest> {
    match normalize_command(&body) {
        Some(command) => quest_reply(state.registry.update_command(&title, index, command).await),
        None => reject(QuestError::Invalid("command".to_string())),
    }
}

async fn remove_command(
    State(state): State<AppState>,
    Path((title, index)): Path<(String, usize)>,
) -> Reply<Quest> {
    quest_reply(state.registry.remove_command(&title, index).await)
}

// ============================================================================
// HTTP Handlers - Evaluation
// ============================================================================

/// POST /api/quests/:title/dry-run - Evaluate a stored quest against a sample
async fn dry_run_quest(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Json(sample): Json<SampleEvent>,
) -> Reply<EvaluationResult> {
    match state.registry.dry_run(&title, &sample).await {
        Ok(result) => respond(StatusCode::OK, result),
        Err(e) => reject(e),
    }
}

/// POST /api/dry-run - Evaluate an unsaved quest
async fn dry_run_draft(
    State(state): State<AppState>,
    Json(req): Json<DraftDryRunRequest>,
) -> Reply<EvaluationResult> {
    let result = Quest::from_raw(&req.quest)
        .and_then(|quest| state.registry.evaluate_draft(&quest, &req.sample));
    match result {
        Ok(result) => respond(StatusCode::OK, result),
        Err(e) => reject(e),
    }
}

/// POST /api/triggers/:trigger_type/evaluate - Run a sample through every
/// enabled quest fed by this trigger
async fn evaluate_trigger(
    State(state): State<AppState>,
    Path(trigger_type): Path<String>,
    Json(sample): Json<SampleEvent>,
) -> Reply<Vec<QuestEvaluation>> {
    let trigger_type = match TriggerType::from_str(&trigger_type) {
        Ok(trigger_type) => trigger_type,
        Err(e) => return reject(e),
    };

    let results: Vec<QuestEvaluation> = state
        .registry
        .evaluate_trigger(trigger_type, &sample)
        .await
        .into_iter()
        .map(|(title, result)| QuestEvaluation { title, result })
        .collect();

    let matched = results.iter().filter(|r| r.result.matched).count();
    info!(
        "Evaluated {} quests for {} ({} matched)",
        results.len(),
        trigger_type.as_str(),
        matched
    );
    respond(StatusCode::OK, results)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Quests
        .route("/api/quests", get(list_quests).post(create_quest))
        .route(
            "/api/quests/:title",
            get(get_quest).patch(update_quest).delete(delete_quest),
        )
        .route("/api/quests/:title/rename", post(rename_quest))
        .route("/api/quests/:title/trigger", put(set_trigger))
        .route("/api/quests/:title/operator", put(set_operator))
        .route("/api/quests/:title/conditions", post(add_condition))
        .route(
            "/api/quests/:title/conditions/:index",
            put(update_condition).delete(remove_condition),
        )
        .route("/api/quests/:title/commands", post(add_command))
        .route(
            "/api/quests/:title/commands/:index",
            put(update_command).delete(remove_command),
        )
        // Evaluation
        .route("/api/quests/:title/dry-run", post(dry_run_quest))
        .route("/api/dry-run", post(dry_run_draft))
        .route("/api/triggers/:trigger_type/evaluate", post(evaluate_trigger))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE]),
        )
        .with_state(state)
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::{BookingFlowState, BookingPayload, SchedulingSettings};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// POST /api/booking/turn
#[derive(Deserialize)]
pub struct TurnRequest {
    pub conversation_key: String,
    pub ai_reply: Value,
    #[serde(default)]
    pub user_message: Option<String>,
}

#[derive(Serialize)]
pub struct TurnResponse {
    augmented: bool,
    reply: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    booking: Option<BookingPayload>,
}

pub async fn process_turn(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, AppError> {
    let key = body.conversation_key.trim();
    if key.is_empty() {
        return Err(AppError::BadRequest("conversation_key is required".into()));
    }

    let result = state
        .flows
        .process(&body.ai_reply, key, body.user_message.as_deref())
        .await;

    Ok(Json(match result {
        Some(augmented) => TurnResponse {
            augmented: true,
            reply: augmented.reply,
            booking: Some(augmented.booking),
        },
        None => TurnResponse {
            augmented: false,
            reply: body.ai_reply,
            booking: None,
        },
    }))
}

// GET /api/booking/flows/:key
pub async fn get_flow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<BookingFlowState>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    state
        .flows
        .store()
        .peek(&key)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no booking flow for {key}")))
}

// POST /api/booking/flows/:key/reset
pub async fn reset_flow(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(key): Path<String>,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let removed = state.flows.store().reset(&key).await;
    tracing::info!(conversation = %key, removed, "booking flow reset");
    Ok(Json(serde_json::json!({ "reset": removed })))
}

// GET /api/booking/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SchedulingSettings>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let settings = state.flows.settings().await;
    Ok(Json(SchedulingSettings::clone(&settings)))
}

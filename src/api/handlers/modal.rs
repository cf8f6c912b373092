use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::models::{CompletedTransfer, DEFAULT_INTERACTION_KIND};
use crate::security::SecurityError;

fn default_modal_type() -> String {
    DEFAULT_INTERACTION_KIND.to_string()
}

fn default_interaction_type() -> String {
    "generic".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartModalRequest {
    pub session_id: String,
    #[serde(default = "default_modal_type")]
    pub modal_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    pub session_id: String,
    #[serde(default = "default_modal_type")]
    pub modal_type: String,
    #[serde(default = "default_interaction_type")]
    pub interaction_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTxData {
    pub to: String,
    pub amount: f64,
    #[serde(default)]
    pub risk_score: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndModalRequest {
    pub session_id: String,
    #[serde(default = "default_modal_type")]
    pub modal_type: String,
    #[serde(default = "default_true")]
    pub was_successful: bool,
    pub tx_data: Option<CompletedTxData>,
}

// Open an interaction window
pub async fn start_modal(
    state: web::Data<AppState>,
    req: web::Json<StartModalRequest>,
) -> Result<HttpResponse, SecurityError> {
    let handle = state.service.start_interaction(&req.session_id, &req.modal_type)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "modalId": handle.modal_id,
        "sessionId": handle.session_id,
        "modalType": handle.interaction_kind,
        "startedAt": handle.started_at,
    })))
}

// Record one interaction ping
pub async fn record_interaction(
    state: web::Data<AppState>,
    req: web::Json<InteractionRequest>,
) -> Result<HttpResponse, SecurityError> {
    let count = state
        .service
        .record_interaction_event(&req.session_id, &req.modal_type, &req.interaction_type)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "interactionCount": count,
    })))
}

// Close an interaction window, learning from it when the transfer went through
pub async fn end_modal(
    state: web::Data<AppState>,
    req: web::Json<EndModalRequest>,
) -> Result<HttpResponse, SecurityError> {
    let req = req.into_inner();
    let completed = req.tx_data.map(|tx| CompletedTransfer {
        recipient: tx.to,
        amount: tx.amount,
        risk_score: tx.risk_score,
    });

    let ended = state
        .service
        .end_interaction(&req.session_id, &req.modal_type, req.was_successful, completed)
        .await;

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "found": ended.found,
        "duration": ended.duration_seconds,
        "interactions": ended.interaction_count,
        "wasRecorded": ended.feedback.is_some(),
        "profilePersisted": ended.feedback.as_ref().map(|f| f.profile_persisted),
        "newAverageDuration": ended.feedback.as_ref().map(|f| f.average_duration),
    })))
}

// Read-only view of a window
pub async fn modal_status(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, SecurityError> {
    let (session_id, modal_type) = path.into_inner();
    let status = state.service.interaction_status(&session_id, &modal_type);
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "active": status.active,
        "elapsedSeconds": status.elapsed_seconds,
        "interactionCount": status.interaction_count,
        "startedAt": status.started_at,
    })))
}

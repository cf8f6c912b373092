use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::security::SecurityError;

// Display-only behavior profile
pub async fn get_profile(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, SecurityError> {
    let summary = state.service.profile_summary(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "profile": summary,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndSessionRequest {
    pub session_id: String,
}

// Wallet locked or tab closed: drop the session's windows, challenges and cached profile
pub async fn end_session(
    state: web::Data<AppState>,
    req: web::Json<EndSessionRequest>,
) -> Result<HttpResponse, SecurityError> {
    let ended = state.service.end_session(&req.session_id)?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "modalsClosed": ended.modals,
        "tokensRevoked": ended.tokens,
    })))
}

// Active scoring configuration
pub async fn get_config(state: web::Data<AppState>) -> HttpResponse {
    let config = &state.config;
    HttpResponse::Ok().json(json!({
        "success": true,
        "risk": config.risk,
        "timing": config.timing,
        "verification": config.verification,
        "profile": config.profile,
    }))
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "risk-engine",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}

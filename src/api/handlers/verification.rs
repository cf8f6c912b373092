use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::security::verification::AttemptOutcome;
use crate::security::SecurityError;
use crate::utils::mask_email;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEmailRequest {
    pub session_id: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub token_id: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindWalletRequest {
    pub session_id: String,
    pub wallet_fingerprint: String,
}

// Register the email verification codes are sent to
pub async fn register_email(
    state: web::Data<AppState>,
    req: web::Json<RegisterEmailRequest>,
) -> Result<HttpResponse, SecurityError> {
    state
        .service
        .register_verification_email(&req.session_id, &req.email)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "email": mask_email(req.email.trim()),
    })))
}

// Submit a verification code
pub async fn verify_code(
    state: web::Data<AppState>,
    req: web::Json<VerifyCodeRequest>,
) -> Result<HttpResponse, SecurityError> {
    let outcome = state.service.submit_verification_code(&req.token_id, &req.code).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "verified": true,
        "alreadyVerified": matches!(outcome, AttemptOutcome::AlreadyVerified(_)),
        "transactionDetails": outcome.snapshot(),
    })))
}

pub async fn token_status(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, SecurityError> {
    let status = state.service.token_status(&path.into_inner())?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "tokenId": status.token_id,
        "verified": status.verified,
        "attemptsRemaining": status.attempts_remaining,
        "expiresAt": status.expires_at,
        "email": status.email,
    })))
}

// Bind a session to its wallet so the email survives session regeneration
pub async fn bind_wallet(
    state: web::Data<AppState>,
    req: web::Json<BindWalletRequest>,
) -> Result<HttpResponse, SecurityError> {
    let email = state
        .service
        .bind_wallet_fingerprint(&req.session_id, &req.wallet_fingerprint)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "hasEmail": email.is_some(),
        "email": email.as_deref().map(mask_email),
    })))
}

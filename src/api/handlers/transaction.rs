use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::models::{TransactionRequest, DEFAULT_INTERACTION_KIND};
use crate::security::{GateDecision, SecurityError};

fn default_modal_type() -> String {
    DEFAULT_INTERACTION_KIND.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreSignRequest {
    pub session_id: String,
    pub to: String,
    pub amount: f64,
    pub balance: Option<f64>,
    pub account_id: Option<String>,
    #[serde(default = "default_modal_type")]
    pub modal_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub token_id: String,
}

// Score a transfer before it is signed
pub async fn pre_sign(
    state: web::Data<AppState>,
    req: web::Json<PreSignRequest>,
) -> Result<HttpResponse, SecurityError> {
    let req = req.into_inner();

    let balance = match (req.balance, &req.account_id) {
        (Some(balance), _) => balance,
        (None, Some(account_id)) => state.wallet.get_balance(account_id).await?,
        (None, None) => {
            return Err(SecurityError::Validation(
                "Either balance or accountId is required".to_string(),
            ))
        }
    };

    let tx = TransactionRequest::new(&req.to, req.amount, balance).with_interaction_kind(&req.modal_type);
    let decision = state.service.evaluate_transaction(&req.session_id, &tx).await?;

    let rejection = match &decision {
        GateDecision::Rejected { reason, .. } => Some(reason.to_error().to_string()),
        _ => None,
    };
    let body = json!({
        "success": true,
        "approved": decision.is_approved(),
        "decision": decision.name(),
        "requiresEmailRegistration": matches!(decision, GateDecision::RequiresEmailRegistration { .. }),
        "requiresVerification": matches!(decision, GateDecision::RequiresVerification { .. }),
        "rejection": rejection,
        "result": decision,
    });
    Ok(HttpResponse::Ok().json(body))
}

// Release a transfer whose challenge has been verified
pub async fn confirm_after_verification(
    state: web::Data<AppState>,
    req: web::Json<ConfirmRequest>,
) -> Result<HttpResponse, SecurityError> {
    let snapshot = state.service.confirm_after_verification(&req.token_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "approved": true,
        "transactionDetails": snapshot,
    })))
}

// src/api/error.rs - HTTP mapping for engine errors
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::security::SecurityError;

impl ResponseError for SecurityError {
    fn status_code(&self) -> StatusCode {
        match self {
            SecurityError::Validation(_) | SecurityError::WrongCode { .. } => StatusCode::BAD_REQUEST,
            SecurityError::NotFound { .. } => StatusCode::NOT_FOUND,
            SecurityError::NotVerified { .. } => StatusCode::CONFLICT,
            SecurityError::Expired { .. } => StatusCode::GONE,
            SecurityError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SecurityError::AttemptsExhausted { .. } => StatusCode::TOO_MANY_REQUESTS,
            SecurityError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = json!({
            "success": false,
            "error": self.code(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });

        match self {
            SecurityError::WrongCode {
                attempts_remaining,
                expires_at,
                ..
            } => {
                body["attemptsRemaining"] = json!(attempts_remaining);
                body["expiresAt"] = json!(expires_at);
            }
            SecurityError::Expired { expired_at, .. } => {
                body["expiredAt"] = json!(expired_at);
            }
            SecurityError::AttemptsExhausted { max_attempts, .. } => {
                body["maxAttempts"] = json!(max_attempts);
            }
            _ => {}
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}

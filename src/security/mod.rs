// src/security/mod.rs
pub mod anomaly;
pub mod clock;
pub mod gate;
pub mod heuristics;
pub mod modal_timing;
pub mod notification;
pub mod profile_store;
pub mod risk_scoring;
pub mod service;
pub mod verification;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::wallet::WalletClientError;
use notification::MailerError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{GateDecision, PreSignGate, RejectionReason};
pub use modal_timing::{ModalTimingTracker, TimingSettings};
pub use profile_store::{BehaviorProfileStore, ProfileSettings};
pub use risk_scoring::{RiskAssessment, RiskFlag, RiskScoringEngine, RiskSettings};
pub use service::TransactionSecurityService;
pub use verification::{VerificationChallengeStateMachine, VerificationSettings};

/// Error types for risk-engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SecurityError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Verification token {token_id} expired at {expired_at}")]
    Expired {
        token_id: String,
        expired_at: DateTime<Utc>,
    },

    #[error("Verification token {token_id} revoked after {max_attempts} attempts")]
    AttemptsExhausted { token_id: String, max_attempts: u32 },

    #[error("Wrong verification code, {attempts_remaining} attempts remaining")]
    WrongCode {
        token_id: String,
        attempts_remaining: u32,
        expires_at: DateTime<Utc>,
    },

    #[error("Verification token {token_id} has not been verified")]
    NotVerified { token_id: String },

    #[error("Insufficient balance: requested {amount}, available {balance}")]
    InsufficientBalance { amount: f64, balance: f64 },

    #[error("Dependency failure: {0}")]
    Dependency(String),
}

impl SecurityError {
    pub fn not_found(entity: &'static str, id: &str) -> Self {
        SecurityError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Only collaborator failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, SecurityError::Dependency(_))
    }

    /// Stable machine-readable code for API payloads
    pub fn code(&self) -> &'static str {
        match self {
            SecurityError::Validation(_) => "validation_error",
            SecurityError::NotFound { .. } => "not_found",
            SecurityError::Expired { .. } => "expired",
            SecurityError::AttemptsExhausted { .. } => "attempts_exhausted",
            SecurityError::WrongCode { .. } => "wrong_code",
            SecurityError::NotVerified { .. } => "not_verified",
            SecurityError::InsufficientBalance { .. } => "insufficient_balance",
            SecurityError::Dependency(_) => "dependency_error",
        }
    }
}

impl From<RepositoryError> for SecurityError {
    fn from(err: RepositoryError) -> Self {
        SecurityError::Dependency(format!("profile store: {}", err))
    }
}

impl From<MailerError> for SecurityError {
    fn from(err: MailerError) -> Self {
        SecurityError::Dependency(format!("email delivery: {}", err))
    }
}

impl From<WalletClientError> for SecurityError {
    fn from(err: WalletClientError) -> Self {
        match err {
            WalletClientError::AccountNotFound(account) => SecurityError::NotFound {
                entity: "wallet account",
                id: account,
            },
            WalletClientError::InsufficientBalance { requested, available } => SecurityError::InsufficientBalance {
                amount: requested,
                balance: available,
            },
            WalletClientError::Network(reason) => SecurityError::Dependency(format!("wallet: {}", reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_dependency_errors_are_retryable() {
        assert!(SecurityError::Dependency("timeout".to_string()).is_retryable());
        assert!(!SecurityError::Validation("bad amount".to_string()).is_retryable());
        assert!(!SecurityError::not_found("token", "verify_1").is_retryable());
    }

    #[test]
    fn test_collaborator_errors_become_dependency_errors() {
        let err: SecurityError = RepositoryError::Unavailable("connection reset".to_string()).into();
        assert_eq!(err.code(), "dependency_error");
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_wallet_errors_keep_their_meaning() {
        let err: SecurityError = WalletClientError::AccountNotFound("acct-x".to_string()).into();
        assert_eq!(err.code(), "not_found");
        assert!(!err.is_retryable());

        let err: SecurityError = WalletClientError::InsufficientBalance {
            requested: 5.0,
            available: 1.0,
        }
        .into();
        assert_eq!(err.code(), "insufficient_balance");

        let err: SecurityError = WalletClientError::Network("rpc timeout".to_string()).into();
        assert_eq!(err.code(), "dependency_error");
        assert!(err.is_retryable());
    }
}

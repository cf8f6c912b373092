// src/security/gate.rs - Pre-sign gate: approve, challenge or reject a transfer
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::models::{TransactionRequest, TransactionSnapshot};
use crate::security::clock::Clock;
use crate::security::modal_timing::ModalTimingTracker;
use crate::security::notification::{VerificationContext, VerificationMailer};
use crate::security::profile_store::BehaviorProfileStore;
use crate::security::risk_scoring::{RiskAssessment, RiskScoringEngine};
use crate::security::verification::VerificationChallengeStateMachine;
use crate::security::SecurityError;
use crate::utils::{mask_email, shorten_address};

const MAX_ADDRESS_LEN: usize = 128;
const MAX_KIND_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientBalance { amount: f64, balance: f64 },
}

impl RejectionReason {
    pub fn to_error(&self) -> SecurityError {
        match self {
            RejectionReason::InsufficientBalance { amount, balance } => SecurityError::InsufficientBalance {
                amount: *amount,
                balance: *balance,
            },
        }
    }
}

/// What the client needs to render the challenge; never the code itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeInfo {
    pub token_id: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub code_length: usize,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Approved {
        assessment: RiskAssessment,
    },
    RequiresEmailRegistration {
        assessment: RiskAssessment,
    },
    RequiresVerification {
        assessment: RiskAssessment,
        challenge: ChallengeInfo,
    },
    Rejected {
        assessment: RiskAssessment,
        reason: RejectionReason,
    },
}

impl GateDecision {
    pub fn assessment(&self) -> &RiskAssessment {
        match self {
            GateDecision::Approved { assessment }
            | GateDecision::RequiresEmailRegistration { assessment }
            | GateDecision::RequiresVerification { assessment, .. }
            | GateDecision::Rejected { assessment, .. } => assessment,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, GateDecision::Approved { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            GateDecision::Approved { .. } => "approved",
            GateDecision::RequiresEmailRegistration { .. } => "requires_email_registration",
            GateDecision::RequiresVerification { .. } => "requires_verification",
            GateDecision::Rejected { .. } => "rejected",
        }
    }
}

/// Rejects malformed input before any state is read or written
pub fn validate_request(tx: &TransactionRequest) -> Result<(), SecurityError> {
    let recipient = tx.recipient.trim();
    if recipient.is_empty() {
        return Err(SecurityError::Validation("Recipient address is required".to_string()));
    }
    if recipient.len() > MAX_ADDRESS_LEN || !recipient.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SecurityError::Validation(format!(
            "Malformed recipient address: {}",
            shorten_address(recipient)
        )));
    }
    if !tx.amount.is_finite() || tx.amount <= 0.0 {
        return Err(SecurityError::Validation(format!("Amount must be positive, got {}", tx.amount)));
    }
    if !tx.balance.is_finite() || tx.balance < 0.0 {
        return Err(SecurityError::Validation(format!("Balance must be non-negative, got {}", tx.balance)));
    }
    validate_interaction_kind(&tx.interaction_kind)
}

pub fn validate_interaction_kind(kind: &str) -> Result<(), SecurityError> {
    if kind.is_empty()
        || kind.len() > MAX_KIND_LEN
        || !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SecurityError::Validation(format!("Invalid interaction kind: {:?}", kind)));
    }
    Ok(())
}

pub struct PreSignGate {
    profiles: Arc<BehaviorProfileStore>,
    tracker: Arc<ModalTimingTracker>,
    engine: Arc<RiskScoringEngine>,
    verifier: Arc<VerificationChallengeStateMachine>,
    mailer: Arc<dyn VerificationMailer>,
    clock: Arc<dyn Clock>,
}

impl PreSignGate {
    pub fn new(
        profiles: Arc<BehaviorProfileStore>,
        tracker: Arc<ModalTimingTracker>,
        engine: Arc<RiskScoringEngine>,
        verifier: Arc<VerificationChallengeStateMachine>,
        mailer: Arc<dyn VerificationMailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        PreSignGate {
            profiles,
            tracker,
            engine,
            verifier,
            mailer,
            clock,
        }
    }

    pub async fn evaluate(&self, session_id: &str, tx: &TransactionRequest) -> Result<GateDecision, SecurityError> {
        validate_request(tx)?;

        let profile = self.profiles.snapshot(session_id).await?;
        let timing = self.tracker.snapshot(session_id, &tx.interaction_kind);
        let now = self.clock.now();
        let assessment = self
            .engine
            .evaluate(&profile, tx, timing.as_ref(), now, self.clock.local_hour());

        info!(
            "Risk evaluated: session={} score={} level={} action={} flags={:?}",
            session_id,
            assessment.total_risk_score,
            assessment.risk_level,
            assessment.recommended_action,
            assessment.flags().iter().map(|f| f.as_str()).collect::<Vec<_>>()
        );

        if tx.balance <= 0.0 || tx.amount > tx.balance {
            warn!(
                "Rejected transfer for session {}: amount {} exceeds balance {}",
                session_id, tx.amount, tx.balance
            );
            return Ok(GateDecision::Rejected {
                assessment,
                reason: RejectionReason::InsufficientBalance {
                    amount: tx.amount,
                    balance: tx.balance,
                },
            });
        }

        if !assessment.requires_email_verification() {
            return Ok(GateDecision::Approved { assessment });
        }

        let email = match self.profiles.resolve_email(session_id).await? {
            Some(email) => email,
            None => {
                info!("Session {} must register an email before verification", session_id);
                return Ok(GateDecision::RequiresEmailRegistration { assessment });
            }
        };

        let snapshot = TransactionSnapshot {
            session_id: session_id.to_string(),
            recipient: tx.recipient.trim().to_string(),
            amount: tx.amount,
            balance: tx.balance,
            interaction_kind: tx.interaction_kind.clone(),
            risk_score: assessment.total_risk_score,
            risk_level: assessment.risk_level,
            elapsed_seconds: assessment.timing.elapsed_seconds,
            captured_at: now,
        };
        let issued = self.verifier.issue(session_id, &email, snapshot);

        let context = VerificationContext {
            token_id: issued.token_id.clone(),
            recipient: tx.recipient.trim().to_string(),
            amount: tx.amount,
            risk_score: assessment.total_risk_score,
            expires_at: issued.expires_at,
        };
        if let Err(e) = self.mailer.send_code(&email, &issued.code, &context).await {
            error!("Failed to deliver verification code for session {}: {}", session_id, e);
            self.verifier.revoke(&issued.token_id);
            return Err(e.into());
        }

        let settings = self.verifier.settings();
        Ok(GateDecision::RequiresVerification {
            assessment,
            challenge: ChallengeInfo {
                token_id: issued.token_id,
                email: mask_email(&email),
                expires_at: issued.expires_at,
                code_length: settings.code_length,
                max_attempts: settings.max_attempts,
            },
        })
    }

    /// Only a verified, unconsumed token releases its transaction
    pub async fn confirm_after_verification(&self, token_id: &str) -> Result<TransactionSnapshot, SecurityError> {
        let snapshot = self.verifier.confirm(token_id)?;
        info!(
            "Transfer released after verification: session={} amount={} to {}",
            snapshot.session_id,
            snapshot.amount,
            shorten_address(&snapshot.recipient)
        );
        Ok(snapshot)
    }
}

// src/security/notification.rs - Verification email delivery boundary
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::utils::{mask_email, shorten_address};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MailerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Recipient rejected: {0}")]
    Rejected(String),
}

/// What the owner sees alongside the code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationContext {
    pub token_id: String,
    pub recipient: String,
    pub amount: f64,
    pub risk_score: u8,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait VerificationMailer: Send + Sync {
    async fn send_code(&self, to: &str, code: &str, context: &VerificationContext) -> Result<(), MailerError>;
}

/// Degraded mode for deployments without an email transport: the code goes to the log
pub struct LogOnlyMailer;

#[async_trait]
impl VerificationMailer for LogOnlyMailer {
    async fn send_code(&self, to: &str, code: &str, context: &VerificationContext) -> Result<(), MailerError> {
        warn!(
            "Email delivery not configured; verification code for {} is {} (token {}, {} to {}, expires {})",
            mask_email(to),
            code,
            context.token_id,
            context.amount,
            shorten_address(&context.recipient),
            context.expires_at.format("%H:%M:%S")
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentCode {
    pub to: String,
    pub code: String,
    pub context: VerificationContext,
}

/// Captures outgoing codes; can be switched to fail every delivery
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentCode>>,
    failing: Mutex<bool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().clone()
    }

    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().last().map(|s| s.code.clone())
    }
}

#[async_trait]
impl VerificationMailer for RecordingMailer {
    async fn send_code(&self, to: &str, code: &str, context: &VerificationContext) -> Result<(), MailerError> {
        if *self.failing.lock() {
            return Err(MailerError::Transport("smtp connection refused".to_string()));
        }
        self.sent.lock().push(SentCode {
            to: to.to_string(),
            code: code.to_string(),
            context: context.clone(),
        });
        Ok(())
    }
}

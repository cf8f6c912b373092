// src/security/verification.rs - One-time email verification challenges
//
// Created -> Pending(attempts) -> Verified | Expired | AttemptsExhausted.
// Expired and exhausted tokens are deleted; a verified token is consumed by
// exactly one `confirm`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::models::{SessionId, TokenId, TransactionSnapshot};
use crate::security::clock::Clock;
use crate::security::SecurityError;
use crate::utils::{generate_id, mask_email};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationSettings {
    pub code_length: usize,
    pub ttl_secs: i64,
    pub max_attempts: u32,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        VerificationSettings {
            code_length: 6,
            ttl_secs: 300,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct VerificationToken {
    session_id: SessionId,
    email: String,
    code: String,
    snapshot: TransactionSnapshot,
    expires_at: DateTime<Utc>,
    attempts: u32,
    verified: bool,
}

/// Handed to the caller once, so the code can be delivered
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedChallenge {
    pub token_id: TokenId,
    pub session_id: SessionId,
    pub email: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "transaction", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Verified(TransactionSnapshot),
    AlreadyVerified(TransactionSnapshot),
}

impl AttemptOutcome {
    pub fn snapshot(&self) -> &TransactionSnapshot {
        match self {
            AttemptOutcome::Verified(s) | AttemptOutcome::AlreadyVerified(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenStatus {
    pub token_id: TokenId,
    pub verified: bool,
    pub attempts_remaining: u32,
    pub expires_at: DateTime<Utc>,
    /// Masked address the code went to
    pub email: String,
}

#[derive(Default)]
struct TokenTable {
    tokens: HashMap<TokenId, VerificationToken>,
    // session -> its single unverified token
    live_by_session: HashMap<SessionId, TokenId>,
}

impl TokenTable {
    fn remove(&mut self, token_id: &str) -> Option<VerificationToken> {
        let token = self.tokens.remove(token_id)?;
        if self.live_by_session.get(&token.session_id).map(String::as_str) == Some(token_id) {
            self.live_by_session.remove(&token.session_id);
        }
        Some(token)
    }
}

pub struct VerificationChallengeStateMachine {
    table: Mutex<TokenTable>,
    settings: VerificationSettings,
    clock: Arc<dyn Clock>,
}

impl VerificationChallengeStateMachine {
    pub fn new(settings: VerificationSettings, clock: Arc<dyn Clock>) -> Self {
        VerificationChallengeStateMachine {
            table: Mutex::new(TokenTable::default()),
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }

    /// Fixed-length numeric code from the OS CSPRNG
    fn generate_code(&self) -> String {
        let mut rng = OsRng;
        (0..self.settings.code_length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    /// Creates a challenge, replacing the session's previous unverified one
    pub fn issue(&self, session_id: &str, email: &str, snapshot: TransactionSnapshot) -> IssuedChallenge {
        let now = self.clock.now();
        let token_id = generate_id("verify");
        let code = self.generate_code();
        let expires_at = now + Duration::seconds(self.settings.ttl_secs);

        let mut table = self.table.lock();
        if let Some(previous) = table.live_by_session.remove(session_id) {
            if table.tokens.remove(&previous).is_some() {
                debug!("Invalidated previous verification token {} for session {}", previous, session_id);
            }
        }
        table.tokens.insert(
            token_id.clone(),
            VerificationToken {
                session_id: session_id.to_string(),
                email: email.to_string(),
                code: code.clone(),
                snapshot,
                expires_at,
                attempts: 0,
                verified: false,
            },
        );
        table.live_by_session.insert(session_id.to_string(), token_id.clone());
        drop(table);

        info!(
            "Verification token {} issued for session {} to {}",
            token_id,
            session_id,
            mask_email(email)
        );

        IssuedChallenge {
            token_id,
            session_id: session_id.to_string(),
            email: email.to_string(),
            code,
            created_at: now,
            expires_at,
        }
    }

    pub fn attempt(&self, token_id: &str, supplied_code: &str) -> Result<AttemptOutcome, SecurityError> {
        let now = self.clock.now();
        let mut table = self.table.lock();

        let token = table
            .tokens
            .get_mut(token_id)
            .ok_or_else(|| SecurityError::not_found("verification token", token_id))?;

        if now >= token.expires_at {
            let expired_at = token.expires_at;
            table.remove(token_id);
            info!("Verification token {} expired", token_id);
            return Err(SecurityError::Expired {
                token_id: token_id.to_string(),
                expired_at,
            });
        }

        if token.verified {
            return Ok(AttemptOutcome::AlreadyVerified(token.snapshot.clone()));
        }

        if token.attempts >= self.settings.max_attempts {
            table.remove(token_id);
            warn!("Verification token {} revoked: attempts exhausted", token_id);
            return Err(SecurityError::AttemptsExhausted {
                token_id: token_id.to_string(),
                max_attempts: self.settings.max_attempts,
            });
        }

        token.attempts += 1;
        let matches: bool = token.code.as_bytes().ct_eq(supplied_code.trim().as_bytes()).into();

        if !matches {
            let attempts_remaining = self.settings.max_attempts.saturating_sub(token.attempts);
            warn!(
                "Wrong verification code for token {} ({} attempts remaining)",
                token_id, attempts_remaining
            );
            return Err(SecurityError::WrongCode {
                token_id: token_id.to_string(),
                attempts_remaining,
                expires_at: token.expires_at,
            });
        }

        token.verified = true;
        let snapshot = token.snapshot.clone();
        let session_id = token.session_id.clone();
        if table.live_by_session.get(&session_id).map(String::as_str) == Some(token_id) {
            table.live_by_session.remove(&session_id);
        }

        info!("Verification token {} verified for session {}", token_id, session_id);
        Ok(AttemptOutcome::Verified(snapshot))
    }

    /// Releases the snapshot of a verified token and deletes it
    pub fn confirm(&self, token_id: &str) -> Result<TransactionSnapshot, SecurityError> {
        let now = self.clock.now();
        let mut table = self.table.lock();

        let token = table
            .tokens
            .get(token_id)
            .ok_or_else(|| SecurityError::not_found("verification token", token_id))?;

        if now >= token.expires_at {
            let expired_at = token.expires_at;
            table.remove(token_id);
            return Err(SecurityError::Expired {
                token_id: token_id.to_string(),
                expired_at,
            });
        }

        if !token.verified {
            return Err(SecurityError::NotVerified {
                token_id: token_id.to_string(),
            });
        }

        let token = table
            .remove(token_id)
            .ok_or_else(|| SecurityError::not_found("verification token", token_id))?;
        info!("Verification token {} consumed", token_id);
        Ok(token.snapshot)
    }

    pub fn status(&self, token_id: &str) -> Result<TokenStatus, SecurityError> {
        let now = self.clock.now();
        let mut table = self.table.lock();

        let token = table
            .tokens
            .get(token_id)
            .ok_or_else(|| SecurityError::not_found("verification token", token_id))?;

        if now >= token.expires_at {
            let expired_at = token.expires_at;
            table.remove(token_id);
            return Err(SecurityError::Expired {
                token_id: token_id.to_string(),
                expired_at,
            });
        }

        Ok(TokenStatus {
            token_id: token_id.to_string(),
            verified: token.verified,
            attempts_remaining: self.settings.max_attempts.saturating_sub(token.attempts),
            expires_at: token.expires_at,
            email: mask_email(&token.email),
        })
    }

    /// Drops every token issued to the session, verified or not
    pub fn revoke_session(&self, session_id: &str) -> usize {
        let mut table = self.table.lock();
        let owned: Vec<TokenId> = table
            .tokens
            .iter()
            .filter(|(_, token)| token.session_id == session_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &owned {
            table.remove(id);
        }
        owned.len()
    }

    pub fn revoke(&self, token_id: &str) -> bool {
        self.table.lock().remove(token_id).is_some()
    }

    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut table = self.table.lock();
        let expired: Vec<TokenId> = table
            .tokens
            .iter()
            .filter(|(_, token)| now >= token.expires_at)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            table.remove(id);
        }
        expired.len()
    }

    pub fn token_count(&self) -> usize {
        self.table.lock().tokens.len()
    }
}

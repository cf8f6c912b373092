// src/security/service.rs - Facade exposing the engine to the wallet-flow layer
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::db::ProfileRepository;
use crate::models::{CompletedTransfer, ProfileSummary, TransactionRequest, TransactionSnapshot};
use crate::security::clock::Clock;
use crate::security::gate::{validate_interaction_kind, GateDecision, PreSignGate};
use crate::security::modal_timing::{CompletedInteraction, InteractionStatus, ModalHandle, ModalTimingTracker};
use crate::security::notification::VerificationMailer;
use crate::security::profile_store::{BehaviorProfileStore, FeedbackOutcome};
use crate::security::risk_scoring::RiskScoringEngine;
use crate::security::verification::{AttemptOutcome, TokenStatus, VerificationChallengeStateMachine};
use crate::security::SecurityError;

const MAX_SESSION_ID_LEN: usize = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEnded {
    pub found: bool,
    pub successful: bool,
    pub duration_seconds: Option<f64>,
    pub interaction_count: u32,
    pub feedback: Option<FeedbackOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub expired_tokens: usize,
    pub abandoned_modals: usize,
    pub idle_profiles: usize,
}

/// What `end_session` released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEnded {
    pub modals: usize,
    pub tokens: usize,
    pub profile_cached: bool,
}

fn validate_session_id(session_id: &str) -> Result<(), SecurityError> {
    if session_id.trim().is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(SecurityError::Validation("Invalid session id".to_string()));
    }
    Ok(())
}

pub struct TransactionSecurityService {
    profiles: Arc<BehaviorProfileStore>,
    tracker: Arc<ModalTimingTracker>,
    engine: Arc<RiskScoringEngine>,
    verifier: Arc<VerificationChallengeStateMachine>,
    gate: PreSignGate,
}

impl TransactionSecurityService {
    pub fn new(
        config: &Config,
        repository: Arc<dyn ProfileRepository>,
        mailer: Arc<dyn VerificationMailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let profiles = Arc::new(BehaviorProfileStore::new(repository, config.profile.clone(), clock.clone()));
        let tracker = Arc::new(ModalTimingTracker::new(config.timing.clone(), clock.clone()));
        let engine = Arc::new(RiskScoringEngine::new(config.risk.clone(), config.timing.clone()));
        let verifier = Arc::new(VerificationChallengeStateMachine::new(
            config.verification.clone(),
            clock.clone(),
        ));
        let gate = PreSignGate::new(
            profiles.clone(),
            tracker.clone(),
            engine.clone(),
            verifier.clone(),
            mailer,
            clock,
        );

        TransactionSecurityService {
            profiles,
            tracker,
            engine,
            verifier,
            gate,
        }
    }

    pub fn start_interaction(&self, session_id: &str, kind: &str) -> Result<ModalHandle, SecurityError> {
        validate_session_id(session_id)?;
        validate_interaction_kind(kind)?;
        Ok(self.tracker.start(session_id, kind))
    }

    pub fn record_interaction_event(&self, session_id: &str, kind: &str, event_type: &str) -> Result<u32, SecurityError> {
        self.tracker.record_interaction(session_id, kind, event_type)
    }

    /// Never fails for a missing window; learning problems are logged, not returned
    pub async fn end_interaction(
        &self,
        session_id: &str,
        kind: &str,
        successful: bool,
        completed: Option<CompletedTransfer>,
    ) -> InteractionEnded {
        let ended = self.tracker.end(session_id, kind, successful);
        let found = ended.is_some();

        let feedback = match (successful, completed) {
            (true, Some(transfer)) => {
                let interaction = ended.clone().unwrap_or(CompletedInteraction {
                    duration_seconds: 0.0,
                    interaction_count: 0,
                    successful,
                });
                match self
                    .profiles
                    .record_completed_transfer(session_id, &transfer, &interaction)
                    .await
                {
                    Ok(outcome) => Some(outcome),
                    Err(e) => {
                        warn!("Skipped learning from transfer in session {}: {}", session_id, e);
                        None
                    }
                }
            }
            _ => None,
        };

        if !found {
            debug!("End without open modal: session={} kind={}", session_id, kind);
        }

        InteractionEnded {
            found,
            successful,
            duration_seconds: ended.as_ref().map(|e| e.duration_seconds),
            interaction_count: ended.as_ref().map(|e| e.interaction_count).unwrap_or(0),
            feedback,
        }
    }

    pub fn interaction_status(&self, session_id: &str, kind: &str) -> InteractionStatus {
        self.tracker.status(session_id, kind)
    }

    pub async fn evaluate_transaction(&self, session_id: &str, tx: &TransactionRequest) -> Result<GateDecision, SecurityError> {
        validate_session_id(session_id)?;
        self.gate.evaluate(session_id, tx).await
    }

    pub async fn submit_verification_code(&self, token_id: &str, code: &str) -> Result<AttemptOutcome, SecurityError> {
        let outcome = self.verifier.attempt(token_id, code)?;
        if let AttemptOutcome::Verified(snapshot) = &outcome {
            if let Err(e) = self.profiles.mark_email_verified(&snapshot.session_id).await {
                warn!("Could not mark email verified for session {}: {}", snapshot.session_id, e);
            }
        }
        Ok(outcome)
    }

    pub fn token_status(&self, token_id: &str) -> Result<TokenStatus, SecurityError> {
        self.verifier.status(token_id)
    }

    pub async fn confirm_after_verification(&self, token_id: &str) -> Result<TransactionSnapshot, SecurityError> {
        self.gate.confirm_after_verification(token_id).await
    }

    pub async fn register_verification_email(&self, session_id: &str, email: &str) -> Result<(), SecurityError> {
        validate_session_id(session_id)?;
        self.profiles.register_email(session_id, email).await
    }

    pub async fn bind_wallet_fingerprint(&self, session_id: &str, fingerprint: &str) -> Result<Option<String>, SecurityError> {
        validate_session_id(session_id)?;
        self.profiles.bind_wallet_fingerprint(session_id, fingerprint).await
    }

    pub async fn profile_summary(&self, session_id: &str) -> Result<ProfileSummary, SecurityError> {
        validate_session_id(session_id)?;
        self.profiles.summary(session_id).await
    }

    /// Releases in-memory state held for a session that has ended; the stored profile stays
    pub fn end_session(&self, session_id: &str) -> Result<SessionEnded, SecurityError> {
        validate_session_id(session_id)?;
        let ended = SessionEnded {
            modals: self.tracker.evict_session(session_id),
            tokens: self.verifier.revoke_session(session_id),
            profile_cached: self.profiles.evict(session_id),
        };
        debug!(
            "Session {} ended (modals={}, tokens={}, profile={})",
            session_id, ended.modals, ended.tokens, ended.profile_cached
        );
        Ok(ended)
    }

    pub fn run_cleanup(&self) -> CleanupReport {
        CleanupReport {
            expired_tokens: self.verifier.sweep_expired(),
            abandoned_modals: self.tracker.evict_abandoned(),
            idle_profiles: self.profiles.evict_idle(),
        }
    }

    pub fn cached_profile_count(&self) -> usize {
        self.profiles.cached_count()
    }

    pub fn spawn_cleanup_task(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.run_cleanup();
                if report != CleanupReport::default() {
                    info!(
                        "Cleanup removed {} expired token(s), {} abandoned modal(s), {} idle profile(s)",
                        report.expired_tokens, report.abandoned_modals, report.idle_profiles
                    );
                }
            }
        })
    }

    pub fn engine(&self) -> &RiskScoringEngine {
        &self.engine
    }

    pub fn tracker(&self) -> &ModalTimingTracker {
        &self.tracker
    }

    pub fn verifier(&self) -> &VerificationChallengeStateMachine {
        &self.verifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryProfileRepository;
    use crate::security::clock::ManualClock;
    use crate::security::notification::RecordingMailer;

    fn service() -> (TransactionSecurityService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_at_hour(12));
        let service = TransactionSecurityService::new(
            &Config::default(),
            Arc::new(InMemoryProfileRepository::new()),
            Arc::new(RecordingMailer::new()),
            clock.clone(),
        );
        (service, clock)
    }

    #[tokio::test]
    async fn test_end_without_start_is_noop() {
        let (service, _) = service();
        let ended = service.end_interaction("s1", "transfer", false, None).await;
        assert!(!ended.found);
        assert!(ended.feedback.is_none());
    }

    #[tokio::test]
    async fn test_successful_end_feeds_profile() {
        let (service, clock) = service();
        service.start_interaction("s1", "transfer").unwrap();
        clock.advance_secs(40);

        let ended = service
            .end_interaction(
                "s1",
                "transfer",
                true,
                Some(CompletedTransfer {
                    recipient: "0xabc".to_string(),
                    amount: 1.0,
                    risk_score: 10,
                }),
            )
            .await;
        assert_eq!(ended.duration_seconds, Some(40.0));
        let feedback = ended.feedback.unwrap();
        assert_eq!(feedback.total_transactions, 1);
        assert!(feedback.profile_persisted);
    }

    #[tokio::test]
    async fn test_aborted_end_does_not_learn() {
        let (service, _) = service();
        service.start_interaction("s1", "transfer").unwrap();
        let ended = service
            .end_interaction(
                "s1",
                "transfer",
                false,
                Some(CompletedTransfer {
                    recipient: "0xabc".to_string(),
                    amount: 1.0,
                    risk_score: 10,
                }),
            )
            .await;
        assert!(ended.found);
        assert!(ended.feedback.is_none());
        assert_eq!(service.profile_summary("s1").await.unwrap().transaction_count, 0);
    }

    #[tokio::test]
    async fn test_run_cleanup() {
        let (service, clock) = service();
        service.start_interaction("s1", "transfer").unwrap();
        clock.advance_secs(2 * 3600);
        let report = service.run_cleanup();
        assert_eq!(report.abandoned_modals, 1);
        assert_eq!(report.expired_tokens, 0);
    }

    #[tokio::test]
    async fn test_cleanup_evicts_idle_profiles() {
        let (service, clock) = service();
        for i in 0..50 {
            service.profile_summary(&format!("drive-by-{}", i)).await.unwrap();
        }
        assert_eq!(service.cached_profile_count(), 50);

        clock.advance_secs(7 * 24 * 3600);
        let report = service.run_cleanup();
        assert_eq!(report.idle_profiles, 50);
        assert_eq!(service.cached_profile_count(), 0);
    }

    #[tokio::test]
    async fn test_end_session_releases_state() {
        let (service, _) = service();
        service.start_interaction("s1", "transfer").unwrap();
        service.start_interaction("s1", "swap").unwrap();
        service.profile_summary("s1").await.unwrap();

        let ended = service.end_session("s1").unwrap();
        assert_eq!(ended.modals, 2);
        assert!(ended.profile_cached);
        assert_eq!(service.cached_profile_count(), 0);
        assert!(!service.interaction_status("s1", "transfer").active);
        assert!(service.end_session("").is_err());
    }

    #[test]
    fn test_invalid_session_rejected() {
        let (service, _) = service();
        assert_eq!(service.start_interaction("", "transfer").unwrap_err().code(), "validation_error");
        assert_eq!(service.start_interaction("s1", "bad kind").unwrap_err().code(), "validation_error");
    }
}

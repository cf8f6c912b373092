#![allow(dead_code)]

use std::sync::Arc;

use risk_engine::config::Config;
use risk_engine::db::InMemoryProfileRepository;
use risk_engine::models::{CompletedTransfer, TransactionRequest};
use risk_engine::security::notification::RecordingMailer;
use risk_engine::security::{GateDecision, ManualClock, TransactionSecurityService};

pub const KNOWN: &str = "0x1111111111111111111111111111111111111111";
pub const STRANGER: &str = "0x2222222222222222222222222222222222222222";

pub struct Harness {
    pub service: Arc<TransactionSecurityService>,
    pub clock: Arc<ManualClock>,
    pub mailer: Arc<RecordingMailer>,
    pub repository: Arc<InMemoryProfileRepository>,
}

impl Harness {
    /// Engine at midday local time with default settings
    pub fn new() -> Self {
        Self::with_config(Config::default(), 12)
    }

    pub fn with_config(config: Config, hour: u32) -> Self {
        let clock = Arc::new(ManualClock::starting_at_hour(hour));
        let mailer = Arc::new(RecordingMailer::new());
        let repository = Arc::new(InMemoryProfileRepository::new());
        let service = Arc::new(TransactionSecurityService::new(
            &config,
            repository.clone(),
            mailer.clone(),
            clock.clone(),
        ));
        Harness {
            service,
            clock,
            mailer,
            repository,
        }
    }

    /// Opens a window, waits, pings and completes a transfer that feeds the profile
    pub async fn complete_transfer(&self, session_id: &str, recipient: &str, amount: f64, seconds: i64, interactions: u32) {
        self.service.start_interaction(session_id, "transfer").unwrap();
        for _ in 0..interactions {
            self.service
                .record_interaction_event(session_id, "transfer", "keypress")
                .unwrap();
        }
        self.clock.advance_secs(seconds);
        let ended = self
            .service
            .end_interaction(
                session_id,
                "transfer",
                true,
                Some(CompletedTransfer {
                    recipient: recipient.to_string(),
                    amount,
                    risk_score: 10,
                }),
            )
            .await;
        assert!(ended.feedback.is_some(), "transfer was not learned");
    }

    /// Opens a window and lets `seconds` pass with the given number of pings
    pub fn open_window(&self, session_id: &str, seconds: i64, interactions: u32) {
        self.service.start_interaction(session_id, "transfer").unwrap();
        for _ in 0..interactions {
            self.service
                .record_interaction_event(session_id, "transfer", "click")
                .unwrap();
        }
        self.clock.advance_secs(seconds);
    }

    pub async fn evaluate(&self, session_id: &str, recipient: &str, amount: f64, balance: f64) -> GateDecision {
        self.service
            .evaluate_transaction(session_id, &TransactionRequest::new(recipient, amount, balance))
            .await
            .unwrap()
    }

    /// Registers an email and triggers a challenge by signing with no open window
    pub async fn challenge(&self, session_id: &str, amount: f64) -> (String, String) {
        self.service
            .register_verification_email(session_id, "owner@example.com")
            .await
            .unwrap();
        match self.evaluate(session_id, STRANGER, amount, 10.0).await {
            GateDecision::RequiresVerification { challenge, .. } => {
                let code = self.mailer.last_code().expect("code was not delivered");
                (challenge.token_id, code)
            }
            other => panic!("expected a verification challenge, got {}", other.name()),
        }
    }
}

pub fn wrong_code(code: &str) -> String {
    code.chars().map(|c| if c == '9' { '0' } else { '9' }).collect()
}

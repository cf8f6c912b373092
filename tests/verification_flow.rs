mod common;

use common::{wrong_code, Harness, STRANGER};
use risk_engine::models::TransactionRequest;
use risk_engine::security::verification::AttemptOutcome;
use risk_engine::security::{GateDecision, SecurityError};
use risk_engine::utils::wallet_fingerprint;

#[tokio::test]
async fn three_wrong_codes_exhaust_the_token() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-1", 1.0).await;
    let bad = wrong_code(&code);

    for remaining in [2, 1, 0] {
        match h.service.submit_verification_code(&token_id, &bad).await {
            Err(SecurityError::WrongCode { attempts_remaining, .. }) => assert_eq!(attempts_remaining, remaining),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    let exhausted = h.service.submit_verification_code(&token_id, &code).await;
    assert!(matches!(exhausted, Err(SecurityError::AttemptsExhausted { max_attempts: 3, .. })));
    assert!(matches!(h.service.token_status(&token_id), Err(SecurityError::NotFound { .. })));
}

#[tokio::test]
async fn correct_code_after_expiry_is_refused() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-2", 1.0).await;

    h.clock.advance_secs(301);
    let result = h.service.submit_verification_code(&token_id, &code).await;
    assert!(matches!(result, Err(SecurityError::Expired { .. })));
    assert_eq!(h.service.verifier().token_count(), 0);
}

#[tokio::test]
async fn code_just_before_expiry_is_accepted() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-3", 1.0).await;

    h.clock.advance_secs(299);
    let outcome = h.service.submit_verification_code(&token_id, &code).await.unwrap();
    assert!(matches!(outcome, AttemptOutcome::Verified(_)));
}

#[tokio::test]
async fn confirmation_releases_the_snapshot_once() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-4", 2.5).await;

    h.service.submit_verification_code(&token_id, &code).await.unwrap();
    let snapshot = h.service.confirm_after_verification(&token_id).await.unwrap();
    assert_eq!(snapshot.amount, 2.5);
    assert_eq!(snapshot.recipient, STRANGER);
    assert_eq!(snapshot.session_id, "s-4");

    let again = h.service.confirm_after_verification(&token_id).await;
    assert!(matches!(again, Err(SecurityError::NotFound { .. })));
}

#[tokio::test]
async fn confirmation_before_verification_keeps_the_token() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-5", 1.0).await;

    let early = h.service.confirm_after_verification(&token_id).await;
    assert!(matches!(early, Err(SecurityError::NotVerified { .. })));

    h.service.submit_verification_code(&token_id, &code).await.unwrap();
    assert!(h.service.confirm_after_verification(&token_id).await.is_ok());
}

#[tokio::test]
async fn repeated_correct_code_reports_already_verified() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-6", 1.0).await;

    h.service.submit_verification_code(&token_id, &code).await.unwrap();
    let second = h.service.submit_verification_code(&token_id, &code).await.unwrap();
    assert!(matches!(second, AttemptOutcome::AlreadyVerified(_)));
}

#[tokio::test]
async fn new_challenge_invalidates_the_previous_one() {
    let h = Harness::new();
    let (first, first_code) = h.challenge("s-7", 1.0).await;
    let (second, _) = h.challenge("s-7", 1.5).await;

    assert_ne!(first, second);
    let stale = h.service.submit_verification_code(&first, &first_code).await;
    assert!(matches!(stale, Err(SecurityError::NotFound { .. })));
    assert_eq!(h.service.verifier().token_count(), 1);
}

#[tokio::test]
async fn failed_delivery_leaves_no_token_behind() {
    let h = Harness::new();
    h.service
        .register_verification_email("s-8", "owner@example.com")
        .await
        .unwrap();
    h.mailer.set_failing(true);

    let result = h
        .service
        .evaluate_transaction("s-8", &TransactionRequest::new(STRANGER, 1.0, 10.0))
        .await;
    assert!(matches!(result, Err(SecurityError::Dependency(_))));
    assert_eq!(h.service.verifier().token_count(), 0);
}

#[tokio::test]
async fn successful_verification_marks_the_email_verified() {
    let h = Harness::new();
    let (token_id, code) = h.challenge("s-9", 1.0).await;

    assert!(!h.service.profile_summary("s-9").await.unwrap().email_verified);
    h.service.submit_verification_code(&token_id, &code).await.unwrap();

    let summary = h.service.profile_summary("s-9").await.unwrap();
    assert!(summary.email_verified);
    assert_eq!(summary.email.as_deref(), Some("own***@example.com"));
}

#[tokio::test]
async fn code_is_sent_to_the_registered_address() {
    let h = Harness::new();
    let (token_id, _) = h.challenge("s-10", 1.0).await;

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@example.com");
    assert_eq!(sent[0].context.token_id, token_id);
    assert_eq!(sent[0].code.len(), 6);
    assert!(sent[0].code.chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn wallet_email_is_recovered_in_a_new_session() {
    let h = Harness::new();
    let fingerprint = wallet_fingerprint(b"wallet seed material");

    assert_eq!(h.service.bind_wallet_fingerprint("old", &fingerprint).await.unwrap(), None);
    h.service
        .register_verification_email("old", "Owner@Example.com")
        .await
        .unwrap();

    let recovered = h.service.bind_wallet_fingerprint("new", &fingerprint).await.unwrap();
    assert_eq!(recovered.as_deref(), Some("owner@example.com"));

    match h.evaluate("new", STRANGER, 1.0, 10.0).await {
        GateDecision::RequiresVerification { challenge, .. } => {
            assert_eq!(challenge.email, "own***@example.com");
        }
        other => panic!("expected a verification challenge, got {}", other.name()),
    }
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let h = Harness::new();
    let result = h.service.register_verification_email("s-11", "not-an-email").await;
    assert!(matches!(result, Err(SecurityError::Validation(_))));
}

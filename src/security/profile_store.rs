// src/security/profile_store.rs - Per-session behavioral baselines
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::db::ProfileRepository;
use crate::models::{
    normalize_address, BehaviorProfile, CompletedTransfer, KnownAddress, ProfileSummary, TransactionRecord,
    TransactionSummary,
};
use crate::security::anomaly::mean_and_std_dev;
use crate::security::clock::Clock;
use crate::security::modal_timing::CompletedInteraction;
use crate::security::SecurityError;
use crate::utils::{is_valid_email, mask_email, shorten_address};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    pub default_average_duration: f64,
    pub history_limit: usize,
    pub duration_window: usize,
    pub min_duration_samples: usize,
    pub summary_transactions: usize,
    pub idle_eviction_secs: i64,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        ProfileSettings {
            default_average_duration: 120.0,
            history_limit: 100,
            duration_window: 20,
            min_duration_samples: 3,
            summary_transactions: 10,
            idle_eviction_secs: 24 * 60 * 60,
        }
    }
}

/// Result of feeding a completed transfer back into the baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutcome {
    pub total_transactions: u64,
    pub average_duration: f64,
    pub profile_persisted: bool,
}

/// Cached profile plus a lock that keeps its repository writes in order
struct ProfileEntry {
    profile: Mutex<BehaviorProfile>,
    persist: tokio::sync::Mutex<()>,
}

type SharedProfile = Arc<ProfileEntry>;

/// In-memory profiles are authoritative; the repository is written behind them
pub struct BehaviorProfileStore {
    profiles: RwLock<HashMap<String, SharedProfile>>,
    repository: Arc<dyn ProfileRepository>,
    settings: ProfileSettings,
    clock: Arc<dyn Clock>,
}

impl BehaviorProfileStore {
    pub fn new(repository: Arc<dyn ProfileRepository>, settings: ProfileSettings, clock: Arc<dyn Clock>) -> Self {
        BehaviorProfileStore {
            profiles: RwLock::new(HashMap::new()),
            repository,
            settings,
            clock,
        }
    }

    pub fn settings(&self) -> &ProfileSettings {
        &self.settings
    }

    /// Cached profile, else the stored one, else a fresh zero-history profile
    async fn entry(&self, session_id: &str) -> Result<SharedProfile, SecurityError> {
        let cached = self.profiles.read().get(session_id).cloned();
        if let Some(profile) = cached {
            return Ok(profile);
        }

        let loaded = self.repository.load_profile(session_id).await?;
        let profile = match loaded {
            Some(profile) => {
                debug!("Loaded stored profile for session {}", session_id);
                profile
            }
            None => {
                info!("Creating behavior profile for session {}", session_id);
                BehaviorProfile::new(session_id, self.settings.default_average_duration, self.clock.now())
            }
        };

        // A concurrent loader may have won the race; keep whichever got in first
        let mut profiles = self.profiles.write();
        Ok(profiles
            .entry(session_id.to_string())
            .or_insert_with(|| {
                Arc::new(ProfileEntry {
                    profile: Mutex::new(profile),
                    persist: tokio::sync::Mutex::new(()),
                })
            })
            .clone())
    }

    /// Point-in-time copy for read-only use
    pub async fn snapshot(&self, session_id: &str) -> Result<BehaviorProfile, SecurityError> {
        let entry = self.entry(session_id).await?;
        let profile = entry.profile.lock().clone();
        Ok(profile)
    }

    pub async fn record_completed_transfer(
        &self,
        session_id: &str,
        transfer: &CompletedTransfer,
        interaction: &CompletedInteraction,
    ) -> Result<FeedbackOutcome, SecurityError> {
        if !transfer.amount.is_finite() || transfer.amount <= 0.0 {
            return Err(SecurityError::Validation(format!("Invalid amount: {}", transfer.amount)));
        }
        if transfer.recipient.trim().is_empty() {
            return Err(SecurityError::Validation("Recipient address is required".to_string()));
        }

        let entry = self.entry(session_id).await?;
        let now = self.clock.now();
        let record = TransactionRecord {
            amount: transfer.amount,
            counterparty: transfer.recipient.trim().to_string(),
            duration_seconds: interaction.duration_seconds,
            interaction_count: interaction.interaction_count,
            risk_score: transfer.risk_score,
            timestamp: now,
        };

        let _persist = entry.persist.lock().await;
        let updated = {
            let mut profile = entry.profile.lock();
            self.apply_transfer(&mut profile, &record);
            profile.clone()
        };

        info!(
            "Profile updated: session={} transactions={} avg_duration={:.1}s recipient={}",
            session_id,
            updated.total_transactions,
            updated.average_duration,
            shorten_address(&record.counterparty)
        );

        let profile_persisted = self.persist_transfer(&updated, &record).await;

        Ok(FeedbackOutcome {
            total_transactions: updated.total_transactions,
            average_duration: updated.average_duration,
            profile_persisted,
        })
    }

    fn apply_transfer(&self, profile: &mut BehaviorProfile, record: &TransactionRecord) {
        profile.recent_transactions.push_front(record.clone());
        profile.recent_transactions.truncate(self.settings.history_limit);
        profile.total_transactions += 1;

        let amounts = profile.recent_amounts(self.settings.history_limit);
        if let Some((mean, std_dev)) = mean_and_std_dev(&amounts) {
            profile.amount_mean = mean;
            profile.amount_std_dev = std_dev;
        }

        profile
            .known_addresses
            .entry(normalize_address(&record.counterparty))
            .and_modify(|known| known.interaction_count += 1)
            .or_insert(KnownAddress {
                first_seen: record.timestamp,
                interaction_count: 1,
            });

        if record.duration_seconds > 0.0 && record.duration_seconds.is_finite() {
            profile.duration_samples.push_back(record.duration_seconds);
            while profile.duration_samples.len() > self.settings.duration_window {
                profile.duration_samples.pop_front();
            }
        }

        if profile.duration_samples.len() >= self.settings.min_duration_samples {
            let samples: Vec<f64> = profile.duration_samples.iter().copied().collect();
            if let Some((mean, std_dev)) = mean_and_std_dev(&samples) {
                if mean > 0.0 {
                    profile.average_duration = mean;
                    profile.duration_std_dev = std_dev;
                }
            }
        }

        profile.last_activity = record.timestamp;
    }

    async fn persist_transfer(&self, profile: &BehaviorProfile, record: &TransactionRecord) -> bool {
        let session_id = &profile.session_id;
        let results = [
            self.repository.save_profile(profile).await,
            self.repository.append_transaction(session_id, record).await,
            self.repository.register_address(session_id, &record.counterparty).await,
        ];

        let mut persisted = true;
        for err in results.into_iter().filter_map(Result::err) {
            warn!("Failed to persist profile update for session {}: {}", session_id, err);
            persisted = false;
        }
        persisted
    }

    /// Stores the email on the profile and, when bound, under the wallet fingerprint
    pub async fn register_email(&self, session_id: &str, email: &str) -> Result<(), SecurityError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            return Err(SecurityError::Validation(format!("Invalid email address: {}", mask_email(&email))));
        }

        let entry = self.entry(session_id).await?;
        let _persist = entry.persist.lock().await;
        let mut candidate = entry.profile.lock().clone();
        candidate.email = Some(email.clone());
        candidate.email_verified = false;
        candidate.last_activity = self.clock.now();

        // Persist before touching the cached profile so a failure leaves it unchanged
        self.repository.save_profile(&candidate).await?;
        if let Some(fingerprint) = &candidate.wallet_fingerprint {
            self.repository.register_wallet_email(fingerprint, &email).await?;
        }

        {
            let mut profile = entry.profile.lock();
            profile.email = candidate.email;
            profile.email_verified = false;
            profile.last_activity = candidate.last_activity;
        }

        info!("Verification email {} registered for session {}", mask_email(&email), session_id);
        Ok(())
    }

    /// Binds the session to a wallet and returns the email now on file, if any
    pub async fn bind_wallet_fingerprint(&self, session_id: &str, fingerprint: &str) -> Result<Option<String>, SecurityError> {
        let fingerprint = fingerprint.trim();
        if fingerprint.len() != 64 || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SecurityError::Validation("Wallet fingerprint must be a hex sha256 digest".to_string()));
        }

        let entry = self.entry(session_id).await?;
        entry.profile.lock().wallet_fingerprint = Some(fingerprint.to_lowercase());

        self.resolve_email(session_id).await
    }

    /// Profile email, falling back to the email stored for the bound wallet
    pub async fn resolve_email(&self, session_id: &str) -> Result<Option<String>, SecurityError> {
        let entry = self.entry(session_id).await?;
        let (email, fingerprint) = {
            let profile = entry.profile.lock();
            (profile.email.clone(), profile.wallet_fingerprint.clone())
        };

        if email.is_some() {
            return Ok(email);
        }
        let fingerprint = match fingerprint {
            Some(fingerprint) => fingerprint,
            None => return Ok(None),
        };

        let recovered = self.repository.wallet_email(&fingerprint).await?;
        if let Some(email) = &recovered {
            let mut profile = entry.profile.lock();
            if profile.email.is_none() {
                profile.email = Some(email.clone());
                info!("Recovered email {} for session {} from wallet", mask_email(email), session_id);
            }
        }
        Ok(recovered)
    }

    pub async fn mark_email_verified(&self, session_id: &str) -> Result<(), SecurityError> {
        let entry = self.entry(session_id).await?;
        let _persist = entry.persist.lock().await;
        let updated = {
            let mut profile = entry.profile.lock();
            if profile.email_verified || profile.email.is_none() {
                return Ok(());
            }
            profile.email_verified = true;
            profile.clone()
        };

        if let Err(e) = self.repository.save_profile(&updated).await {
            warn!("Failed to persist email verification for session {}: {}", session_id, e);
        }
        Ok(())
    }

    pub async fn summary(&self, session_id: &str) -> Result<ProfileSummary, SecurityError> {
        let profile = self.snapshot(session_id).await?;
        let status = match profile.total_transactions {
            0 => "new",
            n if (n as usize) < self.settings.min_duration_samples => "learning",
            _ => "established",
        };

        Ok(ProfileSummary {
            session_id: profile.session_id.clone(),
            status: status.to_string(),
            email: profile.email.as_deref().map(mask_email),
            email_verified: profile.email_verified,
            transaction_count: profile.total_transactions,
            known_addresses: profile.known_addresses.len(),
            average_duration: profile.average_duration,
            amount_mean: profile.amount_mean,
            amount_std_dev: profile.amount_std_dev,
            recent_transactions: profile
                .recent_transactions
                .iter()
                .take(self.settings.summary_transactions)
                .map(|tx| TransactionSummary {
                    amount: tx.amount,
                    counterparty: shorten_address(&tx.counterparty),
                    duration_seconds: tx.duration_seconds,
                    risk_score: tx.risk_score,
                    timestamp: tx.timestamp,
                })
                .collect(),
            created_at: profile.created_at,
            last_activity: profile.last_activity,
        })
    }

    /// Drops the cached profile; the stored copy is untouched
    pub fn evict(&self, session_id: &str) -> bool {
        self.profiles.write().remove(session_id).is_some()
    }

    /// Drops cached profiles idle past the threshold and not in use by a caller
    pub fn evict_idle(&self) -> usize {
        let cutoff = self.clock.now() - Duration::seconds(self.settings.idle_eviction_secs);
        let mut profiles = self.profiles.write();
        let before = profiles.len();
        profiles.retain(|_, entry| Arc::strong_count(entry) > 1 || entry.profile.lock().last_activity >= cutoff);
        let evicted = before - profiles.len();
        if evicted > 0 {
            debug!("Evicted {} idle profile(s) from the cache", evicted);
        }
        evicted
    }

    pub fn cached_count(&self) -> usize {
        self.profiles.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InMemoryProfileRepository, RepositoryError};
    use crate::security::clock::ManualClock;
    use async_trait::async_trait;

    fn store() -> (BehaviorProfileStore, Arc<InMemoryProfileRepository>) {
        let repo = Arc::new(InMemoryProfileRepository::new());
        let clock = Arc::new(ManualClock::starting_at_hour(12));
        (
            BehaviorProfileStore::new(repo.clone(), ProfileSettings::default(), clock),
            repo,
        )
    }

    fn completed(duration: f64) -> CompletedInteraction {
        CompletedInteraction {
            duration_seconds: duration,
            interaction_count: 6,
            successful: true,
        }
    }

    fn transfer(recipient: &str, amount: f64) -> CompletedTransfer {
        CompletedTransfer {
            recipient: recipient.to_string(),
            amount,
            risk_score: 12,
        }
    }

    #[tokio::test]
    async fn test_fresh_profile_defaults() {
        let (store, _) = store();
        let profile = store.snapshot("s1").await.unwrap();
        assert_eq!(profile.average_duration, 120.0);
        assert_eq!(profile.total_transactions, 0);
        assert!(profile.known_addresses.is_empty());
    }

    #[tokio::test]
    async fn test_average_duration_converges() {
        let (store, _) = store();
        store.record_completed_transfer("s1", &transfer("0xabc", 1.0), &completed(45.0)).await.unwrap();
        store.record_completed_transfer("s1", &transfer("0xabc", 1.0), &completed(45.0)).await.unwrap();
        assert_eq!(store.snapshot("s1").await.unwrap().average_duration, 120.0);

        let outcome = store
            .record_completed_transfer("s1", &transfer("0xabc", 1.0), &completed(45.0))
            .await
            .unwrap();
        assert!((outcome.average_duration - 45.0).abs() < 1e-9);
        assert!(outcome.profile_persisted);
    }

    #[tokio::test]
    async fn test_history_and_addresses() {
        let (store, repo) = store();
        store.record_completed_transfer("s1", &transfer("0xAbC", 1.0), &completed(60.0)).await.unwrap();
        store.record_completed_transfer("s1", &transfer("0xabc", 3.0), &completed(60.0)).await.unwrap();

        let profile = store.snapshot("s1").await.unwrap();
        assert_eq!(profile.recent_transactions[0].amount, 3.0);
        assert_eq!(profile.address_interactions("0xABC"), 2);
        assert_eq!(profile.amount_mean, 2.0);
        assert_eq!(profile.amount_std_dev, 1.0);
        assert_eq!(repo.transaction_count("s1"), 2);
    }

    #[tokio::test]
    async fn test_register_email_and_wallet_recovery() {
        let (store, _) = store();
        let fingerprint = crate::utils::wallet_fingerprint(b"seed words");

        store.bind_wallet_fingerprint("old-session", &fingerprint).await.unwrap();
        store.register_email("old-session", "Owner@Example.com").await.unwrap();

        let recovered = store.bind_wallet_fingerprint("new-session", &fingerprint).await.unwrap();
        assert_eq!(recovered, Some("owner@example.com".to_string()));
        assert_eq!(
            store.snapshot("new-session").await.unwrap().email,
            Some("owner@example.com".to_string())
        );
    }

    #[tokio::test]
    async fn test_invalid_email_rejected() {
        let (store, _) = store();
        let err = store.register_email("s1", "not-an-email").await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(store.snapshot("s1").await.unwrap().email.is_none());
    }

    #[tokio::test]
    async fn test_summary_masks_email() {
        let (store, _) = store();
        store.register_email("s1", "alice@example.com").await.unwrap();
        let summary = store.summary("s1").await.unwrap();
        assert_eq!(summary.email, Some("ali***@example.com".to_string()));
        assert_eq!(summary.status, "new");
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_recent_profiles() {
        let repo = Arc::new(InMemoryProfileRepository::new());
        let clock = Arc::new(ManualClock::starting_at_hour(12));
        let store = BehaviorProfileStore::new(repo.clone(), ProfileSettings::default(), clock.clone());

        for i in 0..5 {
            store.summary(&format!("idle-{}", i)).await.unwrap();
        }
        store.record_completed_transfer("busy", &transfer("0xabc", 2.0), &completed(30.0)).await.unwrap();
        assert_eq!(store.cached_count(), 6);

        clock.advance_secs(23 * 60 * 60);
        store.record_completed_transfer("busy", &transfer("0xabc", 2.0), &completed(30.0)).await.unwrap();
        clock.advance_secs(2 * 60 * 60);

        assert_eq!(store.evict_idle(), 5);
        assert_eq!(store.cached_count(), 1);

        // Evicted profiles come back from the repository
        assert!(store.evict("busy"));
        assert_eq!(store.snapshot("busy").await.unwrap().total_transactions, 2);
    }

    /// Delays saves of profiles without an email so they would land after later writes
    struct DelayedRepository {
        inner: InMemoryProfileRepository,
    }

    #[async_trait]
    impl ProfileRepository for DelayedRepository {
        async fn load_profile(&self, session_id: &str) -> Result<Option<BehaviorProfile>, RepositoryError> {
            self.inner.load_profile(session_id).await
        }
        async fn save_profile(&self, profile: &BehaviorProfile) -> Result<(), RepositoryError> {
            if profile.email.is_none() {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            self.inner.save_profile(profile).await
        }
        async fn append_transaction(&self, session_id: &str, record: &TransactionRecord) -> Result<(), RepositoryError> {
            self.inner.append_transaction(session_id, record).await
        }
        async fn register_address(&self, session_id: &str, address: &str) -> Result<(), RepositoryError> {
            self.inner.register_address(session_id, address).await
        }
        async fn wallet_email(&self, fingerprint: &str) -> Result<Option<String>, RepositoryError> {
            self.inner.wallet_email(fingerprint).await
        }
        async fn register_wallet_email(&self, fingerprint: &str, email: &str) -> Result<(), RepositoryError> {
            self.inner.register_wallet_email(fingerprint, email).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_writes_persist_in_order() {
        let repo = Arc::new(DelayedRepository {
            inner: InMemoryProfileRepository::new(),
        });
        let clock = Arc::new(ManualClock::starting_at_hour(12));
        let store = BehaviorProfileStore::new(repo.clone(), ProfileSettings::default(), clock);
        store.snapshot("s1").await.unwrap();

        let request = transfer("0xabc", 1.0);
        let outcome = completed(30.0);
        let (learned, registered) = tokio::join!(
            store.record_completed_transfer("s1", &request, &outcome),
            store.register_email("s1", "owner@example.com"),
        );
        assert!(learned.unwrap().profile_persisted);
        registered.unwrap();

        let stored = repo.load_profile("s1").await.unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("owner@example.com"));
        assert_eq!(stored.total_transactions, 1);
    }

    struct FailingRepository;

    #[async_trait]
    impl ProfileRepository for FailingRepository {
        async fn load_profile(&self, _: &str) -> Result<Option<BehaviorProfile>, RepositoryError> {
            Ok(None)
        }
        async fn save_profile(&self, _: &BehaviorProfile) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("disk full".to_string()))
        }
        async fn append_transaction(&self, _: &str, _: &TransactionRecord) -> Result<(), RepositoryError> {
            Err(RepositoryError::Unavailable("disk full".to_string()))
        }
        async fn register_address(&self, _: &str, _: &str) -> Result<(), RepositoryError> {
            Ok(())
        }
        async fn wallet_email(&self, _: &str) -> Result<Option<String>, RepositoryError> {
            Ok(None)
        }
        async fn register_wallet_email(&self, _: &str, _: &str) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_learning() {
        let clock = Arc::new(ManualClock::starting_at_hour(12));
        let store = BehaviorProfileStore::new(Arc::new(FailingRepository), ProfileSettings::default(), clock);

        let outcome = store
            .record_completed_transfer("s1", &transfer("0xabc", 1.0), &completed(30.0))
            .await
            .unwrap();
        assert!(!outcome.profile_persisted);
        assert_eq!(store.snapshot("s1").await.unwrap().total_transactions, 1);

        let err = store.register_email("s1", "owner@example.com").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.snapshot("s1").await.unwrap().email.is_none());
    }
}

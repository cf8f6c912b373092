// src/db/repositories/profile_repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::db::{ProfileRepository, RepositoryError};
use crate::models::{normalize_address, BehaviorProfile, TransactionRecord};

/// Process-local profile store with the same table layout as the relational backend
#[derive(Default)]
pub struct InMemoryProfileRepository {
    profiles: RwLock<HashMap<String, BehaviorProfile>>,
    transactions: RwLock<HashMap<String, Vec<TransactionRecord>>>,
    addresses: RwLock<HashMap<(String, String), u32>>,
    wallet_emails: RwLock<HashMap<String, String>>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_count(&self, session_id: &str) -> usize {
        self.transactions
            .read()
            .get(session_id)
            .map(|txs| txs.len())
            .unwrap_or(0)
    }

    pub fn address_count(&self, session_id: &str, address: &str) -> u32 {
        self.addresses
            .read()
            .get(&(session_id.to_string(), normalize_address(address)))
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn load_profile(&self, session_id: &str) -> Result<Option<BehaviorProfile>, RepositoryError> {
        Ok(self.profiles.read().get(session_id).cloned())
    }

    async fn save_profile(&self, profile: &BehaviorProfile) -> Result<(), RepositoryError> {
        self.profiles
            .write()
            .insert(profile.session_id.clone(), profile.clone());
        Ok(())
    }

    async fn append_transaction(&self, session_id: &str, record: &TransactionRecord) -> Result<(), RepositoryError> {
        self.transactions
            .write()
            .entry(session_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn register_address(&self, session_id: &str, address: &str) -> Result<(), RepositoryError> {
        let mut addresses = self.addresses.write();
        *addresses
            .entry((session_id.to_string(), normalize_address(address)))
            .or_insert(0) += 1;
        Ok(())
    }

    async fn wallet_email(&self, wallet_fingerprint: &str) -> Result<Option<String>, RepositoryError> {
        Ok(self.wallet_emails.read().get(wallet_fingerprint).cloned())
    }

    async fn register_wallet_email(&self, wallet_fingerprint: &str, email: &str) -> Result<(), RepositoryError> {
        self.wallet_emails
            .write()
            .insert(wallet_fingerprint.to_string(), email.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_profile_round_trip_and_address_counts() {
        let repo = InMemoryProfileRepository::new();
        let profile = BehaviorProfile::new("session-1", 120.0, Utc::now());

        assert!(repo.load_profile("session-1").await.unwrap().is_none());
        repo.save_profile(&profile).await.unwrap();
        let loaded = repo.load_profile("session-1").await.unwrap().unwrap();
        assert_eq!(loaded.session_id, "session-1");

        repo.register_address("session-1", "0xAbC").await.unwrap();
        repo.register_address("session-1", "0xabc").await.unwrap();
        assert_eq!(repo.address_count("session-1", "0XABC"), 2);
    }

    #[tokio::test]
    async fn test_wallet_email_mapping() {
        let repo = InMemoryProfileRepository::new();
        assert_eq!(repo.wallet_email("fp").await.unwrap(), None);

        repo.register_wallet_email("fp", "owner@example.com").await.unwrap();
        assert_eq!(
            repo.wallet_email("fp").await.unwrap(),
            Some("owner@example.com".to_string())
        );
    }
}

// src/db/mod.rs - Durable profile-store interface
pub mod repositories;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{BehaviorProfile, TransactionRecord};

pub use repositories::InMemoryProfileRepository;

/// Error types for the persistent profile store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable key-value backend for profiles, transaction history and wallet emails.
///
/// Every call is fallible and may be retried by the caller; the engine keeps its
/// in-memory state authoritative and treats this store as write-behind.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load_profile(&self, session_id: &str) -> Result<Option<BehaviorProfile>, RepositoryError>;
    async fn save_profile(&self, profile: &BehaviorProfile) -> Result<(), RepositoryError>;
    async fn append_transaction(&self, session_id: &str, record: &TransactionRecord) -> Result<(), RepositoryError>;
    async fn register_address(&self, session_id: &str, address: &str) -> Result<(), RepositoryError>;

    /// Email keyed by a hash of the wallet's secret material, surviving session regeneration
    async fn wallet_email(&self, wallet_fingerprint: &str) -> Result<Option<String>, RepositoryError>;
    async fn register_wallet_email(&self, wallet_fingerprint: &str, email: &str) -> Result<(), RepositoryError>;
}

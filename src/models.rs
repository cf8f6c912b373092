// src/models.rs - Shared data model for the risk engine
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Define core types
pub type SessionId = String;
pub type TokenId = String;
pub type Address = String;

/// Interaction kind used when the client does not name one
pub const DEFAULT_INTERACTION_KIND: &str = "transfer";

/// Normalizes a counterparty address for set membership (case-insensitive)
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Ordinal risk classification of an aggregate score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            _ => Err(format!("Invalid risk level: {}", s)),
        }
    }
}

/// What the caller should do with a scored transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    Allow,
    Warn,
    Confirm,
    RequireEmailVerification,
}

impl RecommendedAction {
    pub fn for_level(level: RiskLevel) -> Self {
        match level {
            RiskLevel::Low => RecommendedAction::Allow,
            RiskLevel::Medium => RecommendedAction::Warn,
            RiskLevel::High => RecommendedAction::Confirm,
            RiskLevel::Critical => RecommendedAction::RequireEmailVerification,
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecommendedAction::Allow => write!(f, "allow"),
            RecommendedAction::Warn => write!(f, "warn"),
            RecommendedAction::Confirm => write!(f, "confirm"),
            RecommendedAction::RequireEmailVerification => write!(f, "require_email_verification"),
        }
    }
}

/// One completed transfer in a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub amount: f64,
    pub counterparty: Address,
    pub duration_seconds: f64,
    pub interaction_count: u32,
    pub risk_score: u8,
    pub timestamp: DateTime<Utc>,
}

/// Per-address interaction bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownAddress {
    pub first_seen: DateTime<Utc>,
    pub interaction_count: u32,
}

/// Durable per-session behavioral baseline.
///
/// `recent_transactions` is ordered most-recent-first. `duration_samples` holds the
/// completion times (seconds) of the latest successful transfers, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub session_id: SessionId,
    pub email: Option<String>,
    pub email_verified: bool,
    pub wallet_fingerprint: Option<String>,
    pub average_duration: f64,
    pub duration_std_dev: f64,
    pub duration_samples: VecDeque<f64>,
    pub total_transactions: u64,
    pub amount_mean: f64,
    pub amount_std_dev: f64,
    pub known_addresses: HashMap<Address, KnownAddress>,
    pub recent_transactions: VecDeque<TransactionRecord>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl BehaviorProfile {
    /// Fresh zero-history profile
    pub fn new(session_id: &str, default_average_duration: f64, now: DateTime<Utc>) -> Self {
        BehaviorProfile {
            session_id: session_id.to_string(),
            email: None,
            email_verified: false,
            wallet_fingerprint: None,
            average_duration: default_average_duration,
            duration_std_dev: 0.0,
            duration_samples: VecDeque::new(),
            total_transactions: 0,
            amount_mean: 0.0,
            amount_std_dev: 0.0,
            known_addresses: HashMap::new(),
            recent_transactions: VecDeque::new(),
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_known_address(&self, address: &str) -> bool {
        self.known_addresses.contains_key(&normalize_address(address))
    }

    pub fn address_interactions(&self, address: &str) -> u32 {
        self.known_addresses
            .get(&normalize_address(address))
            .map(|a| a.interaction_count)
            .unwrap_or(0)
    }

    /// Amounts of the most recent `limit` transfers, most recent first
    pub fn recent_amounts(&self, limit: usize) -> Vec<f64> {
        self.recent_transactions
            .iter()
            .take(limit)
            .map(|tx| tx.amount)
            .collect()
    }
}

/// A transfer proposed for signing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub recipient: Address,
    pub amount: f64,
    pub balance: f64,
    #[serde(default = "default_interaction_kind")]
    pub interaction_kind: String,
}

impl TransactionRequest {
    pub fn new(recipient: &str, amount: f64, balance: f64) -> Self {
        TransactionRequest {
            recipient: recipient.to_string(),
            amount,
            balance,
            interaction_kind: DEFAULT_INTERACTION_KIND.to_string(),
        }
    }

    pub fn with_interaction_kind(mut self, kind: &str) -> Self {
        self.interaction_kind = kind.to_string();
        self
    }
}

fn default_interaction_kind() -> String {
    DEFAULT_INTERACTION_KIND.to_string()
}

/// Exactly what a verification challenge releases once it is verified
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub session_id: SessionId,
    pub recipient: Address,
    pub amount: f64,
    pub balance: f64,
    pub interaction_kind: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub elapsed_seconds: Option<f64>,
    pub captured_at: DateTime<Utc>,
}

/// Summary of a submitted transfer reported when its interaction window closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedTransfer {
    pub recipient: Address,
    pub amount: f64,
    #[serde(default)]
    pub risk_score: u8,
}

/// Display-only view of a behavior profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub session_id: SessionId,
    pub status: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub transaction_count: u64,
    pub known_addresses: usize,
    pub average_duration: f64,
    pub amount_mean: f64,
    pub amount_std_dev: f64,
    pub recent_transactions: Vec<TransactionSummary>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub amount: f64,
    pub counterparty: String,
    pub duration_seconds: f64,
    pub risk_score: u8,
    pub timestamp: DateTime<Utc>,
}

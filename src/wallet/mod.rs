// src/wallet/mod.rs - Wallet/signing SDK boundary
//
// The engine only reads balances; signing and broadcast happen after approval
// and belong to the wallet SDK behind this trait.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::WalletSettings;

pub type AccountId = String;

/// Error types for wallet SDK calls
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletClientError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentTransaction {
    pub hash: String,
    pub fee: f64,
}

#[async_trait]
pub trait WalletClient: Send + Sync {
    async fn get_balance(&self, account: &AccountId) -> Result<f64, WalletClientError>;

    async fn send_transaction(
        &self,
        account: &AccountId,
        to: &str,
        amount: f64,
    ) -> Result<SentTransaction, WalletClientError>;
}

/// Balance table for local runs and tests
pub struct StaticWalletClient {
    balances: RwLock<HashMap<AccountId, f64>>,
    network_fee: f64,
}

impl StaticWalletClient {
    pub fn new(network_fee: f64) -> Self {
        StaticWalletClient {
            balances: RwLock::new(HashMap::new()),
            network_fee,
        }
    }

    pub fn from_settings(settings: &WalletSettings) -> Self {
        let wallet = Self::new(settings.network_fee);
        for (account, balance) in &settings.balances {
            wallet.set_balance(account, *balance);
        }
        wallet
    }

    pub fn account_count(&self) -> usize {
        self.balances.read().len()
    }

    pub fn set_balance(&self, account: &str, balance: f64) {
        self.balances.write().insert(account.to_string(), balance);
    }

    fn mock_hash(account: &str, to: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("tx:{}-{}-{}", account, to, Uuid::new_v4()));
        format!("0x{}", hex::encode(hasher.finalize()))
    }
}

#[async_trait]
impl WalletClient for StaticWalletClient {
    async fn get_balance(&self, account: &AccountId) -> Result<f64, WalletClientError> {
        self.balances
            .read()
            .get(account)
            .copied()
            .ok_or_else(|| WalletClientError::AccountNotFound(account.clone()))
    }

    async fn send_transaction(
        &self,
        account: &AccountId,
        to: &str,
        amount: f64,
    ) -> Result<SentTransaction, WalletClientError> {
        let mut balances = self.balances.write();
        let balance = balances
            .get_mut(account)
            .ok_or_else(|| WalletClientError::AccountNotFound(account.clone()))?;

        let total = amount + self.network_fee;
        if total > *balance {
            return Err(WalletClientError::InsufficientBalance {
                requested: total,
                available: *balance,
            });
        }
        *balance -= total;

        Ok(SentTransaction {
            hash: Self::mock_hash(account, to),
            fee: self.network_fee,
        })
    }
}

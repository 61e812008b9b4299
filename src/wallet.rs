//! Coin wallet contract.
//!
//! The real wallet (purchases, ad rewards, daily bonuses) is an
//! external collaborator; the game server only needs balance checks,
//! entry-fee debits, and reward credits. Debits are atomic per user and
//! fail without side effects when the balance is short.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::protocol::UserId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("insufficient coins: have {balance}, need {required}")]
    InsufficientCoins { balance: u32, required: u32 },
}

#[async_trait]
pub trait CoinWallet: Send + Sync {
    async fn balance(&self, user_id: UserId) -> Result<u32>;

    /// Debit `amount`; fails with `WalletError::InsufficientCoins`
    /// (downcastable) without changing the balance.
    async fn debit(&self, user_id: UserId, amount: u32) -> Result<u32>;

    async fn credit(&self, user_id: UserId, amount: u32) -> Result<u32>;
}

/// In-memory wallet for single-process deployments and tests. Unknown
/// users start at a configurable grant so local games can charge entry
/// fees.
pub struct InMemoryWallet {
    balances: DashMap<UserId, u32>,
    starting_balance: u32,
}

impl InMemoryWallet {
    pub fn new(starting_balance: u32) -> Self {
        Self {
            balances: DashMap::new(),
            starting_balance,
        }
    }
}

#[async_trait]
impl CoinWallet for InMemoryWallet {
    async fn balance(&self, user_id: UserId) -> Result<u32> {
        Ok(*self
            .balances
            .entry(user_id)
            .or_insert(self.starting_balance))
    }

    async fn debit(&self, user_id: UserId, amount: u32) -> Result<u32> {
        let mut entry = self
            .balances
            .entry(user_id)
            .or_insert(self.starting_balance);
        let balance = *entry;
        if balance < amount {
            return Err(WalletError::InsufficientCoins {
                balance,
                required: amount,
            }
            .into());
        }
        *entry = balance - amount;
        Ok(*entry)
    }

    async fn credit(&self, user_id: UserId, amount: u32) -> Result<u32> {
        let mut entry = self
            .balances
            .entry(user_id)
            .or_insert(self.starting_balance);
        *entry += amount;
        Ok(*entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_debit_and_credit() {
        let wallet = InMemoryWallet::new(100);
        assert_eq!(wallet.balance(1).await.unwrap(), 100);
        assert_eq!(wallet.debit(1, 30).await.unwrap(), 70);
        assert_eq!(wallet.credit(1, 10).await.unwrap(), 80);
    }

    #[tokio::test]
    async fn test_debit_fails_without_side_effects() {
        let wallet = InMemoryWallet::new(10);
        let err = wallet.debit(1, 50).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<WalletError>(),
            Some(&WalletError::InsufficientCoins {
                balance: 10,
                required: 50
            })
        );
        assert_eq!(wallet.balance(1).await.unwrap(), 10);
    }
}

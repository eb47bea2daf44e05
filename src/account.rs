//! Account aggregate.
//!
//! Balances only move through [`Account::debit`] and [`Account::credit`].
//! Neither operation persists anything: the caller stages the mutated
//! account through an [`AccountStore`](crate::store::AccountStore).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;
use crate::model::AccountId;

/// Lifecycle of an account. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Active,
    Closed,
}

/// Error raised by account-level operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("amount {0} must be positive")]
    InvalidAmount(Amount),
    #[error("account {0} is not active")]
    NotActive(AccountId),
    #[error("insufficient balance in account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        requested: Amount,
    },
    #[error("balance of account {0} would overflow")]
    Overflow(AccountId),
}

/// A holder's account: balance, lifecycle status and optimistic version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    id: AccountId,
    holder_name: String,
    balance: Amount,
    status: AccountStatus,
    version: u64,
    last_updated: DateTime<Utc>,
}

impl Account {
    /// Open a new active account at version 0.
    pub fn open(
        id: impl Into<AccountId>,
        holder_name: impl Into<String>,
        initial_balance: Amount,
    ) -> Result<Self, AccountError> {
        if initial_balance.is_negative() {
            return Err(AccountError::InvalidAmount(initial_balance));
        }
        Ok(Self {
            id: id.into(),
            holder_name: holder_name.into(),
            balance: initial_balance,
            status: AccountStatus::Active,
            version: 0,
            last_updated: Utc::now(),
        })
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn holder_name(&self) -> &str {
        &self.holder_name
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    /// Version as of the last read from the store.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Withdraw `amount` from the balance.
    ///
    /// Checks, in order: amount is positive, account is active, balance covers
    /// the amount.
    pub fn debit(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.ensure_operable(amount)?;
        if self.balance < amount {
            return Err(AccountError::InsufficientBalance {
                account: self.id.clone(),
                balance: self.balance,
                requested: amount,
            });
        }
        // cannot underflow: balance >= amount > 0
        self.balance = self.balance - amount;
        Ok(())
    }

    /// Deposit `amount` into the balance.
    pub fn credit(&mut self, amount: Amount) -> Result<(), AccountError> {
        self.ensure_operable(amount)?;
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| AccountError::Overflow(self.id.clone()))?;
        Ok(())
    }

    /// Move an active account to `Closed`. There is no way back.
    pub fn close(&mut self) -> Result<(), AccountError> {
        if !self.is_active() {
            return Err(AccountError::NotActive(self.id.clone()));
        }
        self.status = AccountStatus::Closed;
        Ok(())
    }

    fn ensure_operable(&self, amount: Amount) -> Result<(), AccountError> {
        if !amount.is_positive() {
            return Err(AccountError::InvalidAmount(amount));
        }
        if !self.is_active() {
            return Err(AccountError::NotActive(self.id.clone()));
        }
        Ok(())
    }

    /// Stamp a successful store write.
    pub(crate) fn bump(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.last_updated = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i32) -> Account {
        Account::open("ACC001", "Alice", Amount::from_units(balance)).unwrap()
    }

    #[test]
    fn open_starts_active_at_version_zero() {
        let account = account(100);
        assert_eq!(account.id(), "ACC001");
        assert_eq!(account.holder_name(), "Alice");
        assert_eq!(account.balance(), Amount::from_units(100));
        assert_eq!(account.status(), AccountStatus::Active);
        assert_eq!(account.version(), 0);
    }

    #[test]
    fn open_rejects_negative_balance() {
        let result = Account::open("ACC001", "Alice", Amount::from_units(-1));
        assert!(matches!(result, Err(AccountError::InvalidAmount(_))));
    }

    #[test]
    fn debit_decreases_balance() {
        let mut account = account(100);
        account.debit(Amount::from_units(30)).unwrap();
        assert_eq!(account.balance(), Amount::from_units(70));
    }

    #[test]
    fn debit_exact_balance_leaves_zero() {
        let mut account = account(100);
        account.debit(Amount::from_units(100)).unwrap();
        assert_eq!(account.balance(), Amount::ZERO);
    }

    #[test]
    fn debit_insufficient_balance_fails() {
        let mut account = account(100);
        let result = account.debit(Amount::from_units(101));
        assert!(matches!(
            result,
            Err(AccountError::InsufficientBalance { .. })
        ));
        assert_eq!(account.balance(), Amount::from_units(100));
    }

    #[test]
    fn amount_is_checked_before_status() {
        let mut account = account(100);
        account.close().unwrap();
        assert!(matches!(
            account.debit(Amount::ZERO),
            Err(AccountError::InvalidAmount(_))
        ));
        assert!(matches!(
            account.credit(Amount::from_units(-5)),
            Err(AccountError::InvalidAmount(_))
        ));
    }

    #[test]
    fn status_is_checked_before_balance() {
        let mut account = account(10);
        account.close().unwrap();
        let result = account.debit(Amount::from_units(50));
        assert!(matches!(result, Err(AccountError::NotActive(_))));
    }

    #[test]
    fn credit_increases_balance() {
        let mut account = account(100);
        account.credit(Amount::from_units(50)).unwrap();
        assert_eq!(account.balance(), Amount::from_units(150));
    }

    #[test]
    fn credit_to_closed_account_fails() {
        let mut account = account(100);
        account.close().unwrap();
        let result = account.credit(Amount::from_units(1));
        assert!(matches!(result, Err(AccountError::NotActive(_))));
        assert_eq!(account.balance(), Amount::from_units(100));
    }

    #[test]
    fn credit_overflow_fails_without_change() {
        let mut account = Account::open("ACC001", "Alice", Amount::from_scaled(i64::MAX)).unwrap();
        let result = account.credit(Amount::from_scaled(1));
        assert!(matches!(result, Err(AccountError::Overflow(_))));
        assert_eq!(account.balance(), Amount::from_scaled(i64::MAX));
    }

    #[test]
    fn close_is_terminal() {
        let mut account = account(0);
        account.close().unwrap();
        assert_eq!(account.status(), AccountStatus::Closed);
        assert!(matches!(account.close(), Err(AccountError::NotActive(_))));
    }

    #[test]
    fn bump_advances_version_and_timestamp() {
        let mut account = account(0);
        let later = account.last_updated() + chrono::Duration::seconds(5);
        account.bump(later);
        assert_eq!(account.version(), 1);
        assert_eq!(account.last_updated(), later);
    }
}

use thiserror::Error;

use crate::model::{AccountId, TransactionId};

/// Error raised by the account and ledger stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {0} already exists")]
    AccountExists(AccountId),

    #[error("account {account} was modified concurrently: read version {expected}, stored version {found}")]
    ConcurrencyConflict {
        account: AccountId,
        expected: u64,
        found: u64,
    },

    #[error("idempotency key '{0}' already recorded")]
    DuplicateIdempotencyKey(String),

    #[error("transaction id {0} already recorded")]
    DuplicateTransactionId(TransactionId),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

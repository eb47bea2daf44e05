//! Error types for transfer processing.

use thiserror::Error;

use crate::Amount;
use crate::model::{AccountId, TransactionLog};
use crate::store::StoreError;

/// Caller-facing classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    AccountNotFound,
    AccountNotActive,
    InsufficientBalance,
    ConcurrencyConflict,
    Unexpected,
}

impl ErrorKind {
    /// Stable code for outer surfaces.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ErrorKind::AccountNotActive => "ACCOUNT_NOT_ACTIVE",
            ErrorKind::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorKind::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
            ErrorKind::Unexpected => "UNEXPECTED",
        }
    }

    /// Whether resubmitting the same request may succeed.
    pub fn is_retryable(self) -> bool {
        self == ErrorKind::ConcurrencyConflict
    }
}

/// Bad or missing input. Nothing is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount is required")]
    MissingAmount,

    #[error("amount {0} must be positive")]
    NonPositiveAmount(Amount),

    #[error("source and destination accounts cannot be the same ({0})")]
    SameAccount(AccountId),

    #[error("idempotency key is required")]
    MissingIdempotencyKey,

    #[error("opening balance {0} cannot be negative")]
    NegativeOpeningBalance(Amount),

    #[error("account {0} already exists")]
    AccountExists(AccountId),
}

/// Top-level error returned by [`Engine`](super::Engine) operations.
///
/// Variants that carry a `log` were raised after the FAILED row had been
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("sender account {0} not found")]
    SenderNotFound(AccountId),

    #[error("receiver account {0} not found")]
    ReceiverNotFound(AccountId),

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("account {0} is not active")]
    AccountNotActive(AccountId),

    #[error("insufficient balance in account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: Amount,
        requested: Amount,
        log: Box<TransactionLog>,
    },

    #[error("account {0} was modified concurrently")]
    ConcurrencyConflict(AccountId),

    #[error("unexpected failure: {reason}")]
    Unexpected {
        reason: String,
        log: Option<Box<TransactionLog>>,
    },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::SenderNotFound(_)
            | EngineError::ReceiverNotFound(_)
            | EngineError::AccountNotFound(_) => ErrorKind::AccountNotFound,
            EngineError::AccountNotActive(_) => ErrorKind::AccountNotActive,
            EngineError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            EngineError::ConcurrencyConflict(_) => ErrorKind::ConcurrencyConflict,
            EngineError::Unexpected { .. } => ErrorKind::Unexpected,
        }
    }

    /// The FAILED ledger row persisted before this error was raised, if any.
    pub fn log(&self) -> Option<&TransactionLog> {
        match self {
            EngineError::InsufficientBalance { log, .. } => Some(&**log),
            EngineError::Unexpected { log, .. } => log.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn unexpected(reason: impl ToString) -> Self {
        EngineError::Unexpected {
            reason: reason.to_string(),
            log: None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::AccountNotFound(id) => EngineError::AccountNotFound(id),
            StoreError::AccountExists(id) => ValidationError::AccountExists(id).into(),
            StoreError::ConcurrencyConflict { account, .. } => {
                EngineError::ConcurrencyConflict(account)
            }
            other => EngineError::unexpected(other),
        }
    }
}

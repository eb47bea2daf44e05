//! Durable storage seams for accounts and the transaction ledger.
//!
//! The engine never writes to either table piecemeal: every write goes through
//! a [`Batch`] handed to [`Ledger::commit`], which applies all staged writes or
//! none of them.

use crate::account::Account;
use crate::model::{TransactionId, TransactionLog};

mod error;
pub use error::StoreError;

mod memory;
pub use memory::InMemoryLedger;

/// Keyed storage for account aggregates with optimistic-version writes.
pub trait AccountStore {
    /// Load the current state of an account.
    fn get(&self, id: &str) -> Result<Account, StoreError>;

    /// Insert a new account. Fails if the id is already taken.
    fn create(&self, account: Account) -> Result<Account, StoreError>;

    /// Compare-and-swap write: succeeds only if the stored version still equals
    /// `account.version()`. Returns the account as stored, with its version
    /// incremented and `last_updated` refreshed.
    fn save(&self, account: Account) -> Result<Account, StoreError>;
}

/// Append-only storage for transfer attempts.
pub trait TransactionLogStore {
    fn find_by_id(&self, id: TransactionId) -> Result<Option<TransactionLog>, StoreError>;

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionLog>, StoreError>;

    /// Insert a new row. Never overwrites: an existing idempotency key yields
    /// [`StoreError::DuplicateIdempotencyKey`].
    fn append(&self, log: TransactionLog) -> Result<TransactionLog, StoreError>;

    /// Every row naming `account` on either side, newest first.
    fn history_for_account(&self, account: &str) -> Result<Vec<TransactionLog>, StoreError>;
}

/// Both stores behind one atomic commit boundary.
pub trait Ledger: AccountStore + TransactionLogStore {
    /// Validate every staged write, then apply all of them. On error nothing
    /// has been written.
    fn commit(&self, batch: Batch) -> Result<Committed, StoreError>;
}

/// Writes staged for a single atomic commit.
#[derive(Debug, Default)]
pub struct Batch {
    pub(crate) accounts: Vec<Account>,
    pub(crate) logs: Vec<TransactionLog>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an optimistic save of `account`.
    pub fn save(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    /// Stage a ledger append.
    pub fn append(mut self, log: TransactionLog) -> Self {
        self.logs.push(log);
        self
    }
}

/// What a successful [`Ledger::commit`] wrote, in staging order.
#[derive(Debug, Default)]
pub struct Committed {
    pub accounts: Vec<Account>,
    pub logs: Vec<TransactionLog>,
}

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use parking_lot::Mutex;

use super::{AccountStore, Batch, Committed, Ledger, StoreError, TransactionLogStore};
use crate::account::Account;
use crate::model::{AccountId, TransactionId, TransactionLog};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    /// Append order; a row's index is its insertion sequence.
    logs: Vec<TransactionLog>,
    by_key: HashMap<String, usize>,
    by_id: HashMap<TransactionId, usize>,
}

impl Tables {
    fn validate(&self, batch: &Batch) -> Result<(), StoreError> {
        // version each account will have once earlier writes in the batch land
        let mut versions: HashMap<&str, u64> = HashMap::new();
        for account in &batch.accounts {
            let id = account.id().as_str();
            let found = match versions.get(id) {
                Some(version) => *version,
                None => self
                    .accounts
                    .get(id)
                    .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))?
                    .version(),
            };
            if found != account.version() {
                return Err(StoreError::ConcurrencyConflict {
                    account: id.to_string(),
                    expected: account.version(),
                    found,
                });
            }
            versions.insert(id, found + 1);
        }

        let mut keys = HashSet::new();
        let mut ids = HashSet::new();
        for log in &batch.logs {
            let key = log.idempotency_key();
            if self.by_key.contains_key(key) || !keys.insert(key) {
                return Err(StoreError::DuplicateIdempotencyKey(key.to_string()));
            }
            if self.by_id.contains_key(&log.id()) || !ids.insert(log.id()) {
                return Err(StoreError::DuplicateTransactionId(log.id()));
            }
        }
        Ok(())
    }

    fn apply(&mut self, batch: Batch) -> Committed {
        let now = Utc::now();
        let mut committed = Committed::default();

        for mut account in batch.accounts {
            account.bump(now);
            self.accounts.insert(account.id().clone(), account.clone());
            committed.accounts.push(account);
        }
        for log in batch.logs {
            let seq = self.logs.len();
            self.by_key.insert(log.idempotency_key().to_string(), seq);
            self.by_id.insert(log.id(), seq);
            self.logs.push(log.clone());
            committed.logs.push(log);
        }
        committed
    }
}

/// Thread-safe in-memory [`Ledger`].
///
/// Both tables sit behind one mutex, so a commit is atomic with respect to
/// every other read and write.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    tables: Mutex<Tables>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every account, ordered by id.
    pub fn accounts(&self) -> Vec<Account> {
        let tables = self.tables.lock();
        let mut accounts: Vec<_> = tables.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.id().cmp(b.id()));
        accounts
    }

    /// Every ledger row in append order.
    pub fn logs(&self) -> Vec<TransactionLog> {
        self.tables.lock().logs.clone()
    }
}

impl AccountStore for InMemoryLedger {
    fn get(&self, id: &str) -> Result<Account, StoreError> {
        self.tables
            .lock()
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.to_string()))
    }

    fn create(&self, account: Account) -> Result<Account, StoreError> {
        let mut tables = self.tables.lock();
        if tables.accounts.contains_key(account.id()) {
            return Err(StoreError::AccountExists(account.id().clone()));
        }
        tables.accounts.insert(account.id().clone(), account.clone());
        Ok(account)
    }

    fn save(&self, account: Account) -> Result<Account, StoreError> {
        let mut committed = self.commit(Batch::new().save(account))?;
        committed
            .accounts
            .pop()
            .ok_or_else(|| StoreError::Unavailable("save committed no account".into()))
    }
}

impl TransactionLogStore for InMemoryLedger {
    fn find_by_id(&self, id: TransactionId) -> Result<Option<TransactionLog>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.by_id.get(&id).map(|&seq| tables.logs[seq].clone()))
    }

    fn find_by_idempotency_key(&self, key: &str) -> Result<Option<TransactionLog>, StoreError> {
        let tables = self.tables.lock();
        Ok(tables.by_key.get(key).map(|&seq| tables.logs[seq].clone()))
    }

    fn append(&self, log: TransactionLog) -> Result<TransactionLog, StoreError> {
        let mut committed = self.commit(Batch::new().append(log))?;
        committed
            .logs
            .pop()
            .ok_or_else(|| StoreError::Unavailable("append committed no row".into()))
    }

    fn history_for_account(&self, account: &str) -> Result<Vec<TransactionLog>, StoreError> {
        let tables = self.tables.lock();
        // newest insertion first, then a stable sort keeps that order for ties
        let mut history: Vec<_> = tables
            .logs
            .iter()
            .rev()
            .filter(|log| log.involves(account))
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_on().cmp(&a.created_on()));
        Ok(history)
    }
}

impl Ledger for InMemoryLedger {
    fn commit(&self, batch: Batch) -> Result<Committed, StoreError> {
        let mut tables = self.tables.lock();
        tables.validate(&batch)?;
        Ok(tables.apply(batch))
    }
}

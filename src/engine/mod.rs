//! Transfer engine.
//!
//! Moves funds between two accounts with idempotency-key deduplication and
//! optimistic concurrency on account state. Every attempt that passes
//! validation and finds both accounts leaves exactly one row in the ledger;
//! account writes and that row are committed together.
//! Also supports an async stream of transfer requests.

use tokio_stream::{Stream, StreamExt};
use tracing::field;
use tracing::{error, info, warn};

use crate::Amount;
use crate::account::{Account, AccountError};
use crate::model::{AccountId, TransactionId, TransactionLog, TransferRequest};
use crate::store::{Batch, InMemoryLedger, Ledger, StoreError};

mod error;
pub use error::{EngineError, ErrorKind, ValidationError};

const INSUFFICIENT_BALANCE: &str = "Insufficient balance";

/// Outcome counts of an [`Engine::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Requests that returned a SUCCESS row (new or replayed).
    pub succeeded: usize,
    /// Requests that ended with a FAILED row.
    pub failed: usize,
    /// Requests refused before anything was written.
    pub rejected: usize,
}

/// One movement of funds. Transfers have both sides, deposits have no source
/// and withdrawals no destination.
struct Movement<'a> {
    op: &'static str,
    from: Option<&'a str>,
    to: Option<&'a str>,
    amount: Option<Amount>,
    key: &'a str,
    remarks: Option<&'a str>,
}

impl Movement<'_> {
    fn success_log(&self, amount: Amount) -> TransactionLog {
        TransactionLog::success(
            self.from.map(Into::into),
            self.to.map(Into::into),
            amount,
            self.key,
            self.remarks.map(Into::into),
        )
    }

    fn failed_log(&self, amount: Amount, reason: &str) -> TransactionLog {
        TransactionLog::failed(
            self.from.map(Into::into),
            self.to.map(Into::into),
            amount,
            self.key,
            self.remarks.map(Into::into),
            reason,
        )
    }
}

/// Result of committing a batch that carries a ledger row.
enum Recorded {
    New(TransactionLog),
    /// Another writer committed the same idempotency key first.
    Existing(TransactionLog),
}

/// The transfer engine.
///
/// Holds no account state of its own: every operation re-reads the ledger it
/// was constructed with.
pub struct Engine<L = InMemoryLedger> {
    ledger: L,
}

/// Public API
impl<L: Ledger> Engine<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Run the engine over a stream of transfer requests.
    pub async fn run(&self, mut stream: impl Stream<Item = TransferRequest> + Unpin) -> RunSummary {
        let mut summary = RunSummary::default();
        while let Some(request) = stream.next().await {
            // a failed transfer must not stop the run; it is already logged
            match self.transfer(&request) {
                Ok(log) if log.is_success() => summary.succeeded += 1,
                Ok(_) => summary.failed += 1,
                Err(e) if e.log().is_some() => summary.failed += 1,
                Err(_) => summary.rejected += 1,
            }
        }
        summary
    }

    /// Move `amount` from one account to another.
    ///
    /// A request whose idempotency key is already in the ledger returns the
    /// recorded row unchanged, without re-executing. Failures found after both
    /// accounts were loaded and checked are recorded as a FAILED row before
    /// the error is returned.
    pub fn transfer(&self, request: &TransferRequest) -> Result<TransactionLog, EngineError> {
        self.execute(&Movement {
            op: "transfer",
            from: Some(request.from_account_id.as_str()),
            to: Some(request.to_account_id.as_str()),
            amount: request.amount,
            key: &request.idempotency_key,
            remarks: request.remarks.as_deref(),
        })
    }

    /// Credit an account from outside the system.
    pub fn deposit(
        &self,
        account: &str,
        amount: Amount,
        idempotency_key: &str,
        remarks: Option<&str>,
    ) -> Result<TransactionLog, EngineError> {
        self.execute(&Movement {
            op: "deposit",
            from: None,
            to: Some(account),
            amount: Some(amount),
            key: idempotency_key,
            remarks,
        })
    }

    /// Debit an account to outside the system.
    pub fn withdraw(
        &self,
        account: &str,
        amount: Amount,
        idempotency_key: &str,
        remarks: Option<&str>,
    ) -> Result<TransactionLog, EngineError> {
        self.execute(&Movement {
            op: "withdrawal",
            from: Some(account),
            to: None,
            amount: Some(amount),
            key: idempotency_key,
            remarks,
        })
    }

    pub fn open_account(
        &self,
        id: &str,
        holder_name: &str,
        initial_balance: Amount,
    ) -> Result<Account, EngineError> {
        let account = Account::open(id, holder_name, initial_balance).map_err(|e| match e {
            AccountError::InvalidAmount(amount) => {
                ValidationError::NegativeOpeningBalance(amount).into()
            }
            other => EngineError::unexpected(other),
        })?;
        let account = self.ledger.create(account)?;
        info!(account = id, balance = %initial_balance, "account opened");
        Ok(account)
    }

    /// Close an account for good.
    pub fn close_account(&self, id: &str) -> Result<Account, EngineError> {
        let mut account = self.ledger.get(id)?;
        account
            .close()
            .map_err(|_| EngineError::AccountNotActive(id.to_string()))?;
        let account = self.ledger.save(account)?;
        info!(account = id, "account closed");
        Ok(account)
    }

    pub fn account(&self, id: &str) -> Result<Account, EngineError> {
        Ok(self.ledger.get(id)?)
    }

    /// Ledger rows naming `account` on either side, newest first.
    pub fn history(&self, account: &str) -> Result<Vec<TransactionLog>, EngineError> {
        Ok(self.ledger.history_for_account(account)?)
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Option<TransactionLog>, EngineError> {
        Ok(self.ledger.find_by_id(id)?)
    }
}

/// Private API
impl<L: Ledger> Engine<L> {
    fn execute(&self, movement: &Movement<'_>) -> Result<TransactionLog, EngineError> {
        let result = self.apply(movement);
        Self::log_result(movement, &result);
        result
    }

    /// Small helper to log `execute` results
    fn log_result(movement: &Movement<'_>, result: &Result<TransactionLog, EngineError>) {
        let amount = movement.amount.map(field::display);
        match result {
            Ok(log) => {
                info!(
                    from = movement.from,
                    to = movement.to,
                    amount,
                    key = movement.key,
                    tx = %log.id(),
                    status = ?log.status(),
                    "{} completed",
                    movement.op
                );
            }
            Err(e) => {
                let outcome = if e.log().is_some() { "failed" } else { "rejected" };
                warn!(
                    from = movement.from,
                    to = movement.to,
                    amount,
                    key = movement.key,
                    kind = e.kind().code(),
                    reason = %e,
                    "{} {outcome}",
                    movement.op
                );
            }
        }
    }

    /// Apply a movement:
    /// - Validate the request (no ledger row on failure)
    /// - Return the recorded row if the idempotency key was seen before
    /// - Load both sides, ensure they are active (no ledger row on failure)
    /// - Record a FAILED row if the source cannot cover the amount
    /// - Commit debit, credit and the SUCCESS row together
    fn apply(&self, movement: &Movement<'_>) -> Result<TransactionLog, EngineError> {
        let amount = Self::validate(movement)?;

        if let Some(existing) = self.ledger.find_by_idempotency_key(movement.key)? {
            info!(
                key = movement.key,
                tx = %existing.id(),
                status = ?existing.status(),
                "duplicate {} request, returning recorded result",
                movement.op
            );
            return Ok(existing);
        }

        let from = movement
            .from
            .map(|id| self.load(id, EngineError::SenderNotFound))
            .transpose()?;
        let to = movement
            .to
            .map(|id| self.load(id, EngineError::ReceiverNotFound))
            .transpose()?;

        for account in from.iter().chain(to.iter()) {
            if !account.is_active() {
                return Err(EngineError::AccountNotActive(account.id().clone()));
            }
        }

        if let Some(sender) = &from {
            if sender.balance() < amount {
                return self.reject_insufficient(movement, amount, sender);
            }
        }

        match self.move_funds(movement, amount, from, to) {
            Err(EngineError::Unexpected { reason, .. }) => self.fail(movement, amount, reason),
            other => other,
        }
    }

    fn validate(movement: &Movement<'_>) -> Result<Amount, ValidationError> {
        let amount = movement.amount.ok_or(ValidationError::MissingAmount)?;
        if !amount.is_positive() {
            return Err(ValidationError::NonPositiveAmount(amount));
        }
        if let (Some(from), Some(to)) = (movement.from, movement.to) {
            if from == to {
                return Err(ValidationError::SameAccount(from.to_string()));
            }
        }
        if movement.key.trim().is_empty() {
            return Err(ValidationError::MissingIdempotencyKey);
        }
        Ok(amount)
    }

    fn load(
        &self,
        id: &str,
        not_found: fn(AccountId) -> EngineError,
    ) -> Result<Account, EngineError> {
        match self.ledger.get(id) {
            Ok(account) => Ok(account),
            Err(StoreError::AccountNotFound(id)) => Err(not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    fn reject_insufficient(
        &self,
        movement: &Movement<'_>,
        amount: Amount,
        sender: &Account,
    ) -> Result<TransactionLog, EngineError> {
        let row = movement.failed_log(amount, INSUFFICIENT_BALANCE);
        match self.record(Batch::new().append(row), movement.key) {
            Ok(Recorded::New(log)) => Err(EngineError::InsufficientBalance {
                account: sender.id().clone(),
                balance: sender.balance(),
                requested: amount,
                log: Box::new(log),
            }),
            Ok(Recorded::Existing(log)) => Ok(log),
            Err(e) => {
                error!(key = movement.key, error = %e, "could not record failed attempt");
                Err(EngineError::unexpected(e))
            }
        }
    }

    /// Debit, credit and append the SUCCESS row as one commit.
    ///
    /// Any error other than a concurrency conflict comes back as
    /// [`EngineError::Unexpected`] without a ledger row.
    fn move_funds(
        &self,
        movement: &Movement<'_>,
        amount: Amount,
        from: Option<Account>,
        to: Option<Account>,
    ) -> Result<TransactionLog, EngineError> {
        let mut batch = Batch::new();
        if let Some(mut sender) = from {
            sender.debit(amount).map_err(EngineError::unexpected)?;
            batch = batch.save(sender);
        }
        if let Some(mut receiver) = to {
            receiver.credit(amount).map_err(EngineError::unexpected)?;
            batch = batch.save(receiver);
        }

        match self.record(batch.append(movement.success_log(amount)), movement.key) {
            Ok(Recorded::New(log)) => Ok(log),
            Ok(Recorded::Existing(log)) => {
                info!(
                    key = movement.key,
                    tx = %log.id(),
                    "concurrent {} with the same key committed first",
                    movement.op
                );
                Ok(log)
            }
            Err(StoreError::ConcurrencyConflict { account, .. }) => {
                Err(EngineError::ConcurrencyConflict(account))
            }
            Err(e) => Err(EngineError::unexpected(e)),
        }
    }

    /// Record a FAILED row for an unexpected failure, then raise it.
    fn fail(
        &self,
        movement: &Movement<'_>,
        amount: Amount,
        reason: String,
    ) -> Result<TransactionLog, EngineError> {
        error!(
            key = movement.key,
            reason = %reason,
            "unexpected {} failure, recording failed attempt",
            movement.op
        );
        let row = movement.failed_log(amount, &reason);
        match self.record(Batch::new().append(row), movement.key) {
            Ok(Recorded::New(log)) => Err(EngineError::Unexpected {
                reason,
                log: Some(Box::new(log)),
            }),
            Ok(Recorded::Existing(log)) => Ok(log),
            Err(e) => {
                error!(key = movement.key, error = %e, "could not record failed attempt");
                Err(EngineError::Unexpected { reason, log: None })
            }
        }
    }

    /// Commit a batch ending in a ledger row. A duplicate idempotency key
    /// resolves to the row that won.
    fn record(&self, batch: Batch, key: &str) -> Result<Recorded, StoreError> {
        match self.ledger.commit(batch) {
            Ok(mut committed) => committed
                .logs
                .pop()
                .map(Recorded::New)
                .ok_or_else(|| StoreError::Unavailable("commit returned no ledger row".into())),
            Err(StoreError::DuplicateIdempotencyKey(dup)) => {
                match self.ledger.find_by_idempotency_key(key)? {
                    Some(log) => Ok(Recorded::Existing(log)),
                    None => Err(StoreError::DuplicateIdempotencyKey(dup)),
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(InMemoryLedger::new())
    }
}

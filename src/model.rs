//! Core domain types for the transfer engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Amount;

/// Opaque account identifier.
pub type AccountId = String;

/// Transaction log identifier.
pub type TransactionId = Uuid;

/// Outcome recorded on a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Success,
    Failed,
}

/// One row of the append-only ledger.
///
/// Rows are only built through [`TransactionLog::success`] and
/// [`TransactionLog::failed`], so `failure_reason` is present exactly when the
/// status is `Failed`. A row is never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionLog {
    id: TransactionId,
    from_account_id: Option<AccountId>,
    to_account_id: Option<AccountId>,
    amount: Amount,
    status: TransferStatus,
    failure_reason: Option<String>,
    idempotency_key: String,
    created_on: DateTime<Utc>,
    remarks: Option<String>,
}

impl TransactionLog {
    pub fn success(
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: Amount,
        idempotency_key: impl Into<String>,
        remarks: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_account_id: from,
            to_account_id: to,
            amount,
            status: TransferStatus::Success,
            failure_reason: None,
            idempotency_key: idempotency_key.into(),
            created_on: Utc::now(),
            remarks,
        }
    }

    /// A failed attempt. The reason is appended to the caller's remarks.
    pub fn failed(
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: Amount,
        idempotency_key: impl Into<String>,
        remarks: Option<String>,
        reason: impl Into<String>,
    ) -> Self {
        let reason = reason.into();
        let remarks = match remarks.as_deref() {
            Some(r) if !r.is_empty() => format!("{r} | Error: {reason}"),
            _ => format!("Error: {reason}"),
        };
        Self {
            id: Uuid::new_v4(),
            from_account_id: from,
            to_account_id: to,
            amount,
            status: TransferStatus::Failed,
            failure_reason: Some(reason),
            idempotency_key: idempotency_key.into(),
            created_on: Utc::now(),
            remarks: Some(remarks),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn from_account_id(&self) -> Option<&str> {
        self.from_account_id.as_deref()
    }

    pub fn to_account_id(&self) -> Option<&str> {
        self.to_account_id.as_deref()
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn status(&self) -> TransferStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }

    /// Whether `account` is on either side of this row.
    pub fn involves(&self, account: &str) -> bool {
        self.from_account_id() == Some(account) || self.to_account_id() == Some(account)
    }

    #[cfg(test)]
    pub(crate) fn created_at(mut self, created_on: DateTime<Utc>) -> Self {
        self.created_on = created_on;
        self
    }
}

/// Inbound transfer request.
///
/// `amount` is optional so that a missing amount can be rejected by the engine
/// rather than by whatever parsed the request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferRequest {
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Option<Amount>,
    pub idempotency_key: String,
    pub remarks: Option<String>,
}

impl TransferRequest {
    pub fn new(
        from: impl Into<AccountId>,
        to: impl Into<AccountId>,
        amount: Amount,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            from_account_id: from.into(),
            to_account_id: to.into(),
            amount: Some(amount),
            idempotency_key: idempotency_key.into(),
            remarks: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_no_failure_reason() {
        let log = TransactionLog::success(
            Some("A".into()),
            Some("B".into()),
            Amount::from_units(10),
            "k1",
            Some("rent".into()),
        );
        assert!(log.is_success());
        assert_eq!(log.failure_reason(), None);
        assert_eq!(log.remarks(), Some("rent"));
        assert_eq!(log.idempotency_key(), "k1");
    }

    #[test]
    fn failed_records_reason_in_remarks() {
        let log = TransactionLog::failed(
            Some("A".into()),
            Some("B".into()),
            Amount::from_units(10),
            "k1",
            Some("rent".into()),
            "Insufficient balance",
        );
        assert_eq!(log.status(), TransferStatus::Failed);
        assert_eq!(log.failure_reason(), Some("Insufficient balance"));
        assert_eq!(log.remarks(), Some("rent | Error: Insufficient balance"));
    }

    #[test]
    fn failed_without_remarks() {
        let log = TransactionLog::failed(None, Some("B".into()), Amount::from_units(1), "k", None, "boom");
        assert_eq!(log.remarks(), Some("Error: boom"));

        let log = TransactionLog::failed(None, Some("B".into()), Amount::from_units(1), "k", Some(String::new()), "boom");
        assert_eq!(log.remarks(), Some("Error: boom"));
    }

    #[test]
    fn involves_either_side() {
        let log = TransactionLog::success(Some("A".into()), None, Amount::from_units(1), "k", None);
        assert!(log.involves("A"));
        assert!(!log.involves("B"));
    }

    #[test]
    fn ids_are_unique() {
        let a = TransactionLog::success(None, Some("A".into()), Amount::from_units(1), "k1", None);
        let b = TransactionLog::success(None, Some("A".into()), Amount::from_units(1), "k2", None);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn status_serializes_uppercase() {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
        writer.serialize([TransferStatus::Success, TransferStatus::Failed]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "SUCCESS,FAILED\n");
    }
}

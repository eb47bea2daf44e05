use serde::Deserialize;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::account::{Account, AccountError, AccountStatus};
use crate::{AccountId, Amount, TransactionLog, TransferRequest};

/// Errors that can occur when reading or writing csv files
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("cannot open {path}: {source}")]
    Open { path: String, source: csv::Error },

    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: invalid account: {source}")]
    InvalidAccount { line: usize, source: AccountError },

    #[error("failed to write csv: {0}")]
    Write(#[from] csv::Error),

    #[error("failed to flush output: {0}")]
    Flush(#[from] io::Error),
}

#[derive(Debug, Deserialize)]
struct AccountRow {
    id: AccountId,
    // snapshots written by `write_accounts` read back as input
    #[serde(alias = "holder_name")]
    holder: String,
    balance: Amount,
    #[serde(default)]
    status: AccountStatus,
}

#[derive(Debug, Deserialize)]
struct TransferRow {
    from: AccountId,
    to: AccountId,
    amount: Option<Amount>,
    key: String,
    remarks: Option<String>,
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, CsvError> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| CsvError::Open {
            path: path.display().to_string(),
            source,
        })
}

/// Read opening account snapshots (`id,holder,balance,status`) from a csv file
pub fn read_accounts(
    path: &Path,
) -> Result<impl Iterator<Item = Result<Account, CsvError>> + use<>, CsvError> {
    let reader = reader(path)?;

    Ok(reader
        .into_deserialize::<AccountRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let invalid = |source| CsvError::InvalidAccount { line, source };

            let mut account = Account::open(row.id, row.holder, row.balance).map_err(invalid)?;
            if row.status == AccountStatus::Closed {
                account.close().map_err(invalid)?;
            }
            Ok(account)
        }))
}

/// Read transfer requests (`from,to,amount,key,remarks`) from a csv file
///
/// The iterator owns the open file and does not borrow `path`.
pub fn read_transfers(
    path: &Path,
) -> Result<impl Iterator<Item = Result<TransferRequest, CsvError>> + use<>, CsvError> {
    let reader = reader(path)?;

    Ok(reader
        .into_deserialize::<TransferRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2;
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            Ok(TransferRequest {
                from_account_id: row.from,
                to_account_id: row.to,
                amount: row.amount,
                idempotency_key: row.key,
                remarks: row.remarks,
            })
        }))
}

/// Write account snapshots in csv format
pub fn write_accounts<'a>(
    writer: impl io::Write,
    accounts: impl IntoIterator<Item = &'a Account>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);
    for account in accounts {
        writer.serialize(account)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write ledger rows in csv format
pub fn write_logs<'a>(
    writer: impl io::Write,
    logs: impl IntoIterator<Item = &'a TransactionLog>,
) -> Result<(), CsvError> {
    let mut writer = csv::Writer::from_writer(writer);
    for log in logs {
        writer.serialize(log)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn read_account() {
        let file = write_csv("id,holder,balance,status\nACC001,Alice,5000.00,active\n");
        let accounts: Vec<_> = read_accounts(file.path()).unwrap().collect();
        assert_eq!(accounts.len(), 1);

        let account = accounts.into_iter().next().unwrap().unwrap();
        assert_eq!(account.id(), "ACC001");
        assert_eq!(account.holder_name(), "Alice");
        assert_eq!(account.balance(), Amount::from_units(5000));
        assert_eq!(account.status(), AccountStatus::Active);
    }

    #[test]
    fn read_closed_account() {
        let file = write_csv("id,holder,balance,status\nACC004,Diana,0,closed\n");
        let account = read_accounts(file.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(account.status(), AccountStatus::Closed);
    }

    #[test]
    fn read_account_rejects_negative_balance() {
        let file = write_csv("id,holder,balance,status\nACC001,Alice,-1,active\n");
        let result = read_accounts(file.path()).unwrap().next().unwrap();
        assert!(matches!(result, Err(CsvError::InvalidAccount { line: 2, .. })));
    }

    #[test]
    fn read_transfer_with_whitespace() {
        let file = write_csv("from, to, amount, key, remarks\nA, B, 10.5, k1, rent\n");
        let request = read_transfers(file.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(
            request,
            TransferRequest::new("A", "B", "10.5".parse().unwrap(), "k1").with_remarks("rent")
        );
    }

    #[test]
    fn read_transfer_with_missing_amount_and_remarks() {
        let file = write_csv("from,to,amount,key,remarks\nA,B,,k1,\n");
        let request = read_transfers(file.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(request.amount, None);
        assert_eq!(request.remarks, None);
    }

    #[test]
    fn read_returns_error_for_bad_amount() {
        let file = write_csv("from,to,amount,key,remarks\nA,B,ten,k1,\nA,B,1.23456,k2,\n");
        let results: Vec<_> = read_transfers(file.path()).unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(CsvError::Parse { line: 2, .. })));
        assert!(matches!(results[1], Err(CsvError::Parse { line: 3, .. })));
    }

    #[test]
    fn open_missing_file_fails() {
        let result = read_transfers(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(CsvError::Open { .. })));
    }

    #[test]
    fn write_accounts_formats_balances() {
        let account = Account::open("A", "Alice", Amount::from_units(900)).unwrap();
        let mut out = Vec::new();
        write_accounts(&mut out, [&account]).unwrap();

        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,holder_name,balance,status,version,last_updated")
        );
        assert!(lines.next().unwrap().starts_with("A,Alice,900.0000,active,0,"));
    }

    #[test]
    fn written_accounts_read_back() {
        let mut closed = Account::open("B", "Bob", Amount::from_scaled(15)).unwrap();
        closed.close().unwrap();
        let accounts = [
            Account::open("A", "Alice", Amount::from_units(900)).unwrap(),
            closed,
        ];

        let mut file = NamedTempFile::new().unwrap();
        write_accounts(&mut file, &accounts).unwrap();

        let read: Vec<_> = read_accounts(file.path())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(read.len(), 2);
        for (read, written) in read.iter().zip(&accounts) {
            assert_eq!(read.id(), written.id());
            assert_eq!(read.holder_name(), written.holder_name());
            assert_eq!(read.balance(), written.balance());
            assert_eq!(read.status(), written.status());
        }
    }

    #[test]
    fn transfer_reader_outlives_its_path() {
        let file = write_csv("from,to,amount,key,remarks\nA,B,1,k1,\nB,A,2,k2,\n");
        let transfers = {
            let path = file.path().to_path_buf();
            read_transfers(&path).unwrap()
        };

        let handle = std::thread::spawn(move || transfers.filter(Result::is_ok).count());
        assert_eq!(handle.join().unwrap(), 2);
    }

    #[test]
    fn write_logs_formats_rows() {
        let log = TransactionLog::failed(
            Some("A".into()),
            Some("B".into()),
            Amount::from_units(5),
            "k1",
            None,
            "Insufficient balance",
        );
        let mut out = Vec::new();
        write_logs(&mut out, [&log]).unwrap();

        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,from_account_id,to_account_id,amount,status,failure_reason,idempotency_key,created_on,remarks")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with(&format!("{},A,B,5.0000,FAILED,Insufficient balance,k1,", log.id())));
        assert!(row.ends_with(",Error: Insufficient balance"));
    }
}

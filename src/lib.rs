pub mod account;
pub mod amount;
pub mod csv;
pub mod engine;
pub mod model;
pub mod store;

pub use account::{Account, AccountStatus};
pub use amount::Amount;
pub use engine::{Engine, EngineError, ErrorKind};
pub use model::{AccountId, TransactionId, TransactionLog, TransferRequest, TransferStatus};
pub use store::{InMemoryLedger, Ledger};

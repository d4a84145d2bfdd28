use crate::gateway::GatewayError;
use payroll_commons::CallerKind;
use rust_decimal::Decimal;
use thiserror::Error;
use xahau_client::LedgerError;

/// The typed failures public engine operations can return.
///
/// Every variant maps to a stable machine-readable kind at the HTTP
/// boundary; see `AppError` in the crate root.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0}")]
    InvalidParameters(String),
    #[error("worker wallet {0} is not activated on the ledger")]
    DestinationInactive(String),
    /// Soft refusal: closing now would abandon earned wages. Retry with
    /// `force_close` to proceed anyway.
    #[error("{unpaid_balance} in earned wages is still unclaimed")]
    UnclaimedBalance {
        unpaid_balance: Decimal,
        caller_kind: CallerKind,
    },
    #[error("could not resolve a channel id for create transaction {tx_hash}")]
    ChannelIdUnresolved { tx_hash: String },
    #[error("transaction {tx_hash} has not been validated by the ledger")]
    TransactionNotFinal { tx_hash: String },
    #[error("transaction failed on the ledger with {code}")]
    TransactionFailed { code: String },
    #[error("channel ledger entry in unexpected state: {0}")]
    ChannelStateUnexpected(String),
    #[error("no channel with id {0}")]
    NoSuchChannel(i32),
    #[error("no work session with id {0}")]
    NoSuchSession(i32),
    /// A write would have broken one of the documented invariants. Treated
    /// as a bug: logged with full context and never auto-corrected.
    #[error("invariant {0} violated")]
    InvariantViolation(&'static str),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<diesel::result::Error> for LifecycleError {
    fn from(e: diesel::result::Error) -> Self {
        LifecycleError::Storage(anyhow::Error::new(e))
    }
}

impl From<diesel::r2d2::PoolError> for LifecycleError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        LifecycleError::Storage(anyhow::Error::new(e))
    }
}

impl From<tokio::task::JoinError> for LifecycleError {
    fn from(e: tokio::task::JoinError) -> Self {
        LifecycleError::Storage(anyhow::Error::new(e))
    }
}

use loom_core::SettlementError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Result alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Error type surfaced by ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("insufficient stock for {fabric}: requested {requested}, available {available}")]
    InsufficientStock {
        fabric: String,
        requested: Decimal,
        available: Decimal,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("invalid ledger state: {0}")]
    InvalidState(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl LedgerError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<i64>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// `true` for errors caused by caller input rather than storage.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InsufficientStock { .. }
                | Self::NotFound { .. }
                | Self::Integrity(_)
        )
    }
}

impl From<SettlementError> for LedgerError {
    fn from(value: SettlementError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(value: std::io::Error) -> Self {
        Self::Storage(value.to_string())
    }
}

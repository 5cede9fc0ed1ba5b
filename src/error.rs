use miette::Diagnostic;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BillingError>;

/// Coarse classification of a [`BillingError`], suitable for mapping onto
/// transport-level statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AlreadyExists,
    NotFound,
    AlreadyClosed,
    NoOutstandingBalance,
    InvalidAmount,
    Persistence,
}

#[derive(Error, Diagnostic, Debug)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    #[diagnostic(code(billing::validation))]
    ValidationError(String),

    #[error("Loan {0} already exists")]
    #[diagnostic(code(billing::already_exists))]
    AlreadyExists(String),

    #[error("Loan {0} not found")]
    #[diagnostic(code(billing::not_found))]
    NotFound(String),

    #[error("Loan {0} is not active")]
    #[diagnostic(code(billing::already_closed))]
    AlreadyClosed(String),

    #[error("Loan {0} has no outstanding balance")]
    #[diagnostic(code(billing::no_outstanding_balance))]
    NoOutstandingBalance(String),

    #[error("Invalid payment amount {amount}: {reason}")]
    #[diagnostic(
        code(billing::invalid_amount),
        help("payments must match the installment amount exactly")
    )]
    InvalidAmount { amount: Decimal, reason: String },

    #[error("Persistence error: {0}")]
    #[diagnostic(code(billing::persistence))]
    PersistenceError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(billing::config))]
    ConfigError(String),

    #[error("CSV error: {0}")]
    #[diagnostic(code(billing::csv))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(billing::io))]
    IoError(#[from] std::io::Error),
}

impl BillingError {
    /// Wraps a storage-level failure.
    pub fn persistence<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::PersistenceError(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) | Self::ConfigError(_) | Self::CsvError(_) => {
                ErrorKind::Validation
            }
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyClosed(_) => ErrorKind::AlreadyClosed,
            Self::NoOutstandingBalance(_) => ErrorKind::NoOutstandingBalance,
            Self::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            Self::PersistenceError(_) | Self::IoError(_) => ErrorKind::Persistence,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for BillingError {
    fn from(err: rocksdb::Error) -> Self {
        Self::persistence(err)
    }
}

impl From<serde_json::Error> for BillingError {
    fn from(err: serde_json::Error) -> Self {
        Self::persistence(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BillingError::NotFound("L1".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BillingError::InvalidAmount {
                amount: dec!(1),
                reason: "expected 2".into()
            }
            .kind(),
            ErrorKind::InvalidAmount
        );
        assert_eq!(
            BillingError::persistence("disk full").kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_diagnostic_codes() {
        let err = BillingError::AlreadyClosed("L1".into());
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("billing::already_closed"));
        assert_eq!(err.to_string(), "Loan L1 is not active");
    }
}

use thiserror::Error;

use crate::decimal::Money;
use crate::types::{ClientId, InstallmentId, LoanId, LoanStatus};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("invalid loan parameters: {message}")]
    InvalidLoanParameters {
        message: String,
    },

    #[error("client not found: {id}")]
    ClientNotFound {
        id: ClientId,
    },

    #[error("client is not active: {id}")]
    ClientInactive {
        id: ClientId,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("loan is closed: current status is {status:?}")]
    LoanClosed {
        status: LoanStatus,
    },

    #[error("installment {number} not found for loan {loan_id}")]
    InstallmentNotFound {
        loan_id: LoanId,
        number: u32,
    },

    #[error("installment not found: {id}")]
    InstallmentIdNotFound {
        id: InstallmentId,
    },

    #[error("installment {number} of loan {loan_id} is already paid")]
    AlreadyPaid {
        loan_id: LoanId,
        number: u32,
    },

    #[error("installment {id} is paid and can no longer be modified")]
    InstallmentAlreadyPaid {
        id: InstallmentId,
    },

    #[error("invalid installment update: {message}")]
    InvalidInstallmentUpdate {
        message: String,
    },

    #[error("invalid payment amount: {amount}")]
    InvalidPaymentAmount {
        amount: Money,
    },

    #[error("invalid client: {message}")]
    InvalidClient {
        message: String,
    },

    #[error("a client with this {field} already exists")]
    DuplicateClient {
        field: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("persistence failure: {message}")]
    PersistenceFailure {
        message: String,
    },
}

impl LedgerError {
    pub(crate) fn invalid_params(message: impl Into<String>) -> Self {
        LedgerError::InvalidLoanParameters {
            message: message.into(),
        }
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        LedgerError::PersistenceFailure {
            message: message.into(),
        }
    }

    /// caller errors are surfaced as-is; everything else is a backend failure
    pub fn is_caller_error(&self) -> bool {
        !matches!(
            self,
            LedgerError::PersistenceFailure { .. } | LedgerError::InvalidConfiguration { .. }
        )
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::persistence(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::InvalidConfiguration {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

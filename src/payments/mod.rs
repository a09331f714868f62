pub mod amortization;
pub mod summary;

use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::LoanId;

pub use amortization::{generate_installments, loan_due_date, AmortizationCalculator, LoanQuote};
pub use summary::PaymentSummary;

/// payment against one installment of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub loan_id: LoanId,
    pub installment_number: u32,
    /// caller supplied, not checked against the installment amount
    pub amount: Money,
}

impl PaymentRequest {
    pub fn new(loan_id: LoanId, installment_number: u32, amount: Money) -> Self {
        Self {
            loan_id,
            installment_number,
            amount,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_positive() {
            return Err(LedgerError::InvalidPaymentAmount { amount: self.amount });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_payment_amount_must_be_positive() {
        let loan_id = Uuid::new_v4();
        assert!(PaymentRequest::new(loan_id, 1, Money::from_major(10)).validate().is_ok());

        for amount in [Money::ZERO, Money::from_major(-10)] {
            let err = PaymentRequest::new(loan_id, 1, amount).validate().unwrap_err();
            assert!(matches!(err, LedgerError::InvalidPaymentAmount { .. }));
        }
    }
}

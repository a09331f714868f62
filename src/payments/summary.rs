use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::state::{Installment, Loan};
use crate::types::{InstallmentStatus, LoanId, LoanStatus};

/// per-loan payment statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub loan_id: LoanId,
    pub original_amount: Money,
    pub total_paid: Money,
    /// principal minus the sum of paid installments, may be negative
    pub balance: Money,
    pub paid_count: usize,
    pub pending_count: usize,
    pub overdue_count: usize,
    pub loan_status: LoanStatus,
}

impl PaymentSummary {
    pub fn from_installments(loan: &Loan, installments: &[Installment]) -> Self {
        let count = |status: InstallmentStatus| installments.iter().filter(|i| i.status == status).count();

        let total_paid: Money = installments
            .iter()
            .filter(|i| i.is_paid())
            .map(|i| i.amount)
            .sum();

        Self {
            loan_id: loan.id,
            original_amount: loan.principal,
            total_paid,
            balance: loan.principal - total_paid,
            paid_count: count(InstallmentStatus::Paid),
            pending_count: count(InstallmentStatus::Pending),
            overdue_count: count(InstallmentStatus::Overdue),
            loan_status: loan.status,
        }
    }

    pub fn is_fully_paid(&self) -> bool {
        self.pending_count == 0 && self.overdue_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::payments::generate_installments;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn test_summary_counts() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let loan = Loan::new(
            Uuid::new_v4(),
            Money::from_major(300),
            Rate::from_percentage(10),
            3,
            start,
            start + Duration::days(90),
            Money::from_major(105),
        );

        let mut installments = generate_installments(loan.id, loan.monthly_payment, 3, start, 30);
        installments[0].mark_paid(start + Duration::days(29));
        installments[1].status = InstallmentStatus::Overdue;

        let summary = PaymentSummary::from_installments(&loan, &installments);
        assert_eq!(summary.paid_count, 1);
        assert_eq!(summary.pending_count, 1);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.total_paid, Money::from_major(105));
        assert_eq!(summary.balance, Money::from_major(195));
        assert!(!summary.is_fully_paid());
    }
}

/// serializable read models handed back to request handlers
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::state::{Client, Installment, Loan};
use crate::types::{LoanId, LoanStatus};

/// a loan with its installment schedule, ordered by number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanDetail {
    pub loan: Loan,
    pub installments: Vec<Installment>,
}

impl LoanDetail {
    pub fn installment(&self, number: u32) -> Option<&Installment> {
        self.installments.iter().find(|i| i.number == number)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// outstanding balance derived from paid installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceView {
    pub loan_id: LoanId,
    pub original_amount: Money,
    pub balance: Money,
    pub total_paid: Money,
    pub status: LoanStatus,
}

/// recorded balance against the balance derived from paid installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceCheck {
    pub loan_id: LoanId,
    pub recorded: Money,
    pub derived: Money,
    pub drift: Money,
}

impl BalanceCheck {
    pub fn new(loan_id: LoanId, recorded: Money, derived: Money) -> Self {
        Self {
            loan_id,
            recorded,
            derived,
            drift: recorded - derived,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// a client with every loan they hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientWithLoans {
    pub client: Client,
    pub loans: Vec<Loan>,
}

impl ClientWithLoans {
    pub fn outstanding(&self) -> Money {
        self.loans
            .iter()
            .filter(|l| !l.status.is_terminal())
            .map(|l| l.balance)
            .sum()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};
use crate::types::{ClientId, InstallmentId, InstallmentStatus, LoanId, LoanStatus};

/// a borrower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub document_id: String,
    pub registered_at: DateTime<Utc>,
    pub active: bool,
}

impl Client {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// loan record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub client_id: ClientId,
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_months: u32,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub monthly_payment: Money,
    /// incrementally maintained outstanding balance, the source of truth
    pub balance: Money,
    pub status: LoanStatus,
}

impl Loan {
    /// new active loan with its full principal outstanding
    pub fn new(
        client_id: ClientId,
        principal: Money,
        annual_rate: Rate,
        term_months: u32,
        start_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        monthly_payment: Money,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            principal,
            annual_rate,
            term_months,
            start_date,
            due_date,
            monthly_payment,
            balance: principal,
            status: LoanStatus::Active,
        }
    }

    pub fn can_accept_payment(&self) -> bool {
        !self.status.is_terminal()
    }

    /// decrement the balance, clamped at zero; a zero balance settles the loan
    pub fn record_payment(&mut self, amount: Money) {
        self.balance = self.balance.saturating_sub(amount);
        if self.balance.is_zero() {
            self.status = LoanStatus::Paid;
        }
    }

    /// principal already repaid according to the balance
    pub fn amount_repaid(&self) -> Money {
        self.principal.saturating_sub(self.balance)
    }
}

/// one scheduled payment obligation of a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub number: u32,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: InstallmentStatus,
}

impl Installment {
    pub fn pending(loan_id: LoanId, number: u32, amount: Money, due_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id,
            number,
            amount,
            due_date,
            paid_date: None,
            status: InstallmentStatus::Pending,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    /// unpaid and past its due date
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && self.due_date < now
    }

    pub fn mark_paid(&mut self, paid_at: DateTime<Utc>) {
        self.status = InstallmentStatus::Paid;
        self.paid_date = Some(paid_at);
    }
}

//! Persistence collaborator for the ledger.
//!
//! The engine never holds a connection of its own: every operation receives a
//! `&mut S where S: LedgerStore` and wraps multi-step mutations in
//! [`LedgerStore::transaction`].

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::decimal::Money;
use crate::errors::Result;
use crate::state::{Client, Installment, Loan};
use crate::types::{
    ClientFilter, ClientId, InstallmentFilter, InstallmentId, InstallmentStatus, LoanFilter, LoanId, Page,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// record store backing clients, loans and installments
pub trait LedgerStore {
    // clients
    fn insert_client(&mut self, client: &Client) -> Result<()>;
    fn get_client(&self, id: ClientId) -> Result<Option<Client>>;
    fn update_client(&mut self, client: &Client) -> Result<()>;
    fn list_clients(&self, filter: ClientFilter, page: Page) -> Result<Vec<Client>>;

    // loans
    fn insert_loan(&mut self, loan: &Loan) -> Result<()>;
    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>>;
    fn update_loan(&mut self, loan: &Loan) -> Result<()>;
    fn list_loans(&self, filter: LoanFilter, page: Page) -> Result<Vec<Loan>>;

    // installments
    fn insert_installments(&mut self, installments: &[Installment]) -> Result<()>;
    fn get_installment(&self, id: InstallmentId) -> Result<Option<Installment>>;
    fn find_installment(&self, loan_id: LoanId, number: u32) -> Result<Option<Installment>>;
    /// ordered by loan, then installment number
    fn list_installments(&self, filter: InstallmentFilter, page: Page) -> Result<Vec<Installment>>;
    fn update_installment(&mut self, installment: &Installment) -> Result<()>;
    /// write only if the stored status still equals `expected`; returns whether it was written
    fn update_installment_if(&mut self, installment: &Installment, expected: InstallmentStatus) -> Result<bool>;

    // aggregates
    fn sum_paid_installments(&self, loan_id: LoanId) -> Result<Money>;
    fn count_installments(&self, loan_id: LoanId, status: InstallmentStatus) -> Result<usize>;
    /// unpaid installments due strictly before `now`
    fn count_past_due(&self, loan_id: LoanId, now: DateTime<Utc>) -> Result<usize>;

    // unit of work
    fn begin(&mut self) -> Result<()>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;

    /// run `f` as one unit: commit on `Ok`, roll back on `Err` or a failed commit
    fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        Self: Sized,
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.begin()?;
        let err = match f(self) {
            Ok(value) => match self.commit() {
                Ok(()) => return Ok(value),
                Err(err) => {
                    warn!(error = %err, "commit failed");
                    err
                }
            },
            Err(err) => err,
        };
        if let Err(rollback_err) = self.rollback() {
            warn!(error = %rollback_err, "rollback failed");
        }
        Err(err)
    }
}

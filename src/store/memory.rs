//! In-memory ledger store.
//!
//! Tables are plain vectors kept in insertion order, so list queries come back
//! the way a relational store ordered by row id would return them. A
//! transaction snapshots every table on `begin` and restores it on `rollback`.
//! Not persistent and single process only.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::LedgerStore;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::state::{Client, Installment, Loan};
use crate::types::{
    ClientFilter, ClientId, InstallmentFilter, InstallmentId, InstallmentStatus, LoanFilter, LoanId, Page,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    clients: Vec<Client>,
    loans: Vec<Loan>,
    installments: Vec<Installment>,
}

/// vector-backed store for tests and single-process use
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    snapshot: Option<Tables>,
    #[cfg(test)]
    fail_on: Option<&'static str>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// make the next call to the named operation fail with a persistence error
    #[cfg(test)]
    pub(crate) fn fail_on(&mut self, operation: &'static str) {
        self.fail_on = Some(operation);
    }

    #[cfg(test)]
    fn check_fault(&mut self, operation: &'static str) -> Result<()> {
        if self.fail_on == Some(operation) {
            self.fail_on = None;
            return Err(LedgerError::persistence(format!("injected failure in {}", operation)));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_fault(&mut self, _operation: &'static str) -> Result<()> {
        Ok(())
    }

    fn check_unique(&self, client: &Client) -> Result<()> {
        for existing in self.tables.clients.iter().filter(|c| c.id != client.id) {
            if existing.email.eq_ignore_ascii_case(&client.email) {
                return Err(LedgerError::DuplicateClient { field: "email".to_string() });
            }
            if existing.document_id == client.document_id {
                return Err(LedgerError::DuplicateClient {
                    field: "document_id".to_string(),
                });
            }
        }
        Ok(())
    }

    fn installments_of(&self, loan_id: LoanId) -> impl Iterator<Item = &Installment> {
        self.tables.installments.iter().filter(move |i| i.loan_id == loan_id)
    }
}

impl LedgerStore for MemoryStore {
    fn insert_client(&mut self, client: &Client) -> Result<()> {
        self.check_fault("insert_client")?;
        self.check_unique(client)?;
        self.tables.clients.push(client.clone());
        Ok(())
    }

    fn get_client(&self, id: ClientId) -> Result<Option<Client>> {
        Ok(self.tables.clients.iter().find(|c| c.id == id).cloned())
    }

    fn update_client(&mut self, client: &Client) -> Result<()> {
        self.check_fault("update_client")?;
        self.check_unique(client)?;
        let slot = self
            .tables
            .clients
            .iter_mut()
            .find(|c| c.id == client.id)
            .ok_or(LedgerError::ClientNotFound { id: client.id })?;
        *slot = client.clone();
        Ok(())
    }

    fn list_clients(&self, filter: ClientFilter, page: Page) -> Result<Vec<Client>> {
        let clients = self
            .tables
            .clients
            .iter()
            .filter(|c| filter.active.map_or(true, |active| c.active == active))
            .cloned()
            .collect();
        Ok(page.slice(clients))
    }

    fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        self.check_fault("insert_loan")?;
        if self.get_client(loan.client_id)?.is_none() {
            return Err(LedgerError::persistence(format!(
                "foreign key violation: client {} does not exist",
                loan.client_id
            )));
        }
        self.tables.loans.push(loan.clone());
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        Ok(self.tables.loans.iter().find(|l| l.id == id).cloned())
    }

    fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        self.check_fault("update_loan")?;
        let slot = self
            .tables
            .loans
            .iter_mut()
            .find(|l| l.id == loan.id)
            .ok_or(LedgerError::LoanNotFound { id: loan.id })?;
        *slot = loan.clone();
        Ok(())
    }

    fn list_loans(&self, filter: LoanFilter, page: Page) -> Result<Vec<Loan>> {
        let loans = self
            .tables
            .loans
            .iter()
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .filter(|l| filter.client_id.map_or(true, |c| l.client_id == c))
            .cloned()
            .collect();
        Ok(page.slice(loans))
    }

    fn insert_installments(&mut self, installments: &[Installment]) -> Result<()> {
        self.check_fault("insert_installments")?;
        for installment in installments {
            if self.find_installment(installment.loan_id, installment.number)?.is_some() {
                return Err(LedgerError::persistence(format!(
                    "unique violation: installment {} of loan {} already exists",
                    installment.number, installment.loan_id
                )));
            }
            self.tables.installments.push(installment.clone());
        }
        Ok(())
    }

    fn get_installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        Ok(self.tables.installments.iter().find(|i| i.id == id).cloned())
    }

    fn find_installment(&self, loan_id: LoanId, number: u32) -> Result<Option<Installment>> {
        Ok(self.installments_of(loan_id).find(|i| i.number == number).cloned())
    }

    fn list_installments(&self, filter: InstallmentFilter, page: Page) -> Result<Vec<Installment>> {
        let mut installments: Vec<(usize, Installment)> = Vec::new();
        for installment in &self.tables.installments {
            if filter.loan_id.map_or(false, |id| installment.loan_id != id)
                || filter.status.map_or(false, |s| installment.status != s)
            {
                continue;
            }
            let loan_pos = self
                .tables
                .loans
                .iter()
                .position(|l| l.id == installment.loan_id)
                .unwrap_or(usize::MAX);
            installments.push((loan_pos, installment.clone()));
        }
        installments.sort_by_key(|(loan_pos, i)| (*loan_pos, i.number));
        Ok(page.slice(installments.into_iter().map(|(_, i)| i).collect()))
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        self.check_fault("update_installment")?;
        let slot = self
            .tables
            .installments
            .iter_mut()
            .find(|i| i.id == installment.id)
            .ok_or(LedgerError::InstallmentIdNotFound { id: installment.id })?;
        *slot = installment.clone();
        Ok(())
    }

    fn update_installment_if(&mut self, installment: &Installment, expected: InstallmentStatus) -> Result<bool> {
        self.check_fault("update_installment")?;
        match self.tables.installments.iter_mut().find(|i| i.id == installment.id) {
            Some(slot) if slot.status == expected => {
                *slot = installment.clone();
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(LedgerError::InstallmentIdNotFound { id: installment.id }),
        }
    }

    fn sum_paid_installments(&self, loan_id: LoanId) -> Result<Money> {
        Ok(self.installments_of(loan_id).filter(|i| i.is_paid()).map(|i| i.amount).sum())
    }

    fn count_installments(&self, loan_id: LoanId, status: InstallmentStatus) -> Result<usize> {
        Ok(self.installments_of(loan_id).filter(|i| i.status == status).count())
    }

    fn count_past_due(&self, loan_id: LoanId, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.installments_of(loan_id).filter(|i| i.is_past_due(now)).count())
    }

    fn begin(&mut self) -> Result<()> {
        if self.snapshot.is_some() {
            return Err(LedgerError::persistence("transaction already in progress"));
        }
        self.snapshot = Some(self.tables.clone());
        debug!("memory transaction started");
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.check_fault("commit")?;
        self.snapshot
            .take()
            .ok_or_else(|| LedgerError::persistence("commit without an open transaction"))?;
        debug!("memory transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| LedgerError::persistence("rollback without an open transaction"))?;
        self.tables = snapshot;
        debug!("memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Rate;
    use crate::payments::generate_installments;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn client(email: &str, document_id: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            first_name: "Ana".to_string(),
            last_name: "Pérez".to_string(),
            email: email.to_string(),
            phone: "555-0100".to_string(),
            address: "Calle 1".to_string(),
            document_id: document_id.to_string(),
            registered_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            active: true,
        }
    }

    fn loan_for(client_id: ClientId) -> Loan {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Loan::new(
            client_id,
            Money::from_major(300),
            Rate::from_percentage(12),
            3,
            start,
            start + Duration::days(90),
            Money::from_major(102),
        )
    }

    #[test]
    fn test_unique_client_fields() {
        let mut store = MemoryStore::new();
        store.insert_client(&client("ana@example.com", "DOC-1")).unwrap();

        let err = store.insert_client(&client("ANA@example.com", "DOC-2")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateClient { ref field } if field == "email"));

        let err = store.insert_client(&client("other@example.com", "DOC-1")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateClient { ref field } if field == "document_id"));
    }

    #[test]
    fn test_rollback_restores_tables() {
        let mut store = MemoryStore::new();
        let owner = client("ana@example.com", "DOC-1");
        store.insert_client(&owner).unwrap();

        let result: Result<()> = store.transaction(|tx| {
            tx.insert_loan(&loan_for(owner.id))?;
            Err(LedgerError::persistence("boom"))
        });

        assert!(result.is_err());
        assert!(!store.in_transaction());
        assert!(store.list_loans(LoanFilter::default(), Page::default()).unwrap().is_empty());
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let mut store = MemoryStore::new();
        let owner = client("ana@example.com", "DOC-1");
        store.insert_client(&owner).unwrap();

        store.fail_on("commit");
        let result = store.transaction(|tx| tx.insert_loan(&loan_for(owner.id)));

        assert!(matches!(result, Err(LedgerError::PersistenceFailure { .. })));
        assert!(!store.in_transaction());
        assert!(store.list_loans(LoanFilter::default(), Page::default()).unwrap().is_empty());

        // the store is usable again afterwards
        store.transaction(|tx| tx.insert_loan(&loan_for(owner.id))).unwrap();
        assert_eq!(store.list_loans(LoanFilter::default(), Page::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_loan_requires_existing_client() {
        let mut store = MemoryStore::new();
        let err = store.insert_loan(&loan_for(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, LedgerError::PersistenceFailure { .. }));
    }

    #[test]
    fn test_compare_and_swap_installment() {
        let mut store = MemoryStore::new();
        let owner = client("ana@example.com", "DOC-1");
        store.insert_client(&owner).unwrap();
        let loan = loan_for(owner.id);
        store.insert_loan(&loan).unwrap();

        let start = loan.start_date;
        store
            .insert_installments(&generate_installments(loan.id, loan.monthly_payment, 3, start, 30))
            .unwrap();

        let mut first = store.find_installment(loan.id, 1).unwrap().unwrap();
        first.mark_paid(start + Duration::days(10));

        assert!(store.update_installment_if(&first, InstallmentStatus::Pending).unwrap());
        // second writer sees the installment already paid
        assert!(!store.update_installment_if(&first, InstallmentStatus::Pending).unwrap());

        assert_eq!(store.sum_paid_installments(loan.id).unwrap(), Money::from_major(102));
        assert_eq!(store.count_installments(loan.id, InstallmentStatus::Pending).unwrap(), 2);
        assert_eq!(store.count_past_due(loan.id, start + Duration::days(91)).unwrap(), 2);
        assert_eq!(store.count_past_due(loan.id, start + Duration::days(45)).unwrap(), 0);
    }

    #[test]
    fn test_duplicate_installment_number_rejected() {
        let mut store = MemoryStore::new();
        let owner = client("ana@example.com", "DOC-1");
        store.insert_client(&owner).unwrap();
        let loan = loan_for(owner.id);
        store.insert_loan(&loan).unwrap();

        let installments = generate_installments(loan.id, loan.monthly_payment, 1, loan.start_date, 30);
        store.insert_installments(&installments).unwrap();

        let again = generate_installments(loan.id, loan.monthly_payment, 1, loan.start_date, 30);
        assert!(store.insert_installments(&again).is_err());
    }
}

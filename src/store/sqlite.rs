//! SQLite ledger store.
//!
//! Only this module talks to the database. Money and rates are stored as
//! decimal text so nothing passes through floating point, and timestamps as
//! fixed-width RFC 3339 UTC text so they compare correctly as strings.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

use super::LedgerStore;
use crate::config::{LedgerConfig, StorageConfig};
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::state::{Client, Installment, Loan};
use crate::types::{
    ClientFilter, ClientId, InstallmentFilter, InstallmentId, InstallmentStatus, LoanFilter, LoanId, Page,
};

const CLIENT_COLUMNS: &str =
    "id, first_name, last_name, email, phone, address, document_id, registered_at, active";

const LOAN_COLUMNS: &str =
    "id, client_id, principal, annual_rate, term_months, start_date, due_date, monthly_payment, balance, status";

const INSTALLMENT_COLUMNS: &str = "i.id, i.loan_id, i.number, i.amount, i.due_date, i.paid_date, i.status";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// open (or create) the ledger database at `path` and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        let store = Self::with_connection(conn)?;
        info!(path = %path.as_ref().display(), "opened sqlite ledger");
        Ok(store)
    }

    /// open an in-memory database (used in tests)
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// open the database named by a sqlite storage configuration
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        match &config.storage {
            StorageConfig::Sqlite { path } => Self::open(path),
            StorageConfig::Memory => Err(LedgerError::InvalidConfiguration {
                message: "storage is configured as memory, not sqlite".to_string(),
            }),
        }
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// apply all schema migrations in order
    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_ledger.sql"))?;
        Ok(())
    }

    fn installment_exists(&self, id: InstallmentId) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM installments WHERE id = ?1", params![id.to_string()], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl LedgerStore for SqliteStore {
    fn insert_client(&mut self, client: &Client) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO clients ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)", CLIENT_COLUMNS),
                params![
                    client.id.to_string(),
                    client.first_name,
                    client.last_name,
                    client.email,
                    client.phone,
                    client.address,
                    client.document_id,
                    fmt_time(client.registered_at),
                    client.active,
                ],
            )
            .map_err(client_write_error)?;
        Ok(())
    }

    fn get_client(&self, id: ClientId) -> Result<Option<Client>> {
        let client = self
            .conn
            .query_row(
                &format!("SELECT {} FROM clients WHERE id = ?1", CLIENT_COLUMNS),
                params![id.to_string()],
                client_from_row,
            )
            .optional()?;
        Ok(client)
    }

    fn update_client(&mut self, client: &Client) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE clients SET first_name = ?2, last_name = ?3, email = ?4, phone = ?5,
                 address = ?6, document_id = ?7, active = ?8 WHERE id = ?1",
                params![
                    client.id.to_string(),
                    client.first_name,
                    client.last_name,
                    client.email,
                    client.phone,
                    client.address,
                    client.document_id,
                    client.active,
                ],
            )
            .map_err(client_write_error)?;
        if changed == 0 {
            return Err(LedgerError::ClientNotFound { id: client.id });
        }
        Ok(())
    }

    fn list_clients(&self, filter: ClientFilter, page: Page) -> Result<Vec<Client>> {
        let mut sql = format!("SELECT {} FROM clients", CLIENT_COLUMNS);
        if let Some(active) = filter.active {
            sql.push_str(if active { " WHERE active = 1" } else { " WHERE active = 0" });
        }
        sql.push_str(&page_clause("rowid", page));

        let mut stmt = self.conn.prepare(&sql)?;
        let clients = stmt
            .query_map([], client_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(clients)
    }

    fn insert_loan(&mut self, loan: &Loan) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO loans ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                LOAN_COLUMNS
            ),
            params![
                loan.id.to_string(),
                loan.client_id.to_string(),
                loan.principal.as_decimal().to_string(),
                loan.annual_rate.as_decimal().to_string(),
                loan.term_months,
                fmt_time(loan.start_date),
                fmt_time(loan.due_date),
                loan.monthly_payment.as_decimal().to_string(),
                loan.balance.as_decimal().to_string(),
                loan.status.as_str(),
            ],
        )?;
        Ok(())
    }

    fn get_loan(&self, id: LoanId) -> Result<Option<Loan>> {
        let loan = self
            .conn
            .query_row(
                &format!("SELECT {} FROM loans WHERE id = ?1", LOAN_COLUMNS),
                params![id.to_string()],
                loan_from_row,
            )
            .optional()?;
        Ok(loan)
    }

    fn update_loan(&mut self, loan: &Loan) -> Result<()> {
        // monthly payment and schedule terms are fixed at creation
        let changed = self.conn.execute(
            "UPDATE loans SET balance = ?2, status = ?3, due_date = ?4 WHERE id = ?1",
            params![
                loan.id.to_string(),
                loan.balance.as_decimal().to_string(),
                loan.status.as_str(),
                fmt_time(loan.due_date),
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::LoanNotFound { id: loan.id });
        }
        Ok(())
    }

    fn list_loans(&self, filter: LoanFilter, page: Page) -> Result<Vec<Loan>> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(status) = filter.status {
            values.push(status.as_str().to_string());
            conditions.push(format!("status = ?{}", values.len()));
        }
        if let Some(client_id) = filter.client_id {
            values.push(client_id.to_string());
            conditions.push(format!("client_id = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {} FROM loans", LOAN_COLUMNS);
        sql.push_str(&where_clause(&conditions));
        sql.push_str(&page_clause("rowid", page));

        let mut stmt = self.conn.prepare(&sql)?;
        let loans = stmt
            .query_map(params_from_iter(values.iter()), loan_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(loans)
    }

    fn insert_installments(&mut self, installments: &[Installment]) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "INSERT INTO installments (id, loan_id, number, amount, due_date, paid_date, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for installment in installments {
            stmt.execute(params![
                installment.id.to_string(),
                installment.loan_id.to_string(),
                installment.number,
                installment.amount.as_decimal().to_string(),
                fmt_time(installment.due_date),
                installment.paid_date.map(fmt_time),
                installment.status.as_str(),
            ])?;
        }
        debug!(count = installments.len(), "inserted installments");
        Ok(())
    }

    fn get_installment(&self, id: InstallmentId) -> Result<Option<Installment>> {
        let installment = self
            .conn
            .query_row(
                &format!("SELECT {} FROM installments i WHERE i.id = ?1", INSTALLMENT_COLUMNS),
                params![id.to_string()],
                installment_from_row,
            )
            .optional()?;
        Ok(installment)
    }

    fn find_installment(&self, loan_id: LoanId, number: u32) -> Result<Option<Installment>> {
        let installment = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM installments i WHERE i.loan_id = ?1 AND i.number = ?2",
                    INSTALLMENT_COLUMNS
                ),
                params![loan_id.to_string(), number],
                installment_from_row,
            )
            .optional()?;
        Ok(installment)
    }

    fn list_installments(&self, filter: InstallmentFilter, page: Page) -> Result<Vec<Installment>> {
        let mut conditions = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(loan_id) = filter.loan_id {
            values.push(loan_id.to_string());
            conditions.push(format!("i.loan_id = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(status.as_str().to_string());
            conditions.push(format!("i.status = ?{}", values.len()));
        }

        let mut sql = format!(
            "SELECT {} FROM installments i JOIN loans l ON l.id = i.loan_id",
            INSTALLMENT_COLUMNS
        );
        sql.push_str(&where_clause(&conditions));
        sql.push_str(&page_clause("l.rowid, i.number", page));

        let mut stmt = self.conn.prepare(&sql)?;
        let installments = stmt
            .query_map(params_from_iter(values.iter()), installment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(installments)
    }

    fn update_installment(&mut self, installment: &Installment) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE installments SET amount = ?2, due_date = ?3, paid_date = ?4, status = ?5 WHERE id = ?1",
            params![
                installment.id.to_string(),
                installment.amount.as_decimal().to_string(),
                fmt_time(installment.due_date),
                installment.paid_date.map(fmt_time),
                installment.status.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::InstallmentIdNotFound { id: installment.id });
        }
        Ok(())
    }

    fn update_installment_if(&mut self, installment: &Installment, expected: InstallmentStatus) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE installments SET amount = ?2, due_date = ?3, paid_date = ?4, status = ?5
             WHERE id = ?1 AND status = ?6",
            params![
                installment.id.to_string(),
                installment.amount.as_decimal().to_string(),
                fmt_time(installment.due_date),
                installment.paid_date.map(fmt_time),
                installment.status.as_str(),
                expected.as_str(),
            ],
        )?;
        if changed == 1 {
            return Ok(true);
        }
        if !self.installment_exists(installment.id)? {
            return Err(LedgerError::InstallmentIdNotFound { id: installment.id });
        }
        Ok(false)
    }

    fn sum_paid_installments(&self, loan_id: LoanId) -> Result<Money> {
        let mut stmt = self
            .conn
            .prepare("SELECT amount FROM installments WHERE loan_id = ?1 AND status = 'paid'")?;
        let amounts = stmt
            .query_map(params![loan_id.to_string()], |row| money_at(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(amounts.into_iter().sum())
    }

    fn count_installments(&self, loan_id: LoanId, status: InstallmentStatus) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM installments WHERE loan_id = ?1 AND status = ?2",
            params![loan_id.to_string(), status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_past_due(&self, loan_id: LoanId, now: DateTime<Utc>) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM installments WHERE loan_id = ?1 AND status != 'paid' AND due_date < ?2",
            params![loan_id.to_string(), fmt_time(now)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn begin(&mut self) -> Result<()> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn.execute_batch("ROLLBACK")?;
        debug!("sqlite transaction rolled back");
        Ok(())
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// sqlite reads LIMIT and OFFSET as signed 64-bit
fn page_clause(order_by: &str, page: Page) -> String {
    let bound = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
    format!(
        " ORDER BY {} LIMIT {} OFFSET {}",
        order_by,
        bound(page.limit),
        bound(page.offset)
    )
}

fn fmt_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn client_write_error(err: rusqlite::Error) -> LedgerError {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            for field in ["email", "document_id"] {
                if message.contains(&format!("clients.{}", field)) {
                    return LedgerError::DuplicateClient { field: field.to_string() };
                }
            }
        }
    }
    err.into()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| conversion_error(idx, e))
}

fn money_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Money> {
    let text: String = row.get(idx)?;
    Money::from_str_exact(&text).map_err(|e| conversion_error(idx, e))
}

fn rate_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Rate> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map(Rate::from_decimal)
        .map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn optional_time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        DateTime::parse_from_rfc3339(&t)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn parsed_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let text: String = row.get(idx)?;
    text.parse().map_err(|e: String| conversion_error(idx, e))
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        id: uuid_at(row, 0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        document_id: row.get(6)?,
        registered_at: time_at(row, 7)?,
        active: row.get(8)?,
    })
}

fn loan_from_row(row: &Row<'_>) -> rusqlite::Result<Loan> {
    Ok(Loan {
        id: uuid_at(row, 0)?,
        client_id: uuid_at(row, 1)?,
        principal: money_at(row, 2)?,
        annual_rate: rate_at(row, 3)?,
        term_months: row.get(4)?,
        start_date: time_at(row, 5)?,
        due_date: time_at(row, 6)?,
        monthly_payment: money_at(row, 7)?,
        balance: money_at(row, 8)?,
        status: parsed_at(row, 9)?,
    })
}

fn installment_from_row(row: &Row<'_>) -> rusqlite::Result<Installment> {
    Ok(Installment {
        id: uuid_at(row, 0)?,
        loan_id: uuid_at(row, 1)?,
        number: row.get(2)?,
        amount: money_at(row, 3)?,
        due_date: time_at(row, 4)?,
        paid_date: optional_time_at(row, 5)?,
        status: parsed_at(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::generate_installments;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn client(email: &str, document_id: &str) -> Client {
        Client {
            id: Uuid::new_v4(),
            first_name: "Luis".to_string(),
            last_name: "Gómez".to_string(),
            email: email.to_string(),
            phone: "555-0101".to_string(),
            address: "Av. Central 42".to_string(),
            document_id: document_id.to_string(),
            registered_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            active: true,
        }
    }

    fn seeded() -> (SqliteStore, Loan) {
        let mut store = SqliteStore::in_memory().unwrap();
        let owner = client("luis@example.com", "DOC-9");
        store.insert_client(&owner).unwrap();

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let loan = Loan::new(
            owner.id,
            Money::from_major(1_000),
            Rate::from_percent(dec!(12.5)),
            4,
            start,
            start + Duration::days(120),
            Money::from_str_exact("256.55").unwrap(),
        );
        store.insert_loan(&loan).unwrap();
        store
            .insert_installments(&generate_installments(loan.id, loan.monthly_payment, 4, start, 30))
            .unwrap();
        (store, loan)
    }

    #[test]
    fn test_loan_round_trip_keeps_decimals() {
        let (store, loan) = seeded();
        let stored = store.get_loan(loan.id).unwrap().unwrap();

        assert_eq!(stored, loan);
        assert_eq!(stored.annual_rate.as_percentage(), dec!(12.5));
        assert_eq!(stored.monthly_payment.to_string(), "256.55");
    }

    #[test]
    fn test_duplicate_client_is_reported() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert_client(&client("a@example.com", "DOC-1")).unwrap();

        let err = store.insert_client(&client("A@example.com", "DOC-2")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateClient { ref field } if field == "email"));

        let err = store.insert_client(&client("b@example.com", "DOC-1")).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateClient { ref field } if field == "document_id"));
    }

    #[test]
    fn test_installment_queries() {
        let (mut store, loan) = seeded();

        let third = store.find_installment(loan.id, 3).unwrap().unwrap();
        assert_eq!(third.due_date, loan.start_date + Duration::days(90));
        assert!(store.find_installment(loan.id, 5).unwrap().is_none());

        let mut first = store.find_installment(loan.id, 1).unwrap().unwrap();
        first.mark_paid(loan.start_date + Duration::days(15));
        assert!(store.update_installment_if(&first, InstallmentStatus::Pending).unwrap());
        assert!(!store.update_installment_if(&first, InstallmentStatus::Pending).unwrap());

        let stored = store.get_installment(first.id).unwrap().unwrap();
        assert_eq!(stored.paid_date, first.paid_date);

        assert_eq!(store.sum_paid_installments(loan.id).unwrap(), Money::from_str_exact("256.55").unwrap());
        assert_eq!(store.count_installments(loan.id, InstallmentStatus::Pending).unwrap(), 3);
        assert_eq!(store.count_past_due(loan.id, loan.start_date + Duration::days(61)).unwrap(), 1);

        let listed = store
            .list_installments(
                InstallmentFilter {
                    loan_id: Some(loan.id),
                    status: None,
                },
                Page::new(1, 2),
            )
            .unwrap();
        assert_eq!(listed.iter().map(|i| i.number).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_transaction_rollback() {
        let (mut store, loan) = seeded();

        let result: Result<()> = store.transaction(|tx| {
            let mut changed = loan.clone();
            changed.record_payment(Money::from_major(100));
            tx.update_loan(&changed)?;
            Err(LedgerError::persistence("abort"))
        });

        assert!(result.is_err());
        assert_eq!(store.get_loan(loan.id).unwrap().unwrap().balance, Money::from_major(1_000));
    }

    #[test]
    fn test_loan_filters() {
        let (store, loan) = seeded();

        let by_client = store
            .list_loans(
                LoanFilter {
                    status: None,
                    client_id: Some(loan.client_id),
                },
                Page::default(),
            )
            .unwrap();
        assert_eq!(by_client.len(), 1);

        let paid = store
            .list_loans(
                LoanFilter {
                    status: Some(crate::types::LoanStatus::Paid),
                    client_id: None,
                },
                Page::default(),
            )
            .unwrap();
        assert!(paid.is_empty());
    }

    #[test]
    fn test_unbounded_page() {
        let (store, loan) = seeded();

        let loans = store.list_loans(LoanFilter::default(), Page::new(0, usize::MAX)).unwrap();
        assert_eq!(loans.len(), 1);
        assert_eq!(loans[0].id, loan.id);

        let installments = store
            .list_installments(InstallmentFilter::default(), Page::new(usize::MAX, usize::MAX))
            .unwrap();
        assert!(installments.is_empty());
    }
}

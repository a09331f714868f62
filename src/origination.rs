use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::types::ClientId;

/// request to open a loan for a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub client_id: ClientId,
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_months: u32,
    /// defaults to the time provider's now
    pub start_date: Option<DateTime<Utc>>,
}

impl LoanApplication {
    pub fn new(client_id: ClientId, principal: Money, annual_rate: Rate, term_months: u32) -> Self {
        Self {
            client_id,
            principal,
            annual_rate,
            term_months,
            start_date: None,
        }
    }

    pub fn builder() -> LoanApplicationBuilder {
        LoanApplicationBuilder::new()
    }
}

/// builder for loan applications
#[derive(Debug, Default)]
pub struct LoanApplicationBuilder {
    client_id: Option<ClientId>,
    amount: Option<Money>,
    rate: Option<Rate>,
    term_months: Option<u32>,
    start_date: Option<DateTime<Utc>>,
}

impl LoanApplicationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn rate(mut self, rate: Rate) -> Self {
        self.rate = Some(rate);
        self
    }

    /// annual rate as a percentage, e.g. `dec!(12.5)`
    pub fn rate_percent(mut self, percent: Decimal) -> Self {
        self.rate = Some(Rate::from_percent(percent));
        self
    }

    pub fn term_months(mut self, months: u32) -> Self {
        self.term_months = Some(months);
        self
    }

    pub fn start_date(mut self, date: DateTime<Utc>) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn build(self) -> Result<LoanApplication> {
        let client_id = self
            .client_id
            .ok_or_else(|| LedgerError::invalid_params("client required"))?;

        let principal = self
            .amount
            .ok_or_else(|| LedgerError::invalid_params("amount required"))?;

        let annual_rate = self
            .rate
            .ok_or_else(|| LedgerError::invalid_params("rate required"))?;

        let term_months = self
            .term_months
            .ok_or_else(|| LedgerError::invalid_params("term required"))?;

        Ok(LoanApplication {
            client_id,
            principal,
            annual_rate,
            term_months,
            start_date: self.start_date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_builder() {
        let client_id = Uuid::new_v4();
        let application = LoanApplication::builder()
            .client(client_id)
            .amount(Money::from_major(5_000))
            .rate_percent(dec!(12.5))
            .term_months(12)
            .build()
            .unwrap();

        assert_eq!(application.client_id, client_id);
        assert_eq!(application.annual_rate.as_percentage(), dec!(12.5));
        assert!(application.start_date.is_none());
    }

    #[test]
    fn test_builder_missing_fields() {
        let err = LoanApplication::builder()
            .client(Uuid::new_v4())
            .amount(Money::from_major(5_000))
            .term_months(12)
            .build()
            .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidLoanParameters { ref message } if message == "rate required"));
    }
}

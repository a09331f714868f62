use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::state::Installment;
use crate::types::LoanId;

/// result of pricing a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanQuote {
    pub principal: Money,
    pub annual_rate: Rate,
    pub term_months: u32,
    pub monthly_payment: Money,
    pub total_paid: Money,
    pub total_interest: Money,
}

/// amortization calculator
#[derive(Debug, Clone, Copy, Default)]
pub struct AmortizationCalculator {
    allow_interest_free: bool,
}

impl AmortizationCalculator {
    /// calculator that rejects non-positive rates
    pub fn new() -> Self {
        Self::default()
    }

    /// calculator that also prices zero-rate loans
    pub fn interest_free() -> Self {
        Self {
            allow_interest_free: true,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self {
            allow_interest_free: config.allow_interest_free,
        }
    }

    pub fn validate(&self, principal: Money, annual_rate: Rate, term_months: i64) -> Result<u32> {
        if !principal.is_positive() {
            return Err(LedgerError::invalid_params(format!(
                "principal must be greater than zero, got {}",
                principal
            )));
        }

        if annual_rate.is_negative() || (annual_rate.is_zero() && !self.allow_interest_free) {
            return Err(LedgerError::invalid_params(format!(
                "interest rate must be greater than zero, got {}",
                annual_rate
            )));
        }

        if term_months <= 0 {
            return Err(LedgerError::invalid_params(format!(
                "term must be at least one month, got {}",
                term_months
            )));
        }

        u32::try_from(term_months)
            .map_err(|_| LedgerError::invalid_params(format!("term of {} months is too long", term_months)))
    }

    /// price a loan: fixed monthly payment, total paid and total interest
    pub fn quote(&self, principal: Money, annual_rate: Rate, term_months: i64) -> Result<LoanQuote> {
        let term = self.validate(principal, annual_rate, term_months)?;

        let monthly_payment = monthly_payment(principal, annual_rate, term)?;
        let total_paid = monthly_payment * Decimal::from(term);
        let total_interest = total_paid - principal;

        Ok(LoanQuote {
            principal,
            annual_rate,
            term_months: term,
            monthly_payment,
            total_paid,
            total_interest,
        })
    }
}

/// P * i * (1 + i)^n / ((1 + i)^n - 1), or P / n when the monthly rate is zero
fn monthly_payment(principal: Money, annual_rate: Rate, months: u32) -> Result<Money> {
    let i = annual_rate.monthly_rate().as_decimal();
    let p = principal.as_decimal();

    if i.is_zero() {
        return Ok(Money::from_decimal(p / Decimal::from(months)));
    }

    let overflow = || LedgerError::invalid_params("rate and term overflow the payment formula");

    let base = Decimal::ONE + i;
    let mut compound = Decimal::ONE;
    for _ in 0..months {
        compound = compound.checked_mul(base).ok_or_else(overflow)?;
    }

    let numerator = p
        .checked_mul(i)
        .and_then(|pi| pi.checked_mul(compound))
        .ok_or_else(overflow)?;
    let denominator = compound - Decimal::ONE;
    if denominator.is_zero() {
        return Err(LedgerError::invalid_params("interest rate is too small to amortize"));
    }

    let payment = numerator.checked_div(denominator).ok_or_else(overflow)?;
    Ok(Money::from_decimal(payment))
}

/// loan due date: start plus a fixed number of periods
pub fn loan_due_date(start: DateTime<Utc>, term_months: u32, period_days: u32) -> DateTime<Utc> {
    start + Duration::days(i64::from(term_months) * i64::from(period_days))
}

/// pending installments 1..=term, the k-th due k periods after start
pub fn generate_installments(
    loan_id: LoanId,
    monthly_payment: Money,
    term_months: u32,
    start: DateTime<Utc>,
    period_days: u32,
) -> Vec<Installment> {
    (1..=term_months)
        .map(|number| {
            let due_date = start + Duration::days(i64::from(number) * i64::from(period_days));
            Installment::pending(loan_id, number, monthly_payment, due_date)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstallmentStatus;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_reference_quote() {
        let calculator = AmortizationCalculator::new();
        let quote = calculator
            .quote(Money::from_major(5_000), Rate::from_percent(dec!(12.5)), 12)
            .unwrap();

        assert_eq!(quote.monthly_payment, Money::from_str_exact("445.41").unwrap());
        assert_eq!(quote.total_paid, Money::from_str_exact("5344.92").unwrap());
        assert_eq!(quote.total_interest, Money::from_str_exact("344.92").unwrap());
        assert_eq!(quote.term_months, 12);
    }

    #[test]
    fn test_totals_are_consistent() {
        let calculator = AmortizationCalculator::new();
        let cases = [
            (1_000, dec!(24), 2),
            (10_000, dec!(12), 12),
            (250_000, dec!(7.25), 360),
            (750, dec!(36), 5),
        ];

        for (principal, rate, term) in cases {
            let principal = Money::from_major(principal);
            let quote = calculator.quote(principal, Rate::from_percent(rate), term).unwrap();

            let implied = quote.monthly_payment * Decimal::from(term);
            assert!((implied - quote.total_paid).abs() <= Money::CENT);
            assert!((quote.total_paid - principal - quote.total_interest).abs() <= Money::CENT);
            assert!(quote.total_interest.is_positive());
        }
    }

    #[test]
    fn test_interest_free_quote() {
        let quote = AmortizationCalculator::interest_free()
            .quote(Money::from_major(6_000), Rate::ZERO, 6)
            .unwrap();

        assert_eq!(quote.monthly_payment, Money::from_major(1_000));
        assert_eq!(quote.total_paid, Money::from_major(6_000));
        assert_eq!(quote.total_interest, Money::ZERO);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let strict = AmortizationCalculator::new();
        let rate = Rate::from_percentage(10);
        let principal = Money::from_major(1_000);

        let rejected = [
            strict.quote(Money::ZERO, rate, 12),
            strict.quote(Money::from_major(-5), rate, 12),
            strict.quote(principal, Rate::ZERO, 12),
            strict.quote(principal, Rate::from_percent(dec!(-1)), 12),
            strict.quote(principal, rate, 0),
            strict.quote(principal, rate, -3),
        ];

        for result in rejected {
            assert!(matches!(result, Err(LedgerError::InvalidLoanParameters { .. })));
        }

        // negative rates stay invalid even when zero is allowed
        let lenient = AmortizationCalculator::interest_free();
        assert!(lenient.quote(principal, Rate::from_percent(dec!(-1)), 12).is_err());
    }

    #[test]
    fn test_extreme_rate_and_term_is_rejected() {
        // (1 + 0.2)^360 still fits a decimal, the payment numerator does not
        let err = AmortizationCalculator::new()
            .quote(Money::from_major(1_000), Rate::from_percent(dec!(240)), 360)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLoanParameters { .. }));

        let err = AmortizationCalculator::new()
            .quote(Money::from_major(1_000), Rate::from_percent(dec!(1200)), 360)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidLoanParameters { .. }));
    }

    #[test]
    fn test_installment_schedule() {
        let loan_id = Uuid::new_v4();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let installments = generate_installments(loan_id, Money::from_major(100), 12, start, 30);

        assert_eq!(installments.len(), 12);
        for (k, installment) in installments.iter().enumerate() {
            let number = k as u32 + 1;
            assert_eq!(installment.number, number);
            assert_eq!(installment.loan_id, loan_id);
            assert_eq!(installment.due_date, start + Duration::days(30 * number as i64));
            assert_eq!(installment.status, InstallmentStatus::Pending);
            assert!(installment.paid_date.is_none());
        }

        // fixed 30-day periods, not calendar months
        assert_eq!(loan_due_date(start, 12, 30), Utc.with_ymd_and_hms(2024, 12, 26, 0, 0, 0).unwrap());
    }
}

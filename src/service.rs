use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::LedgerConfig;
use crate::decimal::{Money, Rate};
use crate::errors::{LedgerError, Result};
use crate::origination::LoanApplication;
use crate::payments::{
    generate_installments, loan_due_date, AmortizationCalculator, LoanQuote, PaymentRequest, PaymentSummary,
};
use crate::state::{Installment, Loan};
use crate::store::LedgerStore;
use crate::types::{InstallmentFilter, InstallmentId, InstallmentStatus, LoanFilter, LoanId, LoanStatus, Page};
use crate::views::{BalanceCheck, BalanceView, LoanDetail};

/// administrative change to an unpaid installment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPatch {
    pub status: Option<InstallmentStatus>,
    pub due_date: Option<DateTime<Utc>>,
}

/// loan bookkeeping engine
#[derive(Debug, Clone)]
pub struct LoanService {
    config: LedgerConfig,
    calculator: AmortizationCalculator,
}

impl LoanService {
    /// create new service from a validated config
    pub fn new(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let calculator = AmortizationCalculator::from_config(&config.schedule);
        Ok(Self { config, calculator })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// price a loan without touching the store
    pub fn compute_schedule(&self, principal: Money, annual_rate: Rate, term_months: i64) -> Result<LoanQuote> {
        let term = self.calculator.validate(principal, annual_rate, term_months)?;
        if term > self.config.limits.max_term_months {
            return Err(LedgerError::invalid_params(format!(
                "term of {} months exceeds the maximum of {}",
                term, self.config.limits.max_term_months
            )));
        }

        self.calculator.quote(principal, annual_rate, term_months)
    }

    /// originate a loan and its full installment schedule as one unit
    pub fn create_loan<S: LedgerStore>(
        &self,
        store: &mut S,
        time_provider: &SafeTimeProvider,
        application: LoanApplication,
    ) -> Result<LoanDetail> {
        let start = application.start_date.unwrap_or_else(|| time_provider.now());
        let period_days = self.config.schedule.period_days;

        store.transaction(|tx| {
            let client = tx
                .get_client(application.client_id)?
                .ok_or(LedgerError::ClientNotFound {
                    id: application.client_id,
                })?;

            if !client.active {
                warn!(client_id = %client.id, "loan requested for inactive client");
                return Err(LedgerError::ClientInactive { id: client.id });
            }

            let quote = self.compute_schedule(
                application.principal,
                application.annual_rate,
                i64::from(application.term_months),
            )?;

            let loan = Loan::new(
                client.id,
                quote.principal,
                quote.annual_rate,
                quote.term_months,
                start,
                loan_due_date(start, quote.term_months, period_days),
                quote.monthly_payment,
            );
            let installments =
                generate_installments(loan.id, loan.monthly_payment, loan.term_months, start, period_days);

            tx.insert_loan(&loan)?;
            tx.insert_installments(&installments)?;

            info!(
                loan_id = %loan.id,
                client_id = %client.id,
                principal = %loan.principal,
                monthly_payment = %loan.monthly_payment,
                term_months = loan.term_months,
                "loan originated"
            );

            Ok(LoanDetail { loan, installments })
        })
    }

    /// settle one installment and decrement the loan balance
    pub fn apply_payment<S: LedgerStore>(
        &self,
        store: &mut S,
        time_provider: &SafeTimeProvider,
        loan_id: LoanId,
        installment_number: u32,
        amount: Money,
    ) -> Result<Installment> {
        self.process_payment(
            store,
            time_provider,
            PaymentRequest::new(loan_id, installment_number, amount),
        )
    }

    /// process payment
    pub fn process_payment<S: LedgerStore>(
        &self,
        store: &mut S,
        time_provider: &SafeTimeProvider,
        request: PaymentRequest,
    ) -> Result<Installment> {
        request.validate()?;
        let now = time_provider.now();

        store.transaction(|tx| {
            let mut loan = tx
                .get_loan(request.loan_id)?
                .ok_or(LedgerError::LoanNotFound { id: request.loan_id })?;

            let already_paid = LedgerError::AlreadyPaid {
                loan_id: loan.id,
                number: request.installment_number,
            };

            let mut installment = tx
                .find_installment(loan.id, request.installment_number)?
                .ok_or(LedgerError::InstallmentNotFound {
                    loan_id: loan.id,
                    number: request.installment_number,
                })?;

            if installment.is_paid() {
                return Err(already_paid);
            }

            if !loan.can_accept_payment() {
                return Err(LedgerError::LoanClosed { status: loan.status });
            }

            let expected = installment.status;
            installment.mark_paid(now);
            if !tx.update_installment_if(&installment, expected)? {
                warn!(
                    loan_id = %loan.id,
                    number = installment.number,
                    "installment changed while being paid"
                );
                return Err(already_paid);
            }

            loan.record_payment(request.amount);
            tx.update_loan(&loan)?;

            info!(
                loan_id = %loan.id,
                number = installment.number,
                amount = %request.amount,
                balance = %loan.balance,
                status = %loan.status,
                "payment applied"
            );

            Ok(installment)
        })
    }

    /// principal minus paid installment amounts, floored at zero
    pub fn recompute_balance<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<Money> {
        let loan = self.get_loan(store, loan_id)?;
        let paid = store.sum_paid_installments(loan_id)?;
        Ok(loan.principal.saturating_sub(paid))
    }

    /// compare the recorded balance with the one derived from paid installments
    pub fn reconcile_balance<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<BalanceCheck> {
        let loan = self.get_loan(store, loan_id)?;
        let derived = loan.principal.saturating_sub(store.sum_paid_installments(loan_id)?);
        let check = BalanceCheck::new(loan_id, loan.balance, derived);

        if !check.is_consistent() {
            warn!(
                loan_id = %loan_id,
                recorded = %check.recorded,
                derived = %check.derived,
                drift = %check.drift,
                "balance drift"
            );
        }

        Ok(check)
    }

    /// re-derive the loan status; paid and cancelled loans are left alone
    ///
    /// pending installments past their due date are flagged overdue on the way.
    pub fn refresh_status<S: LedgerStore>(
        &self,
        store: &mut S,
        time_provider: &SafeTimeProvider,
        loan_id: LoanId,
    ) -> Result<LoanStatus> {
        let now = time_provider.now();

        store.transaction(|tx| {
            let mut loan = tx.get_loan(loan_id)?.ok_or(LedgerError::LoanNotFound { id: loan_id })?;

            if loan.status.is_terminal() {
                debug!(loan_id = %loan_id, status = %loan.status, "status is final");
                return Ok(loan.status);
            }

            let pending = tx.list_installments(
                InstallmentFilter {
                    loan_id: Some(loan_id),
                    status: Some(InstallmentStatus::Pending),
                },
                Page::all(),
            )?;
            for mut installment in pending.into_iter().filter(|i| i.is_past_due(now)) {
                installment.status = InstallmentStatus::Overdue;
                tx.update_installment(&installment)?;
                debug!(loan_id = %loan_id, number = installment.number, "installment overdue");
            }

            let status = if !loan.balance.is_positive() {
                LoanStatus::Paid
            } else if now > loan.due_date || tx.count_past_due(loan_id, now)? > 0 {
                LoanStatus::Overdue
            } else {
                LoanStatus::Active
            };

            if status != loan.status {
                info!(loan_id = %loan_id, from = %loan.status, to = %status, "loan status changed");
                loan.status = status;
                tx.update_loan(&loan)?;
            }

            Ok(status)
        })
    }

    /// close a performing loan
    pub fn cancel_loan<S: LedgerStore>(&self, store: &mut S, loan_id: LoanId) -> Result<Loan> {
        store.transaction(|tx| {
            let mut loan = tx.get_loan(loan_id)?.ok_or(LedgerError::LoanNotFound { id: loan_id })?;
            if loan.status.is_terminal() {
                return Err(LedgerError::LoanClosed { status: loan.status });
            }

            loan.status = LoanStatus::Cancelled;
            tx.update_loan(&loan)?;
            info!(loan_id = %loan_id, balance = %loan.balance, "loan cancelled");
            Ok(loan)
        })
    }

    pub fn get_loan<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<Loan> {
        store.get_loan(loan_id)?.ok_or(LedgerError::LoanNotFound { id: loan_id })
    }

    pub fn loan_detail<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<LoanDetail> {
        let loan = self.get_loan(store, loan_id)?;
        let installments = self.installments_of(store, loan_id)?;
        Ok(LoanDetail { loan, installments })
    }

    /// `None` takes the configured default page
    pub fn list_loans<S: LedgerStore>(&self, store: &S, filter: LoanFilter, page: Option<Page>) -> Result<Vec<Loan>> {
        store.list_loans(filter, page.unwrap_or_else(|| self.config.default_page()))
    }

    pub fn get_installment<S: LedgerStore>(&self, store: &S, id: InstallmentId) -> Result<Installment> {
        store
            .get_installment(id)?
            .ok_or(LedgerError::InstallmentIdNotFound { id })
    }

    pub fn list_installments<S: LedgerStore>(
        &self,
        store: &S,
        filter: InstallmentFilter,
        page: Option<Page>,
    ) -> Result<Vec<Installment>> {
        store.list_installments(filter, page.unwrap_or_else(|| self.config.default_page()))
    }

    /// reschedule or re-flag an unpaid installment; settling goes through `apply_payment`
    pub fn update_installment<S: LedgerStore>(
        &self,
        store: &mut S,
        id: InstallmentId,
        patch: InstallmentPatch,
    ) -> Result<Installment> {
        if patch.status == Some(InstallmentStatus::Paid) {
            return Err(LedgerError::InvalidInstallmentUpdate {
                message: "installments are settled by applying a payment".to_string(),
            });
        }

        store.transaction(|tx| {
            let mut installment = tx
                .get_installment(id)?
                .ok_or(LedgerError::InstallmentIdNotFound { id })?;
            if installment.is_paid() {
                return Err(LedgerError::InstallmentAlreadyPaid { id });
            }

            if let Some(status) = patch.status {
                installment.status = status;
            }
            if let Some(due_date) = patch.due_date {
                installment.due_date = due_date;
            }

            tx.update_installment(&installment)?;
            info!(installment_id = %id, status = %installment.status, "installment updated");
            Ok(installment)
        })
    }

    pub fn balance_view<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<BalanceView> {
        let loan = self.get_loan(store, loan_id)?;
        let total_paid = store.sum_paid_installments(loan_id)?;

        Ok(BalanceView {
            loan_id,
            original_amount: loan.principal,
            balance: loan.principal.saturating_sub(total_paid),
            total_paid,
            status: loan.status,
        })
    }

    pub fn payment_summary<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<PaymentSummary> {
        let loan = self.get_loan(store, loan_id)?;
        let installments = self.installments_of(store, loan_id)?;
        Ok(PaymentSummary::from_installments(&loan, &installments))
    }

    fn installments_of<S: LedgerStore>(&self, store: &S, loan_id: LoanId) -> Result<Vec<Installment>> {
        store.list_installments(
            InstallmentFilter {
                loan_id: Some(loan_id),
                status: None,
            },
            Page::all(),
        )
    }
}

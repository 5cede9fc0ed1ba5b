use super::locks::LoanLocks;
use crate::config::BillingConfig;
use crate::domain::clock::{self, Clock};
use crate::domain::loan::{Loan, LoanRequest};
use crate::domain::money::Money;
use crate::domain::payment::{Payment, PaymentReceipt, Settlement};
use crate::domain::ports::BillingStoreBox;
use crate::domain::schedule::{self, Installment};
use crate::error::{BillingError, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// The billing service for fixed-installment weekly loans.
///
/// `BillingEngine` owns the storage backend and exposes the four billing
/// operations. Every operation that changes a loan holds that loan's lock for
/// its whole read-modify-write, and commits its writes through one atomic
/// store call.
pub struct BillingEngine {
    store: BillingStoreBox,
    clock: Arc<dyn Clock>,
    config: BillingConfig,
    locks: LoanLocks,
}

impl BillingEngine {
    /// Creates a new `BillingEngine` on the system clock.
    ///
    /// # Arguments
    ///
    /// * `store` - The backend holding loans, schedules and payments.
    /// * `config` - Loan defaults and the delinquency threshold.
    pub fn new(store: BillingStoreBox, config: BillingConfig) -> Self {
        Self::with_clock(store, config, Arc::new(clock::system_time()))
    }

    pub fn with_clock(store: BillingStoreBox, config: BillingConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
            locks: LoanLocks::new(),
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Creates a loan and its full weekly schedule.
    ///
    /// Omitted terms are taken from the configuration. The loan and every
    /// installment are persisted together or not at all.
    pub async fn create_loan(&self, request: LoanRequest) -> Result<(Loan, Vec<Installment>)> {
        let terms = request.resolve(&self.config)?;
        let _guard = self.locks.acquire(&request.loan_id).await;

        if self.store.get(&request.loan_id).await?.is_some() {
            return Err(BillingError::AlreadyExists(request.loan_id));
        }

        let loan = Loan::new(request.loan_id, &terms, self.clock.now());
        let installments = schedule::build_schedule(&loan, self.config.absorb_rounding_residual)?;
        self.store
            .open_loan(loan.clone(), installments.clone())
            .await?;

        info!(
            loan_id = %loan.loan_id,
            principal = %loan.principal,
            weekly_payment = %loan.weekly_payment,
            weeks = loan.duration_weeks,
            "loan created"
        );
        Ok((loan, installments))
    }

    /// Total owed (principal plus flat interest) minus everything paid so far.
    pub async fn get_outstanding(&self, loan_id: &str) -> Result<Money> {
        let loan = self.load_loan(loan_id).await?;
        self.outstanding_of(&loan).await
    }

    /// Checks the configured number of consecutive missed installments.
    pub async fn is_delinquent(&self, loan_id: &str) -> Result<bool> {
        self.is_delinquent_with(loan_id, self.config.delinquency_threshold)
            .await
    }

    pub async fn is_delinquent_with(&self, loan_id: &str, threshold: u32) -> Result<bool> {
        if threshold == 0 {
            return Err(BillingError::ValidationError(
                "Delinquency threshold must be positive".to_string(),
            ));
        }
        let loan = self.load_loan(loan_id).await?;
        if !loan.is_active() {
            return Err(BillingError::AlreadyClosed(loan.loan_id));
        }
        let installments = self.store.get_schedule(loan_id).await?;
        Ok(schedule::is_delinquent(
            &installments,
            self.clock.today(),
            threshold,
        ))
    }

    /// Applies a payment to the earliest unpaid installment.
    ///
    /// The amount must equal that installment's due amount exactly. Paying the
    /// last unpaid installment closes the loan.
    pub async fn make_payment(&self, loan_id: &str, amount: Decimal) -> Result<PaymentReceipt> {
        if amount <= Decimal::ZERO {
            return Err(BillingError::InvalidAmount {
                amount,
                reason: "must be positive".to_string(),
            });
        }

        let _guard = self.locks.acquire(loan_id).await;

        let mut loan = self.load_loan(loan_id).await?;
        if !loan.is_active() {
            return Err(BillingError::AlreadyClosed(loan.loan_id));
        }

        let installments = self.store.get_schedule(loan_id).await?;
        let installment = schedule::earliest_unpaid(&installments)
            .ok_or_else(|| BillingError::NoOutstandingBalance(loan_id.to_string()))?;

        if Money::new(amount) != installment.due_amount {
            return Err(BillingError::InvalidAmount {
                amount,
                reason: format!("expected exactly {}", installment.due_amount),
            });
        }

        let now = self.clock.now();
        let payment = Payment::new(loan_id, installment.due_amount, installment.week_number, now);
        let closes = schedule::settles_loan(&installments, installment.week_number);
        let closed_loan = closes.then(|| {
            loan.close(now);
            loan.clone()
        });

        self.store
            .settle(Settlement {
                payment: payment.clone(),
                closed_loan,
            })
            .await?;

        debug!(
            loan_id,
            week = payment.week_number,
            amount = %payment.amount,
            "payment applied"
        );
        if closes {
            info!(loan_id, "loan fully repaid and closed");
        }

        let outstanding = self.outstanding_of(&loan).await?;
        let delinquent = if loan.is_active() {
            let installments = self.store.get_schedule(loan_id).await?;
            schedule::is_delinquent(
                &installments,
                self.clock.today(),
                self.config.delinquency_threshold,
            )
        } else {
            false
        };

        Ok(PaymentReceipt {
            payment,
            outstanding,
            delinquent,
        })
    }

    /// Installments of a loan ordered by week.
    pub async fn schedule(&self, loan_id: &str) -> Result<Vec<Installment>> {
        self.load_loan(loan_id).await?;
        self.store.get_schedule(loan_id).await
    }

    /// Payment history of a loan ordered by week.
    pub async fn payments(&self, loan_id: &str) -> Result<Vec<Payment>> {
        self.load_loan(loan_id).await?;
        self.store.get_by_loan(loan_id).await
    }

    /// All loans ordered by loan id.
    pub async fn loans(&self) -> Result<Vec<Loan>> {
        let mut loans = self.store.get_all().await?;
        loans.sort_by(|a, b| a.loan_id.cmp(&b.loan_id));
        Ok(loans)
    }

    async fn load_loan(&self, loan_id: &str) -> Result<Loan> {
        self.store
            .get(loan_id)
            .await?
            .ok_or_else(|| BillingError::NotFound(loan_id.to_string()))
    }

    async fn outstanding_of(&self, loan: &Loan) -> Result<Money> {
        let paid = self.store.total_paid(&loan.loan_id).await?;
        Ok(loan.total_owed()? - paid)
    }
}

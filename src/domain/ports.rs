use super::loan::Loan;
use super::money::Money;
use super::payment::{Payment, Settlement};
use super::schedule::{Installment, InstallmentStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn create(&self, loan: Loan) -> Result<()>;
    async fn get(&self, loan_id: &str) -> Result<Option<Loan>>;
    async fn update(&self, loan: Loan) -> Result<()>;
    async fn get_all(&self) -> Result<Vec<Loan>>;
    async fn create_schedule_batch(&self, schedule: Vec<Installment>) -> Result<()>;
    /// Installments of a loan ordered by week number.
    async fn get_schedule(&self, loan_id: &str) -> Result<Vec<Installment>>;
    /// Unpaid installments of a loan due strictly before `today`, ordered by week.
    async fn get_overdue_schedule(&self, loan_id: &str, today: NaiveDate)
    -> Result<Vec<Installment>>;
    async fn update_installment_status(
        &self,
        loan_id: &str,
        week_number: u32,
        status: InstallmentStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create(&self, payment: Payment) -> Result<()>;
    /// Payment history of a loan ordered by week number.
    async fn get_by_loan(&self, loan_id: &str) -> Result<Vec<Payment>>;

    async fn total_paid(&self, loan_id: &str) -> Result<Money> {
        Ok(self.get_by_loan(loan_id).await?.iter().map(|p| p.amount).sum())
    }

    async fn latest(&self, loan_id: &str) -> Result<Option<Payment>> {
        Ok(self
            .get_by_loan(loan_id)
            .await?
            .into_iter()
            .max_by_key(|p| (p.paid_at, p.week_number)))
    }
}

/// Storage backend holding loans, schedules and payments together, so that
/// multi-record changes can be committed as one unit.
#[async_trait]
pub trait BillingStore: LoanStore + PaymentStore {
    /// Persists a new loan together with its full schedule, or nothing.
    ///
    /// Fails with `AlreadyExists` if the loan id is taken.
    async fn open_loan(&self, loan: Loan, schedule: Vec<Installment>) -> Result<()>;

    /// Applies every write of an accepted payment, or none of them.
    ///
    /// Rejects a second payment for the same loan and week.
    async fn settle(&self, settlement: Settlement) -> Result<()>;
}

pub type BillingStoreBox = Box<dyn BillingStore>;

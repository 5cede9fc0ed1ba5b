use async_trait::async_trait;
use billing_engine::domain::loan::Loan;
use billing_engine::domain::payment::{Payment, Settlement};
use billing_engine::domain::ports::{BillingStore, LoanStore, PaymentStore};
use billing_engine::domain::schedule::{Installment, InstallmentStatus};
use billing_engine::error::{BillingError, Result};
use billing_engine::infrastructure::in_memory::InMemoryBillingStore;
use chrono::NaiveDate;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Switches that make a `FlakyStore` fail on demand.
#[derive(Clone, Default)]
pub struct Faults {
    reads: Arc<AtomicBool>,
    schedule_reads: Arc<AtomicBool>,
    writes: Arc<AtomicBool>,
}

impl Faults {
    pub fn fail_reads(&self, on: bool) {
        self.reads.store(on, Ordering::SeqCst);
    }

    /// Fails only schedule reads, leaving loans and payments readable.
    pub fn fail_schedule_reads(&self, on: bool) {
        self.schedule_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.writes.store(on, Ordering::SeqCst);
    }

    fn read(&self) -> Result<()> {
        if self.reads.load(Ordering::SeqCst) {
            return Err(BillingError::persistence("read unavailable"));
        }
        Ok(())
    }

    fn schedule_read(&self) -> Result<()> {
        self.read()?;
        if self.schedule_reads.load(Ordering::SeqCst) {
            return Err(BillingError::persistence("schedule unavailable"));
        }
        Ok(())
    }

    fn write(&self) -> Result<()> {
        if self.writes.load(Ordering::SeqCst) {
            return Err(BillingError::persistence("write unavailable"));
        }
        Ok(())
    }
}

/// In-memory store whose reads or writes can be made to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryBillingStore,
    faults: Faults,
}

impl FlakyStore {
    pub fn with_faults() -> (Self, Faults) {
        let store = Self::default();
        let faults = store.faults.clone();
        (store, faults)
    }
}

#[async_trait]
impl LoanStore for FlakyStore {
    async fn create(&self, loan: Loan) -> Result<()> {
        self.faults.write()?;
        LoanStore::create(&self.inner, loan).await
    }

    async fn get(&self, loan_id: &str) -> Result<Option<Loan>> {
        self.faults.read()?;
        self.inner.get(loan_id).await
    }

    async fn update(&self, loan: Loan) -> Result<()> {
        self.faults.write()?;
        self.inner.update(loan).await
    }

    async fn get_all(&self) -> Result<Vec<Loan>> {
        self.faults.read()?;
        self.inner.get_all().await
    }

    async fn create_schedule_batch(&self, schedule: Vec<Installment>) -> Result<()> {
        self.faults.write()?;
        self.inner.create_schedule_batch(schedule).await
    }

    async fn get_schedule(&self, loan_id: &str) -> Result<Vec<Installment>> {
        self.faults.schedule_read()?;
        self.inner.get_schedule(loan_id).await
    }

    async fn get_overdue_schedule(
        &self,
        loan_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Installment>> {
        self.faults.schedule_read()?;
        self.inner.get_overdue_schedule(loan_id, today).await
    }

    async fn update_installment_status(
        &self,
        loan_id: &str,
        week_number: u32,
        status: InstallmentStatus,
    ) -> Result<()> {
        self.faults.write()?;
        self.inner
            .update_installment_status(loan_id, week_number, status)
            .await
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        self.faults.write()?;
        PaymentStore::create(&self.inner, payment).await
    }

    async fn get_by_loan(&self, loan_id: &str) -> Result<Vec<Payment>> {
        self.faults.read()?;
        self.inner.get_by_loan(loan_id).await
    }
}

#[async_trait]
impl BillingStore for FlakyStore {
    async fn open_loan(&self, loan: Loan, schedule: Vec<Installment>) -> Result<()> {
        self.faults.write()?;
        self.inner.open_loan(loan, schedule).await
    }

    async fn settle(&self, settlement: Settlement) -> Result<()> {
        self.faults.write()?;
        self.inner.settle(settlement).await
    }
}

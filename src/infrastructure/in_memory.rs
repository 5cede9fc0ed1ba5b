use crate::domain::loan::Loan;
use crate::domain::payment::{Payment, Settlement};
use crate::domain::ports::{BillingStore, LoanStore, PaymentStore};
use crate::domain::schedule::{self, Installment, InstallmentStatus};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    loans: HashMap<String, Loan>,
    /// Keyed by loan id, then week number.
    schedules: HashMap<String, BTreeMap<u32, Installment>>,
    /// Keyed by loan id, then week number; one payment per installment.
    payments: HashMap<String, BTreeMap<u32, Payment>>,
}

impl Tables {
    fn check_new_loan(&self, loan: &Loan) -> Result<()> {
        if self.loans.contains_key(&loan.loan_id) {
            return Err(BillingError::AlreadyExists(loan.loan_id.clone()));
        }
        Ok(())
    }

    fn check_schedule(&self, schedule: &[Installment], pending_loan: Option<&str>) -> Result<()> {
        let mut seen = HashSet::new();
        for installment in schedule {
            let known = self.loans.contains_key(&installment.loan_id)
                || pending_loan == Some(installment.loan_id.as_str());
            if !known {
                return Err(BillingError::persistence(format!(
                    "installment references unknown loan {}",
                    installment.loan_id
                )));
            }
            let existing = self
                .schedules
                .get(&installment.loan_id)
                .is_some_and(|weeks| weeks.contains_key(&installment.week_number));
            if existing || !seen.insert((&installment.loan_id, installment.week_number)) {
                return Err(BillingError::persistence(format!(
                    "duplicate installment for loan {} week {}",
                    installment.loan_id, installment.week_number
                )));
            }
        }
        Ok(())
    }

    fn check_installment(&self, loan_id: &str, week_number: u32) -> Result<()> {
        let exists = self
            .schedules
            .get(loan_id)
            .is_some_and(|weeks| weeks.contains_key(&week_number));
        if !exists {
            return Err(BillingError::persistence(format!(
                "no installment for loan {} week {}",
                loan_id, week_number
            )));
        }
        Ok(())
    }

    fn check_payment(&self, payment: &Payment) -> Result<()> {
        if !self.loans.contains_key(&payment.loan_id) {
            return Err(BillingError::NotFound(payment.loan_id.clone()));
        }
        let duplicate = self
            .payments
            .get(&payment.loan_id)
            .is_some_and(|weeks| weeks.contains_key(&payment.week_number));
        if duplicate {
            return Err(BillingError::persistence(format!(
                "payment for loan {} week {} already recorded",
                payment.loan_id, payment.week_number
            )));
        }
        Ok(())
    }

    fn check_loan_exists(&self, loan_id: &str) -> Result<()> {
        if !self.loans.contains_key(loan_id) {
            return Err(BillingError::NotFound(loan_id.to_string()));
        }
        Ok(())
    }

    fn insert_schedule(&mut self, schedule: Vec<Installment>) {
        for installment in schedule {
            self.schedules
                .entry(installment.loan_id.clone())
                .or_default()
                .insert(installment.week_number, installment);
        }
    }

    fn set_status(&mut self, loan_id: &str, week_number: u32, status: InstallmentStatus) {
        if let Some(installment) = self
            .schedules
            .get_mut(loan_id)
            .and_then(|weeks| weeks.get_mut(&week_number))
        {
            installment.status = status;
        }
    }

    fn insert_payment(&mut self, payment: Payment) {
        self.payments
            .entry(payment.loan_id.clone())
            .or_default()
            .insert(payment.week_number, payment);
    }
}

/// A thread-safe in-memory store for loans, schedules and payments.
///
/// All three tables sit behind one `Arc<RwLock<..>>`, so the multi-record
/// operations of [`BillingStore`] validate and apply under a single write
/// guard. Ideal for testing or for runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryBillingStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryBillingStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoanStore for InMemoryBillingStore {
    async fn create(&self, loan: Loan) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_new_loan(&loan)?;
        tables.loans.insert(loan.loan_id.clone(), loan);
        Ok(())
    }

    async fn get(&self, loan_id: &str) -> Result<Option<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.get(loan_id).cloned())
    }

    async fn update(&self, loan: Loan) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_loan_exists(&loan.loan_id)?;
        tables.loans.insert(loan.loan_id.clone(), loan);
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.values().cloned().collect())
    }

    async fn create_schedule_batch(&self, schedule: Vec<Installment>) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_schedule(&schedule, None)?;
        tables.insert_schedule(schedule);
        Ok(())
    }

    async fn get_schedule(&self, loan_id: &str) -> Result<Vec<Installment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .schedules
            .get(loan_id)
            .map(|weeks| weeks.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_overdue_schedule(
        &self,
        loan_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Installment>> {
        let tables = self.tables.read().await;
        let installments: Vec<Installment> = tables
            .schedules
            .get(loan_id)
            .map(|weeks| weeks.values().cloned().collect())
            .unwrap_or_default();
        Ok(schedule::past_due(&installments, today))
    }

    async fn update_installment_status(
        &self,
        loan_id: &str,
        week_number: u32,
        status: InstallmentStatus,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_installment(loan_id, week_number)?;
        tables.set_status(loan_id, week_number, status);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryBillingStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_payment(&payment)?;
        tables.insert_payment(payment);
        Ok(())
    }

    async fn get_by_loan(&self, loan_id: &str) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .get(loan_id)
            .map(|weeks| weeks.values().cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn open_loan(&self, loan: Loan, schedule: Vec<Installment>) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.check_new_loan(&loan)?;
        tables.check_schedule(&schedule, Some(&loan.loan_id))?;
        tables.loans.insert(loan.loan_id.clone(), loan);
        tables.insert_schedule(schedule);
        Ok(())
    }

    async fn settle(&self, settlement: Settlement) -> Result<()> {
        let Settlement {
            payment,
            closed_loan,
        } = settlement;

        let mut tables = self.tables.write().await;
        tables.check_payment(&payment)?;
        tables.check_installment(&payment.loan_id, payment.week_number)?;
        if let Some(loan) = &closed_loan {
            tables.check_loan_exists(&loan.loan_id)?;
        }

        tables.set_status(
            &payment.loan_id,
            payment.week_number,
            InstallmentStatus::Paid,
        );
        tables.insert_payment(payment);
        if let Some(loan) = closed_loan {
            tables.loans.insert(loan.loan_id.clone(), loan);
        }
        Ok(())
    }
}

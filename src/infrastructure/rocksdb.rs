use crate::domain::loan::Loan;
use crate::domain::payment::{Payment, Settlement};
use crate::domain::ports::{BillingStore, LoanStore, PaymentStore};
use crate::domain::schedule::{self, Installment, InstallmentStatus};
use crate::error::{BillingError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing loans.
pub const CF_LOANS: &str = "loans";
/// Column Family for storing schedule installments.
pub const CF_SCHEDULES: &str = "schedules";
/// Column Family for storing payment history.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent store implementation using RocksDB.
///
/// Loans, installments and payments live in separate Column Families.
/// Installments and payments are keyed by `len(loan_id) loan_id week`, with
/// the length and week as big-endian `u32`, so a loan's records are contiguous,
/// ordered by week, and never share a prefix with another loan's.
///
/// Multi-record operations validate under a store-wide writer lock and commit
/// through a single `WriteBatch`. This struct is thread-safe (`Clone` shares
/// the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

fn loan_prefix(loan_id: &str) -> Vec<u8> {
    let id = loan_id.as_bytes();
    let mut key = Vec::with_capacity(id.len() + 8);
    // Ids are bounded by memory, far below u32::MAX bytes.
    key.extend_from_slice(&(id.len() as u32).to_be_bytes());
    key.extend_from_slice(id);
    key
}

fn week_key(loan_id: &str, week_number: u32) -> Vec<u8> {
    let mut key = loan_prefix(loan_id);
    key.extend_from_slice(&week_number.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(bytes)?)
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [CF_LOANS, CF_SCHEDULES, CF_PAYMENTS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BillingError::persistence(format!("{} column family not found", name))
        })
    }

    fn read<T: DeserializeOwned>(&self, family: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn exists(&self, family: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(family)?;
        Ok(self.db.get_pinned_cf(cf, key)?.is_some())
    }

    /// Every record of one loan in a week-keyed family, in week order.
    fn scan_loan<T: DeserializeOwned>(&self, family: &str, loan_id: &str) -> Result<Vec<T>> {
        let cf = self.cf(family)?;
        let prefix = loan_prefix(loan_id);
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            records.push(decode(&value)?);
        }
        Ok(records)
    }

    fn stage_loan(&self, batch: &mut WriteBatch, loan: &Loan) -> Result<()> {
        batch.put_cf(self.cf(CF_LOANS)?, loan.loan_id.as_bytes(), encode(loan)?);
        Ok(())
    }

    fn stage_installment(&self, batch: &mut WriteBatch, installment: &Installment) -> Result<()> {
        batch.put_cf(
            self.cf(CF_SCHEDULES)?,
            week_key(&installment.loan_id, installment.week_number),
            encode(installment)?,
        );
        Ok(())
    }

    fn stage_payment(&self, batch: &mut WriteBatch, payment: &Payment) -> Result<()> {
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            week_key(&payment.loan_id, payment.week_number),
            encode(payment)?,
        );
        Ok(())
    }

    fn check_schedule(&self, schedule: &[Installment], pending_loan: Option<&str>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for installment in schedule {
            let known = pending_loan == Some(installment.loan_id.as_str())
                || self.exists(CF_LOANS, installment.loan_id.as_bytes())?;
            if !known {
                return Err(BillingError::persistence(format!(
                    "installment references unknown loan {}",
                    installment.loan_id
                )));
            }
            let key = week_key(&installment.loan_id, installment.week_number);
            if self.exists(CF_SCHEDULES, &key)? || !seen.insert(key) {
                return Err(BillingError::persistence(format!(
                    "duplicate installment for loan {} week {}",
                    installment.loan_id, installment.week_number
                )));
            }
        }
        Ok(())
    }

    fn check_payment(&self, payment: &Payment) -> Result<()> {
        if !self.exists(CF_LOANS, payment.loan_id.as_bytes())? {
            return Err(BillingError::NotFound(payment.loan_id.clone()));
        }
        if self.exists(CF_PAYMENTS, &week_key(&payment.loan_id, payment.week_number))? {
            return Err(BillingError::persistence(format!(
                "payment for loan {} week {} already recorded",
                payment.loan_id, payment.week_number
            )));
        }
        Ok(())
    }

    fn installment(&self, loan_id: &str, week_number: u32) -> Result<Installment> {
        self.read(CF_SCHEDULES, &week_key(loan_id, week_number))?
            .ok_or_else(|| {
                BillingError::persistence(format!(
                    "no installment for loan {} week {}",
                    loan_id, week_number
                ))
            })
    }
}

#[async_trait]
impl LoanStore for RocksDBStore {
    async fn create(&self, loan: Loan) -> Result<()> {
        let _writer = self.writer.lock().await;
        if self.exists(CF_LOANS, loan.loan_id.as_bytes())? {
            return Err(BillingError::AlreadyExists(loan.loan_id));
        }
        let mut batch = WriteBatch::default();
        self.stage_loan(&mut batch, &loan)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, loan_id: &str) -> Result<Option<Loan>> {
        self.read(CF_LOANS, loan_id.as_bytes())
    }

    async fn update(&self, loan: Loan) -> Result<()> {
        let _writer = self.writer.lock().await;
        if !self.exists(CF_LOANS, loan.loan_id.as_bytes())? {
            return Err(BillingError::NotFound(loan.loan_id));
        }
        let mut batch = WriteBatch::default();
        self.stage_loan(&mut batch, &loan)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Loan>> {
        let cf = self.cf(CF_LOANS)?;
        let mut loans = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            loans.push(decode(&value)?);
        }
        Ok(loans)
    }

    async fn create_schedule_batch(&self, schedule: Vec<Installment>) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.check_schedule(&schedule, None)?;
        let mut batch = WriteBatch::default();
        for installment in &schedule {
            self.stage_installment(&mut batch, installment)?;
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_schedule(&self, loan_id: &str) -> Result<Vec<Installment>> {
        self.scan_loan(CF_SCHEDULES, loan_id)
    }

    async fn get_overdue_schedule(
        &self,
        loan_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<Installment>> {
        let installments: Vec<Installment> = self.scan_loan(CF_SCHEDULES, loan_id)?;
        Ok(schedule::past_due(&installments, today))
    }

    async fn update_installment_status(
        &self,
        loan_id: &str,
        week_number: u32,
        status: InstallmentStatus,
    ) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut installment = self.installment(loan_id, week_number)?;
        installment.status = status;
        let mut batch = WriteBatch::default();
        self.stage_installment(&mut batch, &installment)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create(&self, payment: Payment) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.check_payment(&payment)?;
        let mut batch = WriteBatch::default();
        self.stage_payment(&mut batch, &payment)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get_by_loan(&self, loan_id: &str) -> Result<Vec<Payment>> {
        self.scan_loan(CF_PAYMENTS, loan_id)
    }
}

#[async_trait]
impl BillingStore for RocksDBStore {
    async fn open_loan(&self, loan: Loan, schedule: Vec<Installment>) -> Result<()> {
        let _writer = self.writer.lock().await;
        if self.exists(CF_LOANS, loan.loan_id.as_bytes())? {
            return Err(BillingError::AlreadyExists(loan.loan_id));
        }
        self.check_schedule(&schedule, Some(&loan.loan_id))?;

        let mut batch = WriteBatch::default();
        self.stage_loan(&mut batch, &loan)?;
        for installment in &schedule {
            self.stage_installment(&mut batch, installment)?;
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn settle(&self, settlement: Settlement) -> Result<()> {
        let Settlement {
            payment,
            closed_loan,
        } = settlement;

        let _writer = self.writer.lock().await;
        self.check_payment(&payment)?;
        let mut installment = self.installment(&payment.loan_id, payment.week_number)?;
        installment.status = InstallmentStatus::Paid;

        let mut batch = WriteBatch::default();
        self.stage_payment(&mut batch, &payment)?;
        self.stage_installment(&mut batch, &installment)?;
        if let Some(loan) = &closed_loan {
            self.stage_loan(&mut batch, loan)?;
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loan::{LoanStatus, LoanTerms};
    use crate::domain::money::Money;
    use crate::domain::schedule::build_schedule;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn sample_loan(loan_id: &str) -> Loan {
        let terms = LoanTerms::new(Money::new(dec!(300)), dec!(0), 3).unwrap();
        Loan::new(loan_id, &terms, Utc::now())
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_LOANS).is_some());
        assert!(store.db.cf_handle(CF_SCHEDULES).is_some());
        assert!(store.db.cf_handle(CF_PAYMENTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_loan_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let loan = sample_loan("L1");

        LoanStore::create(&store, loan.clone()).await.unwrap();
        assert_eq!(store.get("L1").await.unwrap().unwrap(), loan);
        assert!(store.get("L2").await.unwrap().is_none());
        assert!(matches!(
            LoanStore::create(&store, loan.clone()).await,
            Err(BillingError::AlreadyExists(_))
        ));

        let all = store.get_all().await.unwrap();
        assert_eq!(all, vec![loan]);
    }

    #[tokio::test]
    async fn test_rocksdb_schedules_do_not_bleed_between_loans() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        // "L1" is a byte prefix of "L10".
        for id in ["L1", "L10"] {
            let loan = sample_loan(id);
            store
                .open_loan(loan.clone(), build_schedule(&loan, false).unwrap())
                .await
                .unwrap();
        }

        let schedule = store.get_schedule("L1").await.unwrap();
        assert_eq!(schedule.len(), 3);
        assert!(schedule.iter().all(|i| i.loan_id == "L1"));
        assert_eq!(
            schedule.iter().map(|i| i.week_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_rocksdb_keys_do_not_alias_across_loan_ids() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let loan = sample_loan("A");
        store
            .open_loan(loan.clone(), build_schedule(&loan, false).unwrap())
            .await
            .unwrap();

        assert!(store.get_schedule("A\0").await.unwrap().is_empty());
        assert!(store.get_schedule("").await.unwrap().is_empty());
        assert_eq!(store.get_schedule("A").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rocksdb_overdue_schedule() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let created = NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        let terms = LoanTerms::new(Money::new(dec!(300)), dec!(0), 3).unwrap();
        let loan = Loan::new("L1", &terms, created);
        store
            .open_loan(loan.clone(), build_schedule(&loan, false).unwrap())
            .await
            .unwrap();
        store
            .update_installment_status("L1", 1, InstallmentStatus::Paid)
            .await
            .unwrap();

        // Week 2 is past due, week 3 (Jan 22) is due today.
        let today = NaiveDate::from_ymd_opt(2025, 1, 22).unwrap();
        let overdue = store.get_overdue_schedule("L1", today).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].week_number, 2);
        assert!(store.get_overdue_schedule("L2", today).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rocksdb_settle_and_reopen() {
        let dir = tempdir().unwrap();
        let loan = sample_loan("L1");
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            store
                .open_loan(loan.clone(), build_schedule(&loan, false).unwrap())
                .await
                .unwrap();

            let mut closed = loan.clone();
            closed.status = LoanStatus::Closed;
            store
                .settle(Settlement {
                    payment: Payment::new("L1", Money::new(dec!(100)), 1, Utc::now()),
                    closed_loan: Some(closed),
                })
                .await
                .unwrap();

            let duplicate = store
                .settle(Settlement {
                    payment: Payment::new("L1", Money::new(dec!(100)), 1, Utc::now()),
                    closed_loan: None,
                })
                .await;
            assert!(matches!(duplicate, Err(BillingError::PersistenceError(_))));
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert_eq!(
            store.get("L1").await.unwrap().unwrap().status,
            LoanStatus::Closed
        );
        assert_eq!(store.get_by_loan("L1").await.unwrap().len(), 1);
        assert_eq!(
            store.get_schedule("L1").await.unwrap()[0].status,
            InstallmentStatus::Paid
        );
        assert_eq!(store.total_paid("L1").await.unwrap(), Money::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_rocksdb_installment_status_update() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let loan = sample_loan("L1");
        LoanStore::create(&store, loan.clone()).await.unwrap();
        store
            .create_schedule_batch(build_schedule(&loan, false).unwrap())
            .await
            .unwrap();

        store
            .update_installment_status("L1", 3, InstallmentStatus::Overdue)
            .await
            .unwrap();
        assert_eq!(
            store.get_schedule("L1").await.unwrap()[2].status,
            InstallmentStatus::Overdue
        );
        assert!(
            store
                .update_installment_status("L1", 4, InstallmentStatus::Paid)
                .await
                .is_err()
        );
    }
}

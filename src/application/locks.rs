use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per loan id.
///
/// Holding the guard serializes every read-modify-write against that loan
/// within this process. Entries are never evicted; loans are never deleted
/// either, so the registry is bounded by the number of loans.
#[derive(Default)]
pub struct LoanLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LoanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, loan_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(loan_id.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

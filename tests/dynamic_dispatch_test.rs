use billing_engine::domain::loan::{Loan, LoanTerms};
use billing_engine::domain::money::Money;
use billing_engine::domain::payment::{Payment, Settlement};
use billing_engine::domain::ports::BillingStoreBox;
use billing_engine::domain::schedule::{InstallmentStatus, build_schedule};
use billing_engine::infrastructure::in_memory::InMemoryBillingStore;
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_store_as_trait_object() {
    let store: Arc<BillingStoreBox> = Arc::new(Box::new(InMemoryBillingStore::new()));

    let terms = LoanTerms::new(Money::new(dec!(200)), dec!(0), 2).unwrap();
    let loan = Loan::new("1", &terms, Utc::now());
    let schedule = build_schedule(&loan, false).unwrap();

    // Verify Send + Sync by spawning tasks
    let writer = store.clone();
    let handle = tokio::spawn(async move {
        writer.open_loan(loan, schedule).await.unwrap();
        writer
            .settle(Settlement {
                payment: Payment::new("1", Money::new(dec!(100)), 1, Utc::now()),
                closed_loan: None,
            })
            .await
            .unwrap();
    });
    handle.await.unwrap();

    let reader = store.clone();
    let (installments, latest) = tokio::spawn(async move {
        (
            reader.get_schedule("1").await.unwrap(),
            reader.latest("1").await.unwrap(),
        )
    })
    .await
    .unwrap();

    assert_eq!(installments[0].status, InstallmentStatus::Paid);
    assert_eq!(installments[1].status, InstallmentStatus::Pending);
    assert_eq!(latest.unwrap().week_number, 1);
    assert_eq!(store.total_paid("1").await.unwrap(), Money::new(dec!(100)));
}

use billing_engine::domain::loan::{Loan, LoanTerms};
use billing_engine::domain::money::Money;
use billing_engine::domain::schedule::{InstallmentStatus, build_schedule, is_delinquent};
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal_macros::dec;

/// Longest run of unpaid installments among those due strictly before `today`.
fn longest_missed_run(statuses: &[(NaiveDate, InstallmentStatus)], today: NaiveDate) -> u32 {
    let mut longest = 0;
    let mut run = 0;
    for (due, status) in statuses {
        if *due >= today {
            break;
        }
        if *status == InstallmentStatus::Paid {
            run = 0;
        } else {
            run += 1;
            longest = longest.max(run);
        }
    }
    longest
}

#[test]
fn test_delinquency_matches_longest_missed_run() {
    let mut rng = StdRng::seed_from_u64(0x10a2);
    let created = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

    for _ in 0..500 {
        let weeks = rng.gen_range(1..=30);
        let terms = LoanTerms::new(Money::new(dec!(1000)), dec!(0.10), weeks).unwrap();
        let loan = Loan::new("P", &terms, created.and_hms_opt(9, 0, 0).unwrap().and_utc());
        let mut installments = build_schedule(&loan, false).unwrap();

        for installment in &mut installments {
            installment.status = match rng.gen_range(0..3) {
                0 => InstallmentStatus::Paid,
                1 => InstallmentStatus::Pending,
                _ => InstallmentStatus::Overdue,
            };
        }
        let expected: Vec<_> = installments
            .iter()
            .map(|i| (i.due_date, i.status))
            .collect();

        installments.shuffle(&mut rng);
        let today = created + Duration::days(rng.gen_range(0..=7 * i64::from(weeks) + 14));
        let threshold = rng.gen_range(1..=4);

        assert_eq!(
            is_delinquent(&installments, today, threshold),
            longest_missed_run(&expected, today) >= threshold,
            "weeks={weeks} today={today} threshold={threshold} statuses={expected:?}"
        );
    }
}

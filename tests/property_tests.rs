//! Property tests for balance and allocation invariants

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use proptest::prelude::*;
use ledger_core::{
    AccountType, Counterparty, EntryType, JournalEntryBuilder, Ledger, LedgerError, MemoryCatalog,
    MemoryStorage, NewSubledgerTransaction, Subledger, TransactionType,
};

fn cents(value: i64) -> BigDecimal {
    BigDecimal::new(value.into(), 2)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

const CHART: [(&str, AccountType); 5] = [
    ("1000", AccountType::Asset),
    ("2000", AccountType::Liability),
    ("3000", AccountType::Equity),
    ("4000", AccountType::Income),
    ("5000", AccountType::Expense),
];

/// (debit account, credit account, amount in cents, day of year)
fn entry_strategy() -> impl Strategy<Value = (usize, usize, i64, u32)> {
    (0..CHART.len(), 0..CHART.len(), 1i64..1_000_000, 1u32..=365)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn posted_entries_keep_the_ledger_balanced(entries in prop::collection::vec(entry_strategy(), 1..25)) {
        runtime().block_on(async {
            let ledger = Ledger::new(MemoryStorage::new(), "acme");
            let mut ids = Vec::new();
            for (code, account_type) in CHART {
                let account = ledger
                    .create_account(code.into(), code.into(), account_type, None)
                    .await
                    .unwrap();
                ids.push(account.id);
            }
            ledger
                .create_period("FY2024".into(), date(2024, 1, 1), date(2024, 12, 31), 2024)
                .await
                .unwrap();

            for (i, (debit, credit, value, day)) in entries.iter().enumerate() {
                let on = date(2024, 1, 1) + chrono::Duration::days(i64::from(*day) - 1);
                let request = JournalEntryBuilder::new(format!("JE-{}", i), on)
                    .debit(ids[*debit].clone(), cents(*value), None)
                    .credit(ids[*credit].clone(), cents(*value), None)
                    .build()
                    .unwrap();
                ledger.post(request).await.unwrap();
            }

            let trial_balance = ledger.trial_balance(date(2024, 12, 31)).await.unwrap();
            assert!(trial_balance.is_balanced);
            let posted: BigDecimal = entries.iter().map(|(_, _, value, _)| cents(*value)).sum();
            assert!(trial_balance.total_debits <= posted);

            for id in &ids {
                let account = ledger.get_account(id).await.unwrap().unwrap();
                assert_eq!(ledger.recompute_balance(id).await.unwrap(), account.balance);
            }

            // Reversing every entry brings all balances back to zero
            for i in 0..entries.len() {
                ledger
                    .reverse(&format!("JE-{}", i), date(2024, 12, 31), None)
                    .await
                    .unwrap();
            }
            for id in &ids {
                let account = ledger.get_account(id).await.unwrap().unwrap();
                assert_eq!(account.balance, BigDecimal::from(0));
            }
        });
    }

    #[test]
    fn allocations_stay_within_amounts(
        invoices in prop::collection::vec(1i64..50_000, 1..5),
        payments in prop::collection::vec(1i64..50_000, 1..5),
        attempts in prop::collection::vec((0usize..5, 0usize..5, 1i64..60_000), 1..30),
    ) {
        runtime().block_on(async {
            let catalog = MemoryCatalog::new();
            let ledger = Ledger::with_collaborators(
                MemoryStorage::new(),
                "acme",
                Arc::new(catalog.clone()),
                Arc::new(catalog.clone()),
            );
            let chart = ledger.setup_standard_chart().await.unwrap();
            ledger
                .create_period("FY2024".into(), date(2024, 1, 1), date(2024, 12, 31), 2024)
                .await
                .unwrap();
            catalog
                .add_counterparty(
                    "acme",
                    Counterparty {
                        id: "CUST-1".into(),
                        subledger: Subledger::Receivables,
                        code: "CUST-1".into(),
                        name: "Northwind".into(),
                        is_active: true,
                        control_account_id: None,
                    },
                )
                .unwrap();
            for (id, offset, effect) in [
                ("INV", "sales_revenue", EntryType::Debit),
                ("PAY", "bank", EntryType::Credit),
            ] {
                catalog
                    .add_transaction_type(
                        "acme",
                        TransactionType {
                            id: id.into(),
                            subledger: Subledger::Receivables,
                            code: id.into(),
                            name: id.into(),
                            control_account_id: chart["accounts_receivable"].id.clone(),
                            offset_account_id: chart[offset].id.clone(),
                            affects_balance: effect,
                            is_payment: id == "PAY",
                            is_active: true,
                        },
                    )
                    .unwrap();
            }

            let post = |type_id: &'static str, value: i64| {
                let ledger = ledger.clone();
                async move {
                    let staged = ledger
                        .create_transaction(
                            Subledger::Receivables,
                            NewSubledgerTransaction {
                                counterparty_id: "CUST-1".into(),
                                transaction_type_id: type_id.into(),
                                date: date(2024, 4, 1),
                                amount: cents(value),
                                due_date: None,
                                reference: None,
                                description: None,
                            },
                        )
                        .await
                        .unwrap();
                    ledger.post_transaction(&staged.id).await.unwrap();
                    staged.id
                }
            };
            let mut debit_ids = Vec::new();
            for value in &invoices {
                debit_ids.push(post("INV", *value).await);
            }
            let mut credit_ids = Vec::new();
            for value in &payments {
                credit_ids.push(post("PAY", *value).await);
            }

            let mut accepted = BigDecimal::from(0);
            for &(debit, credit, value) in &attempts {
                let debit_id = &debit_ids[debit % debit_ids.len()];
                let credit_id = &credit_ids[credit % credit_ids.len()];
                match ledger.allocate(debit_id, credit_id, &cents(value)).await {
                    Ok(allocation) => accepted += allocation.amount,
                    Err(e) => assert!(
                        matches!(e, LedgerError::AmountExceedsOutstanding { .. }),
                        "{e}"
                    ),
                }
            }

            let mut allocated_debits = BigDecimal::from(0);
            for id in &debit_ids {
                let txn = ledger.get_transaction(id).await.unwrap().unwrap();
                assert!(txn.allocated >= BigDecimal::from(0));
                assert!(txn.allocated <= txn.amount);
                allocated_debits += txn.allocated;
            }
            for id in &credit_ids {
                let txn = ledger.get_transaction(id).await.unwrap().unwrap();
                assert!(txn.allocated >= BigDecimal::from(0));
                assert!(txn.allocated <= txn.amount);
            }
            assert_eq!(allocated_debits, accepted);
            assert!(ledger.verify_integrity(date(2024, 12, 31)).await.unwrap().is_valid);
        });
    }
}

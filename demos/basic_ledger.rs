//! Basic ledger usage example

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use ledger_core::{
    Counterparty, EntryType, JournalEntryBuilder, Ledger, MemoryCatalog, MemoryStorage,
    NewSubledgerTransaction, Subledger, TransactionType,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ledger_core::init_tracing();
    println!("🧾 Ledger Core - Basic Ledger Example\n");

    // Create a new ledger with in-memory storage and master data
    let catalog = MemoryCatalog::new();
    let ledger = Ledger::with_collaborators(
        MemoryStorage::new(),
        "acme",
        Arc::new(catalog.clone()),
        Arc::new(catalog.clone()),
    );

    // 1. Set up a basic chart of accounts and the first quarter
    println!("📊 Setting up Chart of Accounts...");
    let accounts = ledger.setup_standard_chart().await?;
    for account in ledger.list_accounts(None).await? {
        println!(
            "  ✓ Created account: {} - {} ({:?})",
            account.code, account.name, account.account_type
        );
    }

    let january = ledger
        .create_period(
            "2024-01".to_string(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            2024,
        )
        .await?;
    ledger
        .create_period(
            "2024-02".to_string(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            2024,
        )
        .await?;
    println!();

    // 2. Record some general ledger entries
    println!("💰 Recording Journal Entries...\n");

    let investment = JournalEntryBuilder::new("JE-0001", NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        .description("Initial owner investment")
        .debit(accounts["cash"].id.clone(), BigDecimal::from(50000), None)
        .credit(accounts["owners_equity"].id.clone(), BigDecimal::from(50000), None)
        .build()?;
    ledger.post(investment).await?;
    println!("  ✓ Posted: Owner investment of 50,000");

    let rent = JournalEntryBuilder::new("JE-0002", NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        .description("Monthly rent payment")
        .debit(accounts["rent_expense"].id.clone(), BigDecimal::from(8000), None)
        .credit(accounts["cash"].id.clone(), BigDecimal::from(8000), None)
        .build()?;
    ledger.post(rent).await?;
    println!("  ✓ Posted: Rent payment of 8,000");

    // Posted by mistake, then reversed
    let mistake = JournalEntryBuilder::new("JE-0003", NaiveDate::from_ymd_opt(2024, 1, 20).unwrap())
        .description("Duplicate rent payment")
        .debit(accounts["rent_expense"].id.clone(), BigDecimal::from(8000), None)
        .credit(accounts["cash"].id.clone(), BigDecimal::from(8000), None)
        .build()?;
    ledger.post(mistake).await?;
    let reversal = ledger
        .reverse(
            "JE-0003",
            NaiveDate::from_ymd_opt(2024, 1, 21).unwrap(),
            Some("Duplicate".to_string()),
        )
        .await?;
    println!("  ✓ Reversed JE-0003 with {}", reversal.entry_id);

    ledger.close_period(&january.id).await?;
    println!("  🔒 Closed period {}", january.name);

    // 3. Receivables: invoice a customer and apply a partial payment
    println!("\n🧾 Processing Receivables...");
    catalog.add_counterparty(
        "acme",
        Counterparty {
            id: "CUST-001".to_string(),
            subledger: Subledger::Receivables,
            code: "CUST-001".to_string(),
            name: "Northwind Traders".to_string(),
            is_active: true,
            control_account_id: None,
        },
    )?;
    catalog.add_transaction_type(
        "acme",
        TransactionType {
            id: "INV".to_string(),
            subledger: Subledger::Receivables,
            code: "INV".to_string(),
            name: "Sales invoice".to_string(),
            control_account_id: accounts["accounts_receivable"].id.clone(),
            offset_account_id: accounts["sales_revenue"].id.clone(),
            affects_balance: EntryType::Debit,
            is_payment: false,
            is_active: true,
        },
    )?;
    catalog.add_transaction_type(
        "acme",
        TransactionType {
            id: "RCPT".to_string(),
            subledger: Subledger::Receivables,
            code: "RCPT".to_string(),
            name: "Customer receipt".to_string(),
            control_account_id: accounts["accounts_receivable"].id.clone(),
            offset_account_id: accounts["bank"].id.clone(),
            affects_balance: EntryType::Credit,
            is_payment: true,
            is_active: true,
        },
    )?;

    let invoice = ledger
        .create_transaction(
            Subledger::Receivables,
            NewSubledgerTransaction {
                counterparty_id: "CUST-001".to_string(),
                transaction_type_id: "INV".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                amount: BigDecimal::from(11800),
                due_date: NaiveDate::from_ymd_opt(2024, 2, 15),
                reference: Some("SO-1001".to_string()),
                description: None,
            },
        )
        .await?;
    let entry = ledger.post_transaction(&invoice.id).await?;
    println!("  ✓ Invoice {} posted as {}", invoice.transaction_number, entry.entry_id);

    let receipt = ledger
        .create_transaction(
            Subledger::Receivables,
            NewSubledgerTransaction {
                counterparty_id: "CUST-001".to_string(),
                transaction_type_id: "RCPT".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
                amount: BigDecimal::from(5000),
                due_date: None,
                reference: None,
                description: None,
            },
        )
        .await?;
    ledger.post_transaction(&receipt.id).await?;
    ledger
        .allocate(&invoice.id, &receipt.id, &BigDecimal::from(5000))
        .await?;
    println!("  ✓ Receipt {} allocated to {}", receipt.transaction_number, invoice.transaction_number);

    let ageing = ledger
        .ageing(
            Subledger::Receivables,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            None,
        )
        .await?;
    for row in &ageing.rows {
        println!(
            "  {} - current {} | 1-30 {} | 31-60 {} | total {}",
            row.counterparty_name.as_deref().unwrap_or(&row.counterparty_id),
            row.current,
            row.days_30,
            row.days_60,
            row.total
        );
    }

    // 4. Generate reports
    println!("\n📈 Generating Reports...\n");

    let trial_balance = ledger
        .trial_balance(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        .await?;

    println!("🔍 Trial Balance as of February 29, 2024:");
    for row in &trial_balance.balances {
        if let Some(debit) = &row.debit_balance {
            println!("  {} {:<22} Dr {}", row.code, row.name, debit);
        } else if let Some(credit) = &row.credit_balance {
            println!("  {} {:<22} Cr {}", row.code, row.name, credit);
        }
    }
    println!("  Total Debits:  {}", trial_balance.total_debits);
    println!("  Total Credits: {}", trial_balance.total_credits);
    println!(
        "  Balanced: {}",
        if trial_balance.is_balanced {
            "✅ Yes"
        } else {
            "❌ No"
        }
    );

    let cash = ledger
        .ledger_detail(
            &accounts["cash"].id,
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .await?;
    println!("\n📒 Cash ledger for January 2024:");
    for line in &cash.lines {
        println!(
            "  {} {:<12} Dr {:>8} Cr {:>8} = {}",
            line.date, line.entry_id, line.debit, line.credit, line.running_balance
        );
    }

    // 5. Validate ledger integrity
    println!("\n🔍 Validating Ledger Integrity...");
    let integrity_report = ledger
        .verify_integrity(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        .await?;

    if integrity_report.is_valid {
        println!("  ✅ Ledger integrity check passed!");
    } else {
        println!("  ❌ Ledger integrity check failed:");
        for issue in &integrity_report.issues {
            println!("    - {}", issue);
        }
    }

    println!("\n🎉 Example completed successfully!");
    Ok(())
}

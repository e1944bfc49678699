//! # Ledger Core
//!
//! Double-entry general ledger with accounts receivable and payable
//! sub-ledgers, accounting periods, reversals and allocation of payments
//! against invoices.
//!
//! ## Features
//!
//! - **Chart of accounts**: hierarchical accounts with soft deactivation
//! - **Posting engine**: balanced, atomic journal entries with period locking
//! - **Sub-ledgers**: AR/AP transactions posted to control accounts
//! - **Allocations**: partial payments that can never over-allocate
//! - **Reversals**: mirror-image entries with an append-only audit trail
//! - **Reporting**: trial balance, ledger detail and ageing, derived from history
//! - **Storage abstraction**: async trait-based storage, in-memory backend included
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_core::{AccountType, JournalEntryBuilder, Ledger, MemoryStorage};
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), ledger_core::LedgerError> {
//! let ledger = Ledger::new(MemoryStorage::new(), "acme");
//! let cash = ledger
//!     .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
//!     .await?;
//! let sales = ledger
//!     .create_account("4000".into(), "Sales".into(), AccountType::Income, None)
//!     .await?;
//! let jan_1 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let jan_31 = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
//! ledger.create_period("Jan 2024".into(), jan_1, jan_31, 2024).await?;
//!
//! let request = JournalEntryBuilder::new("JE-1", jan_1)
//!     .debit(cash.id.clone(), BigDecimal::from(100), None)
//!     .credit(sales.id.clone(), BigDecimal::from(100), None)
//!     .build()?;
//! ledger.post(request).await?;
//!
//! assert!(ledger.trial_balance(jan_31).await?.is_balanced);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod ledger;
pub mod subledger;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use config::*;
pub use ledger::*;
pub use subledger::*;
pub use traits::*;
pub use types::*;
pub use utils::{init_tracing, MemoryCatalog, MemoryStorage, StrictAccountValidator, StrictJournalValidator};

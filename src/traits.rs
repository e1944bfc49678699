//! Traits for storage abstraction and extensibility

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

use crate::types::*;

/// Balance change for one account inside a posting commit
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceDelta {
    pub account_id: String,
    /// Already signed by the account's normal side
    pub signed_amount: BigDecimal,
}

/// Change to a sub-ledger transaction that must land with a posting
#[derive(Debug, Clone, PartialEq)]
pub enum SubledgerLink {
    /// Mark the transaction posted and link it to the new entry
    Post {
        transaction_id: String,
        expected_version: u64,
    },
    /// Return the transaction to the unposted state after a reversal
    Reset {
        transaction_id: String,
        expected_version: u64,
    },
}

/// Everything a single posting writes, applied all-or-nothing
#[derive(Debug, Clone, PartialEq)]
pub struct PostingCommit {
    /// Entry to append; storage assigns `sequence`
    pub entry: JournalEntry,
    pub deltas: Vec<BalanceDelta>,
    pub link: Option<SubledgerLink>,
    /// Status to record when the entry is a reversal
    pub reversal: Option<ReversalStatus>,
}

/// Expected state of one side of an allocation commit
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationSide {
    pub transaction_id: String,
    pub expected_version: u64,
}

/// Allocation record plus the two `allocated` updates it implies
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationCommit {
    pub allocation: Allocation,
    pub debit_side: AllocationSide,
    pub credit_side: AllocationSide,
}

/// Copy of one company's books taken in a single critical section
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BooksSnapshot {
    /// Ordered by code
    pub accounts: Vec<Account>,
    /// Commit order
    pub entries: Vec<JournalEntry>,
    pub transactions: Vec<SubledgerTransaction>,
    /// Insertion order
    pub allocations: Vec<Allocation>,
}

impl BooksSnapshot {
    /// Cached balances and allocated amounts that disagree with history
    pub fn drift(&self) -> Vec<ProjectionDrift> {
        let mut lines_by_account: HashMap<&str, Vec<(EntryType, &BigDecimal)>> = HashMap::new();
        for line in self.entries.iter().flat_map(|e| e.lines.iter()) {
            if let Some(side) = line.entry() {
                lines_by_account
                    .entry(line.account_id.as_str())
                    .or_default()
                    .push(side);
            }
        }

        let mut drift = Vec::new();
        for account in &self.accounts {
            let recomputed: BigDecimal = lines_by_account
                .get(account.id.as_str())
                .into_iter()
                .flatten()
                .map(|(side, amount)| account.signed_amount(*side, amount))
                .sum();
            if recomputed != account.balance {
                drift.push(ProjectionDrift::Balance {
                    account_id: account.id.clone(),
                    cached: account.balance.clone(),
                    recomputed,
                });
            }
        }

        for transaction in &self.transactions {
            let recomputed: BigDecimal = self
                .allocations
                .iter()
                .filter(|a| {
                    a.debit_transaction_id == transaction.id
                        || a.credit_transaction_id == transaction.id
                })
                .map(|a| &a.amount)
                .sum();
            if recomputed != transaction.allocated {
                drift.push(ProjectionDrift::Allocated {
                    transaction_id: transaction.id.clone(),
                    cached: transaction.allocated.clone(),
                    recomputed,
                });
            }
        }

        drift
    }
}

/// A cached projection that disagrees with the journal or allocation history
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionDrift {
    Balance {
        account_id: String,
        cached: BigDecimal,
        recomputed: BigDecimal,
    },
    Allocated {
        transaction_id: String,
        cached: BigDecimal,
        recomputed: BigDecimal,
    },
}

impl fmt::Display for ProjectionDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionDrift::Balance {
                account_id,
                cached,
                recomputed,
            } => write!(
                f,
                "Account {} balance is {} but its lines sum to {}",
                account_id, cached, recomputed
            ),
            ProjectionDrift::Allocated {
                transaction_id,
                cached,
                recomputed,
            } => write!(
                f,
                "Transaction {} has {} allocated but its allocations sum to {}",
                transaction_id, cached, recomputed
            ),
        }
    }
}

/// Storage abstraction for the ledger system
///
/// Every method takes the company scope first. Methods named `commit_*`,
/// `insert_*`, `set_*`, `delete_*` and `rebuild_*` must be atomic: either every change is
/// visible afterwards or none is, and their re-checks run inside the same
/// critical section as their writes.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    /// Save a new account; fails with `DuplicateCode` if the code is taken
    async fn insert_account(&self, company: &str, account: &Account) -> LedgerResult<()>;

    /// Get an account by ID
    async fn get_account(&self, company: &str, account_id: &str) -> LedgerResult<Option<Account>>;

    /// Get an account by its code
    async fn find_account_by_code(&self, company: &str, code: &str)
        -> LedgerResult<Option<Account>>;

    /// List accounts ordered by code, optionally filtered by type
    async fn list_accounts(
        &self,
        company: &str,
        account_type: Option<AccountType>,
    ) -> LedgerResult<Vec<Account>>;

    /// Flip the active flag; fails with `Conflict` if the version moved
    async fn set_account_active(
        &self,
        company: &str,
        account_id: &str,
        is_active: bool,
        expected_version: u64,
    ) -> LedgerResult<Account>;

    /// Hard delete; fails with `AccountInUse` once referenced by lines or children
    async fn delete_account(&self, company: &str, account_id: &str) -> LedgerResult<()>;

    /// Save a new period; fails with `PeriodOverlap` on intersecting ranges
    async fn insert_period(&self, company: &str, period: &AccountingPeriod) -> LedgerResult<()>;

    async fn get_period(&self, company: &str, period_id: &str)
        -> LedgerResult<Option<AccountingPeriod>>;

    /// List periods ordered by start date
    async fn list_periods(&self, company: &str) -> LedgerResult<Vec<AccountingPeriod>>;

    /// Close or reopen; fails with `AlreadyClosed` / `NotClosed`
    async fn set_period_closed(
        &self,
        company: &str,
        period_id: &str,
        is_closed: bool,
    ) -> LedgerResult<AccountingPeriod>;

    /// Delete a period; fails with `PeriodInUse` once any entry references it
    async fn delete_period(&self, company: &str, period_id: &str) -> LedgerResult<()>;

    /// Append a journal entry with its side effects.
    ///
    /// Re-checks inside the critical section: duplicate entry id, period
    /// exists and is open, accounts exist and are active, the sub-ledger
    /// link's expected version and state, and that a reversed entry is not
    /// already reversed.
    async fn commit_posting(&self, company: &str, commit: PostingCommit)
        -> LedgerResult<JournalEntry>;

    async fn get_journal_entry(&self, company: &str, entry_id: &str)
        -> LedgerResult<Option<JournalEntry>>;

    /// Committed entries in commit order, optionally bounded by date (inclusive)
    async fn list_journal_entries(
        &self,
        company: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>>;

    async fn get_reversal_status(
        &self,
        company: &str,
        entry_id: &str,
    ) -> LedgerResult<Option<ReversalStatus>>;

    /// Save a staged sub-ledger transaction
    async fn insert_transaction(
        &self,
        company: &str,
        transaction: &SubledgerTransaction,
    ) -> LedgerResult<()>;

    async fn get_transaction(
        &self,
        company: &str,
        transaction_id: &str,
    ) -> LedgerResult<Option<SubledgerTransaction>>;

    /// Transactions of one sub-ledger ordered by transaction number
    async fn list_transactions(
        &self,
        company: &str,
        subledger: Subledger,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<Vec<SubledgerTransaction>>;

    /// Append an allocation record and adjust both transactions.
    ///
    /// Fails with `Conflict` if either version moved, and never lets
    /// `allocated` leave `0..=amount`.
    async fn commit_allocation(&self, company: &str, commit: AllocationCommit)
        -> LedgerResult<Allocation>;

    async fn get_allocation(&self, company: &str, allocation_id: &str)
        -> LedgerResult<Option<Allocation>>;

    /// Allocation records in insertion order, optionally only those touching a transaction
    async fn list_allocations(
        &self,
        company: &str,
        transaction_id: Option<&str>,
    ) -> LedgerResult<Vec<Allocation>>;

    /// Next value of a per-company sequence, starting at 1
    async fn next_sequence(&self, company: &str, key: &str) -> LedgerResult<u64>;

    /// Accounts, entries, transactions and allocations as of one instant;
    /// no commit is visible in part
    async fn snapshot(&self, company: &str) -> LedgerResult<BooksSnapshot>;

    /// Overwrite every drifted balance and allocated amount with its
    /// recomputation, holding out commits until done. Returns what was fixed.
    async fn rebuild_projections(&self, company: &str) -> LedgerResult<Vec<ProjectionDrift>>;
}

/// Customer and supplier master data, consulted for existence and active checks
#[async_trait]
pub trait CounterpartyDirectory: Send + Sync {
    async fn get_counterparty(
        &self,
        company: &str,
        counterparty_id: &str,
    ) -> LedgerResult<Option<Counterparty>>;
}

/// Source of default account mappings for sub-ledger transaction types
#[async_trait]
pub trait TransactionTypeCatalog: Send + Sync {
    async fn get_transaction_type(
        &self,
        company: &str,
        type_id: &str,
    ) -> LedgerResult<Option<TransactionType>>;
}

/// Trait for implementing custom account validation rules
pub trait AccountValidator: Send + Sync {
    /// Validate an account before saving
    fn validate_account(&self, account: &Account) -> LedgerResult<()>;

    /// Validate account deactivation (e.g., block non-zero balances)
    fn validate_deactivation(&self, account: &Account) -> LedgerResult<()>;
}

/// Trait for implementing additional journal entry rules, run after the
/// built-in posting checks
pub trait JournalValidator: Send + Sync {
    fn validate_entry(&self, request: &PostingRequest) -> LedgerResult<()>;
}

/// Default account validator with basic rules
pub struct DefaultAccountValidator;

impl AccountValidator for DefaultAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        if account.code.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account code cannot be empty".to_string(),
            ));
        }

        if account.name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Account name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_deactivation(&self, _account: &Account) -> LedgerResult<()> {
        Ok(())
    }
}

/// Journal validator that accepts everything the posting engine accepts
pub struct DefaultJournalValidator;

impl JournalValidator for DefaultJournalValidator {
    fn validate_entry(&self, _request: &PostingRequest) -> LedgerResult<()> {
        Ok(())
    }
}

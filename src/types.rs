//! Core types and data structures for the ledger

use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account types following standard accounting principles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Assets - what the business owns (Cash, Receivables, Inventory, etc.)
    Asset,
    /// Liabilities - what the business owes (Loans, Payables, etc.)
    Liability,
    /// Equity - owner's interest in the business
    Equity,
    /// Income/Revenue - money earned by the business
    Income,
    /// Expenses - costs incurred by the business
    Expense,
}

impl AccountType {
    /// Returns the normal balance type for this account type
    /// Assets and Expenses normally have debit balances
    /// Liabilities, Equity, and Income normally have credit balances
    pub fn normal_balance(&self) -> EntryType {
        match self {
            AccountType::Asset | AccountType::Expense => EntryType::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Income => EntryType::Credit,
        }
    }
}

/// Sides of a double-entry posting. Also used as the "affects balance"
/// direction of a sub-ledger transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Debit entry - increases Assets and Expenses, decreases Liabilities, Equity, and Income
    Debit,
    /// Credit entry - increases Liabilities, Equity, and Income, decreases Assets and Expenses
    Credit,
}

impl EntryType {
    pub fn opposite(&self) -> EntryType {
        match self {
            EntryType::Debit => EntryType::Credit,
            EntryType::Credit => EntryType::Debit,
        }
    }
}

/// Module a journal entry originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceModule {
    #[serde(rename = "GL")]
    GeneralLedger,
    #[serde(rename = "AR")]
    Receivables,
    #[serde(rename = "AP")]
    Payables,
}

impl SourceModule {
    pub fn code(&self) -> &'static str {
        match self {
            SourceModule::GeneralLedger => "GL",
            SourceModule::Receivables => "AR",
            SourceModule::Payables => "AP",
        }
    }
}

impl fmt::Display for SourceModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The two customer/supplier sub-ledgers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subledger {
    #[serde(rename = "AR")]
    Receivables,
    #[serde(rename = "AP")]
    Payables,
}

impl Subledger {
    pub fn source_module(&self) -> SourceModule {
        match self {
            Subledger::Receivables => SourceModule::Receivables,
            Subledger::Payables => SourceModule::Payables,
        }
    }

    /// Prefix for transaction numbers and the key of the numbering sequence
    pub fn prefix(&self) -> &'static str {
        self.source_module().code()
    }

    /// Side on which a document increases what the counterparty owes (AR)
    /// or what the company owes the counterparty (AP)
    pub fn natural_effect(&self) -> EntryType {
        match self {
            Subledger::Receivables => EntryType::Debit,
            Subledger::Payables => EntryType::Credit,
        }
    }
}

impl fmt::Display for Subledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Chart of accounts entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier for the account
    pub id: String,
    /// Unique, sortable account code (e.g. "1000")
    pub code: String,
    /// Human-readable account name
    pub name: String,
    /// Type of account (Asset, Liability, etc.)
    pub account_type: AccountType,
    /// Optional parent account for hierarchical chart of accounts
    pub parent_id: Option<String>,
    /// Inactive accounts keep their history but accept no postings
    pub is_active: bool,
    /// Cached balance, signed by the account's normal side
    pub balance: BigDecimal,
    /// Bumped on every change to the record
    pub version: u64,
    /// When the account was created
    pub created_at: NaiveDateTime,
    /// When the account was last updated
    pub updated_at: NaiveDateTime,
}

impl Account {
    /// Create a new, active account with a zero balance
    pub fn new(
        code: String,
        name: String,
        account_type: AccountType,
        parent_id: Option<String>,
    ) -> Self {
        let now = chrono::Utc::now().naive_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            code,
            name,
            account_type,
            parent_id,
            is_active: true,
            balance: BigDecimal::from(0),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Balance change caused by an entry on this account
    pub fn signed_amount(&self, entry_type: EntryType, amount: &BigDecimal) -> BigDecimal {
        if self.account_type.normal_balance() == entry_type {
            amount.clone()
        } else {
            -amount
        }
    }

    /// Apply an already-signed balance change. Only storage commits call this.
    pub fn apply_posting(&mut self, signed_amount: &BigDecimal) {
        self.balance += signed_amount;
        self.touch();
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

/// Single debit or credit line of a journal entry.
///
/// Both sides are optional so that malformed input (both or neither set) can
/// be represented and rejected by the posting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Account being affected
    pub account_id: String,
    pub debit: Option<BigDecimal>,
    pub credit: Option<BigDecimal>,
    /// Optional description for this specific line
    pub description: Option<String>,
}

impl JournalLine {
    /// Create a debit line
    pub fn debit(account_id: String, amount: BigDecimal, description: Option<String>) -> Self {
        Self {
            account_id,
            debit: Some(amount),
            credit: None,
            description,
        }
    }

    /// Create a credit line
    pub fn credit(account_id: String, amount: BigDecimal, description: Option<String>) -> Self {
        Self {
            account_id,
            debit: None,
            credit: Some(amount),
            description,
        }
    }

    /// Create a line on the given side
    pub fn new(
        account_id: String,
        entry_type: EntryType,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        match entry_type {
            EntryType::Debit => Self::debit(account_id, amount, description),
            EntryType::Credit => Self::credit(account_id, amount, description),
        }
    }

    /// The side and amount of the line, or `None` when both or neither side is set
    pub fn entry(&self) -> Option<(EntryType, &BigDecimal)> {
        match (&self.debit, &self.credit) {
            (Some(amount), None) => Some((EntryType::Debit, amount)),
            (None, Some(amount)) => Some((EntryType::Credit, amount)),
            _ => None,
        }
    }

    pub fn debit_amount(&self) -> BigDecimal {
        self.debit.clone().unwrap_or_else(|| BigDecimal::from(0))
    }

    pub fn credit_amount(&self) -> BigDecimal {
        self.credit.clone().unwrap_or_else(|| BigDecimal::from(0))
    }

    /// Mirror image of this line with debit and credit swapped
    pub fn swapped(&self) -> Self {
        Self {
            account_id: self.account_id.clone(),
            debit: self.credit.clone(),
            credit: self.debit.clone(),
            description: self.description.clone(),
        }
    }
}

fn total_debits(lines: &[JournalLine]) -> BigDecimal {
    lines.iter().map(|l| l.debit_amount()).sum()
}

fn total_credits(lines: &[JournalLine]) -> BigDecimal {
    lines.iter().map(|l| l.credit_amount()).sum()
}

/// Journal entry submitted for posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRequest {
    /// Caller-supplied id; posting the same id twice is rejected
    pub entry_id: String,
    pub date: NaiveDate,
    pub lines: Vec<JournalLine>,
    pub source_module: SourceModule,
    pub reference: Option<String>,
    pub description: Option<String>,
}

impl PostingRequest {
    pub fn total_debits(&self) -> BigDecimal {
        total_debits(&self.lines)
    }

    pub fn total_credits(&self) -> BigDecimal {
        total_credits(&self.lines)
    }
}

/// Committed, immutable journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: String,
    pub date: NaiveDate,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub source_module: SourceModule,
    /// Sub-ledger transaction this entry was posted for
    pub source_document: Option<String>,
    /// Entry this one reverses
    pub reversal_of: Option<String>,
    pub period_id: String,
    /// Commit order within the company, assigned by storage
    pub sequence: u64,
    pub lines: Vec<JournalLine>,
    pub posted_at: NaiveDateTime,
}

impl JournalEntry {
    /// Calculate total debits
    pub fn total_debits(&self) -> BigDecimal {
        total_debits(&self.lines)
    }

    /// Calculate total credits
    pub fn total_credits(&self) -> BigDecimal {
        total_credits(&self.lines)
    }

    /// Check if the entry is balanced (debits = credits)
    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }
}

/// Marks a journal entry as reversed. Kept apart from the entry itself so
/// committed entries are never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReversalStatus {
    pub entry_id: String,
    pub reversal_entry_id: String,
    pub reversal_date: NaiveDate,
    pub recorded_at: NaiveDateTime,
}

/// Accounting period within a financial year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub id: String,
    pub name: String,
    pub financial_year: i32,
    /// First day of the period
    pub start_date: NaiveDate,
    /// Last day of the period, inclusive
    pub end_date: NaiveDate,
    pub is_closed: bool,
    pub created_at: NaiveDateTime,
}

impl AccountingPeriod {
    pub fn new(name: String, start_date: NaiveDate, end_date: NaiveDate, financial_year: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            financial_year,
            start_date,
            end_date,
            is_closed: false,
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    /// Returns true if the given date falls within this period
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Returns true if the inclusive range intersects this period
    pub fn overlaps(&self, start_date: NaiveDate, end_date: NaiveDate) -> bool {
        start_date <= self.end_date && self.start_date <= end_date
    }
}

/// Customer (AR) or supplier (AP) as seen by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: String,
    pub subledger: Subledger,
    pub code: String,
    pub name: String,
    pub is_active: bool,
    /// Overrides the transaction type's control account when set
    pub control_account_id: Option<String>,
}

/// Sub-ledger transaction type with its default account mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionType {
    pub id: String,
    pub subledger: Subledger,
    pub code: String,
    pub name: String,
    /// Receivables or payables control account
    pub control_account_id: String,
    /// Revenue, expense or bank account on the other side of the entry
    pub offset_account_id: String,
    /// Side the control account line is posted on
    pub affects_balance: EntryType,
    pub is_payment: bool,
    pub is_active: bool,
}

/// Parameters for staging a sub-ledger transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSubledgerTransaction {
    pub counterparty_id: String,
    pub transaction_type_id: String,
    pub date: NaiveDate,
    pub amount: BigDecimal,
    pub due_date: Option<NaiveDate>,
    pub reference: Option<String>,
    pub description: Option<String>,
}

/// Invoice, credit note or payment in the AR or AP sub-ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubledgerTransaction {
    pub id: String,
    pub subledger: Subledger,
    /// Sequential, human-readable number such as `AR000042`
    pub transaction_number: String,
    pub counterparty_id: String,
    pub transaction_type_id: String,
    pub affects_balance: EntryType,
    pub transaction_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    /// Face value, always positive
    pub amount: BigDecimal,
    /// Cached sum of allocation records against this transaction
    pub allocated: BigDecimal,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub is_posted: bool,
    pub journal_entry_id: Option<String>,
    /// Number of times the transaction has been posted, reversals included
    pub posting_count: u32,
    pub version: u64,
    pub created_at: NaiveDateTime,
    pub posted_at: Option<NaiveDateTime>,
}

impl SubledgerTransaction {
    pub fn outstanding(&self) -> BigDecimal {
        &self.amount - &self.allocated
    }

    pub fn is_fully_allocated(&self) -> bool {
        self.outstanding() == BigDecimal::from(0)
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }
}

/// Append-only link between a debit-effect and a credit-effect transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: String,
    pub subledger: Subledger,
    pub counterparty_id: String,
    pub debit_transaction_id: String,
    pub credit_transaction_id: String,
    /// Positive for an allocation, negative for an un-allocation
    pub amount: BigDecimal,
    /// Allocation this record offsets, for un-allocations
    pub reverses: Option<String>,
    pub recorded_at: NaiveDateTime,
}

/// Trial Balance - snapshot of all account balances at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialBalance {
    /// Date of the trial balance
    pub as_of_date: NaiveDate,
    /// One row per account, ordered by account code
    pub balances: Vec<AccountBalance>,
    /// Total debits across all accounts
    pub total_debits: BigDecimal,
    /// Total credits across all accounts
    pub total_credits: BigDecimal,
    /// Whether the trial balance is balanced
    pub is_balanced: bool,
}

impl TrialBalance {
    pub fn balance_for(&self, account_id: &str) -> Option<&AccountBalance> {
        self.balances.iter().find(|b| b.account_id == account_id)
    }
}

/// Account balance information for trial balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: String,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Balance signed by the account's normal side
    pub balance: BigDecimal,
    /// Debit balance (if applicable)
    pub debit_balance: Option<BigDecimal>,
    /// Credit balance (if applicable)
    pub credit_balance: Option<BigDecimal>,
}

/// Line history of one account over a date range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDetail {
    pub account_id: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Balance of everything dated before `from`
    pub opening_balance: BigDecimal,
    pub lines: Vec<LedgerDetailLine>,
    pub closing_balance: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDetailLine {
    pub entry_id: String,
    pub sequence: u64,
    pub date: NaiveDate,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub running_balance: BigDecimal,
}

/// Broad classes of ledger failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input, rejected before any mutation
    Validation,
    /// Request conflicts with the current ledger state
    StateConflict,
    /// Missing references or unbalanced data; never auto-corrected
    Integrity,
    /// Commit conflict or exhausted retries; safe to retry
    Concurrency,
    /// Storage backend failure
    Storage,
}

/// Errors that can occur in the ledger system
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Journal entry must have at least two lines")]
    EmptyEntry,
    #[error("Invalid journal line: {0}")]
    InvalidLine(String),
    #[error("Invalid date range: end {end} must be after start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Account code already exists: {0}")]
    DuplicateCode(String),
    #[error("Invalid parent account: {0}")]
    InvalidParent(String),
    #[error("Account {account_id} has an open balance of {balance}")]
    HasOpenBalance {
        account_id: String,
        balance: BigDecimal,
    },
    #[error("Account {0} has postings or child accounts and can only be deactivated")]
    AccountInUse(String),
    #[error("Journal entry already posted: {0}")]
    DuplicateEntryId(String),
    #[error("Transaction already posted: {0}")]
    AlreadyPosted(String),
    #[error("Transaction is not posted: {0}")]
    NotPosted(String),
    #[error("Journal entry already reversed: {0}")]
    AlreadyReversed(String),
    #[error("Period {period_id} is closed for {date}")]
    PeriodClosed { period_id: String, date: NaiveDate },
    #[error("Period already closed: {0}")]
    AlreadyClosed(String),
    #[error("Period is not closed: {0}")]
    NotClosed(String),
    #[error("Period overlaps existing period {0}")]
    PeriodOverlap(String),
    #[error("Period {0} is referenced by journal entries")]
    PeriodInUse(String),
    #[error("Transaction {transaction_id} has {outstanding} outstanding, cannot allocate {requested}")]
    AmountExceedsOutstanding {
        transaction_id: String,
        outstanding: BigDecimal,
        requested: BigDecimal,
    },
    #[error("Allocation {allocation_id} has {remaining} remaining, cannot unallocate {requested}")]
    ExceedsAllocated {
        allocation_id: String,
        remaining: BigDecimal,
        requested: BigDecimal,
    },
    #[error("Transaction {transaction_id} has {allocated} allocated")]
    HasActiveAllocations {
        transaction_id: String,
        allocated: BigDecimal,
    },
    #[error("Transactions belong to different counterparties")]
    CounterpartyMismatch,
    #[error("Invalid allocation: {0}")]
    InvalidAllocation(String),

    #[error("Journal entry is not balanced: debits = {total_debit}, credits = {total_credit}")]
    UnbalancedEntry {
        total_debit: BigDecimal,
        total_credit: BigDecimal,
    },
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Period not found: {0}")]
    PeriodNotFound(String),
    #[error("No accounting period covers {0}")]
    NoPeriod(NaiveDate),
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
    #[error("Allocation not found: {0}")]
    AllocationNotFound(String),
    #[error("Counterparty not found or inactive: {0}")]
    CounterpartyNotFound(String),
    #[error("Transaction type not found or inactive: {0}")]
    TransactionTypeNotFound(String),

    #[error("Commit conflict: {0}")]
    Conflict(String),
    #[error("{operation} gave up after {attempts} attempts")]
    Transient { operation: String, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        use LedgerError::*;
        match self {
            Validation(_) | EmptyEntry | InvalidLine(_) | InvalidRange { .. } => {
                ErrorKind::Validation
            }
            DuplicateCode(_)
            | InvalidParent(_)
            | HasOpenBalance { .. }
            | AccountInUse(_)
            | DuplicateEntryId(_)
            | AlreadyPosted(_)
            | NotPosted(_)
            | AlreadyReversed(_)
            | PeriodClosed { .. }
            | AlreadyClosed(_)
            | NotClosed(_)
            | PeriodOverlap(_)
            | PeriodInUse(_)
            | AmountExceedsOutstanding { .. }
            | ExceedsAllocated { .. }
            | HasActiveAllocations { .. }
            | CounterpartyMismatch
            | InvalidAllocation(_) => ErrorKind::StateConflict,
            UnbalancedEntry { .. }
            | AccountNotFound(_)
            | PeriodNotFound(_)
            | NoPeriod(_)
            | EntryNotFound(_)
            | TransactionNotFound(_)
            | AllocationNotFound(_)
            | CounterpartyNotFound(_)
            | TransactionTypeNotFound(_) => ErrorKind::Integrity,
            Conflict(_) | Transient { .. } => ErrorKind::Concurrency,
            Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Concurrency
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

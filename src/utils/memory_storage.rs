//! In-memory storage implementation for testing

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

/// Everything stored for one company
#[derive(Debug, Default)]
struct CompanyBook {
    accounts: HashMap<String, Account>,
    periods: HashMap<String, AccountingPeriod>,
    entries: HashMap<String, JournalEntry>,
    /// Entry ids in commit order
    entry_order: Vec<String>,
    reversals: HashMap<String, ReversalStatus>,
    transactions: HashMap<String, SubledgerTransaction>,
    allocations: Vec<Allocation>,
    sequences: HashMap<String, u64>,
    last_entry_sequence: u64,
}

impl CompanyBook {
    fn account_has_lines(&self, account_id: &str) -> bool {
        self.entries
            .values()
            .any(|e| e.lines.iter().any(|l| l.account_id == account_id))
    }

    fn remaining_on(&self, allocation_id: &str) -> Option<BigDecimal> {
        let original = self.allocations.iter().find(|a| a.id == allocation_id)?;
        let offsets: BigDecimal = self
            .allocations
            .iter()
            .filter(|a| a.reverses.as_deref() == Some(allocation_id))
            .map(|a| &a.amount)
            .sum();
        Some(&original.amount + offsets)
    }

    fn check_posting(&self, commit: &PostingCommit) -> LedgerResult<()> {
        let entry = &commit.entry;
        if self.entries.contains_key(&entry.entry_id) {
            return Err(LedgerError::DuplicateEntryId(entry.entry_id.clone()));
        }

        for delta in &commit.deltas {
            match self.accounts.get(&delta.account_id) {
                Some(account) if account.is_active => {}
                Some(_) => {
                    return Err(LedgerError::InvalidLine(format!(
                        "account {} is inactive",
                        delta.account_id
                    )))
                }
                None => {
                    return Err(LedgerError::InvalidLine(format!(
                        "account {} does not exist",
                        delta.account_id
                    )))
                }
            }
        }

        let period = self
            .periods
            .get(&entry.period_id)
            .ok_or_else(|| LedgerError::PeriodNotFound(entry.period_id.clone()))?;
        if !period.contains(entry.date) {
            return Err(LedgerError::NoPeriod(entry.date));
        }
        if period.is_closed {
            return Err(LedgerError::PeriodClosed {
                period_id: period.id.clone(),
                date: entry.date,
            });
        }

        if let Some(link) = &commit.link {
            let (transaction_id, expected_version) = match link {
                SubledgerLink::Post {
                    transaction_id,
                    expected_version,
                }
                | SubledgerLink::Reset {
                    transaction_id,
                    expected_version,
                } => (transaction_id, *expected_version),
            };
            let transaction = self
                .transactions
                .get(transaction_id)
                .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.clone()))?;
            if transaction.version != expected_version {
                return Err(LedgerError::Conflict(format!(
                    "transaction {} changed during commit",
                    transaction_id
                )));
            }
            match link {
                SubledgerLink::Post { .. } if transaction.is_posted => {
                    return Err(LedgerError::AlreadyPosted(transaction_id.clone()));
                }
                SubledgerLink::Reset { .. } if transaction.allocated != BigDecimal::from(0) => {
                    return Err(LedgerError::HasActiveAllocations {
                        transaction_id: transaction_id.clone(),
                        allocated: transaction.allocated.clone(),
                    });
                }
                _ => {}
            }
        }

        if let Some(status) = &commit.reversal {
            if !self.entries.contains_key(&status.entry_id) {
                return Err(LedgerError::EntryNotFound(status.entry_id.clone()));
            }
            if self.reversals.contains_key(&status.entry_id) {
                return Err(LedgerError::AlreadyReversed(status.entry_id.clone()));
            }
        }

        Ok(())
    }

    fn snapshot(&self) -> BooksSnapshot {
        let mut accounts: Vec<Account> = self.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        let mut transactions: Vec<SubledgerTransaction> =
            self.transactions.values().cloned().collect();
        transactions.sort_by(|a, b| a.transaction_number.cmp(&b.transaction_number));

        BooksSnapshot {
            accounts,
            entries: self
                .entry_order
                .iter()
                .filter_map(|id| self.entries.get(id))
                .cloned()
                .collect(),
            transactions,
            allocations: self.allocations.clone(),
        }
    }

    fn check_allocation_side(
        &self,
        side: &AllocationSide,
        allocation: &Allocation,
    ) -> LedgerResult<BigDecimal> {
        let transaction = self
            .transactions
            .get(&side.transaction_id)
            .ok_or_else(|| LedgerError::TransactionNotFound(side.transaction_id.clone()))?;
        if transaction.version != side.expected_version {
            return Err(LedgerError::Conflict(format!(
                "transaction {} changed during allocation",
                side.transaction_id
            )));
        }

        let allocated = &transaction.allocated + &allocation.amount;
        if allocated > transaction.amount {
            return Err(LedgerError::AmountExceedsOutstanding {
                transaction_id: transaction.id.clone(),
                outstanding: transaction.outstanding(),
                requested: allocation.amount.clone(),
            });
        }
        if allocated < BigDecimal::from(0) {
            return Err(LedgerError::InvalidAllocation(format!(
                "allocated amount on {} would become negative",
                transaction.id
            )));
        }
        Ok(allocated)
    }
}

/// In-memory storage implementation for testing and development.
///
/// All companies share one lock; every write method holds it for its whole
/// check-then-apply sequence, which makes each commit serializable.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    books: Arc<RwLock<HashMap<String, CompanyBook>>>,
}

impl MemoryStorage {
    /// Create a new memory storage instance
    pub fn new() -> Self {
        Self {
            books: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read<T>(&self, company: &str, f: impl FnOnce(&CompanyBook) -> T) -> LedgerResult<T> {
        let books = self
            .books
            .read()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))?;
        match books.get(company) {
            Some(book) => Ok(f(book)),
            None => Ok(f(&CompanyBook::default())),
        }
    }

    fn write<T>(
        &self,
        company: &str,
        f: impl FnOnce(&mut CompanyBook) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut books = self
            .books
            .write()
            .map_err(|_| LedgerError::Storage("storage lock poisoned".to_string()))?;
        f(books.entry(company.to_string()).or_default())
    }

    /// Overwrite a cached balance without touching history. Leaves the
    /// books drifted until `rebuild_projections` runs.
    pub fn set_account_balance(
        &self,
        company: &str,
        account_id: &str,
        balance: &BigDecimal,
    ) -> LedgerResult<()> {
        self.write(company, |book| {
            let account = book
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
            account.balance = balance.clone();
            account.touch();
            Ok(())
        })
    }

    /// Overwrite a cached allocated amount without touching the allocation records
    pub fn set_allocated_amount(
        &self,
        company: &str,
        transaction_id: &str,
        allocated: &BigDecimal,
    ) -> LedgerResult<()> {
        self.write(company, |book| {
            let transaction = book
                .transactions
                .get_mut(transaction_id)
                .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))?;
            transaction.allocated = allocated.clone();
            transaction.touch();
            Ok(())
        })
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn in_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.is_none_or(|s| date >= s) && end.is_none_or(|e| date <= e)
}

#[async_trait]
impl LedgerStorage for MemoryStorage {
    async fn insert_account(&self, company: &str, account: &Account) -> LedgerResult<()> {
        self.write(company, |book| {
            if book.accounts.values().any(|a| a.code == account.code) {
                return Err(LedgerError::DuplicateCode(account.code.clone()));
            }
            if book.accounts.contains_key(&account.id) {
                return Err(LedgerError::Storage(format!(
                    "account id {} already stored",
                    account.id
                )));
            }
            book.accounts.insert(account.id.clone(), account.clone());
            Ok(())
        })
    }

    async fn get_account(&self, company: &str, account_id: &str) -> LedgerResult<Option<Account>> {
        self.read(company, |book| book.accounts.get(account_id).cloned())
    }

    async fn find_account_by_code(
        &self,
        company: &str,
        code: &str,
    ) -> LedgerResult<Option<Account>> {
        self.read(company, |book| {
            book.accounts.values().find(|a| a.code == code).cloned()
        })
    }

    async fn list_accounts(
        &self,
        company: &str,
        account_type: Option<AccountType>,
    ) -> LedgerResult<Vec<Account>> {
        self.read(company, |book| {
            let mut accounts: Vec<Account> = book
                .accounts
                .values()
                .filter(|account| account_type.is_none_or(|t| account.account_type == t))
                .cloned()
                .collect();
            accounts.sort_by(|a, b| a.code.cmp(&b.code));
            accounts
        })
    }

    async fn set_account_active(
        &self,
        company: &str,
        account_id: &str,
        is_active: bool,
        expected_version: u64,
    ) -> LedgerResult<Account> {
        self.write(company, |book| {
            let account = book
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;
            if account.version != expected_version {
                return Err(LedgerError::Conflict(format!(
                    "account {} changed during update",
                    account_id
                )));
            }
            account.is_active = is_active;
            account.touch();
            Ok(account.clone())
        })
    }

    async fn delete_account(&self, company: &str, account_id: &str) -> LedgerResult<()> {
        self.write(company, |book| {
            if !book.accounts.contains_key(account_id) {
                return Err(LedgerError::AccountNotFound(account_id.to_string()));
            }
            let has_children = book
                .accounts
                .values()
                .any(|a| a.parent_id.as_deref() == Some(account_id));
            if has_children || book.account_has_lines(account_id) {
                return Err(LedgerError::AccountInUse(account_id.to_string()));
            }
            book.accounts.remove(account_id);
            Ok(())
        })
    }

    async fn insert_period(&self, company: &str, period: &AccountingPeriod) -> LedgerResult<()> {
        self.write(company, |book| {
            if let Some(existing) = book
                .periods
                .values()
                .find(|p| p.overlaps(period.start_date, period.end_date))
            {
                return Err(LedgerError::PeriodOverlap(existing.id.clone()));
            }
            book.periods.insert(period.id.clone(), period.clone());
            Ok(())
        })
    }

    async fn get_period(
        &self,
        company: &str,
        period_id: &str,
    ) -> LedgerResult<Option<AccountingPeriod>> {
        self.read(company, |book| book.periods.get(period_id).cloned())
    }

    async fn list_periods(&self, company: &str) -> LedgerResult<Vec<AccountingPeriod>> {
        self.read(company, |book| {
            let mut periods: Vec<AccountingPeriod> = book.periods.values().cloned().collect();
            periods.sort_by_key(|p| p.start_date);
            periods
        })
    }

    async fn set_period_closed(
        &self,
        company: &str,
        period_id: &str,
        is_closed: bool,
    ) -> LedgerResult<AccountingPeriod> {
        self.write(company, |book| {
            let period = book
                .periods
                .get_mut(period_id)
                .ok_or_else(|| LedgerError::PeriodNotFound(period_id.to_string()))?;
            match (period.is_closed, is_closed) {
                (true, true) => Err(LedgerError::AlreadyClosed(period_id.to_string())),
                (false, false) => Err(LedgerError::NotClosed(period_id.to_string())),
                _ => {
                    period.is_closed = is_closed;
                    Ok(period.clone())
                }
            }
        })
    }

    async fn delete_period(&self, company: &str, period_id: &str) -> LedgerResult<()> {
        self.write(company, |book| {
            if !book.periods.contains_key(period_id) {
                return Err(LedgerError::PeriodNotFound(period_id.to_string()));
            }
            if book.entries.values().any(|e| e.period_id == period_id) {
                return Err(LedgerError::PeriodInUse(period_id.to_string()));
            }
            book.periods.remove(period_id);
            Ok(())
        })
    }

    async fn commit_posting(
        &self,
        company: &str,
        commit: PostingCommit,
    ) -> LedgerResult<JournalEntry> {
        self.write(company, move |book| {
            book.check_posting(&commit)?;

            let PostingCommit {
                mut entry,
                deltas,
                link,
                reversal,
            } = commit;

            book.last_entry_sequence += 1;
            entry.sequence = book.last_entry_sequence;

            for delta in &deltas {
                if let Some(account) = book.accounts.get_mut(&delta.account_id) {
                    account.apply_posting(&delta.signed_amount);
                }
            }

            match link {
                Some(SubledgerLink::Post { transaction_id, .. }) => {
                    if let Some(transaction) = book.transactions.get_mut(&transaction_id) {
                        transaction.is_posted = true;
                        transaction.journal_entry_id = Some(entry.entry_id.clone());
                        transaction.posting_count += 1;
                        transaction.posted_at = Some(entry.posted_at);
                        transaction.touch();
                    }
                }
                Some(SubledgerLink::Reset { transaction_id, .. }) => {
                    if let Some(transaction) = book.transactions.get_mut(&transaction_id) {
                        transaction.is_posted = false;
                        transaction.journal_entry_id = None;
                        transaction.allocated = BigDecimal::from(0);
                        transaction.posted_at = None;
                        transaction.touch();
                    }
                }
                None => {}
            }

            if let Some(status) = reversal {
                book.reversals.insert(status.entry_id.clone(), status);
            }

            book.entry_order.push(entry.entry_id.clone());
            book.entries.insert(entry.entry_id.clone(), entry.clone());
            Ok(entry)
        })
    }

    async fn get_journal_entry(
        &self,
        company: &str,
        entry_id: &str,
    ) -> LedgerResult<Option<JournalEntry>> {
        self.read(company, |book| book.entries.get(entry_id).cloned())
    }

    async fn list_journal_entries(
        &self,
        company: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.read(company, |book| {
            book.entry_order
                .iter()
                .filter_map(|id| book.entries.get(id))
                .filter(|e| in_range(e.date, start_date, end_date))
                .cloned()
                .collect()
        })
    }

    async fn get_reversal_status(
        &self,
        company: &str,
        entry_id: &str,
    ) -> LedgerResult<Option<ReversalStatus>> {
        self.read(company, |book| book.reversals.get(entry_id).cloned())
    }

    async fn insert_transaction(
        &self,
        company: &str,
        transaction: &SubledgerTransaction,
    ) -> LedgerResult<()> {
        self.write(company, |book| {
            if book.transactions.contains_key(&transaction.id) {
                return Err(LedgerError::Storage(format!(
                    "transaction id {} already stored",
                    transaction.id
                )));
            }
            book.transactions
                .insert(transaction.id.clone(), transaction.clone());
            Ok(())
        })
    }

    async fn get_transaction(
        &self,
        company: &str,
        transaction_id: &str,
    ) -> LedgerResult<Option<SubledgerTransaction>> {
        self.read(company, |book| book.transactions.get(transaction_id).cloned())
    }

    async fn list_transactions(
        &self,
        company: &str,
        subledger: Subledger,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<Vec<SubledgerTransaction>> {
        self.read(company, |book| {
            let mut transactions: Vec<SubledgerTransaction> = book
                .transactions
                .values()
                .filter(|t| t.subledger == subledger)
                .filter(|t| counterparty_id.is_none_or(|c| t.counterparty_id == c))
                .cloned()
                .collect();
            transactions.sort_by(|a, b| a.transaction_number.cmp(&b.transaction_number));
            transactions
        })
    }

    async fn commit_allocation(
        &self,
        company: &str,
        commit: AllocationCommit,
    ) -> LedgerResult<Allocation> {
        self.write(company, move |book| {
            let allocation = commit.allocation;

            let debit_allocated = book.check_allocation_side(&commit.debit_side, &allocation)?;
            let credit_allocated = book.check_allocation_side(&commit.credit_side, &allocation)?;

            if let Some(original_id) = &allocation.reverses {
                let remaining = book
                    .remaining_on(original_id)
                    .ok_or_else(|| LedgerError::AllocationNotFound(original_id.clone()))?;
                if &remaining + &allocation.amount < BigDecimal::from(0) {
                    return Err(LedgerError::ExceedsAllocated {
                        allocation_id: original_id.clone(),
                        remaining,
                        requested: -&allocation.amount,
                    });
                }
            }

            for (side, allocated) in [
                (&commit.debit_side, debit_allocated),
                (&commit.credit_side, credit_allocated),
            ] {
                if let Some(transaction) = book.transactions.get_mut(&side.transaction_id) {
                    transaction.allocated = allocated;
                    transaction.touch();
                }
            }

            book.allocations.push(allocation.clone());
            Ok(allocation)
        })
    }

    async fn get_allocation(
        &self,
        company: &str,
        allocation_id: &str,
    ) -> LedgerResult<Option<Allocation>> {
        self.read(company, |book| {
            book.allocations
                .iter()
                .find(|a| a.id == allocation_id)
                .cloned()
        })
    }

    async fn list_allocations(
        &self,
        company: &str,
        transaction_id: Option<&str>,
    ) -> LedgerResult<Vec<Allocation>> {
        self.read(company, |book| {
            book.allocations
                .iter()
                .filter(|a| {
                    transaction_id.is_none_or(|t| {
                        a.debit_transaction_id == t || a.credit_transaction_id == t
                    })
                })
                .cloned()
                .collect()
        })
    }

    async fn next_sequence(&self, company: &str, key: &str) -> LedgerResult<u64> {
        self.write(company, |book| {
            let value = book.sequences.entry(key.to_string()).or_insert(0);
            *value += 1;
            Ok(*value)
        })
    }

    async fn snapshot(&self, company: &str) -> LedgerResult<BooksSnapshot> {
        self.read(company, CompanyBook::snapshot)
    }

    async fn rebuild_projections(&self, company: &str) -> LedgerResult<Vec<ProjectionDrift>> {
        self.write(company, |book| {
            let drift = book.snapshot().drift();
            for item in &drift {
                match item {
                    ProjectionDrift::Balance {
                        account_id,
                        recomputed,
                        ..
                    } => {
                        if let Some(account) = book.accounts.get_mut(account_id) {
                            account.balance = recomputed.clone();
                            account.touch();
                        }
                    }
                    ProjectionDrift::Allocated {
                        transaction_id,
                        recomputed,
                        ..
                    } => {
                        if let Some(transaction) = book.transactions.get_mut(transaction_id) {
                            transaction.allocated = recomputed.clone();
                            transaction.touch();
                        }
                    }
                }
            }
            Ok(drift)
        })
    }
}

//! Main ledger orchestrator that coordinates accounts, periods, postings and
//! the sub-ledgers of one company

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::config::LedgerConfig;
use crate::ledger::reporting::trial_balance_from;
use crate::ledger::{AccountManager, PeriodCalendar, PostingEngine, ReportProjector, ReversalEngine};
use crate::subledger::{AgeingReport, AllocationEngine, SubledgerManager};
use crate::traits::*;
use crate::types::*;
use crate::utils::MemoryCatalog;

/// Collaborators and policies the components are assembled from
#[derive(Clone)]
struct Parts<S> {
    storage: S,
    company: String,
    config: Arc<LedgerConfig>,
    counterparties: Arc<dyn CounterpartyDirectory>,
    transaction_types: Arc<dyn TransactionTypeCatalog>,
    account_validator: Arc<dyn AccountValidator>,
    journal_validator: Arc<dyn JournalValidator>,
}

/// Main ledger system that orchestrates all accounting operations for a
/// single company. Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct Ledger<S: LedgerStorage> {
    parts: Parts<S>,
    accounts: AccountManager<S>,
    periods: PeriodCalendar<S>,
    posting: PostingEngine<S>,
    reversals: ReversalEngine<S>,
    reports: ReportProjector<S>,
    subledger: SubledgerManager<S>,
    allocations: AllocationEngine<S>,
}

impl<S: LedgerStorage + Clone> Ledger<S> {
    /// Create a general-ledger-only ledger. Its counterparty and transaction
    /// type masters are empty and unreachable, so every sub-ledger operation
    /// fails with `CounterpartyNotFound`; use [`Ledger::with_collaborators`]
    /// for AR/AP work.
    pub fn new(storage: S, company: impl Into<String>) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        Self::with_collaborators(storage, company, catalog.clone(), catalog)
    }

    /// Create a ledger backed by external counterparty and transaction type masters
    pub fn with_collaborators(
        storage: S,
        company: impl Into<String>,
        counterparties: Arc<dyn CounterpartyDirectory>,
        transaction_types: Arc<dyn TransactionTypeCatalog>,
    ) -> Self {
        Self::assemble(Parts {
            storage,
            company: company.into(),
            config: Arc::new(LedgerConfig::default()),
            counterparties,
            transaction_types,
            account_validator: Arc::new(DefaultAccountValidator),
            journal_validator: Arc::new(DefaultJournalValidator),
        })
    }

    pub fn with_config(self, config: LedgerConfig) -> Self {
        Self::assemble(Parts {
            config: Arc::new(config),
            ..self.parts
        })
    }

    /// Replace the account and journal validators
    pub fn with_validators(
        self,
        account_validator: Arc<dyn AccountValidator>,
        journal_validator: Arc<dyn JournalValidator>,
    ) -> Self {
        Self::assemble(Parts {
            account_validator,
            journal_validator,
            ..self.parts
        })
    }

    fn assemble(parts: Parts<S>) -> Self {
        let storage = parts.storage.clone();
        let company = parts.company.clone();

        let posting = PostingEngine::new(storage.clone(), company.clone())
            .with_config(parts.config.clone())
            .with_validator(parts.journal_validator.clone());

        Self {
            accounts: AccountManager::with_validator(
                storage.clone(),
                company.clone(),
                parts.account_validator.clone(),
            )
            .with_retry_policy(parts.config.retry_policy()),
            periods: PeriodCalendar::new(storage.clone(), company.clone()),
            reversals: ReversalEngine::new(posting.clone()),
            reports: ReportProjector::new(storage.clone(), company.clone()),
            subledger: SubledgerManager::new(
                posting.clone(),
                parts.counterparties.clone(),
                parts.transaction_types.clone(),
            ),
            allocations: AllocationEngine::new(storage, company).with_config(parts.config.clone()),
            posting,
            parts,
        }
    }

    pub fn company(&self) -> &str {
        &self.parts.company
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.parts.config
    }

    pub fn storage(&self) -> &S {
        &self.parts.storage
    }

    // Chart of accounts

    /// Create a new account
    pub async fn create_account(
        &self,
        code: String,
        name: String,
        account_type: AccountType,
        parent_id: Option<String>,
    ) -> LedgerResult<Account> {
        self.accounts
            .create_account(code, name, account_type, parent_id)
            .await
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.accounts.get_account(account_id).await
    }

    pub async fn find_account_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        self.accounts.find_by_code(code).await
    }

    /// List accounts ordered by code, optionally of one type
    pub async fn list_accounts(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>> {
        self.accounts.list_accounts(account_type).await
    }

    pub async fn child_accounts(&self, parent_id: &str) -> LedgerResult<Vec<Account>> {
        self.accounts.child_accounts(parent_id).await
    }

    pub async fn account_path(&self, account_id: &str) -> LedgerResult<Vec<Account>> {
        self.accounts.account_path(account_id).await
    }

    pub async fn deactivate_account(&self, account_id: &str) -> LedgerResult<Account> {
        self.accounts.deactivate(account_id).await
    }

    pub async fn reactivate_account(&self, account_id: &str) -> LedgerResult<Account> {
        self.accounts.reactivate(account_id).await
    }

    /// Delete an account that has neither postings nor children
    pub async fn delete_account(&self, account_id: &str) -> LedgerResult<()> {
        self.accounts.delete_account(account_id).await
    }

    pub async fn recompute_balance(&self, account_id: &str) -> LedgerResult<BigDecimal> {
        self.accounts.recompute_balance(account_id).await
    }

    /// Setup a standard chart of accounts for small business
    pub async fn setup_standard_chart(&self) -> LedgerResult<HashMap<String, Account>> {
        crate::ledger::account::utils::create_standard_chart(&self.accounts).await
    }

    // Periods

    pub async fn create_period(
        &self,
        name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        financial_year: i32,
    ) -> LedgerResult<AccountingPeriod> {
        self.periods
            .create_period(name, start_date, end_date, financial_year)
            .await
    }

    pub async fn find_period_for(&self, date: NaiveDate) -> LedgerResult<AccountingPeriod> {
        self.periods.find_period_for(date).await
    }

    pub async fn current_period(&self, today: NaiveDate) -> LedgerResult<Option<AccountingPeriod>> {
        self.periods.current_period(today).await
    }

    pub async fn list_periods(&self) -> LedgerResult<Vec<AccountingPeriod>> {
        self.periods.list_periods().await
    }

    pub async fn close_period(&self, period_id: &str) -> LedgerResult<AccountingPeriod> {
        self.periods.close(period_id).await
    }

    pub async fn reopen_period(&self, period_id: &str) -> LedgerResult<AccountingPeriod> {
        self.periods.reopen(period_id).await
    }

    pub async fn delete_period(&self, period_id: &str) -> LedgerResult<()> {
        self.periods.delete_period(period_id).await
    }

    // Journal

    /// Validate and commit a journal entry
    pub async fn post(&self, request: PostingRequest) -> LedgerResult<JournalEntry> {
        self.posting.post(request).await
    }

    pub async fn get_journal_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        self.posting.get_entry(entry_id).await
    }

    pub async fn list_journal_entries(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.posting.list_entries(start_date, end_date).await
    }

    /// Post the mirror image of an entry dated `reversal_date`
    pub async fn reverse(
        &self,
        entry_id: &str,
        reversal_date: NaiveDate,
        reference: Option<String>,
    ) -> LedgerResult<JournalEntry> {
        self.reversals.reverse(entry_id, reversal_date, reference).await
    }

    pub async fn reversal_status(&self, entry_id: &str) -> LedgerResult<Option<ReversalStatus>> {
        self.reversals.reversal_status(entry_id).await
    }

    // Sub-ledgers

    pub async fn create_transaction(
        &self,
        subledger: Subledger,
        new: NewSubledgerTransaction,
    ) -> LedgerResult<SubledgerTransaction> {
        self.subledger.create_transaction(subledger, new).await
    }

    /// Post a staged sub-ledger transaction to the general ledger
    pub async fn post_transaction(&self, transaction_id: &str) -> LedgerResult<JournalEntry> {
        self.subledger.post(transaction_id).await
    }

    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Option<SubledgerTransaction>> {
        self.subledger.get_transaction(transaction_id).await
    }

    pub async fn list_transactions(
        &self,
        subledger: Subledger,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<Vec<SubledgerTransaction>> {
        self.subledger
            .list_transactions(subledger, counterparty_id)
            .await
    }

    pub async fn counterparty_balance(&self, counterparty_id: &str) -> LedgerResult<BigDecimal> {
        self.subledger.counterparty_balance(counterparty_id).await
    }

    pub async fn ageing(
        &self,
        subledger: Subledger,
        as_at: NaiveDate,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<AgeingReport> {
        self.subledger.ageing(subledger, as_at, counterparty_id).await
    }

    pub async fn allocate(
        &self,
        debit_transaction_id: &str,
        credit_transaction_id: &str,
        amount: &BigDecimal,
    ) -> LedgerResult<Allocation> {
        self.allocations
            .allocate(debit_transaction_id, credit_transaction_id, amount)
            .await
    }

    pub async fn unallocate(&self, allocation_id: &str, amount: &BigDecimal) -> LedgerResult<Allocation> {
        self.allocations.unallocate(allocation_id, amount).await
    }

    pub async fn allocations_for(&self, transaction_id: &str) -> LedgerResult<Vec<Allocation>> {
        self.allocations.allocations_for(transaction_id).await
    }

    pub async fn open_items(
        &self,
        subledger: Subledger,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<Vec<SubledgerTransaction>> {
        self.allocations.open_items(subledger, counterparty_id).await
    }

    // Reporting

    /// Get trial balance as of a specific date
    pub async fn trial_balance(&self, as_of_date: NaiveDate) -> LedgerResult<TrialBalance> {
        self.reports.trial_balance(as_of_date).await
    }

    pub async fn ledger_detail(
        &self,
        account_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<LedgerDetail> {
        self.reports.ledger_detail(account_id, from, to).await
    }

    /// Validate the integrity of the ledger: the trial balance balances,
    /// cached projections match history, and posted transactions point at
    /// existing entries. Every check reads the same snapshot.
    #[instrument(skip(self), fields(company = %self.company()))]
    pub async fn verify_integrity(&self, as_of_date: NaiveDate) -> LedgerResult<LedgerIntegrityReport> {
        let snapshot = self.parts.storage.snapshot(self.company()).await?;
        let trial_balance = trial_balance_from(&snapshot, as_of_date);
        let mut issues = Vec::new();

        // Check if trial balance is balanced
        if !trial_balance.is_balanced {
            issues.push(format!(
                "Trial balance is not balanced: debits = {}, credits = {}",
                trial_balance.total_debits, trial_balance.total_credits
            ));
        }

        issues.extend(snapshot.drift().iter().map(ProjectionDrift::to_string));

        let entry_ids: HashSet<&str> = snapshot
            .entries
            .iter()
            .map(|e| e.entry_id.as_str())
            .collect();
        for transaction in &snapshot.transactions {
            let Some(entry_id) = transaction.journal_entry_id.as_deref() else {
                continue;
            };
            if !entry_ids.contains(entry_id) {
                issues.push(format!(
                    "Transaction {} links to missing journal entry {}",
                    transaction.transaction_number, entry_id
                ));
            }
        }

        if !issues.is_empty() {
            warn!(issues = issues.len(), "ledger integrity check failed");
        }

        Ok(LedgerIntegrityReport {
            as_of_date,
            is_valid: issues.is_empty(),
            issues,
            trial_balance_total_debits: trial_balance.total_debits,
            trial_balance_total_credits: trial_balance.total_credits,
        })
    }

    /// Overwrite cached balances and allocated amounts with values derived
    /// from history; returns how many records were corrected
    #[instrument(skip(self), fields(company = %self.company()))]
    pub async fn rebuild_projections(&self) -> LedgerResult<usize> {
        let fixed = self.parts.storage.rebuild_projections(self.company()).await?;
        for item in &fixed {
            warn!(%item, "projection corrected");
        }
        info!(corrected = fixed.len(), "projections rebuilt");
        Ok(fixed.len())
    }
}

/// Report on ledger integrity and validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerIntegrityReport {
    pub as_of_date: NaiveDate,
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub trial_balance_total_debits: BigDecimal,
    pub trial_balance_total_credits: BigDecimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::JournalEntryBuilder;
    use crate::utils::memory_storage::MemoryStorage;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_ledger_basic_operations() {
        let ledger = Ledger::new(MemoryStorage::new(), "acme");
        let chart = ledger.setup_standard_chart().await.unwrap();
        ledger
            .create_period("FY2024".into(), date(2024, 1, 1), date(2024, 12, 31), 2024)
            .await
            .unwrap();

        let request = JournalEntryBuilder::new("JE-1", date(2024, 1, 1))
            .description("Sale of goods")
            .debit(chart["cash"].id.clone(), BigDecimal::from(1000), None)
            .credit(chart["sales_revenue"].id.clone(), BigDecimal::from(1000), None)
            .build()
            .unwrap();
        ledger.post(request).await.unwrap();

        let cash = ledger.get_account(&chart["cash"].id).await.unwrap().unwrap();
        assert_eq!(cash.balance, BigDecimal::from(1000));

        let report = ledger.verify_integrity(date(2024, 12, 31)).await.unwrap();
        assert!(report.is_valid, "{:?}", report.issues);
        assert_eq!(report.trial_balance_total_debits, BigDecimal::from(1000));
    }

    #[tokio::test]
    async fn test_rebuild_repairs_drifted_balance() {
        let storage = MemoryStorage::new();
        let ledger = Ledger::new(storage.clone(), "acme");
        let chart = ledger.setup_standard_chart().await.unwrap();
        ledger
            .create_period("FY2024".into(), date(2024, 1, 1), date(2024, 12, 31), 2024)
            .await
            .unwrap();
        let request = JournalEntryBuilder::new("JE-1", date(2024, 2, 1))
            .debit(chart["rent_expense"].id.clone(), BigDecimal::from(300), None)
            .credit(chart["cash"].id.clone(), BigDecimal::from(300), None)
            .build()
            .unwrap();
        ledger.post(request).await.unwrap();

        storage
            .set_account_balance("acme", &chart["cash"].id, &BigDecimal::from(7))
            .unwrap();
        let report = ledger.verify_integrity(date(2024, 12, 31)).await.unwrap();
        assert!(!report.is_valid);
        assert_eq!(report.issues.len(), 1);

        assert_eq!(ledger.rebuild_projections().await.unwrap(), 1);
        let cash = ledger.get_account(&chart["cash"].id).await.unwrap().unwrap();
        assert_eq!(cash.balance, BigDecimal::from(-300));
        assert!(ledger.verify_integrity(date(2024, 12, 31)).await.unwrap().is_valid);
    }

    #[tokio::test]
    async fn test_general_ledger_only_refuses_subledger_documents() {
        let ledger = Ledger::new(MemoryStorage::new(), "acme");
        let result = ledger
            .create_transaction(
                Subledger::Receivables,
                NewSubledgerTransaction {
                    counterparty_id: "CUST-1".into(),
                    transaction_type_id: "INV".into(),
                    date: date(2024, 1, 5),
                    amount: BigDecimal::from(10),
                    due_date: None,
                    reference: None,
                    description: None,
                },
            )
            .await;
        assert_eq!(result, Err(LedgerError::CounterpartyNotFound("CUST-1".into())));
    }

    #[tokio::test]
    async fn test_companies_do_not_share_books() {
        let storage = MemoryStorage::new();
        let acme = Ledger::new(storage.clone(), "acme");
        let globex = Ledger::new(storage, "globex");

        acme.create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();
        globex
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();

        assert_eq!(acme.list_accounts(None).await.unwrap().len(), 1);
        assert_eq!(globex.list_accounts(None).await.unwrap().len(), 1);
    }
}

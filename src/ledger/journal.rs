//! Journal posting engine

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::LedgerConfig;
use crate::ledger::PeriodCalendar;
use crate::traits::*;
use crate::types::*;
use crate::utils::{log_rejection, validate_amount_scale, validate_entry_id, with_retry};

/// Side effects that must commit together with an entry
#[derive(Debug, Clone, Default)]
pub(crate) struct EntryLinks {
    pub source_document: Option<String>,
    pub reversal_of: Option<String>,
    pub link: Option<SubledgerLink>,
    pub reversal: Option<ReversalStatus>,
}

/// Line count and debit/credit equality, checked before anything is looked up
fn check_shape(lines: &[JournalLine]) -> LedgerResult<()> {
    if lines.len() < 2 {
        return Err(LedgerError::EmptyEntry);
    }

    let total_debit: BigDecimal = lines.iter().map(|l| l.debit_amount()).sum();
    let total_credit: BigDecimal = lines.iter().map(|l| l.credit_amount()).sum();
    if total_debit != total_credit {
        return Err(LedgerError::UnbalancedEntry {
            total_debit,
            total_credit,
        });
    }
    Ok(())
}

/// Validates journal entries and commits them atomically
#[derive(Clone)]
pub struct PostingEngine<S: LedgerStorage> {
    storage: S,
    company: String,
    calendar: PeriodCalendar<S>,
    config: Arc<LedgerConfig>,
    validator: Arc<dyn JournalValidator>,
}

impl<S: LedgerStorage + Clone> PostingEngine<S> {
    pub fn new(storage: S, company: impl Into<String>) -> Self {
        let company = company.into();
        Self {
            calendar: PeriodCalendar::new(storage.clone(), company.clone()),
            storage,
            company,
            config: Arc::new(LedgerConfig::default()),
            validator: Arc::new(DefaultJournalValidator),
        }
    }

    pub fn with_config(mut self, config: Arc<LedgerConfig>) -> Self {
        self.config = config;
        self
    }

    /// Additional rules run after the built-in checks
    pub fn with_validator(mut self, validator: Arc<dyn JournalValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub(crate) fn storage(&self) -> &S {
        &self.storage
    }

    pub(crate) fn company(&self) -> &str {
        &self.company
    }

    pub(crate) fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Validate and commit a journal entry.
    ///
    /// Checks run in a fixed order: duplicate id, line count, balance, each
    /// line, then the covering period. Nothing is written unless every check
    /// passes, and the commit re-checks the duplicate id and the period lock.
    #[instrument(
        skip(self, request),
        fields(company = %self.company, entry_id = %request.entry_id, source = %request.source_module)
    )]
    pub async fn post(&self, request: PostingRequest) -> LedgerResult<JournalEntry> {
        let request = &request;
        with_retry(&self.config.retry_policy(), "post_entry", move || {
            self.post_with(request, EntryLinks::default())
        })
        .await
        .inspect_err(|e| log_rejection("post_entry", e))
    }

    /// One posting attempt carrying extra commit payload; callers own the retry
    pub(crate) async fn post_with(
        &self,
        request: &PostingRequest,
        links: EntryLinks,
    ) -> LedgerResult<JournalEntry> {
        validate_entry_id(&request.entry_id)?;

        if self
            .storage
            .get_journal_entry(&self.company, &request.entry_id)
            .await?
            .is_some()
        {
            return Err(LedgerError::DuplicateEntryId(request.entry_id.clone()));
        }

        check_shape(&request.lines)?;
        let deltas = self.line_deltas(&request.lines).await?;

        let period = self.calendar.find_period_for(request.date).await?;
        if period.is_closed {
            return Err(LedgerError::PeriodClosed {
                period_id: period.id,
                date: request.date,
            });
        }

        self.validator.validate_entry(request)?;

        let entry = JournalEntry {
            entry_id: request.entry_id.clone(),
            date: request.date,
            reference: request.reference.clone(),
            description: request.description.clone(),
            source_module: request.source_module,
            source_document: links.source_document,
            reversal_of: links.reversal_of,
            period_id: period.id,
            sequence: 0,
            lines: request.lines.clone(),
            posted_at: chrono::Utc::now().naive_utc(),
        };

        let committed = self
            .storage
            .commit_posting(
                &self.company,
                PostingCommit {
                    entry,
                    deltas,
                    link: links.link,
                    reversal: links.reversal,
                },
            )
            .await?;

        info!(
            entry_id = %committed.entry_id,
            sequence = committed.sequence,
            amount = %committed.total_debits(),
            "journal entry posted"
        );
        Ok(committed)
    }

    async fn line_deltas(&self, lines: &[JournalLine]) -> LedgerResult<Vec<BalanceDelta>> {
        let mut deltas = Vec::with_capacity(lines.len());
        for line in lines {
            let (side, amount) = line.entry().ok_or_else(|| {
                LedgerError::InvalidLine(format!(
                    "line for account {} must have exactly one of debit or credit",
                    line.account_id
                ))
            })?;
            if *amount <= BigDecimal::from(0) {
                return Err(LedgerError::InvalidLine(format!(
                    "line for account {} has non-positive amount {}",
                    line.account_id, amount
                )));
            }
            if validate_amount_scale(amount, self.config.amount_scale).is_err() {
                return Err(LedgerError::InvalidLine(format!(
                    "line for account {} has more than {} decimal places",
                    line.account_id, self.config.amount_scale
                )));
            }

            let account = match self.storage.get_account(&self.company, &line.account_id).await? {
                Some(account) if account.is_active => account,
                Some(_) => {
                    return Err(LedgerError::InvalidLine(format!(
                        "account {} is inactive",
                        line.account_id
                    )))
                }
                None => {
                    return Err(LedgerError::InvalidLine(format!(
                        "account {} does not exist",
                        line.account_id
                    )))
                }
            };

            deltas.push(BalanceDelta {
                account_id: account.id.clone(),
                signed_amount: account.signed_amount(side, amount),
            });
        }
        Ok(deltas)
    }

    pub async fn get_entry(&self, entry_id: &str) -> LedgerResult<Option<JournalEntry>> {
        self.storage.get_journal_entry(&self.company, entry_id).await
    }

    /// Committed entries in commit order, optionally bounded by date
    pub async fn list_entries(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> LedgerResult<Vec<JournalEntry>> {
        self.storage
            .list_journal_entries(&self.company, start_date, end_date)
            .await
    }
}

/// Builder for posting requests
#[derive(Debug, Clone)]
pub struct JournalEntryBuilder {
    request: PostingRequest,
}

impl JournalEntryBuilder {
    /// Start a general-ledger entry
    pub fn new(entry_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            request: PostingRequest {
                entry_id: entry_id.into(),
                date,
                lines: Vec::new(),
                source_module: SourceModule::GeneralLedger,
                reference: None,
                description: None,
            },
        }
    }

    pub fn source_module(mut self, source_module: SourceModule) -> Self {
        self.request.source_module = source_module;
        self
    }

    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.request.reference = Some(reference.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.request.description = Some(description.into());
        self
    }

    /// Add a debit line
    pub fn debit(
        mut self,
        account_id: impl Into<String>,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        self.request
            .lines
            .push(JournalLine::debit(account_id.into(), amount, description));
        self
    }

    /// Add a credit line
    pub fn credit(
        mut self,
        account_id: impl Into<String>,
        amount: BigDecimal,
        description: Option<String>,
    ) -> Self {
        self.request
            .lines
            .push(JournalLine::credit(account_id.into(), amount, description));
        self
    }

    pub fn line(mut self, line: JournalLine) -> Self {
        self.request.lines.push(line);
        self
    }

    /// Build the request, rejecting entries that could never post
    pub fn build(self) -> LedgerResult<PostingRequest> {
        check_shape(&self.request.lines)?;
        Ok(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountManager;
    use crate::utils::{MemoryStorage, StrictJournalValidator};
    use std::str::FromStr;

    fn amount(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    struct Fixture {
        storage: MemoryStorage,
        engine: PostingEngine<MemoryStorage>,
        accounts: AccountManager<MemoryStorage>,
        calendar: PeriodCalendar<MemoryStorage>,
        cash: Account,
        sales: Account,
    }

    async fn fixture() -> Fixture {
        let storage = MemoryStorage::new();
        let accounts = AccountManager::new(storage.clone(), "acme");
        let calendar = PeriodCalendar::new(storage.clone(), "acme");
        let cash = accounts
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();
        let sales = accounts
            .create_account("4000".into(), "Sales".into(), AccountType::Income, None)
            .await
            .unwrap();
        calendar
            .create_period("Jan".into(), date(2024, 1, 1), date(2024, 1, 31), 2024)
            .await
            .unwrap();
        Fixture {
            engine: PostingEngine::new(storage.clone(), "acme"),
            storage,
            accounts,
            calendar,
            cash,
            sales,
        }
    }

    fn sale(f: &Fixture, entry_id: &str, value: &str) -> PostingRequest {
        JournalEntryBuilder::new(entry_id, date(2024, 1, 10))
            .debit(f.cash.id.clone(), amount(value), None)
            .credit(f.sales.id.clone(), amount(value), None)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_post_updates_balances() {
        let f = fixture().await;
        let entry = f.engine.post(sale(&f, "JE-1", "150.00")).await.unwrap();
        assert_eq!(entry.sequence, 1);
        assert!(entry.is_balanced());

        let cash = f.accounts.get_account_required(&f.cash.id).await.unwrap();
        let sales = f.accounts.get_account_required(&f.sales.id).await.unwrap();
        assert_eq!(cash.balance, amount("150.00"));
        assert_eq!(sales.balance, amount("150.00"));
        assert_eq!(f.accounts.recompute_balance(&f.cash.id).await.unwrap(), cash.balance);
    }

    #[tokio::test]
    async fn test_duplicate_entry_id_is_rejected_first() {
        let f = fixture().await;
        f.engine.post(sale(&f, "JE-1", "10.00")).await.unwrap();

        let mut again = sale(&f, "JE-1", "10.00");
        again.lines.clear();
        assert_eq!(
            f.engine.post(again).await,
            Err(LedgerError::DuplicateEntryId("JE-1".into()))
        );
    }

    #[tokio::test]
    async fn test_unbalanced_entry_reports_totals() {
        let f = fixture().await;
        let mut request = sale(&f, "JE-1", "100.00");
        request.lines[1].credit = Some(amount("99.99"));

        assert_eq!(
            f.engine.post(request).await,
            Err(LedgerError::UnbalancedEntry {
                total_debit: amount("100.00"),
                total_credit: amount("99.99"),
            })
        );
        let cash = f.accounts.get_account_required(&f.cash.id).await.unwrap();
        assert_eq!(cash.balance, BigDecimal::from(0));
    }

    #[tokio::test]
    async fn test_single_line_is_empty_entry() {
        let f = fixture().await;
        let request = PostingRequest {
            entry_id: "JE-1".into(),
            date: date(2024, 1, 10),
            lines: vec![JournalLine::debit(f.cash.id.clone(), amount("1"), None)],
            source_module: SourceModule::GeneralLedger,
            reference: None,
            description: None,
        };
        assert_eq!(f.engine.post(request).await, Err(LedgerError::EmptyEntry));
    }

    #[tokio::test]
    async fn test_invalid_lines() {
        let f = fixture().await;

        let sub_cent = sale(&f, "JE-1", "10.005");
        assert!(matches!(
            f.engine.post(sub_cent).await,
            Err(LedgerError::InvalidLine(_))
        ));

        let mut unknown = sale(&f, "JE-2", "10.00");
        unknown.lines[0].account_id = "missing".into();
        assert!(matches!(
            f.engine.post(unknown).await,
            Err(LedgerError::InvalidLine(_))
        ));

        f.accounts.deactivate(&f.sales.id).await.unwrap();
        assert!(matches!(
            f.engine.post(sale(&f, "JE-3", "10.00")).await,
            Err(LedgerError::InvalidLine(_))
        ));

        // A bad line is reported before the closed period
        let jan = f.calendar.find_period_for(date(2024, 1, 10)).await.unwrap();
        f.calendar.close(&jan.id).await.unwrap();
        assert!(matches!(
            f.engine.post(sale(&f, "JE-4", "10.00")).await,
            Err(LedgerError::InvalidLine(_))
        ));
        assert!(f.engine.list_entries(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_period_checks() {
        let f = fixture().await;

        let mut outside = sale(&f, "JE-1", "10.00");
        outside.date = date(2024, 3, 1);
        assert_eq!(
            f.engine.post(outside).await,
            Err(LedgerError::NoPeriod(date(2024, 3, 1)))
        );

        let jan = f.calendar.find_period_for(date(2024, 1, 10)).await.unwrap();
        f.calendar.close(&jan.id).await.unwrap();
        assert_eq!(
            f.engine.post(sale(&f, "JE-2", "10.00")).await,
            Err(LedgerError::PeriodClosed {
                period_id: jan.id.clone(),
                date: date(2024, 1, 10)
            })
        );

        f.calendar.reopen(&jan.id).await.unwrap();
        f.engine.post(sale(&f, "JE-2", "10.00")).await.unwrap();
        assert_eq!(
            f.calendar.delete_period(&jan.id).await,
            Err(LedgerError::PeriodInUse(jan.id.clone()))
        );
    }

    #[tokio::test]
    async fn test_custom_validator_runs_after_builtin_checks() {
        let f = fixture().await;
        let engine = PostingEngine::new(f.storage.clone(), "acme")
            .with_validator(Arc::new(StrictJournalValidator));

        let request = JournalEntryBuilder::new("JE-1", date(2024, 1, 10))
            .reference("R".repeat(101))
            .debit(f.cash.id.clone(), amount("5"), None)
            .credit(f.sales.id.clone(), amount("5"), None)
            .build()
            .unwrap();
        assert!(matches!(
            engine.post(request).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[test]
    fn test_builder_rejects_unbalanced() {
        let result = JournalEntryBuilder::new("JE-1", date(2024, 1, 10))
            .debit("a", amount("5"), None)
            .credit("b", amount("4"), None)
            .build();
        assert!(matches!(result, Err(LedgerError::UnbalancedEntry { .. })));
    }
}

//! Trial balance and ledger detail projections over committed history

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::instrument;

use crate::traits::*;
use crate::types::*;

/// Net debit-minus-credit movement per account
fn net_movements<'a>(
    entries: impl IntoIterator<Item = &'a JournalEntry>,
) -> HashMap<&'a str, BigDecimal> {
    let mut totals: HashMap<&str, BigDecimal> = HashMap::new();
    for line in entries.into_iter().flat_map(|e| e.lines.iter()) {
        *totals.entry(line.account_id.as_str()).or_default() +=
            line.debit_amount() - line.credit_amount();
    }
    totals
}

fn normal_signed(account_type: AccountType, net_debit: BigDecimal) -> BigDecimal {
    match account_type.normal_balance() {
        EntryType::Debit => net_debit,
        EntryType::Credit => -net_debit,
    }
}

/// Trial balance over a consistent copy of the books
pub(crate) fn trial_balance_from(snapshot: &BooksSnapshot, as_of_date: NaiveDate) -> TrialBalance {
    let movements = net_movements(snapshot.entries.iter().filter(|e| e.date <= as_of_date));

    let zero = BigDecimal::from(0);
    let mut total_debits = BigDecimal::from(0);
    let mut total_credits = BigDecimal::from(0);
    let mut balances = Vec::with_capacity(snapshot.accounts.len());

    for account in &snapshot.accounts {
        let net_debit = movements
            .get(account.id.as_str())
            .cloned()
            .unwrap_or_default();

        let (debit_balance, credit_balance) = if net_debit > zero {
            total_debits += &net_debit;
            (Some(net_debit.clone()), None)
        } else if net_debit < zero {
            let credit = -&net_debit;
            total_credits += &credit;
            (None, Some(credit))
        } else {
            (None, None)
        };

        balances.push(AccountBalance {
            balance: normal_signed(account.account_type, net_debit),
            account_id: account.id.clone(),
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            debit_balance,
            credit_balance,
        });
    }

    let is_balanced = total_debits == total_credits;
    TrialBalance {
        as_of_date,
        balances,
        total_debits,
        total_credits,
        is_balanced,
    }
}

/// Read-only views derived from the journal. Both reversed entries and their
/// reversals are included, so a reversed pair nets to zero from the
/// reversal date on.
#[derive(Clone)]
pub struct ReportProjector<S: LedgerStorage> {
    storage: S,
    company: String,
}

impl<S: LedgerStorage> ReportProjector<S> {
    pub fn new(storage: S, company: impl Into<String>) -> Self {
        Self {
            storage,
            company: company.into(),
        }
    }

    /// Balances of every account from lines dated on or before `as_of_date`
    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn trial_balance(&self, as_of_date: NaiveDate) -> LedgerResult<TrialBalance> {
        let snapshot = self.storage.snapshot(&self.company).await?;
        Ok(trial_balance_from(&snapshot, as_of_date))
    }

    /// Lines of one account dated `from..=to`, ordered by date then commit
    /// sequence, with a running balance signed by the account's normal side
    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn ledger_detail(
        &self,
        account_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> LedgerResult<LedgerDetail> {
        if to < from {
            return Err(LedgerError::InvalidRange { start: from, end: to });
        }
        let account = self
            .storage
            .get_account(&self.company, account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        let mut entries = self
            .storage
            .list_journal_entries(&self.company, None, Some(to))
            .await?;
        entries.sort_by_key(|e| (e.date, e.sequence));

        let (before, within): (Vec<&JournalEntry>, Vec<&JournalEntry>) =
            entries.iter().partition(|e| e.date < from);

        let opening_balance = normal_signed(
            account.account_type,
            net_movements(before)
                .remove(account.id.as_str())
                .unwrap_or_default(),
        );

        let mut running_balance = opening_balance.clone();
        let mut lines = Vec::new();
        for entry in within {
            for line in entry.lines.iter().filter(|l| l.account_id == account.id) {
                let (debit, credit) = (line.debit_amount(), line.credit_amount());
                running_balance += normal_signed(account.account_type, &debit - &credit);
                lines.push(LedgerDetailLine {
                    entry_id: entry.entry_id.clone(),
                    sequence: entry.sequence,
                    date: entry.date,
                    reference: entry.reference.clone(),
                    description: line
                        .description
                        .clone()
                        .or_else(|| entry.description.clone()),
                    debit,
                    credit,
                    running_balance: running_balance.clone(),
                });
            }
        }

        Ok(LedgerDetail {
            account_id: account.id,
            from,
            to,
            opening_balance,
            lines,
            closing_balance: running_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AccountManager, JournalEntryBuilder, PeriodCalendar, PostingEngine};
    use crate::utils::MemoryStorage;
    use std::str::FromStr;

    fn amount(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn posted_books() -> (ReportProjector<MemoryStorage>, Account, Account, Account) {
        let storage = MemoryStorage::new();
        let accounts = AccountManager::new(storage.clone(), "acme");
        let cash = accounts
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();
        let sales = accounts
            .create_account("4000".into(), "Sales".into(), AccountType::Income, None)
            .await
            .unwrap();
        let rent = accounts
            .create_account("6000".into(), "Rent".into(), AccountType::Expense, None)
            .await
            .unwrap();
        PeriodCalendar::new(storage.clone(), "acme")
            .create_period("Q1".into(), date(2024, 1, 1), date(2024, 3, 31), 2024)
            .await
            .unwrap();

        let engine = PostingEngine::new(storage.clone(), "acme");
        let posts = [
            ("JE-1", date(2024, 1, 10), &cash, &sales, "100.00"),
            ("JE-2", date(2024, 2, 1), &rent, &cash, "30.00"),
            ("JE-3", date(2024, 3, 5), &cash, &sales, "45.50"),
        ];
        for (id, on, debit, credit, value) in posts {
            let request = JournalEntryBuilder::new(id, on)
                .debit(debit.id.clone(), amount(value), None)
                .credit(credit.id.clone(), amount(value), None)
                .build()
                .unwrap();
            engine.post(request).await.unwrap();
        }

        (ReportProjector::new(storage, "acme"), cash, sales, rent)
    }

    #[tokio::test]
    async fn test_trial_balance_respects_cutoff() {
        let (projector, cash, sales, rent) = posted_books().await;

        let tb = projector.trial_balance(date(2024, 1, 31)).await.unwrap();
        assert!(tb.is_balanced);
        assert_eq!(tb.total_debits, amount("100.00"));
        assert_eq!(tb.total_credits, amount("100.00"));
        assert_eq!(tb.balances.len(), 3);
        assert_eq!(tb.balance_for(&rent.id).unwrap().balance, BigDecimal::from(0));

        let tb = projector.trial_balance(date(2024, 3, 31)).await.unwrap();
        assert!(tb.is_balanced);
        assert_eq!(tb.balance_for(&cash.id).unwrap().debit_balance, Some(amount("115.50")));
        assert_eq!(tb.balance_for(&sales.id).unwrap().credit_balance, Some(amount("145.50")));
        assert_eq!(tb.balance_for(&sales.id).unwrap().balance, amount("145.50"));
        assert_eq!(tb.total_debits, amount("145.50"));
    }

    #[tokio::test]
    async fn test_ledger_detail_running_balance() {
        let (projector, cash, ..) = posted_books().await;

        let detail = projector
            .ledger_detail(&cash.id, date(2024, 2, 1), date(2024, 3, 31))
            .await
            .unwrap();
        assert_eq!(detail.opening_balance, amount("100.00"));
        assert_eq!(detail.lines.len(), 2);
        assert_eq!(detail.lines[0].entry_id, "JE-2");
        assert_eq!(detail.lines[0].running_balance, amount("70.00"));
        assert_eq!(detail.lines[1].running_balance, amount("115.50"));
        assert_eq!(detail.closing_balance, amount("115.50"));

        assert!(matches!(
            projector
                .ledger_detail(&cash.id, date(2024, 3, 1), date(2024, 2, 1))
                .await,
            Err(LedgerError::InvalidRange { .. })
        ));
    }
}

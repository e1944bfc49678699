//! Ageing of open sub-ledger items

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::*;

/// Days-overdue bands of an ageing report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeingBucket {
    Current,
    Days30,
    Days60,
    Days90,
    Over90,
}

impl AgeingBucket {
    /// Band for a number of days past due; not yet due counts as current
    pub fn for_days_overdue(days: i64) -> Self {
        match days {
            i64::MIN..=0 => AgeingBucket::Current,
            1..=30 => AgeingBucket::Days30,
            31..=60 => AgeingBucket::Days60,
            61..=90 => AgeingBucket::Days90,
            _ => AgeingBucket::Over90,
        }
    }
}

/// Outstanding amounts of one counterparty spread over the ageing bands.
///
/// Amounts are signed by the sub-ledger's natural side: invoices count
/// positive, unallocated payments and credit notes negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeingRow {
    pub counterparty_id: String,
    pub counterparty_code: Option<String>,
    pub counterparty_name: Option<String>,
    pub current: BigDecimal,
    pub days_30: BigDecimal,
    pub days_60: BigDecimal,
    pub days_90: BigDecimal,
    pub over_90: BigDecimal,
    pub total: BigDecimal,
}

impl AgeingRow {
    fn add(&mut self, bucket: AgeingBucket, amount: &BigDecimal) {
        let slot = match bucket {
            AgeingBucket::Current => &mut self.current,
            AgeingBucket::Days30 => &mut self.days_30,
            AgeingBucket::Days60 => &mut self.days_60,
            AgeingBucket::Days90 => &mut self.days_90,
            AgeingBucket::Over90 => &mut self.over_90,
        };
        *slot += amount;
        self.total += amount;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeingReport {
    pub subledger: Subledger,
    pub as_at: NaiveDate,
    /// One row per counterparty with open items, ordered by counterparty id
    pub rows: Vec<AgeingRow>,
}

impl AgeingReport {
    pub fn total(&self) -> BigDecimal {
        self.rows.iter().map(|r| &r.total).sum()
    }
}

/// Outstanding amount of a transaction signed by the sub-ledger's natural side
pub fn signed_outstanding(transaction: &SubledgerTransaction) -> BigDecimal {
    let outstanding = transaction.outstanding();
    if transaction.affects_balance == transaction.subledger.natural_effect() {
        outstanding
    } else {
        -outstanding
    }
}

/// Age posted, not fully allocated transactions dated on or before `as_at`.
/// Overdue days run from the due date, or the transaction date when no due
/// date was given.
pub fn age_transactions<'a>(
    subledger: Subledger,
    as_at: NaiveDate,
    transactions: impl IntoIterator<Item = &'a SubledgerTransaction>,
) -> AgeingReport {
    let mut rows: BTreeMap<String, AgeingRow> = BTreeMap::new();

    for transaction in transactions.into_iter().filter(|t| {
        t.subledger == subledger
            && t.is_posted
            && t.transaction_date <= as_at
            && !t.is_fully_allocated()
    }) {
        let due = transaction.due_date.unwrap_or(transaction.transaction_date);
        let bucket = AgeingBucket::for_days_overdue((as_at - due).num_days());

        rows.entry(transaction.counterparty_id.clone())
            .or_insert_with(|| AgeingRow {
                counterparty_id: transaction.counterparty_id.clone(),
                ..AgeingRow::default()
            })
            .add(bucket, &signed_outstanding(transaction));
    }

    AgeingReport {
        subledger,
        as_at,
        rows: rows.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn posted(
        counterparty: &str,
        effect: EntryType,
        on: NaiveDate,
        due: Option<NaiveDate>,
        amount: &str,
    ) -> SubledgerTransaction {
        SubledgerTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            subledger: Subledger::Receivables,
            transaction_number: "AR000001".into(),
            counterparty_id: counterparty.into(),
            transaction_type_id: "INV".into(),
            affects_balance: effect,
            transaction_date: on,
            due_date: due,
            amount: BigDecimal::from_str(amount).unwrap(),
            allocated: BigDecimal::from(0),
            reference: None,
            description: None,
            is_posted: true,
            journal_entry_id: None,
            posting_count: 1,
            version: 1,
            created_at: chrono::Utc::now().naive_utc(),
            posted_at: None,
        }
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(AgeingBucket::for_days_overdue(-5), AgeingBucket::Current);
        assert_eq!(AgeingBucket::for_days_overdue(0), AgeingBucket::Current);
        assert_eq!(AgeingBucket::for_days_overdue(1), AgeingBucket::Days30);
        assert_eq!(AgeingBucket::for_days_overdue(30), AgeingBucket::Days30);
        assert_eq!(AgeingBucket::for_days_overdue(31), AgeingBucket::Days60);
        assert_eq!(AgeingBucket::for_days_overdue(90), AgeingBucket::Days90);
        assert_eq!(AgeingBucket::for_days_overdue(91), AgeingBucket::Over90);
    }

    #[test]
    fn test_rows_net_invoices_against_payments() {
        let as_at = date(2024, 4, 30);
        let transactions = vec![
            posted("C1", EntryType::Debit, date(2024, 1, 1), Some(date(2024, 1, 31)), "500.00"),
            posted("C1", EntryType::Debit, date(2024, 4, 10), Some(date(2024, 5, 10)), "80.00"),
            posted("C1", EntryType::Credit, date(2024, 4, 20), None, "100.00"),
            posted("C2", EntryType::Debit, date(2024, 5, 1), None, "999.00"),
        ];

        let report = age_transactions(Subledger::Receivables, as_at, &transactions);
        assert_eq!(report.rows.len(), 1);

        let row = &report.rows[0];
        assert_eq!(row.counterparty_id, "C1");
        assert_eq!(row.days_90, BigDecimal::from_str("500.00").unwrap());
        assert_eq!(row.current, BigDecimal::from_str("80.00").unwrap());
        assert_eq!(row.days_30, BigDecimal::from_str("-100.00").unwrap());
        assert_eq!(report.total(), BigDecimal::from_str("480.00").unwrap());
    }
}

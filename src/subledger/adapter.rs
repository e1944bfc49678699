//! Staging and posting of AR/AP transactions

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::ledger::journal::EntryLinks;
use crate::ledger::PostingEngine;
use crate::subledger::ageing::{age_transactions, AgeingReport};
use crate::traits::*;
use crate::types::*;
use crate::utils::{log_rejection, validate_money, validate_reference, with_retry};

/// Turns customer and supplier documents into balanced journal entries
#[derive(Clone)]
pub struct SubledgerManager<S: LedgerStorage> {
    engine: PostingEngine<S>,
    counterparties: Arc<dyn CounterpartyDirectory>,
    transaction_types: Arc<dyn TransactionTypeCatalog>,
}

impl<S: LedgerStorage + Clone> SubledgerManager<S> {
    pub fn new(
        engine: PostingEngine<S>,
        counterparties: Arc<dyn CounterpartyDirectory>,
        transaction_types: Arc<dyn TransactionTypeCatalog>,
    ) -> Self {
        Self {
            engine,
            counterparties,
            transaction_types,
        }
    }

    fn company(&self) -> &str {
        self.engine.company()
    }

    async fn active_counterparty(
        &self,
        subledger: Subledger,
        counterparty_id: &str,
    ) -> LedgerResult<Counterparty> {
        let counterparty = self
            .counterparties
            .get_counterparty(self.company(), counterparty_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| LedgerError::CounterpartyNotFound(counterparty_id.to_string()))?;
        if counterparty.subledger != subledger {
            return Err(LedgerError::Validation(format!(
                "counterparty {} belongs to the {} ledger",
                counterparty_id, counterparty.subledger
            )));
        }
        Ok(counterparty)
    }

    async fn transaction_type(&self, type_id: &str) -> LedgerResult<TransactionType> {
        self.transaction_types
            .get_transaction_type(self.company(), type_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionTypeNotFound(type_id.to_string()))
    }

    /// Stage an unposted transaction with the next number of its sub-ledger
    #[instrument(
        skip(self, new),
        fields(company = %self.company(), counterparty_id = %new.counterparty_id)
    )]
    pub async fn create_transaction(
        &self,
        subledger: Subledger,
        new: NewSubledgerTransaction,
    ) -> LedgerResult<SubledgerTransaction> {
        validate_money(&new.amount, self.engine.config().amount_scale)?;
        validate_reference(new.reference.as_deref())?;
        if let Some(due_date) = new.due_date {
            if due_date < new.date {
                return Err(LedgerError::Validation(format!(
                    "due date {} precedes transaction date {}",
                    due_date, new.date
                )));
            }
        }

        self.active_counterparty(subledger, &new.counterparty_id)
            .await?;
        let transaction_type = self.transaction_type(&new.transaction_type_id).await?;
        if !transaction_type.is_active {
            return Err(LedgerError::TransactionTypeNotFound(transaction_type.id));
        }
        if transaction_type.subledger != subledger {
            return Err(LedgerError::Validation(format!(
                "transaction type {} belongs to the {} ledger",
                transaction_type.code, transaction_type.subledger
            )));
        }

        let storage = self.engine.storage();
        let number = storage
            .next_sequence(self.company(), subledger.prefix())
            .await?;
        let transaction_number = format!(
            "{}{:0width$}",
            subledger.prefix(),
            number,
            width = self.engine.config().number_width
        );

        let transaction = SubledgerTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            subledger,
            transaction_number,
            counterparty_id: new.counterparty_id,
            transaction_type_id: transaction_type.id,
            affects_balance: transaction_type.affects_balance,
            transaction_date: new.date,
            due_date: new.due_date,
            amount: new.amount,
            allocated: BigDecimal::from(0),
            reference: new.reference,
            description: new.description,
            is_posted: false,
            journal_entry_id: None,
            posting_count: 0,
            version: 0,
            created_at: chrono::Utc::now().naive_utc(),
            posted_at: None,
        };
        storage.insert_transaction(self.company(), &transaction).await?;

        info!(
            transaction_id = %transaction.id,
            number = %transaction.transaction_number,
            amount = %transaction.amount,
            "transaction staged"
        );
        Ok(transaction)
    }

    /// Post a staged transaction to the general ledger.
    ///
    /// The control account line sits on the type's balance-effect side and
    /// the offset account on the other; the transaction is flagged as posted
    /// in the same commit.
    #[instrument(skip(self), fields(company = %self.company()))]
    pub async fn post(&self, transaction_id: &str) -> LedgerResult<JournalEntry> {
        let entry = with_retry(
            &self.engine.config().retry_policy(),
            "post_transaction",
            move || self.try_post(transaction_id),
        )
        .await
        .inspect_err(|e| log_rejection("post_transaction", e))?;

        info!(transaction_id, entry_id = %entry.entry_id, "transaction posted");
        Ok(entry)
    }

    async fn try_post(&self, transaction_id: &str) -> LedgerResult<JournalEntry> {
        let transaction = self.get_transaction_required(transaction_id).await?;
        if transaction.is_posted {
            return Err(LedgerError::AlreadyPosted(transaction_id.to_string()));
        }

        let transaction_type = self.transaction_type(&transaction.transaction_type_id).await?;
        let counterparty = self
            .active_counterparty(transaction.subledger, &transaction.counterparty_id)
            .await?;

        let control_account = counterparty
            .control_account_id
            .unwrap_or(transaction_type.control_account_id);
        let description = transaction
            .description
            .clone()
            .unwrap_or_else(|| format!("{} {}", transaction_type.name, transaction.transaction_number));

        let entry_id = match transaction.posting_count {
            0 => format!("JE-{}", transaction.transaction_number),
            n => format!("JE-{}-{}", transaction.transaction_number, n),
        };
        let request = PostingRequest {
            entry_id,
            date: transaction.transaction_date,
            lines: vec![
                JournalLine::new(
                    control_account,
                    transaction.affects_balance,
                    transaction.amount.clone(),
                    Some(counterparty.name.clone()),
                ),
                JournalLine::new(
                    transaction_type.offset_account_id,
                    transaction.affects_balance.opposite(),
                    transaction.amount.clone(),
                    None,
                ),
            ],
            source_module: transaction.subledger.source_module(),
            reference: transaction
                .reference
                .clone()
                .or_else(|| Some(transaction.transaction_number.clone())),
            description: Some(description),
        };

        let links = EntryLinks {
            source_document: Some(transaction.id.clone()),
            link: Some(SubledgerLink::Post {
                transaction_id: transaction.id.clone(),
                expected_version: transaction.version,
            }),
            ..EntryLinks::default()
        };
        self.engine.post_with(&request, links).await
    }

    pub async fn get_transaction(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<Option<SubledgerTransaction>> {
        self.engine
            .storage()
            .get_transaction(self.company(), transaction_id)
            .await
    }

    pub async fn get_transaction_required(
        &self,
        transaction_id: &str,
    ) -> LedgerResult<SubledgerTransaction> {
        self.get_transaction(transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Transactions ordered by number, optionally for one counterparty
    pub async fn list_transactions(
        &self,
        subledger: Subledger,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<Vec<SubledgerTransaction>> {
        self.engine
            .storage()
            .list_transactions(self.company(), subledger, counterparty_id)
            .await
    }

    /// What a customer owes (AR) or is owed to a supplier (AP), from posted
    /// transactions at face value
    pub async fn counterparty_balance(&self, counterparty_id: &str) -> LedgerResult<BigDecimal> {
        let counterparty = self
            .counterparties
            .get_counterparty(self.company(), counterparty_id)
            .await?
            .ok_or_else(|| LedgerError::CounterpartyNotFound(counterparty_id.to_string()))?;
        let natural = counterparty.subledger.natural_effect();

        Ok(self
            .list_transactions(counterparty.subledger, Some(counterparty_id))
            .await?
            .into_iter()
            .filter(|t| t.is_posted)
            .map(|t| {
                if t.affects_balance == natural {
                    t.amount
                } else {
                    -t.amount
                }
            })
            .sum())
    }

    /// Ageing of open items as at a date, optionally for one counterparty
    #[instrument(skip(self), fields(company = %self.company()))]
    pub async fn ageing(
        &self,
        subledger: Subledger,
        as_at: NaiveDate,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<AgeingReport> {
        let transactions = self.list_transactions(subledger, counterparty_id).await?;
        let mut report = age_transactions(subledger, as_at, &transactions);

        for row in &mut report.rows {
            if let Some(counterparty) = self
                .counterparties
                .get_counterparty(self.company(), &row.counterparty_id)
                .await?
            {
                row.counterparty_code = Some(counterparty.code);
                row.counterparty_name = Some(counterparty.name);
            }
        }
        Ok(report)
    }
}

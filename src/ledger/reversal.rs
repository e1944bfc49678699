//! Reversal of posted journal entries

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::ledger::journal::EntryLinks;
use crate::ledger::PostingEngine;
use crate::traits::*;
use crate::types::*;
use crate::utils::{log_rejection, with_retry};

/// Posts mirror-image entries for previously posted ones
#[derive(Clone)]
pub struct ReversalEngine<S: LedgerStorage> {
    engine: PostingEngine<S>,
}

impl<S: LedgerStorage + Clone> ReversalEngine<S> {
    pub fn new(engine: PostingEngine<S>) -> Self {
        Self { engine }
    }

    /// Reverse a posted entry on `reversal_date`.
    ///
    /// The reversal goes through the normal posting checks, so the period
    /// covering `reversal_date` must be open. If the entry came from a
    /// sub-ledger transaction, that transaction returns to the unposted state
    /// in the same commit; it must have no allocations left.
    #[instrument(skip(self, reference), fields(company = %self.engine.company()))]
    pub async fn reverse(
        &self,
        entry_id: &str,
        reversal_date: NaiveDate,
        reference: Option<String>,
    ) -> LedgerResult<JournalEntry> {
        let reference = reference.as_deref();
        let reversal = with_retry(&self.engine.config().retry_policy(), "reverse_entry", move || {
            self.try_reverse(entry_id, reversal_date, reference)
        })
        .await
        .inspect_err(|e| log_rejection("reverse_entry", e))?;

        info!(
            entry_id,
            reversal_entry_id = %reversal.entry_id,
            "journal entry reversed"
        );
        Ok(reversal)
    }

    async fn try_reverse(
        &self,
        entry_id: &str,
        reversal_date: NaiveDate,
        reference: Option<&str>,
    ) -> LedgerResult<JournalEntry> {
        let storage = self.engine.storage();
        let company = self.engine.company();

        let original = storage
            .get_journal_entry(company, entry_id)
            .await?
            .ok_or_else(|| LedgerError::EntryNotFound(entry_id.to_string()))?;
        if original.reversal_of.is_some() {
            return Err(LedgerError::Validation(format!(
                "{} is itself a reversal and cannot be reversed",
                entry_id
            )));
        }
        if storage.get_reversal_status(company, entry_id).await?.is_some() {
            return Err(LedgerError::AlreadyReversed(entry_id.to_string()));
        }

        let link = match &original.source_document {
            Some(transaction_id) => {
                let transaction = storage
                    .get_transaction(company, transaction_id)
                    .await?
                    .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.clone()))?;
                if transaction.allocated != bigdecimal::BigDecimal::from(0) {
                    return Err(LedgerError::HasActiveAllocations {
                        transaction_id: transaction.id,
                        allocated: transaction.allocated,
                    });
                }
                (transaction.journal_entry_id.as_deref() == Some(entry_id)).then(|| {
                    SubledgerLink::Reset {
                        transaction_id: transaction.id.clone(),
                        expected_version: transaction.version,
                    }
                })
            }
            None => None,
        };

        let reversal_entry_id = format!("{}{}", entry_id, self.engine.config().reversal_suffix);
        let request = PostingRequest {
            entry_id: reversal_entry_id.clone(),
            date: reversal_date,
            lines: original.lines.iter().map(JournalLine::swapped).collect(),
            source_module: original.source_module,
            reference: reference
                .map(str::to_string)
                .or_else(|| original.reference.clone()),
            description: Some(format!("Reversal of {}", entry_id)),
        };

        let links = EntryLinks {
            source_document: original.source_document.clone(),
            reversal_of: Some(entry_id.to_string()),
            link,
            reversal: Some(ReversalStatus {
                entry_id: entry_id.to_string(),
                reversal_entry_id,
                reversal_date,
                recorded_at: chrono::Utc::now().naive_utc(),
            }),
        };

        self.engine.post_with(&request, links).await
    }

    pub async fn reversal_status(&self, entry_id: &str) -> LedgerResult<Option<ReversalStatus>> {
        self.engine
            .storage()
            .get_reversal_status(self.engine.company(), entry_id)
            .await
    }

    pub async fn is_reversed(&self, entry_id: &str) -> LedgerResult<bool> {
        Ok(self.reversal_status(entry_id).await?.is_some())
    }
}

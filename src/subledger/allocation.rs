//! Allocation of payments and credit notes against invoices

use bigdecimal::BigDecimal;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::LedgerConfig;
use crate::traits::*;
use crate::types::*;
use crate::utils::{log_rejection, validate_money, with_retry};

/// Links debit-effect and credit-effect transactions of the same
/// counterparty. Never posts to the general ledger.
#[derive(Clone)]
pub struct AllocationEngine<S: LedgerStorage> {
    storage: S,
    company: String,
    config: Arc<LedgerConfig>,
}

impl<S: LedgerStorage> AllocationEngine<S> {
    pub fn new(storage: S, company: impl Into<String>) -> Self {
        Self {
            storage,
            company: company.into(),
            config: Arc::new(LedgerConfig::default()),
        }
    }

    pub fn with_config(mut self, config: Arc<LedgerConfig>) -> Self {
        self.config = config;
        self
    }

    async fn transaction(&self, transaction_id: &str) -> LedgerResult<SubledgerTransaction> {
        self.storage
            .get_transaction(&self.company, transaction_id)
            .await?
            .ok_or_else(|| LedgerError::TransactionNotFound(transaction_id.to_string()))
    }

    /// Allocate `amount` from a credit-effect transaction (payment, credit
    /// note) to a debit-effect one (invoice), or the reverse for payables
    #[instrument(skip(self, amount), fields(company = %self.company, %amount))]
    pub async fn allocate(
        &self,
        debit_transaction_id: &str,
        credit_transaction_id: &str,
        amount: &BigDecimal,
    ) -> LedgerResult<Allocation> {
        validate_money(amount, self.config.amount_scale)?;

        let allocation = with_retry(&self.config.retry_policy(), "allocate", move || {
            self.try_allocate(debit_transaction_id, credit_transaction_id, amount)
        })
        .await
        .inspect_err(|e| log_rejection("allocate", e))?;

        info!(allocation_id = %allocation.id, "allocation recorded");
        Ok(allocation)
    }

    async fn try_allocate(
        &self,
        debit_transaction_id: &str,
        credit_transaction_id: &str,
        amount: &BigDecimal,
    ) -> LedgerResult<Allocation> {
        if debit_transaction_id == credit_transaction_id {
            return Err(LedgerError::InvalidAllocation(
                "a transaction cannot be allocated to itself".to_string(),
            ));
        }
        let debit = self.transaction(debit_transaction_id).await?;
        let credit = self.transaction(credit_transaction_id).await?;

        if debit.subledger != credit.subledger || debit.counterparty_id != credit.counterparty_id {
            return Err(LedgerError::CounterpartyMismatch);
        }
        for transaction in [&debit, &credit] {
            if !transaction.is_posted {
                return Err(LedgerError::NotPosted(transaction.id.clone()));
            }
        }
        if debit.affects_balance != EntryType::Debit {
            return Err(LedgerError::InvalidAllocation(format!(
                "{} does not have a debit balance effect",
                debit.transaction_number
            )));
        }
        if credit.affects_balance != EntryType::Credit {
            return Err(LedgerError::InvalidAllocation(format!(
                "{} does not have a credit balance effect",
                credit.transaction_number
            )));
        }
        for transaction in [&debit, &credit] {
            let outstanding = transaction.outstanding();
            if &outstanding < amount {
                return Err(LedgerError::AmountExceedsOutstanding {
                    transaction_id: transaction.id.clone(),
                    outstanding,
                    requested: amount.clone(),
                });
            }
        }

        let allocation = Allocation {
            id: uuid::Uuid::new_v4().to_string(),
            subledger: debit.subledger,
            counterparty_id: debit.counterparty_id.clone(),
            debit_transaction_id: debit.id.clone(),
            credit_transaction_id: credit.id.clone(),
            amount: amount.clone(),
            reverses: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        };
        self.commit(allocation, &debit, &credit).await
    }

    /// Take back up to the remaining amount of an earlier allocation by
    /// appending an offsetting record
    #[instrument(skip(self, amount), fields(company = %self.company, %amount))]
    pub async fn unallocate(&self, allocation_id: &str, amount: &BigDecimal) -> LedgerResult<Allocation> {
        validate_money(amount, self.config.amount_scale)?;

        let allocation = with_retry(&self.config.retry_policy(), "unallocate", move || {
            self.try_unallocate(allocation_id, amount)
        })
        .await
        .inspect_err(|e| log_rejection("unallocate", e))?;

        info!(allocation_id, reversal_id = %allocation.id, "allocation reduced");
        Ok(allocation)
    }

    async fn try_unallocate(&self, allocation_id: &str, amount: &BigDecimal) -> LedgerResult<Allocation> {
        let original = self
            .storage
            .get_allocation(&self.company, allocation_id)
            .await?
            .ok_or_else(|| LedgerError::AllocationNotFound(allocation_id.to_string()))?;
        if original.reverses.is_some() {
            return Err(LedgerError::InvalidAllocation(format!(
                "{} is itself an un-allocation",
                allocation_id
            )));
        }

        let remaining = self.remaining(&original).await?;
        if amount > &remaining {
            return Err(LedgerError::ExceedsAllocated {
                allocation_id: allocation_id.to_string(),
                remaining,
                requested: amount.clone(),
            });
        }

        let debit = self.transaction(&original.debit_transaction_id).await?;
        let credit = self.transaction(&original.credit_transaction_id).await?;
        let reversal = Allocation {
            id: uuid::Uuid::new_v4().to_string(),
            amount: -amount,
            reverses: Some(original.id.clone()),
            recorded_at: chrono::Utc::now().naive_utc(),
            ..original
        };
        self.commit(reversal, &debit, &credit).await
    }

    async fn commit(
        &self,
        allocation: Allocation,
        debit: &SubledgerTransaction,
        credit: &SubledgerTransaction,
    ) -> LedgerResult<Allocation> {
        self.storage
            .commit_allocation(
                &self.company,
                AllocationCommit {
                    allocation,
                    debit_side: AllocationSide {
                        transaction_id: debit.id.clone(),
                        expected_version: debit.version,
                    },
                    credit_side: AllocationSide {
                        transaction_id: credit.id.clone(),
                        expected_version: credit.version,
                    },
                },
            )
            .await
    }

    /// Net amount still allocated by an allocation after its un-allocations
    pub async fn remaining(&self, allocation: &Allocation) -> LedgerResult<BigDecimal> {
        let offsets: BigDecimal = self
            .storage
            .list_allocations(&self.company, Some(&allocation.debit_transaction_id))
            .await?
            .iter()
            .filter(|a| a.reverses.as_deref() == Some(allocation.id.as_str()))
            .map(|a| &a.amount)
            .sum();
        Ok(&allocation.amount + offsets)
    }

    /// Allocation records touching a transaction, in the order recorded
    pub async fn allocations_for(&self, transaction_id: &str) -> LedgerResult<Vec<Allocation>> {
        self.storage
            .list_allocations(&self.company, Some(transaction_id))
            .await
    }

    /// Posted transactions that still have an outstanding amount
    pub async fn open_items(
        &self,
        subledger: Subledger,
        counterparty_id: Option<&str>,
    ) -> LedgerResult<Vec<SubledgerTransaction>> {
        Ok(self
            .storage
            .list_transactions(&self.company, subledger, counterparty_id)
            .await?
            .into_iter()
            .filter(|t| t.is_posted && !t.is_fully_allocated())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subledger::fixtures::*;

    #[tokio::test]
    async fn test_partial_allocation_and_bound() {
        let books = Books::new().await;
        let invoice = books.posted_invoice("500.00").await;
        let payment = books.posted_payment("300.00").await;

        let allocation = books
            .allocations
            .allocate(&invoice.id, &payment.id, &amount("300.00"))
            .await
            .unwrap();
        assert_eq!(allocation.amount, amount("300.00"));

        let invoice = books.transaction(&invoice.id).await;
        let payment = books.transaction(&payment.id).await;
        assert_eq!(invoice.outstanding(), amount("200.00"));
        assert_eq!(payment.outstanding(), amount("0.00"));

        let second = books.posted_payment("250.00").await;
        let result = books
            .allocations
            .allocate(&invoice.id, &second.id, &amount("250.00"))
            .await;
        assert_eq!(
            result,
            Err(LedgerError::AmountExceedsOutstanding {
                transaction_id: invoice.id.clone(),
                outstanding: amount("200.00"),
                requested: amount("250.00"),
            })
        );
        assert_eq!(books.transaction(&second.id).await.allocated, BigDecimal::from(0));
        assert_eq!(books.transaction(&invoice.id).await.allocated, amount("300.00"));
    }

    #[tokio::test]
    async fn test_sides_must_match_effects_and_be_posted() {
        let books = Books::new().await;
        let invoice = books.posted_invoice("100.00").await;
        let payment = books.posted_payment("100.00").await;
        let staged = books.staged_invoice("40.00").await;

        assert!(matches!(
            books.allocations.allocate(&payment.id, &invoice.id, &amount("10.00")).await,
            Err(LedgerError::InvalidAllocation(_))
        ));
        assert_eq!(
            books.allocations.allocate(&staged.id, &payment.id, &amount("10.00")).await,
            Err(LedgerError::NotPosted(staged.id.clone()))
        );
        assert!(matches!(
            books.allocations.allocate(&invoice.id, &payment.id, &amount("-1.00")).await,
            Err(LedgerError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_other_customer_is_rejected() {
        let books = Books::new().await;
        let invoice = books.posted_invoice("100.00").await;
        let foreign = books.posted_payment_for(OTHER_CUSTOMER, "100.00").await;

        assert_eq!(
            books.allocations.allocate(&invoice.id, &foreign.id, &amount("10.00")).await,
            Err(LedgerError::CounterpartyMismatch)
        );
    }

    #[tokio::test]
    async fn test_unallocate_appends_offsetting_record() {
        let books = Books::new().await;
        let invoice = books.posted_invoice("500.00").await;
        let payment = books.posted_payment("300.00").await;
        let allocation = books
            .allocations
            .allocate(&invoice.id, &payment.id, &amount("300.00"))
            .await
            .unwrap();

        let undo = books
            .allocations
            .unallocate(&allocation.id, &amount("120.00"))
            .await
            .unwrap();
        assert_eq!(undo.amount, amount("-120.00"));
        assert_eq!(undo.reverses.as_deref(), Some(allocation.id.as_str()));
        assert_eq!(books.allocations.remaining(&allocation).await.unwrap(), amount("180.00"));
        assert_eq!(books.transaction(&invoice.id).await.outstanding(), amount("320.00"));

        assert!(matches!(
            books.allocations.unallocate(&allocation.id, &amount("180.01")).await,
            Err(LedgerError::ExceedsAllocated { .. })
        ));
        assert_eq!(books.allocations.allocations_for(&payment.id).await.unwrap().len(), 2);

        let open = books
            .allocations
            .open_items(Subledger::Receivables, Some(CUSTOMER))
            .await
            .unwrap();
        assert_eq!(open.len(), 2);
    }
}

//! In-memory counterparty directory and transaction type catalog

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::traits::*;
use crate::types::*;

type Key = (String, String);

/// In-memory master data for testing and development
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    counterparties: Arc<RwLock<HashMap<Key, Counterparty>>>,
    transaction_types: Arc<RwLock<HashMap<Key, TransactionType>>>,
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::Storage("catalog lock poisoned".to_string())
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a customer/supplier
    pub fn add_counterparty(&self, company: &str, counterparty: Counterparty) -> LedgerResult<()> {
        self.counterparties
            .write()
            .map_err(poisoned)?
            .insert((company.to_string(), counterparty.id.clone()), counterparty);
        Ok(())
    }

    /// Register or replace a transaction type
    pub fn add_transaction_type(
        &self,
        company: &str,
        transaction_type: TransactionType,
    ) -> LedgerResult<()> {
        self.transaction_types
            .write()
            .map_err(poisoned)?
            .insert(
                (company.to_string(), transaction_type.id.clone()),
                transaction_type,
            );
        Ok(())
    }

    pub fn set_counterparty_active(
        &self,
        company: &str,
        counterparty_id: &str,
        is_active: bool,
    ) -> LedgerResult<()> {
        let mut counterparties = self.counterparties.write().map_err(poisoned)?;
        let counterparty = counterparties
            .get_mut(&(company.to_string(), counterparty_id.to_string()))
            .ok_or_else(|| LedgerError::CounterpartyNotFound(counterparty_id.to_string()))?;
        counterparty.is_active = is_active;
        Ok(())
    }
}

#[async_trait]
impl CounterpartyDirectory for MemoryCatalog {
    async fn get_counterparty(
        &self,
        company: &str,
        counterparty_id: &str,
    ) -> LedgerResult<Option<Counterparty>> {
        Ok(self
            .counterparties
            .read()
            .map_err(poisoned)?
            .get(&(company.to_string(), counterparty_id.to_string()))
            .cloned())
    }
}

#[async_trait]
impl TransactionTypeCatalog for MemoryCatalog {
    async fn get_transaction_type(
        &self,
        company: &str,
        type_id: &str,
    ) -> LedgerResult<Option<TransactionType>> {
        Ok(self
            .transaction_types
            .read()
            .map_err(poisoned)?
            .get(&(company.to_string(), type_id.to_string()))
            .cloned())
    }
}

//! Chart of accounts management

use bigdecimal::BigDecimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::{LedgerConfig, RetryPolicy};
use crate::traits::*;
use crate::types::*;
use crate::utils::{validate_account_code, validate_account_name, with_retry};

/// Account manager for handling chart of accounts operations
#[derive(Clone)]
pub struct AccountManager<S: LedgerStorage> {
    storage: S,
    company: String,
    validator: Arc<dyn AccountValidator>,
    retry: RetryPolicy,
}

impl<S: LedgerStorage> AccountManager<S> {
    /// Create a new account manager
    pub fn new(storage: S, company: impl Into<String>) -> Self {
        Self::with_validator(storage, company, Arc::new(DefaultAccountValidator))
    }

    /// Create a new account manager with custom validator
    pub fn with_validator(
        storage: S,
        company: impl Into<String>,
        validator: Arc<dyn AccountValidator>,
    ) -> Self {
        Self {
            storage,
            company: company.into(),
            validator,
            retry: LedgerConfig::default().retry_policy(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create a new account.
    ///
    /// The parent, when given, must exist and be active. A freshly created
    /// account has no children, so it can never close a cycle.
    #[instrument(skip(self, name), fields(company = %self.company))]
    pub async fn create_account(
        &self,
        code: String,
        name: String,
        account_type: AccountType,
        parent_id: Option<String>,
    ) -> LedgerResult<Account> {
        validate_account_code(&code)?;
        validate_account_name(&name)?;

        let account = Account::new(code, name, account_type, parent_id);
        self.validator.validate_account(&account)?;

        if let Some(ref parent_id) = account.parent_id {
            match self.storage.get_account(&self.company, parent_id).await? {
                Some(parent) if parent.is_active => {}
                Some(_) => {
                    return Err(LedgerError::InvalidParent(format!(
                        "parent account '{}' is inactive",
                        parent_id
                    )))
                }
                None => {
                    return Err(LedgerError::InvalidParent(format!(
                        "parent account '{}' does not exist",
                        parent_id
                    )))
                }
            }
        }

        self.storage.insert_account(&self.company, &account).await?;
        info!(account_id = %account.id, code = %account.code, "account created");
        Ok(account)
    }

    /// Get an account by ID
    pub async fn get_account(&self, account_id: &str) -> LedgerResult<Option<Account>> {
        self.storage.get_account(&self.company, account_id).await
    }

    /// Get an account by ID, returning an error if not found
    pub async fn get_account_required(&self, account_id: &str) -> LedgerResult<Account> {
        self.get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    pub async fn find_by_code(&self, code: &str) -> LedgerResult<Option<Account>> {
        self.storage.find_account_by_code(&self.company, code).await
    }

    /// List accounts ordered by code
    pub async fn list_accounts(&self, account_type: Option<AccountType>) -> LedgerResult<Vec<Account>> {
        self.storage.list_accounts(&self.company, account_type).await
    }

    /// Soft-deactivate an account. History is kept; new postings are refused.
    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn deactivate(&self, account_id: &str) -> LedgerResult<Account> {
        let account = with_retry(&self.retry, "deactivate_account", move || {
            self.set_active(account_id, false)
        })
        .await?;
        info!(account_id, "account deactivated");
        Ok(account)
    }

    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn reactivate(&self, account_id: &str) -> LedgerResult<Account> {
        let account = with_retry(&self.retry, "reactivate_account", move || {
            self.set_active(account_id, true)
        })
        .await?;
        info!(account_id, "account reactivated");
        Ok(account)
    }

    async fn set_active(&self, account_id: &str, is_active: bool) -> LedgerResult<Account> {
        let account = self.get_account_required(account_id).await?;
        if account.is_active == is_active {
            return Ok(account);
        }
        if !is_active {
            self.validator.validate_deactivation(&account)?;
        }
        self.storage
            .set_account_active(&self.company, account_id, is_active, account.version)
            .await
    }

    /// Remove an account that was never referenced
    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn delete_account(&self, account_id: &str) -> LedgerResult<()> {
        self.storage.delete_account(&self.company, account_id).await?;
        info!(account_id, "account deleted");
        Ok(())
    }

    /// Balance of an account recomputed from every committed journal line
    pub async fn recompute_balance(&self, account_id: &str) -> LedgerResult<BigDecimal> {
        let account = self.get_account_required(account_id).await?;
        let entries = self
            .storage
            .list_journal_entries(&self.company, None, None)
            .await?;

        let balance = entries
            .iter()
            .flat_map(|entry| entry.lines.iter())
            .filter(|line| line.account_id == account.id)
            .filter_map(|line| line.entry())
            .map(|(side, amount)| account.signed_amount(side, amount))
            .sum();
        Ok(balance)
    }

    pub async fn child_accounts(&self, parent_id: &str) -> LedgerResult<Vec<Account>> {
        let all_accounts = self.list_accounts(None).await?;
        Ok(all_accounts
            .into_iter()
            .filter(|account| account.parent_id.as_deref() == Some(parent_id))
            .collect())
    }

    /// Accounts from the root down to `account_id`
    pub async fn account_path(&self, account_id: &str) -> LedgerResult<Vec<Account>> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current_account_id = Some(account_id.to_string());

        while let Some(id) = current_account_id {
            if !visited.insert(id.clone()) {
                return Err(LedgerError::InvalidParent(format!(
                    "account hierarchy loops back to '{}'",
                    id
                )));
            }
            let account = self.get_account_required(&id).await?;
            current_account_id = account.parent_id.clone();
            path.insert(0, account);
        }

        Ok(path)
    }
}

/// Utility functions for working with accounts
pub mod utils {
    use super::*;

    const STANDARD_CHART: &[(&str, &str, &str, AccountType)] = &[
        ("cash", "1000", "Cash", AccountType::Asset),
        ("bank", "1100", "Bank", AccountType::Asset),
        ("accounts_receivable", "1200", "Accounts Receivable", AccountType::Asset),
        ("inventory", "1300", "Inventory", AccountType::Asset),
        ("accounts_payable", "2000", "Accounts Payable", AccountType::Liability),
        ("loans_payable", "2100", "Loans Payable", AccountType::Liability),
        ("owners_equity", "3000", "Owner's Equity", AccountType::Equity),
        ("retained_earnings", "3200", "Retained Earnings", AccountType::Equity),
        ("sales_revenue", "4000", "Sales Revenue", AccountType::Income),
        ("service_revenue", "4100", "Service Revenue", AccountType::Income),
        ("cost_of_goods_sold", "5000", "Cost of Goods Sold", AccountType::Expense),
        ("rent_expense", "6000", "Rent Expense", AccountType::Expense),
        ("utilities_expense", "6100", "Utilities Expense", AccountType::Expense),
    ];

    /// Create a standard chart of accounts for a small business, keyed by
    /// a short snake_case name (`cash`, `accounts_receivable`, ...)
    pub async fn create_standard_chart<S: LedgerStorage>(
        account_manager: &AccountManager<S>,
    ) -> LedgerResult<HashMap<String, Account>> {
        let mut accounts = HashMap::new();
        for (key, code, name, account_type) in STANDARD_CHART {
            let account = account_manager
                .create_account(code.to_string(), name.to_string(), *account_type, None)
                .await?;
            accounts.insert(key.to_string(), account);
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{MemoryStorage, StrictAccountValidator};

    fn manager() -> AccountManager<MemoryStorage> {
        AccountManager::new(MemoryStorage::new(), "acme")
    }

    #[tokio::test]
    async fn test_duplicate_code_is_rejected() {
        let accounts = manager();
        accounts
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();

        let result = accounts
            .create_account("1000".into(), "Petty Cash".into(), AccountType::Asset, None)
            .await;
        assert_eq!(result, Err(LedgerError::DuplicateCode("1000".into())));
    }

    #[tokio::test]
    async fn test_parent_must_exist_and_be_active() {
        let accounts = manager();
        let missing = accounts
            .create_account("1010".into(), "Till".into(), AccountType::Asset, Some("nope".into()))
            .await;
        assert!(matches!(missing, Err(LedgerError::InvalidParent(_))));

        let cash = accounts
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();
        accounts.deactivate(&cash.id).await.unwrap();

        let inactive = accounts
            .create_account("1010".into(), "Till".into(), AccountType::Asset, Some(cash.id.clone()))
            .await;
        assert!(matches!(inactive, Err(LedgerError::InvalidParent(_))));
    }

    #[tokio::test]
    async fn test_account_path_and_children() {
        let accounts = manager();
        let assets = accounts
            .create_account("1000".into(), "Current Assets".into(), AccountType::Asset, None)
            .await
            .unwrap();
        let cash = accounts
            .create_account("1010".into(), "Cash".into(), AccountType::Asset, Some(assets.id.clone()))
            .await
            .unwrap();
        let till = accounts
            .create_account("1011".into(), "Till".into(), AccountType::Asset, Some(cash.id.clone()))
            .await
            .unwrap();

        let path: Vec<String> = accounts
            .account_path(&till.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.code)
            .collect();
        assert_eq!(path, vec!["1000", "1010", "1011"]);

        let children = accounts.child_accounts(&assets.id).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, cash.id);

        assert_eq!(
            accounts.delete_account(&assets.id).await,
            Err(LedgerError::AccountInUse(assets.id.clone()))
        );
        accounts.delete_account(&till.id).await.unwrap();
        assert!(accounts.get_account(&till.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deactivation_is_idempotent_and_reversible() {
        let accounts = manager();
        let cash = accounts
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();

        let first = accounts.deactivate(&cash.id).await.unwrap();
        let second = accounts.deactivate(&cash.id).await.unwrap();
        assert!(!first.is_active);
        assert_eq!(first.version, second.version);

        let again = accounts.reactivate(&cash.id).await.unwrap();
        assert!(again.is_active);
    }

    #[tokio::test]
    async fn test_strict_validator_checks_balance() {
        let storage = MemoryStorage::new();
        let accounts =
            AccountManager::with_validator(storage.clone(), "acme", Arc::new(StrictAccountValidator));
        let cash = accounts
            .create_account("1000".into(), "Cash".into(), AccountType::Asset, None)
            .await
            .unwrap();
        storage
            .set_account_balance("acme", &cash.id, &BigDecimal::from(5))
            .unwrap();

        assert!(matches!(
            accounts.deactivate(&cash.id).await,
            Err(LedgerError::HasOpenBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_standard_chart() {
        let accounts = manager();
        let chart = utils::create_standard_chart(&accounts).await.unwrap();
        assert_eq!(chart.len(), 13);
        assert_eq!(chart["accounts_receivable"].code, "1200");

        let listed = accounts.list_accounts(Some(AccountType::Income)).await.unwrap();
        let codes: Vec<&str> = listed.iter().map(|a| a.code.as_str()).collect();
        assert_eq!(codes, vec!["4000", "4100"]);
    }
}

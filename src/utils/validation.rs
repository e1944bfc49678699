//! Validation utilities

use crate::traits::*;
use crate::types::*;
use bigdecimal::BigDecimal;

/// Validate that an amount is positive
pub fn validate_positive_amount(amount: &BigDecimal) -> LedgerResult<()> {
    if *amount <= BigDecimal::from(0) {
        Err(LedgerError::Validation(
            "Amount must be positive".to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Validate that an amount has no more decimal places than `scale`
pub fn validate_amount_scale(amount: &BigDecimal, scale: i64) -> LedgerResult<()> {
    if amount.with_scale(scale) != *amount {
        return Err(LedgerError::Validation(format!(
            "Amount {} has more than {} decimal places",
            amount, scale
        )));
    }
    Ok(())
}

/// Validate a monetary amount: positive and within the minor-unit scale
pub fn validate_money(amount: &BigDecimal, scale: i64) -> LedgerResult<()> {
    validate_positive_amount(amount)?;
    validate_amount_scale(amount, scale)
}

/// Validate that an account code is valid
pub fn validate_account_code(code: &str) -> LedgerResult<()> {
    if code.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account code cannot be empty".to_string(),
        ));
    }

    if code.len() > 20 {
        return Err(LedgerError::Validation(
            "Account code cannot exceed 20 characters".to_string(),
        ));
    }

    // Check for valid characters (alphanumeric, dashes, underscores, dots)
    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(LedgerError::Validation(
            "Account code can only contain alphanumeric characters, dashes, underscores and dots"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validate that an account name is valid
pub fn validate_account_name(name: &str) -> LedgerResult<()> {
    if name.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Account name cannot be empty".to_string(),
        ));
    }

    if name.len() > 255 {
        return Err(LedgerError::Validation(
            "Account name cannot exceed 255 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate a caller-supplied journal entry id
pub fn validate_entry_id(entry_id: &str) -> LedgerResult<()> {
    if entry_id.trim().is_empty() {
        return Err(LedgerError::Validation(
            "Journal entry id cannot be empty".to_string(),
        ));
    }

    if entry_id.len() > 50 {
        return Err(LedgerError::Validation(
            "Journal entry id cannot exceed 50 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validate an optional reference field
pub fn validate_reference(reference: Option<&str>) -> LedgerResult<()> {
    match reference {
        Some(r) if r.len() > 100 => Err(LedgerError::Validation(
            "Reference cannot exceed 100 characters".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Journal validator with stricter checks on top of the posting rules
pub struct StrictJournalValidator;

impl JournalValidator for StrictJournalValidator {
    fn validate_entry(&self, request: &PostingRequest) -> LedgerResult<()> {
        validate_reference(request.reference.as_deref())?;

        if let Some(description) = &request.description {
            if description.len() > 500 {
                return Err(LedgerError::Validation(
                    "Journal entry description cannot exceed 500 characters".to_string(),
                ));
            }
        }

        // Same account cannot appear twice on the same side
        let mut seen = std::collections::HashSet::new();
        for line in &request.lines {
            if let Some((side, _)) = line.entry() {
                if !seen.insert((&line.account_id, side)) {
                    return Err(LedgerError::Validation(format!(
                        "Account '{}' appears multiple times on the same side of the entry",
                        line.account_id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Account validator that enforces code/name formats and refuses to
/// deactivate accounts that still carry a balance
pub struct StrictAccountValidator;

impl AccountValidator for StrictAccountValidator {
    fn validate_account(&self, account: &Account) -> LedgerResult<()> {
        validate_account_code(&account.code)?;
        validate_account_name(&account.name)?;
        Ok(())
    }

    fn validate_deactivation(&self, account: &Account) -> LedgerResult<()> {
        if account.balance != BigDecimal::from(0) {
            return Err(LedgerError::HasOpenBalance {
                account_id: account.id.clone(),
                balance: account.balance.clone(),
            });
        }
        Ok(())
    }
}

//! Accounting period calendar

use chrono::NaiveDate;
use tracing::{info, instrument};

use crate::traits::*;
use crate::types::*;

/// Opens, closes and looks up the accounting periods of one company
#[derive(Clone)]
pub struct PeriodCalendar<S: LedgerStorage> {
    storage: S,
    company: String,
}

impl<S: LedgerStorage> PeriodCalendar<S> {
    pub fn new(storage: S, company: impl Into<String>) -> Self {
        Self {
            storage,
            company: company.into(),
        }
    }

    /// Create an open period covering `start_date..=end_date`
    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn create_period(
        &self,
        name: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        financial_year: i32,
    ) -> LedgerResult<AccountingPeriod> {
        if end_date <= start_date {
            return Err(LedgerError::InvalidRange {
                start: start_date,
                end: end_date,
            });
        }
        if name.trim().is_empty() {
            return Err(LedgerError::Validation(
                "Period name cannot be empty".to_string(),
            ));
        }

        let period = AccountingPeriod::new(name, start_date, end_date, financial_year);
        self.storage.insert_period(&self.company, &period).await?;
        info!(period_id = %period.id, %start_date, %end_date, "period created");
        Ok(period)
    }

    pub async fn get_period(&self, period_id: &str) -> LedgerResult<AccountingPeriod> {
        self.storage
            .get_period(&self.company, period_id)
            .await?
            .ok_or_else(|| LedgerError::PeriodNotFound(period_id.to_string()))
    }

    /// The period covering `date`, open or closed
    pub async fn find_period_for(&self, date: NaiveDate) -> LedgerResult<AccountingPeriod> {
        self.list_periods()
            .await?
            .into_iter()
            .find(|period| period.contains(date))
            .ok_or(LedgerError::NoPeriod(date))
    }

    /// The open period covering `today`, if any
    pub async fn current_period(&self, today: NaiveDate) -> LedgerResult<Option<AccountingPeriod>> {
        Ok(self
            .list_periods()
            .await?
            .into_iter()
            .find(|period| period.contains(today) && !period.is_closed))
    }

    /// Periods ordered by start date
    pub async fn list_periods(&self) -> LedgerResult<Vec<AccountingPeriod>> {
        self.storage.list_periods(&self.company).await
    }

    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn close(&self, period_id: &str) -> LedgerResult<AccountingPeriod> {
        let period = self
            .storage
            .set_period_closed(&self.company, period_id, true)
            .await?;
        info!(period_id, "period closed");
        Ok(period)
    }

    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn reopen(&self, period_id: &str) -> LedgerResult<AccountingPeriod> {
        let period = self
            .storage
            .set_period_closed(&self.company, period_id, false)
            .await?;
        info!(period_id, "period reopened");
        Ok(period)
    }

    /// Remove a period no journal entry was ever posted into
    #[instrument(skip(self), fields(company = %self.company))]
    pub async fn delete_period(&self, period_id: &str) -> LedgerResult<()> {
        self.storage.delete_period(&self.company, period_id).await?;
        info!(period_id, "period deleted");
        Ok(())
    }
}

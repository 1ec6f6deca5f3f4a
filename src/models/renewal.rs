//! Due-back date policy for renewals and checkouts

use chrono::{Duration, Local, NaiveDate};
use thiserror::Error;

use crate::error::{AppError, FieldErrors};

/// Latest acceptable due-back date, in weeks from today
pub const RENEWAL_WINDOW_WEEKS: i64 = 4;

/// Due-back date proposed when the borrower does not pick one
pub const DEFAULT_RENEWAL_WEEKS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenewalError {
    #[error("Invalid date - renewal in past")]
    InPast,
    #[error("Invalid date - renewal more than 4 weeks ahead")]
    TooFarAhead,
}

impl RenewalError {
    /// Attach the message to the form field that carried the date
    pub fn on_field(self, field: &str) -> AppError {
        AppError::InvalidForm(FieldErrors::single(field, self.to_string()))
    }
}

/// Accept `proposed` iff `today <= proposed <= today + 4 weeks`
pub fn validate_renewal(proposed: NaiveDate, today: NaiveDate) -> Result<NaiveDate, RenewalError> {
    if proposed < today {
        return Err(RenewalError::InPast);
    }

    if proposed > today + Duration::weeks(RENEWAL_WINDOW_WEEKS) {
        return Err(RenewalError::TooFarAhead);
    }

    Ok(proposed)
}

pub fn default_renewal_date(today: NaiveDate) -> NaiveDate {
    today + Duration::weeks(DEFAULT_RENEWAL_WEEKS)
}

/// Source of "today" for date policies
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Server-local calendar date
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock pinned to one date
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

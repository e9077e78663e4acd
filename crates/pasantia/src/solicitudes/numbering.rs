//! Monthly `{YY}{MM}{NNN}` application numbers.
//!
//! The sequence restarts every calendar month and is capped at 999. Assignment is
//! read-latest-then-increment, so callers must serialize it (see
//! [`SolicitudService`](super::SolicitudService)); the lock is process-local and does not
//! protect several server instances sharing one database.

use chrono::{DateTime, Local, NaiveDate, Utc};

use super::domain::ApplicationNumber;

pub const MONTHLY_CAPACITY: u32 = 999;
const SEQUENCE_DIGITS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumberingError {
    #[error("monthly application capacity of {MONTHLY_CAPACITY} reached for period {prefix}")]
    CapacityExceeded { prefix: String },
    #[error("stored application number '{number}' does not carry a numeric sequence")]
    MalformedNumber { number: String },
}

/// Two-digit year followed by two-digit month.
pub fn period_prefix(date: NaiveDate) -> String {
    date.format("%y%m").to_string()
}

/// Next number for `prefix`, given the greatest number already stored under it.
pub fn next_number(
    prefix: &str,
    latest: Option<&ApplicationNumber>,
) -> Result<ApplicationNumber, NumberingError> {
    let next = match latest {
        None => 1,
        Some(number) => sequence_of(prefix, number)? + 1,
    };

    if next > MONTHLY_CAPACITY {
        return Err(NumberingError::CapacityExceeded {
            prefix: prefix.to_string(),
        });
    }

    Ok(ApplicationNumber(format!(
        "{prefix}{next:0width$}",
        width = SEQUENCE_DIGITS
    )))
}

fn sequence_of(prefix: &str, number: &ApplicationNumber) -> Result<u32, NumberingError> {
    let malformed = || NumberingError::MalformedNumber {
        number: number.0.clone(),
    };

    let tail = number.as_str().strip_prefix(prefix).ok_or_else(malformed)?;
    if tail.len() != SEQUENCE_DIGITS || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    tail.parse::<u32>().map_err(|_| malformed())
}

/// Time source for numbering and timestamps.
pub trait Clock: Send + Sync {
    /// Calendar date that decides the numbering period.
    fn today(&self) -> NaiveDate;
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pins the numbering period; timestamps still advance.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    pub date: NaiveDate,
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.date
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

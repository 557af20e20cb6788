// crates/counter-reports-core/src/core/period.rs
// ============================================================================
// Module: COUNTER Reports Periods
// Description: Calendar months and validated report periods.
// Purpose: Give aggregation and reports one shared notion of "month".
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! [`YearMonth`] is a validated calendar month. [`ReportPeriod`] is an
//! inclusive range of months capped at [`MAX_REPORT_MONTHS`], with helpers to
//! map a month onto its zero-based offset inside the period.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::Month;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum number of months a single report may span.
pub const MAX_REPORT_MONTHS: u8 = 24;
/// Month abbreviations used in column labels.
const MONTH_LABELS: [&str; 12] =
    ["Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec"];

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when building months or periods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    /// Month outside `1..=12`.
    #[error("invalid month: {0}")]
    InvalidMonth(u8),
    /// Year outside the supported calendar range.
    #[error("year out of range: {0}")]
    YearOutOfRange(i64),
    /// Period end precedes its start.
    #[error("period end {end} precedes start {start}")]
    EndBeforeStart {
        /// Requested first month.
        start: YearMonth,
        /// Requested last month.
        end: YearMonth,
    },
    /// Period spans more months than allowed.
    #[error("period spans {months} months (max {max})")]
    TooLong {
        /// Requested number of months.
        months: i64,
        /// Maximum allowed months.
        max: u8,
    },
    /// Period covers no months.
    #[error("period must span at least one month")]
    Empty,
    /// Day outside the length of its month.
    #[error("invalid day {day} for {month}")]
    InvalidDay {
        /// Requested day of month.
        day: u8,
        /// Month the day belongs to.
        month: YearMonth,
    },
    /// Calendar conversion failed.
    #[error("invalid calendar date: {0}")]
    InvalidDate(String),
}

// ============================================================================
// SECTION: Year Month
// ============================================================================

/// A validated calendar month.
///
/// # Invariants
/// - `month` is within `1..=12`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    /// Calendar year.
    year: i32,
    /// Calendar month (`1..=12`).
    month: u8,
}

impl YearMonth {
    /// Creates a validated month.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidMonth`] when `month` is outside `1..=12`.
    pub const fn new(year: i32, month: u8) -> Result<Self, PeriodError> {
        if month == 0 || month > 12 {
            return Err(PeriodError::InvalidMonth(month));
        }
        Ok(Self {
            year,
            month,
        })
    }

    /// Returns the month containing a calendar date.
    #[must_use]
    pub fn from_date(date: Date) -> Self {
        Self {
            year: date.year(),
            month: u8::from(date.month()),
        }
    }

    /// Returns the calendar year.
    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Returns the calendar month (`1..=12`).
    #[must_use]
    pub const fn month(self) -> u8 {
        self.month
    }

    /// Returns a linear month number (`year * 12 + month - 1`).
    #[must_use]
    pub fn ordinal(self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    /// Rebuilds a month from its linear month number.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::YearOutOfRange`] when the year does not fit.
    pub fn from_ordinal(ordinal: i64) -> Result<Self, PeriodError> {
        let year = ordinal.div_euclid(12);
        let year = i32::try_from(year).map_err(|_| PeriodError::YearOutOfRange(year))?;
        let month = u8::try_from(ordinal.rem_euclid(12) + 1)
            .map_err(|_| PeriodError::InvalidDate(format!("month ordinal {ordinal}")))?;
        Self::new(year, month)
    }

    /// Returns the month `offset` months after this one (negative goes back).
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::YearOutOfRange`] when the result leaves the
    /// supported range.
    pub fn shifted(self, offset: i64) -> Result<Self, PeriodError> {
        Self::from_ordinal(self.ordinal() + offset)
    }

    /// Returns the column label, e.g. `Jan-2024`.
    #[must_use]
    pub fn label(self) -> String {
        format!("{}-{}", MONTH_LABELS[usize::from(self.month - 1)], self.year)
    }

    /// Returns the first day of the month.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidDate`] when the year is outside the
    /// calendar range supported by `time`.
    pub fn first_day(self) -> Result<Date, PeriodError> {
        let month =
            Month::try_from(self.month).map_err(|err| PeriodError::InvalidDate(err.to_string()))?;
        Date::from_calendar_date(self.year, month, 1)
            .map_err(|err| PeriodError::InvalidDate(err.to_string()))
    }

    /// Returns the last day of the month.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidDate`] when the year is outside the
    /// calendar range supported by `time`.
    pub fn last_day(self) -> Result<Date, PeriodError> {
        self.shifted(1)?.first_day()?.previous_day().ok_or_else(|| {
            PeriodError::InvalidDate(format!("no last day for {self}"))
        })
    }

    /// Checks that `day` is a day of this month.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidDay`] when `day` is zero or past the
    /// month's last day.
    pub fn check_day(self, day: u8) -> Result<(), PeriodError> {
        if day == 0 || day > self.last_day()?.day() {
            return Err(PeriodError::InvalidDay {
                day,
                month: self,
            });
        }
        Ok(())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

// ============================================================================
// SECTION: Report Period
// ============================================================================

/// An inclusive range of months covered by a report.
///
/// # Invariants
/// - `start <= end`.
/// - The period spans at most [`MAX_REPORT_MONTHS`] months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    /// First month of the period.
    start: YearMonth,
    /// Last month of the period.
    end: YearMonth,
}

impl ReportPeriod {
    /// Creates a validated period.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] when `end` precedes `start` or the range is
    /// longer than [`MAX_REPORT_MONTHS`].
    pub fn new(start: YearMonth, end: YearMonth) -> Result<Self, PeriodError> {
        if end < start {
            return Err(PeriodError::EndBeforeStart {
                start,
                end,
            });
        }
        let months = end.ordinal() - start.ordinal() + 1;
        if months > i64::from(MAX_REPORT_MONTHS) {
            return Err(PeriodError::TooLong {
                months,
                max: MAX_REPORT_MONTHS,
            });
        }
        Ok(Self {
            start,
            end,
        })
    }

    /// Returns the `months`-long period ending with the month before `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::Empty`] when `months` is zero and
    /// [`PeriodError::TooLong`] when it exceeds [`MAX_REPORT_MONTHS`].
    pub fn trailing(today: Date, months: u8) -> Result<Self, PeriodError> {
        if months == 0 {
            return Err(PeriodError::Empty);
        }
        if months > MAX_REPORT_MONTHS {
            return Err(PeriodError::TooLong {
                months: i64::from(months),
                max: MAX_REPORT_MONTHS,
            });
        }
        let end = YearMonth::from_date(today).shifted(-1)?;
        let start = end.shifted(1 - i64::from(months))?;
        Self::new(start, end)
    }

    /// Returns the first month.
    #[must_use]
    pub const fn start(&self) -> YearMonth {
        self.start
    }

    /// Returns the last month.
    #[must_use]
    pub const fn end(&self) -> YearMonth {
        self.end
    }

    /// Returns the number of months in the period.
    #[must_use]
    pub fn month_count(&self) -> usize {
        usize::try_from(self.end.ordinal() - self.start.ordinal() + 1).unwrap_or(0)
    }

    /// Returns true when `month` falls within the period.
    #[must_use]
    pub fn contains(&self, month: YearMonth) -> bool {
        self.start <= month && month <= self.end
    }

    /// Returns the zero-based offset of `month` inside the period.
    #[must_use]
    pub fn offset_of(&self, month: YearMonth) -> Option<usize> {
        if !self.contains(month) {
            return None;
        }
        usize::try_from(month.ordinal() - self.start.ordinal()).ok()
    }

    /// Returns every month of the period in order.
    #[must_use]
    pub fn months(&self) -> Vec<YearMonth> {
        (self.start.ordinal() ..= self.end.ordinal())
            .filter_map(|ordinal| YearMonth::from_ordinal(ordinal).ok())
            .collect()
    }

    /// Returns the first day of the period.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidDate`] when the date is out of range.
    pub fn first_day(&self) -> Result<Date, PeriodError> {
        self.start.first_day()
    }

    /// Returns the last day of the period.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidDate`] when the date is out of range.
    pub fn last_day(&self) -> Result<Date, PeriodError> {
        self.end.last_day()
    }
}

// crates/counter-reports-core/src/core/report.rs
// ============================================================================
// Module: COUNTER Reports Report Shapes
// Description: Fixed report kinds, their column layouts, and year buckets.
// Purpose: Drive a single report synthesizer from per-kind configuration.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Each [`ReportKind`] maps to a [`ReportLayout`] describing which counter
//! keys fill a slot, whether slot zero holds a period total, and how counter
//! rows map onto slots (calendar month or publication-year bucket).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::Date;

use crate::core::period::PeriodError;
use crate::core::title::Domain;
use crate::core::usage::CountKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Years listed after the current decade's partial years (decade start plus the previous decade).
const PREVIOUS_DECADE_YEARS: usize = 11;

// ============================================================================
// SECTION: Report Kinds
// ============================================================================

/// Which aggregate table feeds a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateSource {
    /// Monthly per-classification aggregates.
    TypeAggregates,
    /// Monthly per-publication-year aggregates.
    PublicationYearAggregates,
}

/// How counter rows map onto report slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportBucketing {
    /// One slot per calendar month of the period.
    CalendarMonth,
    /// One slot per publication-year bucket.
    PublicationYear,
}

/// Column layout of a report kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportLayout {
    /// Counter keys carried by each period slot.
    pub item_keys: &'static [CountKey],
    /// Counter keys summed into the period-total slot.
    pub total_keys: &'static [CountKey],
    /// Whether slot zero holds the reporting-period total.
    pub has_total_column: bool,
    /// Mapping from counter rows to slots.
    pub bucketing: ReportBucketing,
}

/// Supported report kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Book title requests by month (`BR1`).
    BookTitleRequests,
    /// Book section requests by month (`BR2`).
    BookSectionRequests,
    /// Journal full-text article requests by month, with per-format period
    /// totals (`JR1`).
    JournalRequests,
    /// Journal full-text article requests by publication year (`JR5`).
    JournalRequestsByPublicationYear,
}

impl ReportKind {
    /// Every supported report kind.
    pub const ALL: [Self; 4] = [
        Self::BookTitleRequests,
        Self::BookSectionRequests,
        Self::JournalRequests,
        Self::JournalRequestsByPublicationYear,
    ];

    /// Returns the short report code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::BookTitleRequests => "BR1",
            Self::BookSectionRequests => "BR2",
            Self::JournalRequests => "JR1",
            Self::JournalRequestsByPublicationYear => "JR5",
        }
    }

    /// Parses a short report code (case-insensitive).
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code().eq_ignore_ascii_case(code))
    }

    /// Returns the title domain covered by the report.
    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::BookTitleRequests | Self::BookSectionRequests => Domain::Book,
            Self::JournalRequests | Self::JournalRequestsByPublicationYear => Domain::Journal,
        }
    }

    /// Returns the aggregate table feeding the report.
    #[must_use]
    pub const fn source(self) -> AggregateSource {
        match self {
            Self::JournalRequestsByPublicationYear => AggregateSource::PublicationYearAggregates,
            _ => AggregateSource::TypeAggregates,
        }
    }

    /// Returns the column layout.
    #[must_use]
    pub const fn layout(self) -> ReportLayout {
        match self {
            Self::BookTitleRequests => ReportLayout {
                item_keys: &[CountKey::Full],
                total_keys: &[CountKey::Full],
                has_total_column: true,
                bucketing: ReportBucketing::CalendarMonth,
            },
            Self::BookSectionRequests => ReportLayout {
                item_keys: &[CountKey::Section],
                total_keys: &[CountKey::Section],
                has_total_column: true,
                bucketing: ReportBucketing::CalendarMonth,
            },
            Self::JournalRequests => ReportLayout {
                item_keys: &[CountKey::Total],
                total_keys: &[CountKey::Total, CountKey::Html, CountKey::Pdf],
                has_total_column: true,
                bucketing: ReportBucketing::CalendarMonth,
            },
            Self::JournalRequestsByPublicationYear => ReportLayout {
                item_keys: &[CountKey::Requests],
                total_keys: &[],
                has_total_column: false,
                bucketing: ReportBucketing::PublicationYear,
            },
        }
    }
}

// ============================================================================
// SECTION: Publication Year Buckets
// ============================================================================

/// Publication-year columns relative to a current year.
///
/// Slot layout: articles in press, one slot per listed year (newest first),
/// prior years, unknown.
///
/// # Invariants
/// - `listed_years` is non-empty and strictly descending from `current_year`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationYearBuckets {
    /// Year treated as "now".
    current_year: i32,
    /// Individually listed years, newest first.
    listed_years: Vec<i32>,
}

impl PublicationYearBuckets {
    /// Builds the buckets for a current year.
    ///
    /// The current decade's years are listed individually, followed by the
    /// whole previous decade.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::YearOutOfRange`] when `current_year` is outside
    /// the supported calendar range.
    pub fn new(current_year: i32) -> Result<Self, PeriodError> {
        if !(Date::MIN.year() ..= Date::MAX.year()).contains(&current_year) {
            return Err(PeriodError::YearOutOfRange(i64::from(current_year)));
        }
        let mut listed_years = Vec::new();
        let mut year = current_year;
        while year % 10 != 0 {
            listed_years.push(year);
            year -= 1;
        }
        for _ in 0 .. PREVIOUS_DECADE_YEARS {
            listed_years.push(year);
            year -= 1;
        }
        Ok(Self {
            current_year,
            listed_years,
        })
    }

    /// Returns the year treated as "now".
    #[must_use]
    pub const fn current_year(&self) -> i32 {
        self.current_year
    }

    /// Returns the oldest individually listed year.
    #[must_use]
    pub fn oldest_listed_year(&self) -> i32 {
        self.listed_years.last().copied().unwrap_or(self.current_year)
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.listed_years.len() + 3
    }

    /// Returns the slot for a publication year (`None` or zero is unknown).
    #[must_use]
    pub fn index_of(&self, publication_year: Option<i32>) -> usize {
        let slots = self.slot_count();
        match publication_year {
            None | Some(0) => slots - 1,
            Some(year) if year > self.current_year => 0,
            Some(year) if year < self.oldest_listed_year() => slots - 2,
            Some(year) => usize::try_from(self.current_year - year).map_or(slots - 2, |age| age + 1),
        }
    }

    /// Returns the column labels in slot order.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::with_capacity(self.slot_count());
        labels.push("Articles in Press".to_string());
        labels.extend(self.listed_years.iter().map(|year| format!("YOP {year}")));
        labels.push(format!("YOP Pre-{}", self.oldest_listed_year()));
        labels.push("YOP unknown".to_string());
        labels
    }
}

// crates/counter-reports-core/src/core/usage.rs
// ============================================================================
// Module: COUNTER Reports Usage Counters
// Description: Raw request records and per-classification counters.
// Purpose: Define what the recorder writes and what aggregation folds.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A raw request is one access to a title, classified by what was served.
//! Aggregation folds raw requests into [`ItemCounts`] (per classification
//! key) and, for journals, [`PublicationYearCounts`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TitleId;
use crate::core::period::YearMonth;
use crate::core::title::Domain;

// ============================================================================
// SECTION: Count Keys
// ============================================================================

/// Classification key of a usage counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountKey {
    /// Full book requests.
    Full,
    /// Book section requests.
    Section,
    /// Journal requests of any format.
    Total,
    /// Journal HTML requests.
    Html,
    /// Journal PDF requests.
    Pdf,
    /// Journal requests bucketed by publication year.
    Requests,
}

impl CountKey {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Section => "section",
            Self::Total => "total",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Requests => "requests",
        }
    }
}

// ============================================================================
// SECTION: Request Classification
// ============================================================================

/// Classification of a single raw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// A full book was served.
    BookFull,
    /// A book section was served.
    BookSection,
    /// A journal article was served as HTML.
    JournalHtml,
    /// A journal article was served as PDF.
    JournalPdf,
}

impl RequestClass {
    /// Every request class.
    pub const ALL: [Self; 4] = [Self::BookFull, Self::BookSection, Self::JournalHtml, Self::JournalPdf];

    /// Returns the domain this classification belongs to.
    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::BookFull | Self::BookSection => Domain::Book,
            Self::JournalHtml | Self::JournalPdf => Domain::Journal,
        }
    }

    /// Returns the counter keys one request of this class increments.
    #[must_use]
    pub const fn counted_keys(self) -> &'static [CountKey] {
        match self {
            Self::BookFull => &[CountKey::Full],
            Self::BookSection => &[CountKey::Section],
            Self::JournalHtml => &[CountKey::Total, CountKey::Html],
            Self::JournalPdf => &[CountKey::Total, CountKey::Pdf],
        }
    }

    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookFull => "book_full",
            Self::BookSection => "book_section",
            Self::JournalHtml => "journal_html",
            Self::JournalPdf => "journal_pdf",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.as_str() == label)
    }
}

// ============================================================================
// SECTION: Raw Requests
// ============================================================================

/// A single raw usage request as written by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRequest {
    /// Title that was requested.
    pub title: TitleId,
    /// Calendar month of the request.
    pub period: YearMonth,
    /// Day of month of the request.
    pub day: u8,
    /// What was served.
    pub class: RequestClass,
    /// Whether the publisher was involved in serving the request.
    pub publisher_involved: bool,
    /// Publication year of the served item, when known.
    pub publication_year: Option<i32>,
}

// ============================================================================
// SECTION: Item Counts
// ============================================================================

/// Per-classification request counters.
///
/// # Invariants
/// - Additions saturate instead of wrapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCounts(BTreeMap<CountKey, u64>);

impl ItemCounts {
    /// Creates counters with every provided key set to zero.
    #[must_use]
    pub fn zeroed(keys: &[CountKey]) -> Self {
        Self(keys.iter().map(|key| (*key, 0)).collect())
    }

    /// Returns the count for a key (zero when absent).
    #[must_use]
    pub fn get(&self, key: CountKey) -> u64 {
        self.0.get(&key).copied().unwrap_or(0)
    }

    /// Sets the count for a key.
    pub fn set(&mut self, key: CountKey, value: u64) {
        self.0.insert(key, value);
    }

    /// Adds to the count for a key.
    pub fn add(&mut self, key: CountKey, value: u64) {
        let entry = self.0.entry(key).or_insert(0);
        *entry = entry.saturating_add(value);
    }

    /// Records `count` requests of the given class.
    pub fn record(&mut self, class: RequestClass, count: u64) {
        for key in class.counted_keys() {
            self.add(*key, count);
        }
    }

    /// Adds every counter of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.add(*key, *value);
        }
    }

    /// Adds only the listed keys of `other` into `self`.
    pub fn merge_keys(&mut self, other: &Self, keys: &[CountKey]) {
        for key in keys {
            self.add(*key, other.get(*key));
        }
    }

    /// Returns true when every counter is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.values().all(|value| *value == 0)
    }

    /// Iterates over the counters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (CountKey, u64)> + '_ {
        self.0.iter().map(|(key, value)| (*key, *value))
    }
}

impl FromIterator<(CountKey, u64)> for ItemCounts {
    fn from_iter<I: IntoIterator<Item = (CountKey, u64)>>(iter: I) -> Self {
        let mut counts = Self::default();
        for (key, value) in iter {
            counts.add(key, value);
        }
        counts
    }
}

// ============================================================================
// SECTION: Publication Year Counts
// ============================================================================

/// Journal request counts keyed by publication year (`None` when unknown).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicationYearCounts(BTreeMap<Option<i32>, u64>);

impl PublicationYearCounts {
    /// Adds requests for a publication year.
    pub fn add(&mut self, publication_year: Option<i32>, count: u64) {
        let entry = self.0.entry(publication_year).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Returns the count for a publication year.
    #[must_use]
    pub fn get(&self, publication_year: Option<i32>) -> u64 {
        self.0.get(&publication_year).copied().unwrap_or(0)
    }

    /// Adds every count of `other` into `self`.
    pub fn merge(&mut self, other: &Self) {
        for (year, count) in &other.0 {
            self.add(*year, *count);
        }
    }

    /// Returns true when no publication year has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the counts in publication-year order.
    pub fn iter(&self) -> impl Iterator<Item = (Option<i32>, u64)> + '_ {
        self.0.iter().map(|(year, count)| (*year, *count))
    }
}

impl FromIterator<(Option<i32>, u64)> for PublicationYearCounts {
    fn from_iter<I: IntoIterator<Item = (Option<i32>, u64)>>(iter: I) -> Self {
        let mut counts = Self::default();
        for (year, count) in iter {
            counts.add(year, count);
        }
        counts
    }
}

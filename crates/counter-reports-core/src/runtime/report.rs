// crates/counter-reports-core/src/runtime/report.rs
// ============================================================================
// Module: COUNTER Reports Report Synthesizer
// Description: Merge-join of the title list with the summary counter stream.
// Purpose: Produce zero-filled, rollup-consistent report rows.
// Dependencies: crate::{core, interfaces}, thiserror, time, tracing
// ============================================================================

//! ## Overview
//! Report synthesis reads an ordered title list and an identically ordered
//! counter stream, then walks both with a single cursor. Every row starts
//! zero-filled; each counter is added to its title's slot, to the title's
//! period total (when the layout has one), and to the rollup row. Any
//! divergence between the two orderings is a hard error and no partial
//! report is returned.
//!
//! Slot mapping is positional: calendar months map to
//! `12 * (year - start_year) + month - start_month` (shifted by one when slot
//! zero holds the period total), and publication years map through
//! [`PublicationYearBuckets`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;

use thiserror::Error;
use time::Date;
use tracing::debug;

use crate::core::ItemCounts;
use crate::core::PeriodError;
use crate::core::PublicationYearBuckets;
use crate::core::ReportBucketing;
use crate::core::ReportKind;
use crate::core::ReportLayout;
use crate::core::ReportPeriod;
use crate::core::TitleId;
use crate::core::TitleRecord;
use crate::core::YearMonth;
use crate::interfaces::CounterRow;
use crate::interfaces::ReportQuery;
use crate::interfaces::ReportSource;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Label of the reporting-period total column.
const PERIOD_TOTAL_LABEL: &str = "Reporting Period Total";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while synthesizing a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Storage read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Period is invalid.
    #[error(transparent)]
    Period(#[from] PeriodError),
    /// Title list is empty.
    #[error("missing all-titles rollup row")]
    RollupMissing,
    /// Title list does not start with the report domain's rollup.
    #[error("first title is not the all-titles rollup")]
    RollupNotFirst,
    /// Title appears more than once in the title list.
    #[error("duplicate title identifier {title}")]
    DuplicateTitle {
        /// Repeated identity.
        title: TitleId,
    },
    /// Counter row belongs to a title that is not listed.
    #[error("unexpected additional identifier {title}")]
    UnexpectedIdentifier {
        /// Unlisted identity.
        title: TitleId,
    },
    /// Counter stream order diverges from the title list order.
    #[error("wrong identifier sorting at {title}")]
    WrongSorting {
        /// Identity found behind the cursor.
        title: TitleId,
    },
    /// Counter row falls outside the report period.
    #[error("counter for title {title} in {period} is outside the report period")]
    SlotOutOfRange {
        /// Counter identity.
        title: TitleId,
        /// Counter month.
        period: YearMonth,
    },
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Immutable parameters of one report synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportRequest {
    /// Report kind.
    kind: ReportKind,
    /// Months covered.
    period: ReportPeriod,
    /// Year publication-year buckets are relative to.
    current_year: i32,
}

impl ReportRequest {
    /// Creates a report request.
    #[must_use]
    pub const fn new(kind: ReportKind, period: ReportPeriod, current_year: i32) -> Self {
        Self {
            kind,
            period,
            current_year,
        }
    }

    /// Creates a request covering the `months` months before `today`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError`] when `months` is out of range.
    pub fn trailing(kind: ReportKind, today: Date, months: u8) -> Result<Self, PeriodError> {
        Ok(Self::new(kind, ReportPeriod::trailing(today, months)?, today.year()))
    }

    /// Returns the report kind.
    #[must_use]
    pub const fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Returns the report period.
    #[must_use]
    pub const fn period(&self) -> ReportPeriod {
        self.period
    }

    /// Returns the current year used for publication-year buckets.
    #[must_use]
    pub const fn current_year(&self) -> i32 {
        self.current_year
    }
}

// ============================================================================
// SECTION: Report Output
// ============================================================================

/// One report row: a title and its slot counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Title (or rollup placeholder) of the row.
    pub title: TitleRecord,
    /// Slot counters in column order.
    pub slots: Vec<ItemCounts>,
}

impl ReportRow {
    /// Returns the counters of a slot.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&ItemCounts> {
        self.slots.get(index)
    }
}

/// A synthesized report.
///
/// # Invariants
/// - `rows[0]` is the rollup row and each of its slots equals the sum of the
///   same slot over all other rows.
/// - Every row has exactly `columns.len()` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Report request the rows were built for.
    pub request: ReportRequest,
    /// First day of the report period.
    pub begins_on: Date,
    /// Last day of the report period.
    pub ends_on: Date,
    /// Column labels in slot order.
    pub columns: Vec<String>,
    /// Rollup row followed by title rows.
    pub rows: Vec<ReportRow>,
}

impl Report {
    /// Returns the rollup row.
    #[must_use]
    pub fn rollup(&self) -> Option<&ReportRow> {
        self.rows.first()
    }

    /// Returns the row of a title.
    #[must_use]
    pub fn row_for(&self, title: TitleId) -> Option<&ReportRow> {
        self.rows.iter().find(|row| row.title.id == title)
    }
}

// ============================================================================
// SECTION: Slot Mapping
// ============================================================================

/// Maps counter rows onto slot indices for one request.
enum SlotMapper {
    /// One slot per month, optionally after a total slot.
    Months {
        /// Report period.
        period: ReportPeriod,
        /// Index of the first month slot.
        first_slot: usize,
    },
    /// One slot per publication-year bucket.
    PublicationYears {
        /// Report period (counters outside it are rejected).
        period: ReportPeriod,
        /// Publication-year buckets.
        buckets: PublicationYearBuckets,
    },
}

impl SlotMapper {
    /// Builds the mapper for a request.
    fn new(request: &ReportRequest, layout: &ReportLayout) -> Result<Self, PeriodError> {
        Ok(match layout.bucketing {
            ReportBucketing::CalendarMonth => Self::Months {
                period: request.period,
                first_slot: usize::from(layout.has_total_column),
            },
            ReportBucketing::PublicationYear => Self::PublicationYears {
                period: request.period,
                buckets: PublicationYearBuckets::new(request.current_year)?,
            },
        })
    }

    /// Returns the total number of slots including any total slot.
    fn slot_count(&self) -> usize {
        match self {
            Self::Months {
                period,
                first_slot,
            } => first_slot + period.month_count(),
            Self::PublicationYears {
                buckets, ..
            } => buckets.slot_count(),
        }
    }

    /// Returns the column labels in slot order.
    fn labels(&self) -> Vec<String> {
        match self {
            Self::Months {
                period,
                first_slot,
            } => {
                let mut labels = Vec::with_capacity(self.slot_count());
                if *first_slot > 0 {
                    labels.push(PERIOD_TOTAL_LABEL.to_string());
                }
                labels.extend(period.months().into_iter().map(YearMonth::label));
                labels
            }
            Self::PublicationYears {
                buckets, ..
            } => buckets.labels(),
        }
    }

    /// Returns the slot a counter row belongs to.
    fn slot_index(&self, counter: &CounterRow) -> Result<usize, ReportError> {
        let out_of_range = || ReportError::SlotOutOfRange {
            title: counter.title,
            period: counter.period,
        };
        match self {
            Self::Months {
                period,
                first_slot,
            } => period.offset_of(counter.period).map(|offset| first_slot + offset).ok_or_else(out_of_range),
            Self::PublicationYears {
                period,
                buckets,
            } => {
                if !period.contains(counter.period) {
                    return Err(out_of_range());
                }
                Ok(buckets.index_of(counter.publication_year))
            }
        }
    }
}

// ============================================================================
// SECTION: Merge Join
// ============================================================================

/// Builds report rows from an ordered title list and counter stream.
///
/// `titles` must start with the rollup placeholder of the report domain and
/// `counters` must be grouped by title in the same order as `titles`.
///
/// # Errors
///
/// Returns [`ReportError`] when the title list is malformed or the counter
/// stream diverges from it.
pub fn build_report_rows(
    request: &ReportRequest,
    titles: &[TitleRecord],
    counters: &[CounterRow],
) -> Result<Vec<ReportRow>, ReportError> {
    let first = titles.first().ok_or(ReportError::RollupMissing)?;
    if !first.is_rollup() || first.payload.domain != request.kind.domain() {
        return Err(ReportError::RollupNotFirst);
    }
    let layout = request.kind.layout();
    let mapper = SlotMapper::new(request, &layout)?;
    let mut seen = HashSet::with_capacity(titles.len());
    for title in titles {
        if !seen.insert(title.id) {
            return Err(ReportError::DuplicateTitle {
                title: title.id,
            });
        }
    }
    let empty_row = zeroed_slots(&layout, mapper.slot_count());
    let mut rows: Vec<ReportRow> = titles
        .iter()
        .map(|title| ReportRow {
            title: title.clone(),
            slots: empty_row.clone(),
        })
        .collect();

    // The cursor only moves forward; row 0 is the rollup and never matches.
    let mut cursor = 1;
    for counter in counters {
        if counter.title.is_rollup() {
            return Err(ReportError::UnexpectedIdentifier {
                title: counter.title,
            });
        }
        while titles.get(cursor).is_some_and(|title| title.id != counter.title) {
            cursor += 1;
        }
        if cursor >= titles.len() {
            return Err(if seen.contains(&counter.title) {
                ReportError::WrongSorting {
                    title: counter.title,
                }
            } else {
                ReportError::UnexpectedIdentifier {
                    title: counter.title,
                }
            });
        }
        let slot = mapper.slot_index(counter)?;
        for index in [cursor, 0] {
            if let Some(row) = rows.get_mut(index) {
                accumulate(row, &layout, slot, &counter.counts);
            }
        }
    }
    Ok(rows)
}

/// Returns one zero-filled row of slots for a layout.
fn zeroed_slots(layout: &ReportLayout, slot_count: usize) -> Vec<ItemCounts> {
    (0 .. slot_count)
        .map(|slot| {
            if layout.has_total_column && slot == 0 {
                ItemCounts::zeroed(layout.total_keys)
            } else {
                ItemCounts::zeroed(layout.item_keys)
            }
        })
        .collect()
}

/// Adds counters to a row's slot and, when present, to its period total.
fn accumulate(row: &mut ReportRow, layout: &ReportLayout, slot: usize, counts: &ItemCounts) {
    if let Some(target) = row.slots.get_mut(slot) {
        target.merge_keys(counts, layout.item_keys);
    }
    if layout.has_total_column
        && let Some(total) = row.slots.first_mut()
    {
        total.merge_keys(counts, layout.total_keys);
    }
}

// ============================================================================
// SECTION: Synthesizer
// ============================================================================

/// Synthesizes reports from a report source.
#[derive(Debug, Clone)]
pub struct ReportSynthesizer<S> {
    /// Backing report source.
    source: S,
}

impl<S: ReportSource> ReportSynthesizer<S> {
    /// Creates a new synthesizer.
    #[must_use]
    pub const fn new(source: S) -> Self {
        Self {
            source,
        }
    }

    /// Synthesizes a report.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when the read fails or the data is
    /// inconsistent; no partial report is produced.
    pub fn synthesize(&self, request: &ReportRequest) -> Result<Report, ReportError> {
        let snapshot = self.source.report_snapshot(&ReportQuery {
            kind: request.kind,
            period: request.period,
        })?;
        let mut titles = Vec::with_capacity(snapshot.titles.len() + 1);
        titles.push(TitleRecord::rollup(request.kind.domain()));
        titles.extend(snapshot.titles);
        let rows = build_report_rows(request, &titles, &snapshot.counters)?;
        let layout = request.kind.layout();
        let columns = SlotMapper::new(request, &layout)?.labels();
        debug!(
            report = request.kind.code(),
            start = %request.period.start(),
            end = %request.period.end(),
            titles = rows.len() - 1,
            counters = snapshot.counters.len(),
            "usage report synthesized"
        );
        Ok(Report {
            request: *request,
            begins_on: request.period.first_day()?,
            ends_on: request.period.last_day()?,
            columns,
            rows,
        })
    }
}

// crates/counter-reports-core/src/runtime/aggregator.rs
// ============================================================================
// Module: COUNTER Reports Aggregation Pipeline
// Description: Folds pending raw requests into monthly summary aggregates.
// Purpose: Keep aggregates equal to prior state plus pending usage, across
//          retries and partial failures.
// Dependencies: crate::{core, interfaces}, thiserror, tracing
// ============================================================================

//! ## Overview
//! A run marks every unmarked raw request, discovers the months with marked
//! requests, and processes each month per domain and publisher-involved
//! flag. Titles are handled in bounded batches; each batch merges per-title
//! counters, deletes the consumed requests, and merges the batch rollup in a
//! single transaction. A batch that fails leaves its requests marked, so the
//! next run reprocesses them without double counting.
//!
//! Failures are isolated per month: a failing month is logged and skipped,
//! and the run reports [`AggregationError::Incomplete`] at the end.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::core::Domain;
use crate::core::ItemCounts;
use crate::core::PublicationYearCounts;
use crate::core::TitleId;
use crate::core::YearMonth;
use crate::interfaces::AggregationScope;
use crate::interfaces::StoreError;
use crate::interfaces::UsageStore;
use crate::interfaces::UsageTransaction;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum number of titles aggregated per transaction.
pub const DEFAULT_MAX_BATCH_TITLES: usize = 100;
/// Publisher-involved flags processed per month, in order.
const PUBLISHER_INVOLVED_PASSES: [bool; 2] = [true, false];

// ============================================================================
// SECTION: Config
// ============================================================================

/// Aggregation pipeline configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationConfig {
    /// Maximum number of titles aggregated per transaction.
    pub max_batch_titles: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_batch_titles: DEFAULT_MAX_BATCH_TITLES,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A month that could not be fully aggregated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodFailure {
    /// Month whose remaining batches were skipped.
    pub period: YearMonth,
    /// Failure description.
    pub message: String,
}

/// Errors raised by an aggregation run.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Marking or month discovery failed; nothing was aggregated.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Batch size of zero.
    #[error("max_batch_titles must be greater than zero")]
    InvalidBatchSize,
    /// One or more months failed; their requests remain pending.
    #[error("aggregation incomplete: {} month(s) failed", .failures.len())]
    Incomplete {
        /// Failed months, oldest first.
        failures: Vec<PeriodFailure>,
        /// Work committed for the months that succeeded.
        summary: AggregationSummary,
    },
}

// ============================================================================
// SECTION: Summary
// ============================================================================

/// Work performed by an aggregation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationSummary {
    /// Raw requests newly marked by this run.
    pub requests_marked: u64,
    /// Months discovered among pending requests.
    pub periods: usize,
    /// Titles aggregated (rollups excluded).
    pub titles_aggregated: usize,
    /// Batch transactions committed.
    pub batches_committed: usize,
    /// Raw requests consumed and deleted.
    pub requests_deleted: u64,
}

/// Work committed by one batch.
#[derive(Debug, Clone, Copy)]
struct BatchOutcome {
    /// Titles merged in the batch.
    titles: usize,
    /// Raw requests deleted in the batch.
    deleted: u64,
}

// ============================================================================
// SECTION: Aggregator
// ============================================================================

/// Monthly aggregation pipeline over a usage store.
#[derive(Debug, Clone)]
pub struct RequestAggregator<S> {
    /// Backing usage store.
    store: S,
    /// Pipeline configuration.
    config: AggregationConfig,
}

impl<S: UsageStore> RequestAggregator<S> {
    /// Creates a new aggregator.
    #[must_use]
    pub const fn new(store: S, config: AggregationConfig) -> Self {
        Self {
            store,
            config,
        }
    }

    /// Aggregates every pending raw request.
    ///
    /// # Errors
    ///
    /// Returns [`AggregationError::Store`] when marking or discovery fails,
    /// and [`AggregationError::Incomplete`] when some months failed.
    pub fn run(&self) -> Result<AggregationSummary, AggregationError> {
        if self.config.max_batch_titles == 0 {
            return Err(AggregationError::InvalidBatchSize);
        }
        info!("usage aggregation started");
        let requests_marked =
            self.store.transaction(|tx| tx.mark_pending_requests().map_err(AggregationError::from))?;
        let periods =
            self.store.transaction(|tx| tx.pending_periods().map_err(AggregationError::from))?;
        let mut summary = AggregationSummary {
            requests_marked,
            periods: periods.len(),
            ..AggregationSummary::default()
        };
        let mut failures = Vec::new();
        for period in periods {
            if let Err(err) = self.aggregate_period(period, &mut summary) {
                error!(
                    year = period.year(),
                    month = period.month(),
                    error = %err,
                    "usage aggregation failed for month"
                );
                failures.push(PeriodFailure {
                    period,
                    message: err.to_string(),
                });
            }
        }
        info!(
            marked = summary.requests_marked,
            periods = summary.periods,
            titles = summary.titles_aggregated,
            batches = summary.batches_committed,
            deleted = summary.requests_deleted,
            failed_periods = failures.len(),
            "usage aggregation finished"
        );
        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(AggregationError::Incomplete {
                failures,
                summary,
            })
        }
    }

    /// Aggregates one month across domains and publisher-involved flags.
    fn aggregate_period(
        &self,
        period: YearMonth,
        summary: &mut AggregationSummary,
    ) -> Result<(), StoreError> {
        for domain in Domain::ALL {
            for publisher_involved in PUBLISHER_INVOLVED_PASSES {
                let scope = AggregationScope {
                    period,
                    domain,
                    publisher_involved,
                };
                let titles = self.store.transaction(|tx| tx.pending_titles(&scope))?;
                for batch in titles.chunks(self.config.max_batch_titles) {
                    let outcome = self.store.transaction(|tx| aggregate_batch(tx, &scope, batch))?;
                    summary.titles_aggregated += outcome.titles;
                    summary.requests_deleted += outcome.deleted;
                    summary.batches_committed += 1;
                    debug!(
                        year = period.year(),
                        month = period.month(),
                        domain = domain.as_str(),
                        publisher_involved,
                        titles = outcome.titles,
                        deleted = outcome.deleted,
                        "usage aggregation batch committed"
                    );
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Batch Helpers
// ============================================================================

/// Aggregates one batch of titles and merges the batch rollup.
fn aggregate_batch(
    tx: &mut dyn UsageTransaction,
    scope: &AggregationScope,
    titles: &[TitleId],
) -> Result<BatchOutcome, StoreError> {
    let mut rollup = ItemCounts::zeroed(scope.domain.aggregate_keys());
    let mut rollup_years = PublicationYearCounts::default();
    let mut deleted = 0_u64;
    for title in titles {
        let counts = tx.pending_request_counts(*title, scope)?;
        merge_type_aggregate(tx, *title, scope, &counts)?;
        rollup.merge(&counts);
        if scope.domain == Domain::Journal {
            let years = tx.pending_publication_year_counts(*title, scope)?;
            merge_publication_years(tx, *title, scope, &years)?;
            rollup_years.merge(&years);
        }
        deleted += tx.delete_pending_requests(*title, scope)?;
    }
    let rollup_id = TitleId::rollup_for(scope.domain);
    merge_type_aggregate(tx, rollup_id, scope, &rollup)?;
    merge_publication_years(tx, rollup_id, scope, &rollup_years)?;
    Ok(BatchOutcome {
        titles: titles.len(),
        deleted,
    })
}

/// Adds `counts` to a title's type aggregate, creating it when absent.
fn merge_type_aggregate(
    tx: &mut dyn UsageTransaction,
    title: TitleId,
    scope: &AggregationScope,
    counts: &ItemCounts,
) -> Result<(), StoreError> {
    match tx.load_type_aggregate(title, scope)? {
        Some(mut existing) => {
            existing.merge(counts);
            tx.update_type_aggregate(title, scope, &existing)
        }
        None => tx.insert_type_aggregate(title, scope, counts),
    }
}

/// Adds per-publication-year counts to a title's aggregates.
fn merge_publication_years(
    tx: &mut dyn UsageTransaction,
    title: TitleId,
    scope: &AggregationScope,
    years: &PublicationYearCounts,
) -> Result<(), StoreError> {
    for (publication_year, requests) in years.iter() {
        match tx.load_publication_year_aggregate(title, scope, publication_year)? {
            Some(existing) => tx.update_publication_year_aggregate(
                title,
                scope,
                publication_year,
                existing.saturating_add(requests),
            )?,
            None => tx.insert_publication_year_aggregate(title, scope, publication_year, requests)?,
        }
    }
    Ok(())
}

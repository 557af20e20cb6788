// crates/counter-reports-core/src/interfaces/mod.rs
// ============================================================================
// Module: COUNTER Reports Interfaces
// Description: Storage boundaries used by the aggregation and report engines.
// Purpose: Keep the engines backend-agnostic and transaction-explicit.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Engines never touch storage directly. Writes go through
//! [`UsageStore::transaction`], which hands a [`UsageTransaction`] to a
//! closure and commits only when the closure succeeds. Reports read through
//! [`ReportSource::report_snapshot`], which returns the title list and the
//! counter stream from one consistent read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::Domain;
use crate::core::ItemCounts;
use crate::core::PublicationYearCounts;
use crate::core::ReportKind;
use crate::core::ReportPeriod;
use crate::core::TitleId;
use crate::core::TitlePayload;
use crate::core::TitleRecord;
use crate::core::YearMonth;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Usage store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("usage store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("usage store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("usage store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("usage store invalid data: {0}")]
    Invalid(String),
    /// Store reported an error.
    #[error("usage store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Aggregation Scope
// ============================================================================

/// Slice of pending requests processed together by the aggregation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationScope {
    /// Calendar month of the requests.
    pub period: YearMonth,
    /// Title domain of the requests.
    pub domain: Domain,
    /// Publisher-involved flag of the requests.
    pub publisher_involved: bool,
}

// ============================================================================
// SECTION: Usage Store
// ============================================================================

/// Operations available inside one usage store transaction.
///
/// "Pending" requests are raw requests flagged by
/// [`UsageTransaction::mark_pending_requests`] and not yet deleted.
pub trait UsageTransaction {
    /// Loads a title payload by identity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the lookup fails.
    fn find_title(&mut self, id: TitleId) -> Result<Option<TitlePayload>, StoreError>;

    /// Persists a new title.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the identity is taken or the write fails.
    fn insert_title(&mut self, record: &TitleRecord) -> Result<(), StoreError>;

    /// Flags every unflagged raw request as pending and returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the update fails.
    fn mark_pending_requests(&mut self) -> Result<u64, StoreError>;

    /// Returns the distinct months of pending requests, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn pending_periods(&mut self) -> Result<Vec<YearMonth>, StoreError>;

    /// Returns the distinct titles with pending requests in a scope.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn pending_titles(&mut self, scope: &AggregationScope) -> Result<Vec<TitleId>, StoreError>;

    /// Counts a title's pending requests in a scope per classification key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn pending_request_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<ItemCounts, StoreError>;

    /// Counts a title's pending requests in a scope per publication year.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn pending_publication_year_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<PublicationYearCounts, StoreError>;

    /// Deletes a title's pending requests in a scope and returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_pending_requests(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<u64, StoreError>;

    /// Loads a title's monthly type aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn load_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<Option<ItemCounts>, StoreError>;

    /// Inserts a title's monthly type aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregate exists or the write fails.
    fn insert_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError>;

    /// Replaces a title's monthly type aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregate is missing or the write fails.
    fn update_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError>;

    /// Loads a title's monthly request count for one publication year.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn load_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
    ) -> Result<Option<u64>, StoreError>;

    /// Inserts a title's monthly request count for one publication year.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregate exists or the write fails.
    fn insert_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError>;

    /// Replaces a title's monthly request count for one publication year.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the aggregate is missing or the write fails.
    fn update_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError>;
}

/// Transactional usage store.
pub trait UsageStore {
    /// Runs `operation` inside one transaction.
    ///
    /// The transaction commits when `operation` returns `Ok` and rolls back
    /// when it returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or a [`StoreError`] converted into `E`
    /// when the transaction cannot be opened or committed.
    fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UsageTransaction) -> Result<T, E>;
}

// ============================================================================
// SECTION: Report Source
// ============================================================================

/// Parameters of a report read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportQuery {
    /// Report kind (selects domain and source table).
    pub kind: ReportKind,
    /// Months covered by the report.
    pub period: ReportPeriod,
}

/// One summary counter row read for a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRow {
    /// Title the counters belong to.
    pub title: TitleId,
    /// Calendar month of the counters.
    pub period: YearMonth,
    /// Publication year for publication-year sources (`None` otherwise or
    /// when unknown).
    pub publication_year: Option<i32>,
    /// Counter values keyed by classification.
    pub counts: ItemCounts,
}

/// Consistent read of the title list and counter stream for a report.
///
/// # Invariants
/// - `titles` excludes the rollup titles and is ordered by name, then identity.
/// - `counters` is grouped by title in the same order as `titles`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSnapshot {
    /// Catalog titles of the report domain.
    pub titles: Vec<TitleRecord>,
    /// Counter rows of the listed titles within the period.
    pub counters: Vec<CounterRow>,
}

/// Read side of a usage store used by report synthesis.
pub trait ReportSource {
    /// Reads the titles and counters for a report in one consistent snapshot.
    ///
    /// Every catalog title of the report domain is listed; only aggregates
    /// recorded without publisher involvement are returned as counters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn report_snapshot(&self, query: &ReportQuery) -> Result<ReportSnapshot, StoreError>;
}

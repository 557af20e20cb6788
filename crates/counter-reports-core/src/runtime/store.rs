// crates/counter-reports-core/src/runtime/store.rs
// ============================================================================
// Module: COUNTER Reports In-Memory Store
// Description: In-memory usage store for tests and embedding.
// Purpose: Provide a transactional store implementation without external deps.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemoryUsageStore`] keeps titles, raw requests, and aggregates behind a
//! mutex. Each transaction works on a copy of the state and swaps it in only
//! when the operation succeeds, which gives the same all-or-nothing batch
//! semantics as the durable store. It is not intended for production volumes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AggregateSource;
use crate::core::CountKey;
use crate::core::Domain;
use crate::core::ItemCounts;
use crate::core::PublicationYearCounts;
use crate::core::RawRequest;
use crate::core::TitleId;
use crate::core::TitlePayload;
use crate::core::TitleRecord;
use crate::core::YearMonth;
use crate::interfaces::AggregationScope;
use crate::interfaces::CounterRow;
use crate::interfaces::ReportQuery;
use crate::interfaces::ReportSnapshot;
use crate::interfaces::ReportSource;
use crate::interfaces::StoreError;
use crate::interfaces::UsageStore;
use crate::interfaces::UsageTransaction;

// ============================================================================
// SECTION: State
// ============================================================================

/// Key of a monthly type aggregate.
type TypeAggregateKey = (Domain, TitleId, bool, YearMonth);
/// Key of a monthly publication-year aggregate.
type PublicationYearKey = (TitleId, bool, YearMonth, Option<i32>);

/// A raw request plus its pending marker.
#[derive(Debug, Clone)]
struct StoredRequest {
    /// Recorded request.
    request: RawRequest,
    /// Whether an aggregation run has claimed the request.
    pending: bool,
}

impl StoredRequest {
    /// Returns true when the request is pending for a title and scope.
    fn matches(&self, title: TitleId, scope: &AggregationScope) -> bool {
        self.request.title == title && self.in_scope(scope)
    }

    /// Returns true when the request is pending within a scope.
    fn in_scope(&self, scope: &AggregationScope) -> bool {
        self.pending
            && self.request.period == scope.period
            && self.request.class.domain() == scope.domain
            && self.request.publisher_involved == scope.publisher_involved
    }
}

/// Complete store contents.
#[derive(Debug, Clone, Default)]
struct UsageState {
    /// Title catalog.
    titles: BTreeMap<TitleId, TitlePayload>,
    /// Raw requests in recording order.
    requests: Vec<StoredRequest>,
    /// Monthly type aggregates.
    type_aggregates: BTreeMap<TypeAggregateKey, ItemCounts>,
    /// Monthly publication-year aggregates (journals only).
    publication_year_aggregates: BTreeMap<PublicationYearKey, u64>,
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory usage store for tests and examples.
#[derive(Debug, Clone)]
pub struct InMemoryUsageStore {
    /// Store contents protected by a mutex.
    state: Arc<Mutex<UsageState>>,
}

impl Default for InMemoryUsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUsageStore {
    /// Creates an empty store holding only the rollup titles.
    #[must_use]
    pub fn new() -> Self {
        let mut state = UsageState::default();
        for domain in Domain::ALL {
            let rollup = TitleRecord::rollup(domain);
            state.titles.insert(rollup.id, rollup.payload);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Records one raw request (the recorder boundary).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the day is not in the request
    /// month, the title is unknown, or its domain does not match the request
    /// classification.
    pub fn record_request(&self, request: &RawRequest) -> Result<(), StoreError> {
        request.period.check_day(request.day).map_err(|err| StoreError::Invalid(err.to_string()))?;
        let mut guard = self.lock()?;
        let domain = guard
            .titles
            .get(&request.title)
            .map(|payload| payload.domain)
            .ok_or_else(|| StoreError::Invalid(format!("unknown title {}", request.title)))?;
        if request.title.is_rollup() || domain != request.class.domain() {
            return Err(StoreError::Invalid(format!(
                "request class {} does not apply to title {}",
                request.class.as_str(),
                request.title
            )));
        }
        guard.requests.push(StoredRequest {
            request: request.clone(),
            pending: false,
        });
        drop(guard);
        Ok(())
    }

    /// Returns the number of raw requests still stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store mutex is poisoned.
    pub fn raw_request_count(&self) -> Result<u64, StoreError> {
        let count = self.lock()?.requests.len();
        u64::try_from(count).map_err(|_| StoreError::Invalid("request count overflow".to_string()))
    }

    /// Locks the store state.
    fn lock(&self) -> Result<MutexGuard<'_, UsageState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("usage store mutex poisoned".to_string()))
    }
}

impl UsageStore for InMemoryUsageStore {
    fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UsageTransaction) -> Result<T, E>,
    {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        let value = operation(&mut working)?;
        *guard = working;
        drop(guard);
        Ok(value)
    }
}

// ============================================================================
// SECTION: Transaction Operations
// ============================================================================

impl UsageTransaction for UsageState {
    fn find_title(&mut self, id: TitleId) -> Result<Option<TitlePayload>, StoreError> {
        Ok(self.titles.get(&id).cloned())
    }

    fn insert_title(&mut self, record: &TitleRecord) -> Result<(), StoreError> {
        if self.titles.contains_key(&record.id) {
            return Err(StoreError::Invalid(format!("title {} already exists", record.id)));
        }
        self.titles.insert(record.id, record.payload.clone());
        Ok(())
    }

    fn mark_pending_requests(&mut self) -> Result<u64, StoreError> {
        let mut marked = 0_u64;
        for stored in self.requests.iter_mut().filter(|stored| !stored.pending) {
            stored.pending = true;
            marked += 1;
        }
        Ok(marked)
    }

    fn pending_periods(&mut self) -> Result<Vec<YearMonth>, StoreError> {
        let periods: BTreeSet<YearMonth> = self
            .requests
            .iter()
            .filter(|stored| stored.pending)
            .map(|stored| stored.request.period)
            .collect();
        Ok(periods.into_iter().collect())
    }

    fn pending_titles(&mut self, scope: &AggregationScope) -> Result<Vec<TitleId>, StoreError> {
        let titles: BTreeSet<TitleId> = self
            .requests
            .iter()
            .filter(|stored| stored.in_scope(scope))
            .map(|stored| stored.request.title)
            .collect();
        Ok(titles.into_iter().collect())
    }

    fn pending_request_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<ItemCounts, StoreError> {
        let mut counts = ItemCounts::zeroed(scope.domain.aggregate_keys());
        for stored in self.requests.iter().filter(|stored| stored.matches(title, scope)) {
            counts.record(stored.request.class, 1);
        }
        Ok(counts)
    }

    fn pending_publication_year_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<PublicationYearCounts, StoreError> {
        Ok(self
            .requests
            .iter()
            .filter(|stored| stored.matches(title, scope))
            .map(|stored| (stored.request.publication_year, 1))
            .collect())
    }

    fn delete_pending_requests(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<u64, StoreError> {
        let before = self.requests.len();
        self.requests.retain(|stored| !stored.matches(title, scope));
        u64::try_from(before - self.requests.len())
            .map_err(|_| StoreError::Invalid("request count overflow".to_string()))
    }

    fn load_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<Option<ItemCounts>, StoreError> {
        Ok(self.type_aggregates.get(&type_key(title, scope)).cloned())
    }

    fn insert_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError> {
        let key = type_key(title, scope);
        if self.type_aggregates.contains_key(&key) {
            return Err(StoreError::Invalid(format!(
                "type aggregate for title {title} in {} already exists",
                scope.period
            )));
        }
        self.type_aggregates.insert(key, counts.clone());
        Ok(())
    }

    fn update_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError> {
        let existing = self.type_aggregates.get_mut(&type_key(title, scope)).ok_or_else(|| {
            StoreError::Invalid(format!("type aggregate for title {title} in {} is missing", scope.period))
        })?;
        *existing = counts.clone();
        Ok(())
    }

    fn load_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self.publication_year_aggregates.get(&year_key(title, scope, publication_year)).copied())
    }

    fn insert_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError> {
        let key = year_key(title, scope, publication_year);
        if self.publication_year_aggregates.contains_key(&key) {
            return Err(StoreError::Invalid(format!(
                "publication year aggregate for title {title} in {} already exists",
                scope.period
            )));
        }
        self.publication_year_aggregates.insert(key, requests);
        Ok(())
    }

    fn update_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError> {
        let existing = self
            .publication_year_aggregates
            .get_mut(&year_key(title, scope, publication_year))
            .ok_or_else(|| {
                StoreError::Invalid(format!(
                    "publication year aggregate for title {title} in {} is missing",
                    scope.period
                ))
            })?;
        *existing = requests;
        Ok(())
    }
}

/// Builds a type aggregate key.
const fn type_key(title: TitleId, scope: &AggregationScope) -> TypeAggregateKey {
    (scope.domain, title, scope.publisher_involved, scope.period)
}

/// Builds a publication-year aggregate key.
const fn year_key(
    title: TitleId,
    scope: &AggregationScope,
    publication_year: Option<i32>,
) -> PublicationYearKey {
    (title, scope.publisher_involved, scope.period, publication_year)
}

// ============================================================================
// SECTION: Report Source
// ============================================================================

impl ReportSource for InMemoryUsageStore {
    fn report_snapshot(&self, query: &ReportQuery) -> Result<ReportSnapshot, StoreError> {
        let guard = self.lock()?;
        let domain = query.kind.domain();
        let mut titles: Vec<TitleRecord> = guard
            .titles
            .iter()
            .filter(|(id, payload)| payload.domain == domain && !id.is_rollup())
            .map(|(id, payload)| TitleRecord {
                id: *id,
                payload: payload.clone(),
            })
            .collect();
        let mut counters: Vec<CounterRow> = match query.kind.source() {
            AggregateSource::TypeAggregates => guard
                .type_aggregates
                .iter()
                .filter(|((key_domain, _, publisher_involved, period), _)| {
                    *key_domain == domain && !*publisher_involved && query.period.contains(*period)
                })
                .map(|((_, title, _, period), counts)| CounterRow {
                    title: *title,
                    period: *period,
                    publication_year: None,
                    counts: counts.clone(),
                })
                .collect(),
            AggregateSource::PublicationYearAggregates => guard
                .publication_year_aggregates
                .iter()
                .filter(|((_, publisher_involved, period, _), _)| {
                    !*publisher_involved && query.period.contains(*period)
                })
                .map(|((title, _, period, publication_year), requests)| CounterRow {
                    title: *title,
                    period: *period,
                    publication_year: *publication_year,
                    counts: [(CountKey::Requests, *requests)].into_iter().collect(),
                })
                .collect(),
        };
        drop(guard);
        titles.sort_by(|left, right| {
            left.payload.name.cmp(&right.payload.name).then(left.id.cmp(&right.id))
        });
        let positions: HashMap<TitleId, usize> =
            titles.iter().enumerate().map(|(position, title)| (title.id, position)).collect();
        counters.retain(|counter| positions.contains_key(&counter.title));
        counters.sort_by_key(|counter| {
            (positions.get(&counter.title).copied(), counter.period, counter.publication_year)
        });
        Ok(ReportSnapshot {
            titles,
            counters,
        })
    }
}

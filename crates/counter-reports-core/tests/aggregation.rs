// crates/counter-reports-core/tests/aggregation.rs
// ============================================================================
// Module: Aggregation Pipeline Tests
// Description: Idempotency, additivity, rollups, and batch atomicity.
// Purpose: Ensure aggregates always equal prior state plus pending usage.
// Dependencies: counter-reports-core, proptest
// ============================================================================

//! ## Overview
//! Drives the aggregation pipeline against the in-memory store. A wrapping
//! store injects failures mid-run to check that a failed batch leaves no
//! partial aggregate and that a retry converges on the clean-run result.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use counter_reports_core::AggregationConfig;
use counter_reports_core::AggregationError;
use counter_reports_core::AggregationScope;
use counter_reports_core::CountKey;
use counter_reports_core::Domain;
use counter_reports_core::IdentityResolver;
use counter_reports_core::InMemoryUsageStore;
use counter_reports_core::ItemCounts;
use counter_reports_core::PublicationYearCounts;
use counter_reports_core::RawRequest;
use counter_reports_core::RequestAggregator;
use counter_reports_core::RequestClass;
use counter_reports_core::StoreError;
use counter_reports_core::TitleId;
use counter_reports_core::TitlePayload;
use counter_reports_core::TitleRecord;
use counter_reports_core::UsageStore;
use counter_reports_core::UsageTransaction;
use counter_reports_core::YearMonth;
use proptest::prelude::*;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn month(year: i32, month: u8) -> YearMonth {
    YearMonth::new(year, month).expect("valid month")
}

fn title(store: &InMemoryUsageStore, domain: Domain, name: &str) -> TitleId {
    IdentityResolver::new(store.clone())
        .resolve(&TitlePayload::new(domain, name))
        .expect("resolve title")
}

fn record(
    store: &InMemoryUsageStore,
    title: TitleId,
    period: YearMonth,
    class: RequestClass,
    publisher_involved: bool,
    publication_year: Option<i32>,
    times: usize,
) {
    for _ in 0 .. times {
        store
            .record_request(&RawRequest {
                title,
                period,
                day: 15,
                class,
                publisher_involved,
                publication_year,
            })
            .expect("record request");
    }
}

fn scope(domain: Domain, period: YearMonth, publisher_involved: bool) -> AggregationScope {
    AggregationScope {
        period,
        domain,
        publisher_involved,
    }
}

fn type_aggregate<S: UsageStore>(store: &S, title: TitleId, scope: AggregationScope) -> Option<ItemCounts> {
    store
        .transaction(|tx| -> Result<_, StoreError> { tx.load_type_aggregate(title, &scope) })
        .expect("load aggregate")
}

fn year_aggregate<S: UsageStore>(
    store: &S,
    title: TitleId,
    scope: AggregationScope,
    publication_year: Option<i32>,
) -> Option<u64> {
    store
        .transaction(|tx| -> Result<_, StoreError> {
            tx.load_publication_year_aggregate(title, &scope, publication_year)
        })
        .expect("load publication year aggregate")
}

fn book_counts(full: u64, section: u64) -> ItemCounts {
    [(CountKey::Full, full), (CountKey::Section, section)].into_iter().collect()
}

fn aggregator(store: &InMemoryUsageStore) -> RequestAggregator<InMemoryUsageStore> {
    RequestAggregator::new(store.clone(), AggregationConfig::default())
}

/// Store wrapper that fails request deletion once its budget is spent.
#[derive(Clone)]
struct FlakyStore {
    inner: InMemoryUsageStore,
    deletes_left: Arc<AtomicUsize>,
}

impl UsageStore for FlakyStore {
    fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UsageTransaction) -> Result<T, E>,
    {
        self.inner.transaction(|tx| {
            let mut flaky = FlakyTransaction {
                inner: tx,
                deletes_left: &self.deletes_left,
            };
            operation(&mut flaky)
        })
    }
}

struct FlakyTransaction<'a> {
    inner: &'a mut dyn UsageTransaction,
    deletes_left: &'a AtomicUsize,
}

impl UsageTransaction for FlakyTransaction<'_> {
    fn find_title(&mut self, id: TitleId) -> Result<Option<TitlePayload>, StoreError> {
        self.inner.find_title(id)
    }

    fn insert_title(&mut self, record: &TitleRecord) -> Result<(), StoreError> {
        self.inner.insert_title(record)
    }

    fn mark_pending_requests(&mut self) -> Result<u64, StoreError> {
        self.inner.mark_pending_requests()
    }

    fn pending_periods(&mut self) -> Result<Vec<YearMonth>, StoreError> {
        self.inner.pending_periods()
    }

    fn pending_titles(&mut self, scope: &AggregationScope) -> Result<Vec<TitleId>, StoreError> {
        self.inner.pending_titles(scope)
    }

    fn pending_request_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<ItemCounts, StoreError> {
        self.inner.pending_request_counts(title, scope)
    }

    fn pending_publication_year_counts(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<PublicationYearCounts, StoreError> {
        self.inner.pending_publication_year_counts(title, scope)
    }

    fn delete_pending_requests(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<u64, StoreError> {
        let left = self.deletes_left.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Store("injected delete failure".to_string()));
        }
        self.deletes_left.store(left - 1, Ordering::SeqCst);
        self.inner.delete_pending_requests(title, scope)
    }

    fn load_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
    ) -> Result<Option<ItemCounts>, StoreError> {
        self.inner.load_type_aggregate(title, scope)
    }

    fn insert_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError> {
        self.inner.insert_type_aggregate(title, scope, counts)
    }

    fn update_type_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        counts: &ItemCounts,
    ) -> Result<(), StoreError> {
        self.inner.update_type_aggregate(title, scope, counts)
    }

    fn load_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
    ) -> Result<Option<u64>, StoreError> {
        self.inner.load_publication_year_aggregate(title, scope, publication_year)
    }

    fn insert_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError> {
        self.inner.insert_publication_year_aggregate(title, scope, publication_year, requests)
    }

    fn update_publication_year_aggregate(
        &mut self,
        title: TitleId,
        scope: &AggregationScope,
        publication_year: Option<i32>,
        requests: u64,
    ) -> Result<(), StoreError> {
        self.inner.update_publication_year_aggregate(title, scope, publication_year, requests)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn aggregates_book_requests_and_rollup() {
    let store = InMemoryUsageStore::new();
    let a = title(&store, Domain::Book, "Book A");
    let b = title(&store, Domain::Book, "Book B");
    let january = month(2024, 1);
    record(&store, a, january, RequestClass::BookFull, false, None, 3);
    record(&store, a, january, RequestClass::BookSection, false, None, 1);

    let summary = aggregator(&store).run().expect("aggregation run");
    assert_eq!(summary.requests_marked, 4);
    assert_eq!(summary.requests_deleted, 4);
    assert_eq!(summary.titles_aggregated, 1);

    let jan_scope = scope(Domain::Book, january, false);
    assert_eq!(type_aggregate(&store, a, jan_scope), Some(book_counts(3, 1)));
    assert_eq!(type_aggregate(&store, b, jan_scope), None);
    assert_eq!(type_aggregate(&store, TitleId::ALL_BOOKS, jan_scope), Some(book_counts(3, 1)));
    assert_eq!(store.raw_request_count().expect("raw count"), 0);
}

#[test]
fn second_run_without_new_requests_is_a_noop() {
    let store = InMemoryUsageStore::new();
    let a = title(&store, Domain::Book, "Book A");
    let january = month(2024, 1);
    record(&store, a, january, RequestClass::BookFull, false, None, 2);
    aggregator(&store).run().expect("first run");
    let summary = aggregator(&store).run().expect("second run");
    assert_eq!(summary.requests_marked, 0);
    assert_eq!(summary.periods, 0);
    assert_eq!(summary.batches_committed, 0);
    assert_eq!(type_aggregate(&store, a, scope(Domain::Book, january, false)), Some(book_counts(2, 0)));
}

#[test]
fn runs_are_additive_within_and_across_months() {
    let store = InMemoryUsageStore::new();
    let a = title(&store, Domain::Book, "Book A");
    let january = month(2024, 1);
    let february = month(2024, 2);
    record(&store, a, january, RequestClass::BookFull, false, None, 5);
    aggregator(&store).run().expect("january run");
    record(&store, a, february, RequestClass::BookFull, false, None, 2);
    record(&store, a, january, RequestClass::BookFull, false, None, 1);
    aggregator(&store).run().expect("february run");

    assert_eq!(type_aggregate(&store, a, scope(Domain::Book, january, false)), Some(book_counts(6, 0)));
    assert_eq!(type_aggregate(&store, a, scope(Domain::Book, february, false)), Some(book_counts(2, 0)));
    assert_eq!(
        type_aggregate(&store, TitleId::ALL_BOOKS, scope(Domain::Book, january, false)),
        Some(book_counts(6, 0))
    );
}

#[test]
fn publisher_involved_requests_are_aggregated_separately() {
    let store = InMemoryUsageStore::new();
    let a = title(&store, Domain::Book, "Book A");
    let january = month(2024, 1);
    record(&store, a, january, RequestClass::BookFull, true, None, 4);
    record(&store, a, january, RequestClass::BookFull, false, None, 1);
    aggregator(&store).run().expect("aggregation run");
    assert_eq!(type_aggregate(&store, a, scope(Domain::Book, january, true)), Some(book_counts(4, 0)));
    assert_eq!(type_aggregate(&store, a, scope(Domain::Book, january, false)), Some(book_counts(1, 0)));
}

#[test]
fn journal_requests_fill_type_and_publication_year_aggregates() {
    let store = InMemoryUsageStore::new();
    let j = title(&store, Domain::Journal, "Journal J");
    let k = title(&store, Domain::Journal, "Journal K");
    let march = month(2024, 3);
    record(&store, j, march, RequestClass::JournalHtml, false, Some(2020), 2);
    record(&store, j, march, RequestClass::JournalPdf, false, Some(2021), 3);
    record(&store, k, march, RequestClass::JournalPdf, false, None, 1);
    aggregator(&store).run().expect("aggregation run");

    let march_scope = scope(Domain::Journal, march, false);
    let expected_j: ItemCounts =
        [(CountKey::Total, 5), (CountKey::Html, 2), (CountKey::Pdf, 3)].into_iter().collect();
    assert_eq!(type_aggregate(&store, j, march_scope), Some(expected_j));
    assert_eq!(year_aggregate(&store, j, march_scope, Some(2020)), Some(2));
    assert_eq!(year_aggregate(&store, j, march_scope, Some(2021)), Some(3));
    assert_eq!(year_aggregate(&store, k, march_scope, None), Some(1));

    let rollup = type_aggregate(&store, TitleId::ALL_JOURNALS, march_scope).expect("journal rollup");
    assert_eq!(rollup.get(CountKey::Total), 6);
    assert_eq!(rollup.get(CountKey::Pdf), 4);
    assert_eq!(year_aggregate(&store, TitleId::ALL_JOURNALS, march_scope, None), Some(1));
    assert_eq!(year_aggregate(&store, TitleId::ALL_JOURNALS, march_scope, Some(2021)), Some(3));
}

#[test]
fn titles_are_split_into_bounded_batches() {
    let store = InMemoryUsageStore::new();
    let january = month(2024, 1);
    for index in 0 .. 5 {
        let id = title(&store, Domain::Book, &format!("Book {index}"));
        record(&store, id, january, RequestClass::BookFull, false, None, 1);
    }
    let aggregator = RequestAggregator::new(
        store.clone(),
        AggregationConfig {
            max_batch_titles: 2,
        },
    );
    let summary = aggregator.run().expect("aggregation run");
    assert_eq!(summary.batches_committed, 3);
    assert_eq!(summary.titles_aggregated, 5);
    assert_eq!(
        type_aggregate(&store, TitleId::ALL_BOOKS, scope(Domain::Book, january, false)),
        Some(book_counts(5, 0))
    );
}

#[test]
fn zero_batch_size_is_rejected() {
    let aggregator = RequestAggregator::new(
        InMemoryUsageStore::new(),
        AggregationConfig {
            max_batch_titles: 0,
        },
    );
    assert!(matches!(aggregator.run(), Err(AggregationError::InvalidBatchSize)));
}

#[test]
fn failed_batch_rolls_back_and_retry_matches_clean_run() {
    let flaky_inner = InMemoryUsageStore::new();
    let clean = InMemoryUsageStore::new();
    let january = month(2024, 1);
    let mut titles = Vec::new();
    for (index, requests) in [3_usize, 2, 4].into_iter().enumerate() {
        let name = format!("Book {index}");
        let id = title(&flaky_inner, Domain::Book, &name);
        assert_eq!(title(&clean, Domain::Book, &name), id);
        record(&flaky_inner, id, january, RequestClass::BookFull, false, None, requests);
        record(&clean, id, january, RequestClass::BookFull, false, None, requests);
        titles.push(id);
    }
    let flaky = FlakyStore {
        inner: flaky_inner.clone(),
        deletes_left: Arc::new(AtomicUsize::new(1)),
    };
    let config = AggregationConfig {
        max_batch_titles: 1,
    };

    let err = RequestAggregator::new(flaky.clone(), config).run().expect_err("injected failure");
    let AggregationError::Incomplete {
        failures,
        summary,
    } = err
    else {
        panic!("expected incomplete aggregation");
    };
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].period, january);
    assert_eq!(summary.batches_committed, 1);
    let jan_scope = scope(Domain::Book, january, false);
    let committed: Vec<_> = titles.iter().map(|id| type_aggregate(&flaky_inner, *id, jan_scope)).collect();
    assert_eq!(committed.iter().filter(|aggregate| aggregate.is_some()).count(), 1);
    let committed_full: u64 = committed.iter().flatten().map(|counts| counts.get(CountKey::Full)).sum();
    assert_eq!(flaky_inner.raw_request_count().expect("raw count"), 9 - committed_full);
    assert_eq!(
        type_aggregate(&flaky_inner, TitleId::ALL_BOOKS, jan_scope),
        Some(book_counts(committed_full, 0))
    );

    flaky.deletes_left.store(usize::MAX, Ordering::SeqCst);
    let retry = RequestAggregator::new(flaky, config).run().expect("retry run");
    assert_eq!(retry.requests_marked, 0);
    RequestAggregator::new(clean.clone(), config).run().expect("clean run");

    for id in titles.iter().copied().chain([TitleId::ALL_BOOKS]) {
        assert_eq!(type_aggregate(&flaky_inner, id, jan_scope), type_aggregate(&clean, id, jan_scope));
    }
    assert_eq!(type_aggregate(&flaky_inner, TitleId::ALL_BOOKS, jan_scope), Some(book_counts(9, 0)));
    assert_eq!(flaky_inner.raw_request_count().expect("raw count"), 0);
}

#[test]
fn recording_rejects_unknown_titles_and_mismatched_classes() {
    let store = InMemoryUsageStore::new();
    let book = title(&store, Domain::Book, "Book A");
    let request = |title: TitleId, class: RequestClass| RawRequest {
        title,
        period: month(2024, 1),
        day: 1,
        class,
        publisher_involved: false,
        publication_year: None,
    };
    assert!(store.record_request(&request(TitleId::new(1), RequestClass::BookFull)).is_err());
    assert!(store.record_request(&request(book, RequestClass::JournalPdf)).is_err());
    assert!(store.record_request(&request(TitleId::ALL_BOOKS, RequestClass::BookFull)).is_err());
    assert_eq!(store.raw_request_count().expect("raw count"), 0);
}

#[test]
fn recording_rejects_days_outside_the_request_month() {
    let store = InMemoryUsageStore::new();
    let book = title(&store, Domain::Book, "Book A");
    let request = |period: YearMonth, day: u8| RawRequest {
        title: book,
        period,
        day,
        class: RequestClass::BookFull,
        publisher_involved: false,
        publication_year: None,
    };
    for (period, day) in [(month(2024, 1), 0), (month(2024, 1), 99), (month(2023, 2), 29), (month(2024, 2), 30)] {
        let err = store.record_request(&request(period, day)).expect_err("invalid day");
        assert!(matches!(err, StoreError::Invalid(_)));
    }
    assert_eq!(store.raw_request_count().expect("raw count"), 0);

    store.record_request(&request(month(2024, 2), 29)).expect("leap day");
    store.record_request(&request(month(2024, 1), 31)).expect("last day");
    assert_eq!(store.raw_request_count().expect("raw count"), 2);
}

// ============================================================================
// SECTION: Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn split_runs_match_single_run_and_rollup_sums_titles(
        requests in prop::collection::vec((0_usize .. 3, 1_u8 .. 4, any::<bool>()), 0 .. 40),
        split in 0_usize .. 40,
    ) {
        let single = InMemoryUsageStore::new();
        let split_store = InMemoryUsageStore::new();
        let names = ["Alpha", "Beta", "Gamma"];
        let ids: Vec<TitleId> = names.iter().map(|name| title(&single, Domain::Book, name)).collect();
        for name in names {
            title(&split_store, Domain::Book, name);
        }
        let split = split.min(requests.len());
        for (index, (title_index, month_number, full)) in requests.iter().enumerate() {
            let class = if *full { RequestClass::BookFull } else { RequestClass::BookSection };
            let period = month(2024, *month_number);
            record(&single, ids[*title_index], period, class, false, None, 1);
            if index == split {
                aggregator(&split_store).run().expect("first split run");
            }
            record(&split_store, ids[*title_index], period, class, false, None, 1);
        }
        aggregator(&single).run().expect("single run");
        aggregator(&split_store).run().expect("final split run");

        for month_number in 1 .. 4 {
            let month_scope = scope(Domain::Book, month(2024, month_number), false);
            let mut sum = book_counts(0, 0);
            for id in &ids {
                let left = type_aggregate(&single, *id, month_scope);
                prop_assert_eq!(&left, &type_aggregate(&split_store, *id, month_scope));
                if let Some(counts) = left {
                    sum.merge(&counts);
                }
            }
            let rollup = type_aggregate(&single, TitleId::ALL_BOOKS, month_scope)
                .unwrap_or_else(|| book_counts(0, 0));
            prop_assert_eq!(rollup, sum);
        }
    }
}

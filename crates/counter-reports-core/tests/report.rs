// crates/counter-reports-core/tests/report.rs
// ============================================================================
// Module: Report Synthesizer Tests
// Description: Merge-join integrity, zero-fill, rollups, and slot mapping.
// Purpose: Ensure report rows are complete, consistent, and fail closed.
// Dependencies: counter-reports-core
// ============================================================================

//! ## Overview
//! Covers the merge-join directly with hand-built title lists and counter
//! streams, and end to end through aggregation plus synthesis over the
//! in-memory store.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use counter_reports_core::AggregationConfig;
use counter_reports_core::CountKey;
use counter_reports_core::CounterRow;
use counter_reports_core::Domain;
use counter_reports_core::IdentityResolver;
use counter_reports_core::InMemoryUsageStore;
use counter_reports_core::ItemCounts;
use counter_reports_core::PeriodError;
use counter_reports_core::RawRequest;
use counter_reports_core::ReportError;
use counter_reports_core::ReportKind;
use counter_reports_core::ReportPeriod;
use counter_reports_core::ReportRequest;
use counter_reports_core::ReportSynthesizer;
use counter_reports_core::RequestAggregator;
use counter_reports_core::RequestClass;
use counter_reports_core::TitleId;
use counter_reports_core::TitlePayload;
use counter_reports_core::TitleRecord;
use counter_reports_core::YearMonth;
use counter_reports_core::build_report_rows;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn month(year: i32, month: u8) -> YearMonth {
    YearMonth::new(year, month).expect("valid month")
}

fn period(start: YearMonth, end: YearMonth) -> ReportPeriod {
    ReportPeriod::new(start, end).expect("valid period")
}

fn book_record(id: u64, name: &str) -> TitleRecord {
    TitleRecord {
        id: TitleId::new(id),
        payload: TitlePayload::new(Domain::Book, name),
    }
}

fn full(title: u64, period: YearMonth, count: u64) -> CounterRow {
    CounterRow {
        title: TitleId::new(title),
        period,
        publication_year: None,
        counts: [(CountKey::Full, count), (CountKey::Section, 0)].into_iter().collect(),
    }
}

fn full_only(count: u64) -> ItemCounts {
    [(CountKey::Full, count)].into_iter().collect()
}

fn br1_request(start: YearMonth, end: YearMonth) -> ReportRequest {
    ReportRequest::new(ReportKind::BookTitleRequests, period(start, end), 2024)
}

fn resolve(store: &InMemoryUsageStore, domain: Domain, name: &str) -> TitleId {
    IdentityResolver::new(store.clone()).resolve(&TitlePayload::new(domain, name)).expect("resolve")
}

fn record(store: &InMemoryUsageStore, request: RawRequest, times: usize) {
    for _ in 0 .. times {
        store.record_request(&request).expect("record request");
    }
}

fn raw(title: TitleId, period: YearMonth, class: RequestClass, publication_year: Option<i32>) -> RawRequest {
    RawRequest {
        title,
        period,
        day: 3,
        class,
        publisher_involved: false,
        publication_year,
    }
}

fn aggregate(store: &InMemoryUsageStore) {
    RequestAggregator::new(store.clone(), AggregationConfig::default()).run().expect("aggregate");
}

// ============================================================================
// SECTION: Merge Join Tests
// ============================================================================

#[test]
fn empty_title_list_reports_missing_rollup() {
    let request = br1_request(month(2024, 1), month(2024, 1));
    let err = build_report_rows(&request, &[], &[]).expect_err("missing rollup");
    assert!(matches!(err, ReportError::RollupMissing));
}

#[test]
fn title_list_must_start_with_domain_rollup() {
    let request = br1_request(month(2024, 1), month(2024, 1));
    let titles = [book_record(1, "A"), TitleRecord::rollup(Domain::Book)];
    let err = build_report_rows(&request, &titles, &[]).expect_err("rollup not first");
    assert!(matches!(err, ReportError::RollupNotFirst));

    let titles = [TitleRecord::rollup(Domain::Journal), book_record(1, "A")];
    let err = build_report_rows(&request, &titles, &[]).expect_err("wrong domain rollup");
    assert!(matches!(err, ReportError::RollupNotFirst));
}

#[test]
fn counters_fill_slots_totals_and_rollup_with_zero_fill() {
    let request = br1_request(month(2024, 1), month(2024, 3));
    let titles = [TitleRecord::rollup(Domain::Book), book_record(1, "A"), book_record(2, "B"), book_record(3, "C")];
    let counters = [full(1, month(2024, 1), 3), full(1, month(2024, 3), 2), full(3, month(2024, 2), 4)];
    let rows = build_report_rows(&request, &titles, &counters).expect("rows");

    assert_eq!(rows.len(), 4);
    for row in &rows {
        assert_eq!(row.slots.len(), 4);
    }
    let a = &rows[1];
    assert_eq!(a.slots, vec![full_only(5), full_only(3), full_only(0), full_only(2)]);
    let b = &rows[2];
    assert_eq!(b.slots, vec![full_only(0); 4]);
    let rollup = &rows[0];
    assert_eq!(rollup.slots, vec![full_only(9), full_only(3), full_only(4), full_only(2)]);
}

#[test]
fn counter_for_unlisted_title_is_unexpected() {
    let request = br1_request(month(2024, 1), month(2024, 1));
    let titles = [TitleRecord::rollup(Domain::Book), book_record(1, "A")];
    let err = build_report_rows(&request, &titles, &[full(9, month(2024, 1), 1)]).expect_err("unexpected");
    assert!(matches!(err, ReportError::UnexpectedIdentifier { title } if title == TitleId::new(9)));

    let rollup_counter = CounterRow {
        title: TitleId::ALL_BOOKS,
        ..full(1, month(2024, 1), 1)
    };
    let err = build_report_rows(&request, &titles, &[rollup_counter]).expect_err("rollup counter");
    assert!(matches!(err, ReportError::UnexpectedIdentifier { .. }));
}

#[test]
fn counter_order_divergence_is_wrong_sorting() {
    let request = br1_request(month(2024, 1), month(2024, 2));
    let titles = [TitleRecord::rollup(Domain::Book), book_record(1, "A"), book_record(2, "B")];
    let counters = [full(2, month(2024, 1), 1), full(1, month(2024, 1), 1)];
    let err = build_report_rows(&request, &titles, &counters).expect_err("wrong sorting");
    assert!(matches!(err, ReportError::WrongSorting { title } if title == TitleId::new(1)));
}

#[test]
fn counter_outside_period_is_rejected() {
    let request = br1_request(month(2024, 1), month(2024, 2));
    let titles = [TitleRecord::rollup(Domain::Book), book_record(1, "A")];
    let err = build_report_rows(&request, &titles, &[full(1, month(2024, 3), 1)]).expect_err("out of range");
    assert!(matches!(err, ReportError::SlotOutOfRange { .. }));
}

#[test]
fn duplicate_titles_are_rejected() {
    let request = br1_request(month(2024, 1), month(2024, 1));
    let titles = [TitleRecord::rollup(Domain::Book), book_record(1, "A"), book_record(1, "A")];
    let err = build_report_rows(&request, &titles, &[]).expect_err("duplicate");
    assert!(matches!(err, ReportError::DuplicateTitle { .. }));
}

#[test]
fn journal_month_slots_hold_only_total() {
    let request = ReportRequest::new(ReportKind::JournalRequests, period(month(2024, 1), month(2024, 2)), 2024);
    let titles = [
        TitleRecord::rollup(Domain::Journal),
        TitleRecord {
            id: TitleId::new(7),
            payload: TitlePayload::new(Domain::Journal, "J"),
        },
    ];
    let counter = CounterRow {
        title: TitleId::new(7),
        period: month(2024, 2),
        publication_year: None,
        counts: [(CountKey::Total, 5), (CountKey::Html, 3), (CountKey::Pdf, 2)].into_iter().collect(),
    };
    let rows = build_report_rows(&request, &titles, &[counter]).expect("rows");
    let row = &rows[1];
    assert_eq!(ReportKind::JournalRequests.layout().item_keys, &[CountKey::Total]);
    assert_eq!(row.slot(1), Some(&[(CountKey::Total, 0)].into_iter().collect::<ItemCounts>()));
    assert_eq!(row.slot(2), Some(&[(CountKey::Total, 5)].into_iter().collect::<ItemCounts>()));
    assert_eq!(
        row.slot(0),
        Some(&[(CountKey::Total, 5), (CountKey::Html, 3), (CountKey::Pdf, 2)].into_iter().collect::<ItemCounts>())
    );
    assert_eq!(row.slot(3), None);
}

#[test]
fn unrepresentable_current_year_is_a_period_error() {
    let request = ReportRequest::new(
        ReportKind::JournalRequestsByPublicationYear,
        period(month(2024, 1), month(2024, 1)),
        i32::MIN + 5,
    );
    let titles = [TitleRecord::rollup(Domain::Journal)];
    let err = build_report_rows(&request, &titles, &[]).expect_err("year out of range");
    assert!(matches!(err, ReportError::Period(PeriodError::YearOutOfRange(_))));

    let synthesizer = ReportSynthesizer::new(InMemoryUsageStore::new());
    let err = synthesizer.synthesize(&request).expect_err("year out of range");
    assert!(matches!(err, ReportError::Period(PeriodError::YearOutOfRange(_))));
}

#[test]
fn prior_year_bucket_accumulates_several_publication_years() {
    let request = ReportRequest::new(
        ReportKind::JournalRequestsByPublicationYear,
        period(month(2024, 1), month(2024, 1)),
        2024,
    );
    let titles = [
        TitleRecord::rollup(Domain::Journal),
        TitleRecord {
            id: TitleId::new(5),
            payload: TitlePayload::new(Domain::Journal, "J"),
        },
    ];
    let row = |year: Option<i32>, requests: u64| CounterRow {
        title: TitleId::new(5),
        period: month(2024, 1),
        publication_year: year,
        counts: [(CountKey::Requests, requests)].into_iter().collect(),
    };
    let counters = [row(None, 1), row(Some(1990), 2), row(Some(2001), 3), row(Some(2023), 4), row(Some(2030), 5)];
    let rows = build_report_rows(&request, &titles, &counters).expect("rows");
    let slots = &rows[1].slots;
    assert_eq!(slots.len(), 18);
    assert_eq!(slots[0].get(CountKey::Requests), 5);
    assert_eq!(slots[2].get(CountKey::Requests), 4);
    assert_eq!(slots[16].get(CountKey::Requests), 5);
    assert_eq!(slots[17].get(CountKey::Requests), 1);
    assert_eq!(rows[0].slots, rows[1].slots);
}

// ============================================================================
// SECTION: End-to-End Tests
// ============================================================================

#[test]
fn book_scenario_lists_unused_titles_with_zero_rows() {
    let store = InMemoryUsageStore::new();
    let a = resolve(&store, Domain::Book, "A Book");
    let b = resolve(&store, Domain::Book, "B Book");
    let january = month(2024, 1);
    record(&store, raw(a, january, RequestClass::BookFull, None), 3);
    record(&store, raw(a, january, RequestClass::BookSection, None), 1);
    aggregate(&store);

    let synthesizer = ReportSynthesizer::new(store);
    let br1 = synthesizer.synthesize(&br1_request(january, january)).expect("br1");
    assert_eq!(br1.columns, vec!["Reporting Period Total".to_string(), "Jan-2024".to_string()]);
    assert_eq!(br1.rows.len(), 3);
    assert_eq!(br1.rows[1].title.id, a);
    assert_eq!(br1.row_for(a).expect("row a").slots, vec![full_only(3), full_only(3)]);
    assert_eq!(br1.row_for(b).expect("row b").slots, vec![full_only(0), full_only(0)]);
    assert_eq!(br1.rollup().expect("rollup").slots, vec![full_only(3), full_only(3)]);

    let br2 = synthesizer
        .synthesize(&ReportRequest::new(ReportKind::BookSectionRequests, period(january, january), 2024))
        .expect("br2");
    let section = |count: u64| -> ItemCounts { [(CountKey::Section, count)].into_iter().collect() };
    assert_eq!(br2.row_for(a).expect("row a").slots, vec![section(1), section(1)]);
    assert_eq!(br2.row_for(b).expect("row b").slots, vec![section(0), section(0)]);
    assert_eq!(br2.rollup().expect("rollup").slots, vec![section(1), section(1)]);
}

#[test]
fn monthly_runs_land_in_separate_report_columns() {
    let store = InMemoryUsageStore::new();
    let a = resolve(&store, Domain::Book, "A Book");
    record(&store, raw(a, month(2024, 1), RequestClass::BookFull, None), 5);
    aggregate(&store);
    record(&store, raw(a, month(2024, 2), RequestClass::BookFull, None), 2);
    aggregate(&store);

    let report = ReportSynthesizer::new(store)
        .synthesize(&br1_request(month(2024, 1), month(2024, 2)))
        .expect("report");
    assert_eq!(report.row_for(a).expect("row a").slots, vec![full_only(7), full_only(5), full_only(2)]);
    assert_eq!(report.begins_on.to_string(), "2024-01-01");
    assert_eq!(report.ends_on.to_string(), "2024-02-29");
}

#[test]
fn journal_report_sums_formats_and_ignores_publisher_involved_usage() {
    let store = InMemoryUsageStore::new();
    let beta = resolve(&store, Domain::Journal, "Beta Journal");
    let alpha = resolve(&store, Domain::Journal, "Alpha Journal");
    let june = month(2024, 6);
    record(&store, raw(beta, june, RequestClass::JournalHtml, Some(2024)), 2);
    record(&store, raw(beta, june, RequestClass::JournalPdf, Some(2015)), 1);
    record(&store, raw(alpha, june, RequestClass::JournalPdf, None), 4);
    record(
        &store,
        RawRequest {
            publisher_involved: true,
            ..raw(alpha, june, RequestClass::JournalPdf, None)
        },
        10,
    );
    aggregate(&store);

    let synthesizer = ReportSynthesizer::new(store);
    let jr1 = synthesizer
        .synthesize(&ReportRequest::new(ReportKind::JournalRequests, period(june, june), 2024))
        .expect("jr1");
    assert_eq!(jr1.rows[1].title.id, alpha);
    assert_eq!(jr1.rows[2].title.id, beta);
    let beta_month = jr1.row_for(beta).expect("beta").slots[1].clone();
    assert_eq!(beta_month, [(CountKey::Total, 3)].into_iter().collect::<ItemCounts>());
    let beta_total = jr1.row_for(beta).expect("beta").slots[0].clone();
    assert_eq!(beta_total.get(CountKey::Html), 2);
    assert_eq!(beta_total.get(CountKey::Pdf), 1);
    let rollup_total = jr1.rollup().expect("rollup").slots[0].clone();
    assert_eq!(rollup_total.get(CountKey::Total), 7);
    assert_eq!(rollup_total.get(CountKey::Pdf), 5);

    let jr5 = synthesizer
        .synthesize(&ReportRequest::new(
            ReportKind::JournalRequestsByPublicationYear,
            period(june, june),
            2024,
        ))
        .expect("jr5");
    assert_eq!(jr5.columns.first().map(String::as_str), Some("Articles in Press"));
    assert_eq!(jr5.columns.get(1).map(String::as_str), Some("YOP 2024"));
    assert_eq!(jr5.columns.last().map(String::as_str), Some("YOP unknown"));
    let beta_row = jr5.row_for(beta).expect("beta");
    assert_eq!(beta_row.slots[1].get(CountKey::Requests), 2);
    assert_eq!(beta_row.slots[10].get(CountKey::Requests), 1);
    let alpha_row = jr5.row_for(alpha).expect("alpha");
    assert_eq!(alpha_row.slots[17].get(CountKey::Requests), 4);
    assert_eq!(jr5.rollup().expect("rollup").slots[17].get(CountKey::Requests), 4);
}

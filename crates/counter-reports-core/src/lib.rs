// crates/counter-reports-core/src/lib.rs
// ============================================================================
// Module: COUNTER Reports Core Library
// Description: Public API surface for the COUNTER reports core.
// Purpose: Expose core types, storage interfaces, and runtime engines.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! COUNTER reports core turns raw per-access usage records for books and
//! journals into monthly summary counters and synthesizes fixed-shape usage
//! reports from them. It is storage-agnostic and integrates through the
//! [`UsageStore`] and [`ReportSource`] interfaces; an in-memory store ships
//! with the crate and a durable `SQLite` store lives in a sibling crate.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::AggregationScope;
pub use interfaces::CounterRow;
pub use interfaces::ReportQuery;
pub use interfaces::ReportSnapshot;
pub use interfaces::ReportSource;
pub use interfaces::StoreError;
pub use interfaces::UsageStore;
pub use interfaces::UsageTransaction;
pub use runtime::AggregationConfig;
pub use runtime::AggregationError;
pub use runtime::AggregationSummary;
pub use runtime::DEFAULT_MAX_BATCH_TITLES;
pub use runtime::DEFAULT_MAX_PROBE_ATTEMPTS;
pub use runtime::IdentityError;
pub use runtime::IdentityResolver;
pub use runtime::InMemoryUsageStore;
pub use runtime::PeriodFailure;
pub use runtime::Report;
pub use runtime::ReportError;
pub use runtime::ReportRequest;
pub use runtime::ReportRow;
pub use runtime::ReportSynthesizer;
pub use runtime::RequestAggregator;
pub use runtime::Sha256TitleHasher;
pub use runtime::TitleHasher;
pub use runtime::build_report_rows;

// crates/counter-reports-core/src/runtime/mod.rs
// ============================================================================
// Module: COUNTER Reports Runtime
// Description: Identity resolution, aggregation, report synthesis, storage.
// Purpose: Provide the engines that operate over the storage interfaces.
// Dependencies: crate::{core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! The runtime hosts the three engines (identity resolver, aggregation
//! pipeline, report synthesizer) and the in-memory usage store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod aggregator;
pub mod identity;
pub mod report;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aggregator::AggregationConfig;
pub use aggregator::AggregationError;
pub use aggregator::AggregationSummary;
pub use aggregator::DEFAULT_MAX_BATCH_TITLES;
pub use aggregator::PeriodFailure;
pub use aggregator::RequestAggregator;
pub use identity::DEFAULT_MAX_PROBE_ATTEMPTS;
pub use identity::IdentityError;
pub use identity::IdentityResolver;
pub use identity::Sha256TitleHasher;
pub use identity::TitleHasher;
pub use report::Report;
pub use report::ReportError;
pub use report::ReportRequest;
pub use report::ReportRow;
pub use report::ReportSynthesizer;
pub use report::build_report_rows;
pub use store::InMemoryUsageStore;

// crates/counter-reports-core/src/core/mod.rs
// ============================================================================
// Module: COUNTER Reports Core Types
// Description: Domain model for titles, usage counters, and report shapes.
// Purpose: Provide the shared data types used by every engine and store.
// Dependencies: serde, serde_jcs, sha2, time
// ============================================================================

//! ## Overview
//! Core types describe titles and their identities, raw usage requests,
//! per-classification counters, calendar periods, and the fixed report
//! layouts. Everything here is plain data with validation at construction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod hashing;
pub mod identifiers;
pub mod period;
pub mod report;
pub mod title;
pub mod usage;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use hashing::HashError;
pub use identifiers::TitleId;
pub use period::MAX_REPORT_MONTHS;
pub use period::PeriodError;
pub use period::ReportPeriod;
pub use period::YearMonth;
pub use report::AggregateSource;
pub use report::PublicationYearBuckets;
pub use report::ReportBucketing;
pub use report::ReportKind;
pub use report::ReportLayout;
pub use title::Domain;
pub use title::ROLLUP_PUBLISHER_NAME;
pub use title::TitlePayload;
pub use title::TitleRecord;
pub use title::format_isbn;
pub use title::format_issn;
pub use usage::CountKey;
pub use usage::ItemCounts;
pub use usage::PublicationYearCounts;
pub use usage::RawRequest;
pub use usage::RequestClass;

// crates/counter-reports-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Usage Store
// Description: Durable usage store backend using SQLite WAL.
// Purpose: Provide production-grade persistence for titles and usage counters.
// Dependencies: counter-reports-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of the
//! [`counter_reports_core::UsageStore`] and
//! [`counter_reports_core::ReportSource`] interfaces. Every batch the
//! aggregation pipeline runs maps onto one `SQLite` transaction, so a crash
//! mid-batch leaves no partial aggregate behind.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod reports;
pub mod store;
mod transaction;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteUsageStore;

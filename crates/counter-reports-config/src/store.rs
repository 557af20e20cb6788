// crates/counter-reports-config/src/store.rs
// ============================================================================
// Module: Configured Usage Store
// Description: Usage store selected by the `[store]` config section.
// Purpose: Give hosts one store type regardless of the configured backend.
// Dependencies: counter-reports-core, counter-reports-store-sqlite
// ============================================================================

//! ## Overview
//! [`ConfiguredStore`] wraps either backend and forwards the storage traits,
//! so the pipeline and report engines are built once against a single type.

// ============================================================================
// SECTION: Imports
// ============================================================================

use counter_reports_core::InMemoryUsageStore;
use counter_reports_core::RawRequest;
use counter_reports_core::ReportQuery;
use counter_reports_core::ReportSnapshot;
use counter_reports_core::ReportSource;
use counter_reports_core::StoreError;
use counter_reports_core::UsageStore;
use counter_reports_core::UsageTransaction;
use counter_reports_store_sqlite::SqliteUsageStore;

use crate::config::StoreConfig;
use crate::config::StoreType;

// ============================================================================
// SECTION: Configured Store
// ============================================================================

/// Usage store built from configuration.
#[derive(Clone)]
pub enum ConfiguredStore {
    /// In-memory store (tests and local runs).
    Memory(InMemoryUsageStore),
    /// Durable `SQLite` store.
    Sqlite(SqliteUsageStore),
}

impl ConfiguredStore {
    /// Opens the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the sqlite backend has no path or cannot be
    /// opened.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        match config.store_type {
            StoreType::Memory => Ok(Self::Memory(InMemoryUsageStore::new())),
            StoreType::Sqlite => {
                let sqlite = config.sqlite_config().ok_or_else(|| {
                    StoreError::Invalid("sqlite store requires path".to_string())
                })?;
                Ok(Self::Sqlite(SqliteUsageStore::new(&sqlite)?))
            }
        }
    }

    /// Records one raw request in the underlying backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the request is rejected or the write fails.
    pub fn record_request(&self, request: &RawRequest) -> Result<(), StoreError> {
        match self {
            Self::Memory(store) => store.record_request(request),
            Self::Sqlite(store) => Ok(store.record_request(request)?),
        }
    }

    /// Returns the number of raw requests still stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the count cannot be read.
    pub fn raw_request_count(&self) -> Result<u64, StoreError> {
        match self {
            Self::Memory(store) => store.raw_request_count(),
            Self::Sqlite(store) => Ok(store.raw_request_count()?),
        }
    }
}

impl UsageStore for ConfiguredStore {
    fn transaction<T, E, F>(&self, operation: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn UsageTransaction) -> Result<T, E>,
    {
        match self {
            Self::Memory(store) => store.transaction(operation),
            Self::Sqlite(store) => store.transaction(operation),
        }
    }
}

impl ReportSource for ConfiguredStore {
    fn report_snapshot(&self, query: &ReportQuery) -> Result<ReportSnapshot, StoreError> {
        match self {
            Self::Memory(store) => store.report_snapshot(query),
            Self::Sqlite(store) => store.report_snapshot(query),
        }
    }
}

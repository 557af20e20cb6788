// crates/counter-reports-config/src/lib.rs
// ============================================================================
// Module: COUNTER Reports Config Library
// Description: Canonical config model, validation, and store wiring.
// Purpose: Single source of truth for counter-reports.toml semantics.
// Dependencies: counter-reports-core, counter-reports-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! This crate owns the `counter-reports.toml` model: loading with hard size and
//! path limits, fail-closed validation, and builders that turn the validated
//! settings into stores, pipeline configuration, and report requests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::AggregationSettings;
pub use config::ConfigError;
pub use config::CounterReportsConfig;
pub use config::IdentitySettings;
pub use config::ReportSettings;
pub use config::StoreConfig;
pub use config::StoreType;
pub use store::ConfiguredStore;

// crates/counter-reports-core/src/core/identifiers.rs
// ============================================================================
// Module: COUNTER Reports Identifiers
// Description: Numeric title identity and the reserved rollup identities.
// Purpose: Provide a strongly typed, hash-derived title identifier.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Titles are identified by a 64-bit value derived from their descriptive
//! payload. Two values at the top of the range are reserved for the
//! per-domain rollup ("all titles") records and are never handed out to real
//! titles.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::title::Domain;

// ============================================================================
// SECTION: Title Identifier
// ============================================================================

/// Stable numeric identity of a title.
///
/// # Invariants
/// - Real titles never carry [`TitleId::ALL_BOOKS`] or [`TitleId::ALL_JOURNALS`].
/// - Persisted stores keep the two's-complement bit pattern, so every `u64`
///   round-trips through a signed 64-bit column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TitleId(u64);

impl TitleId {
    /// Reserved identity of the "all books" rollup title.
    pub const ALL_BOOKS: Self = Self(u64::MAX);
    /// Reserved identity of the "all journals" rollup title.
    pub const ALL_JOURNALS: Self = Self(u64::MAX - 1);

    /// Creates a new title identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns the rollup identity for a domain.
    #[must_use]
    pub const fn rollup_for(domain: Domain) -> Self {
        match domain {
            Domain::Book => Self::ALL_BOOKS,
            Domain::Journal => Self::ALL_JOURNALS,
        }
    }

    /// Returns true when this is one of the reserved rollup identities.
    #[must_use]
    pub const fn is_rollup(self) -> bool {
        self.0 == Self::ALL_BOOKS.0 || self.0 == Self::ALL_JOURNALS.0
    }

    /// Returns the next probing candidate, wrapping at the top of the range.
    #[must_use]
    pub const fn wrapping_next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns the signed storage representation (same bit pattern).
    #[must_use]
    pub const fn to_storage(self) -> i64 {
        i64::from_be_bytes(self.0.to_be_bytes())
    }

    /// Rebuilds an identifier from its signed storage representation.
    #[must_use]
    pub const fn from_storage(value: i64) -> Self {
        Self(u64::from_be_bytes(value.to_be_bytes()))
    }
}

impl fmt::Display for TitleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TitleId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

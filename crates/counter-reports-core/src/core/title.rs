// crates/counter-reports-core/src/core/title.rs
// ============================================================================
// Module: COUNTER Reports Titles
// Description: Book and journal title descriptors and rollup placeholders.
// Purpose: Model the append-only title catalog shared by reports.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A title is either a book or a journal and is described by an immutable
//! payload. The payload's canonical JSON form is what the identity resolver
//! hashes, so field names here are part of the identity contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::TitleId;
use crate::core::usage::CountKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Publisher name carried by the rollup placeholder titles.
pub const ROLLUP_PUBLISHER_NAME: &str = "COUNTER REPORTS ALL PUBLISHERS";
/// Display name of the "all books" rollup title.
const ALL_BOOKS_NAME: &str = "COUNTER REPORTS ALL BOOKS";
/// Display name of the "all journals" rollup title.
const ALL_JOURNALS_NAME: &str = "COUNTER REPORTS ALL JOURNALS";

// ============================================================================
// SECTION: Domain
// ============================================================================

/// Title domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Books (counted by full-title and section requests).
    Book,
    /// Journals (counted by HTML and PDF requests).
    Journal,
}

impl Domain {
    /// Every domain, in aggregation order.
    pub const ALL: [Self; 2] = [Self::Book, Self::Journal];

    /// Returns the stable storage label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Journal => "journal",
        }
    }

    /// Parses a storage label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "book" => Some(Self::Book),
            "journal" => Some(Self::Journal),
            _ => None,
        }
    }

    /// Returns the counter keys held by this domain's monthly aggregates.
    #[must_use]
    pub const fn aggregate_keys(self) -> &'static [CountKey] {
        match self {
            Self::Book => &[CountKey::Full, CountKey::Section],
            Self::Journal => &[CountKey::Total, CountKey::Html, CountKey::Pdf],
        }
    }
}

// ============================================================================
// SECTION: Title Payload
// ============================================================================

/// Descriptive payload of a title.
///
/// # Invariants
/// - Identical payloads hash to the same identity candidate.
/// - `print_identifier` and `online_identifier` hold ISBNs for books and
///   ISSNs for journals, stored without hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitlePayload {
    /// Title domain.
    pub domain: Domain,
    /// Display name.
    pub name: String,
    /// Publisher name.
    #[serde(default)]
    pub publisher: Option<String>,
    /// Hosting platform name.
    #[serde(default)]
    pub platform: Option<String>,
    /// Digital object identifier.
    #[serde(default)]
    pub doi: Option<String>,
    /// Publisher-proprietary identifiers.
    #[serde(default)]
    pub proprietary_ids: Vec<String>,
    /// Print ISBN or ISSN.
    #[serde(default)]
    pub print_identifier: Option<String>,
    /// Online ISBN or ISSN.
    #[serde(default)]
    pub online_identifier: Option<String>,
}

impl TitlePayload {
    /// Creates a payload with only a domain and name set.
    #[must_use]
    pub fn new(domain: Domain, name: impl Into<String>) -> Self {
        Self {
            domain,
            name: name.into(),
            publisher: None,
            platform: None,
            doi: None,
            proprietary_ids: Vec::new(),
            print_identifier: None,
            online_identifier: None,
        }
    }

    /// Returns the print identifier formatted for display.
    #[must_use]
    pub fn display_print_identifier(&self) -> Option<String> {
        self.print_identifier.as_deref().map(|value| self.format_identifier(value))
    }

    /// Returns the online identifier formatted for display.
    #[must_use]
    pub fn display_online_identifier(&self) -> Option<String> {
        self.online_identifier.as_deref().map(|value| self.format_identifier(value))
    }

    /// Formats an identifier according to the domain.
    fn format_identifier(&self, value: &str) -> String {
        match self.domain {
            Domain::Book => format_isbn(value),
            Domain::Journal => format_issn(value),
        }
    }
}

// ============================================================================
// SECTION: Title Record
// ============================================================================

/// A persisted title: identity plus payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleRecord {
    /// Resolved title identity.
    pub id: TitleId,
    /// Descriptive payload.
    pub payload: TitlePayload,
}

impl TitleRecord {
    /// Returns the rollup placeholder record for a domain.
    #[must_use]
    pub fn rollup(domain: Domain) -> Self {
        let name = match domain {
            Domain::Book => ALL_BOOKS_NAME,
            Domain::Journal => ALL_JOURNALS_NAME,
        };
        let mut payload = TitlePayload::new(domain, name);
        payload.publisher = Some(ROLLUP_PUBLISHER_NAME.to_string());
        Self {
            id: TitleId::rollup_for(domain),
            payload,
        }
    }

    /// Returns true when this record is a rollup placeholder.
    #[must_use]
    pub const fn is_rollup(&self) -> bool {
        self.id.is_rollup()
    }
}

// ============================================================================
// SECTION: Identifier Formatting
// ============================================================================

/// Formats an ISBN with hyphens after the third and ninth characters.
///
/// Values of nine characters or fewer are returned unchanged.
#[must_use]
pub fn format_isbn(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 9 {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.extend(&chars[.. 3]);
    out.push('-');
    out.extend(&chars[3 .. 9]);
    out.push('-');
    out.extend(&chars[9 ..]);
    out
}

/// Formats an ISSN with a hyphen after the fourth character.
///
/// Values of four characters or fewer are returned unchanged.
#[must_use]
pub fn format_issn(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 1);
    out.extend(&chars[.. 4]);
    out.push('-');
    out.extend(&chars[4 ..]);
    out
}

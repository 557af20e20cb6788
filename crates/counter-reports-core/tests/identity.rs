// crates/counter-reports-core/tests/identity.rs
// ============================================================================
// Module: Title Identity Resolver Tests
// Description: Stability, uniqueness, and collision probing of identities.
// Purpose: Ensure every distinct payload is persisted exactly once.
// Dependencies: counter-reports-core
// ============================================================================

//! ## Overview
//! Exercises the identity resolver against the in-memory store, including
//! forced hash collisions, reserved rollup identities, and probe exhaustion.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use counter_reports_core::Domain;
use counter_reports_core::HashError;
use counter_reports_core::IdentityError;
use counter_reports_core::IdentityResolver;
use counter_reports_core::InMemoryUsageStore;
use counter_reports_core::StoreError;
use counter_reports_core::TitleHasher;
use counter_reports_core::TitleId;
use counter_reports_core::TitlePayload;
use counter_reports_core::UsageStore;
use counter_reports_core::hashing::hash_canonical_u64;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Hasher that maps every payload to the same candidate.
struct FixedHasher(u64);

impl TitleHasher for FixedHasher {
    fn hash_title(&self, _payload: &TitlePayload) -> Result<u64, HashError> {
        Ok(self.0)
    }
}

fn journal(name: &str) -> TitlePayload {
    let mut payload = TitlePayload::new(Domain::Journal, name);
    payload.publisher = Some("Example Press".to_string());
    payload.print_identifier = Some("12345678".to_string());
    payload
}

fn stored_payload(store: &InMemoryUsageStore, id: TitleId) -> Option<TitlePayload> {
    store
        .transaction(|tx| -> Result<_, StoreError> { tx.find_title(id) })
        .expect("title lookup")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn identical_payloads_resolve_to_the_same_identity() {
    let store = InMemoryUsageStore::new();
    let resolver = IdentityResolver::new(store.clone());
    let first = resolver.resolve(&journal("Journal of Things")).expect("first resolve");
    let second = resolver.resolve(&journal("Journal of Things")).expect("second resolve");
    assert_eq!(first, second);
    assert_eq!(stored_payload(&store, first), Some(journal("Journal of Things")));
}

#[test]
fn distinct_payloads_resolve_to_distinct_identities() {
    let resolver = IdentityResolver::new(InMemoryUsageStore::new());
    let first = resolver.resolve(&journal("Journal A")).expect("resolve a");
    let second = resolver.resolve(&journal("Journal B")).expect("resolve b");
    assert_ne!(first, second);
    assert!(!first.is_rollup());
    assert!(!second.is_rollup());
}

#[test]
fn identity_is_stable_across_resolver_instances() {
    let store = InMemoryUsageStore::new();
    let first = IdentityResolver::new(store.clone()).resolve(&journal("Stable")).expect("resolve");
    let second = IdentityResolver::new(store).resolve(&journal("Stable")).expect("resolve again");
    assert_eq!(first, second);
}

#[test]
fn forced_collision_probes_to_the_next_identity() {
    let store = InMemoryUsageStore::new();
    let resolver = IdentityResolver::with_hasher(store.clone(), FixedHasher(42), 8);
    let first = resolver.resolve(&journal("Collides A")).expect("resolve a");
    let second = resolver.resolve(&journal("Collides B")).expect("resolve b");
    assert_eq!(first, TitleId::new(42));
    assert_eq!(second, TitleId::new(43));
    assert_eq!(resolver.resolve(&journal("Collides B")).expect("resolve b again"), second);
    assert_eq!(stored_payload(&store, second), Some(journal("Collides B")));
}

#[test]
fn probing_skips_reserved_rollup_identities_and_wraps() {
    let store = InMemoryUsageStore::new();
    let resolver = IdentityResolver::with_hasher(store, FixedHasher(TitleId::ALL_JOURNALS.get()), 8);
    let id = resolver.resolve(&journal("Near the top")).expect("resolve");
    assert_eq!(id, TitleId::new(0));
}

#[test]
fn probe_exhaustion_is_a_distinct_error_and_persists_nothing() {
    let store = InMemoryUsageStore::new();
    let resolver = IdentityResolver::with_hasher(store.clone(), FixedHasher(7), 2);
    resolver.resolve(&journal("One")).expect("resolve one");
    resolver.resolve(&journal("Two")).expect("resolve two");
    let err = resolver.resolve(&journal("Three")).expect_err("probe limit reached");
    assert!(matches!(err, IdentityError::ProbeExhausted { attempts: 2 }));
    assert_eq!(stored_payload(&store, TitleId::new(9)), None);
}

#[test]
fn sha256_identity_is_deterministic_per_payload() {
    let a = hash_canonical_u64(&journal("Canonical")).expect("hash a");
    let b = hash_canonical_u64(&journal("Canonical")).expect("hash b");
    let c = hash_canonical_u64(&journal("Other")).expect("hash c");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

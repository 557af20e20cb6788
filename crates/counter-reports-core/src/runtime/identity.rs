// crates/counter-reports-core/src/runtime/identity.rs
// ============================================================================
// Module: COUNTER Reports Title Identity Resolver
// Description: Hash-derived title identities with bounded linear probing.
// Purpose: Give every distinct title payload exactly one persisted identity.
// Dependencies: crate::{core, interfaces}, thiserror, tracing
// ============================================================================

//! ## Overview
//! The resolver hashes a title payload into a candidate identity and probes
//! upward until it finds either the same payload (reuse) or a free identity
//! (persist). Reserved rollup identities are always skipped. Lookup and
//! insert share one store transaction so a payload is persisted once.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use tracing::debug;

use crate::core::HashError;
use crate::core::TitleId;
use crate::core::TitlePayload;
use crate::core::TitleRecord;
use crate::core::hashing::hash_canonical_u64;
use crate::interfaces::StoreError;
use crate::interfaces::UsageStore;
use crate::interfaces::UsageTransaction;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum number of identities probed per resolution.
pub const DEFAULT_MAX_PROBE_ATTEMPTS: u32 = 64;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while resolving a title identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Storage failed; the transaction was rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Payload could not be hashed.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// Every probed identity belonged to another payload.
    #[error("title identity probing exhausted after {attempts} attempts")]
    ProbeExhausted {
        /// Number of identities probed.
        attempts: u32,
    },
}

// ============================================================================
// SECTION: Hashers
// ============================================================================

/// Computes the identity candidate for a title payload.
pub trait TitleHasher {
    /// Returns the 64-bit identity candidate for `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the payload cannot be hashed.
    fn hash_title(&self, payload: &TitlePayload) -> Result<u64, HashError>;
}

/// Default hasher: SHA-256 over the payload's canonical JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256TitleHasher;

impl TitleHasher for Sha256TitleHasher {
    fn hash_title(&self, payload: &TitlePayload) -> Result<u64, HashError> {
        hash_canonical_u64(payload)
    }
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Resolves title payloads to persisted identities.
#[derive(Debug, Clone)]
pub struct IdentityResolver<S, H = Sha256TitleHasher> {
    /// Backing usage store.
    store: S,
    /// Identity candidate hasher.
    hasher: H,
    /// Maximum identities probed per resolution.
    max_probe_attempts: u32,
}

impl<S: UsageStore> IdentityResolver<S> {
    /// Creates a resolver with the default hasher and probe limit.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self {
            store,
            hasher: Sha256TitleHasher,
            max_probe_attempts: DEFAULT_MAX_PROBE_ATTEMPTS,
        }
    }
}

impl<S: UsageStore, H: TitleHasher> IdentityResolver<S, H> {
    /// Creates a resolver with a custom hasher and probe limit.
    #[must_use]
    pub const fn with_hasher(store: S, hasher: H, max_probe_attempts: u32) -> Self {
        Self {
            store,
            hasher,
            max_probe_attempts,
        }
    }

    /// Returns the identity of `payload`, persisting the title when new.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ProbeExhausted`] when no identity is free
    /// within the probe limit, or a store/hash error otherwise.
    pub fn resolve(&self, payload: &TitlePayload) -> Result<TitleId, IdentityError> {
        let candidate = TitleId::new(self.hasher.hash_title(payload)?);
        let max_attempts = self.max_probe_attempts;
        self.store.transaction(|tx| probe_and_persist(tx, payload, candidate, max_attempts))
    }
}

/// Probes identities starting at `candidate` and persists the payload.
fn probe_and_persist(
    tx: &mut dyn UsageTransaction,
    payload: &TitlePayload,
    candidate: TitleId,
    max_attempts: u32,
) -> Result<TitleId, IdentityError> {
    let mut id = candidate;
    for attempt in 0 .. max_attempts {
        if id.is_rollup() {
            id = id.wrapping_next();
            continue;
        }
        match tx.find_title(id)? {
            None => {
                tx.insert_title(&TitleRecord {
                    id,
                    payload: payload.clone(),
                })?;
                debug!(title_id = %id, attempt, "title identity persisted");
                return Ok(id);
            }
            Some(existing) if existing == *payload => return Ok(id),
            Some(_) => {
                debug!(title_id = %id, attempt, "title identity collision; probing next");
                id = id.wrapping_next();
            }
        }
    }
    Err(IdentityError::ProbeExhausted {
        attempts: max_attempts,
    })
}

//! Best-guess entity resolution
//!
//! Raw tokens from input files (gene symbols, Entrez ids, sample barcodes) are
//! resolved against reference entities the repository already holds. Lookup
//! order is fixed and short-circuits on the first tier with any match:
//!
//! 1. exact primary identifier
//! 2. exact primary display symbol
//! 3. alias / cross-reference membership
//!
//! Several matches within one tier resolve to the lowest id.

use std::collections::HashMap;

use strata_common::{EntityId, EntityKind};
use tracing::trace;

use crate::error::{IngestError, Result};

/// Lookup tier, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchTier {
    PrimaryId,
    Symbol,
    Alias,
}

impl MatchTier {
    pub const ORDER: [MatchTier; 3] = [MatchTier::PrimaryId, MatchTier::Symbol, MatchTier::Alias];
}

/// Reference-entity lookups the repository must provide
pub trait EntityLookup: Send + Sync {
    /// All entities of `kind` matching `token` exactly within one tier
    fn lookup(&self, kind: EntityKind, tier: MatchTier, token: &str)
        -> anyhow::Result<Vec<EntityId>>;

    /// Tiered best guess: the lowest id of the first tier with a match
    fn find_best_guess(&self, kind: EntityKind, token: &str) -> anyhow::Result<Option<EntityId>> {
        for tier in MatchTier::ORDER {
            let candidates = self.lookup(kind, tier, token)?;
            if let Some(id) = candidates.into_iter().min() {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }
}

/// Job-scoped resolver with a private token cache.
///
/// A token resolves to the same answer (hit or miss) for the life of the
/// resolver, whatever happens in the store meanwhile. Not shared between jobs.
pub struct EntityResolver<'a> {
    lookup: &'a dyn EntityLookup,
    kind: EntityKind,
    cache: HashMap<String, Option<EntityId>>,
    lookups: usize,
    cache_hits: usize,
}

impl<'a> EntityResolver<'a> {
    pub fn new(lookup: &'a dyn EntityLookup, kind: EntityKind) -> Self {
        Self {
            lookup,
            kind,
            cache: HashMap::new(),
            lookups: 0,
            cache_hits: 0,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Resolve a raw token; blank tokens never resolve
    pub fn resolve(&mut self, token: &str) -> Result<Option<EntityId>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        self.lookups += 1;
        if let Some(cached) = self.cache.get(token) {
            self.cache_hits += 1;
            return Ok(*cached);
        }

        let resolved = self
            .lookup
            .find_best_guess(self.kind, token)
            .map_err(|e| IngestError::Lookup {
                kind: self.kind,
                token: token.to_string(),
                source: e.into(),
            })?;

        trace!(kind = %self.kind, token, resolved = ?resolved, "Resolved token");
        self.cache.insert(token.to_string(), resolved);
        Ok(resolved)
    }

    /// Total `resolve` calls with a non-blank token
    pub fn lookups(&self) -> usize {
        self.lookups
    }

    /// Calls answered from the cache
    pub fn cache_hits(&self) -> usize {
        self.cache_hits
    }

    pub fn cached_tokens(&self) -> usize {
        self.cache.len()
    }
}

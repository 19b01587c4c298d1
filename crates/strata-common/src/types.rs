//! Common types used across strata

use serde::{Deserialize, Serialize};

/// Identifier of a pre-existing reference entity (gene, sample, data set).
///
/// Ids are ordered so that ambiguous lookups can deterministically pick the
/// lowest one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub i64);

impl EntityId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of reference entity a raw token can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Gene,
    Sample,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Gene => "gene",
            EntityKind::Sample => "sample",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_ordering() {
        let mut ids = vec![EntityId(42), EntityId(7), EntityId(19)];
        ids.sort();
        assert_eq!(ids, vec![EntityId(7), EntityId(19), EntityId(42)]);
        assert_eq!(ids.iter().min(), Some(&EntityId(7)));
    }

    #[test]
    fn test_entity_kind_display() {
        assert_eq!(EntityKind::Gene.to_string(), "gene");
        assert_eq!(EntityKind::Sample.as_str(), "sample");
    }
}

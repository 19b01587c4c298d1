//! In-memory repository
//!
//! Holds reference entities, persisted records and the job ledger behind
//! `RwLock`s. Used by tests and by embedders that want to run the pipeline
//! without a database.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use strata_common::{EntityId, EntityKind};
use tracing::debug;
use uuid::Uuid;

use crate::model::{JobOutcome, Record, SourceDescriptor};
use crate::repository::Repository;
use crate::resolver::{EntityLookup, MatchTier};

/// A reference entity as the repository knows it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    /// Primary identifier, e.g. an Entrez id or a sample barcode
    pub primary_id: String,
    /// Primary display symbol, e.g. an HGNC symbol
    pub symbol: Option<String>,
    pub aliases: Vec<String>,
}

/// A finished job as recorded in the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct JobEntry {
    pub descriptor: SourceDescriptor,
    pub outcome: JobOutcome,
}

#[derive(Default)]
pub struct InMemoryRepository {
    entities: RwLock<Vec<ReferenceEntity>>,
    records: RwLock<Vec<Record>>,
    jobs: RwLock<BTreeMap<Uuid, JobEntry>>,
    write_calls: RwLock<Vec<usize>>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a gene
    pub fn add_gene(&self, id: i64, entrez_id: &str, symbol: &str, aliases: &[&str]) -> EntityId {
        self.add_entity(ReferenceEntity {
            id: EntityId(id),
            kind: EntityKind::Gene,
            primary_id: entrez_id.to_string(),
            symbol: Some(symbol.to_string()),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        })
    }

    /// Register a sample by its barcode
    pub fn add_sample(&self, id: i64, barcode: &str) -> EntityId {
        self.add_entity(ReferenceEntity {
            id: EntityId(id),
            kind: EntityKind::Sample,
            primary_id: barcode.to_string(),
            symbol: None,
            aliases: Vec::new(),
        })
    }

    pub fn add_entity(&self, entity: ReferenceEntity) -> EntityId {
        let id = entity.id;
        write(&self.entities).push(entity);
        id
    }

    /// Make every subsequent insert, update and bulk load fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of everything persisted so far
    pub fn records(&self) -> Vec<Record> {
        read(&self.records).clone()
    }

    /// Sizes of the batches passed to `insert`/`update`, in call order
    pub fn write_calls(&self) -> Vec<usize> {
        read(&self.write_calls).clone()
    }

    pub fn job(&self, id: Uuid) -> Option<JobEntry> {
        read(&self.jobs).get(&id).cloned()
    }

    pub fn jobs(&self) -> Vec<JobEntry> {
        read(&self.jobs).values().cloned().collect()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("repository is not accepting writes");
        }
        Ok(())
    }
}

impl EntityLookup for InMemoryRepository {
    fn lookup(&self, kind: EntityKind, tier: MatchTier, token: &str) -> Result<Vec<EntityId>> {
        let entities = read(&self.entities);
        Ok(entities
            .iter()
            .filter(|e| e.kind == kind)
            .filter(|e| match tier {
                MatchTier::PrimaryId => e.primary_id == token,
                MatchTier::Symbol => e.symbol.as_deref() == Some(token),
                MatchTier::Alias => e.aliases.iter().any(|a| a == token),
            })
            .map(|e| e.id)
            .collect())
    }
}

impl Repository for InMemoryRepository {
    fn insert(&self, records: &[Record]) -> Result<usize> {
        self.check_writable()?;
        write(&self.write_calls).push(records.len());
        write(&self.records).extend_from_slice(records);
        Ok(records.len())
    }

    fn update(&self, records: &[Record]) -> Result<usize> {
        self.check_writable()?;
        write(&self.write_calls).push(records.len());

        let mut stored = write(&self.records);
        let mut updated = 0;
        for record in records {
            let existing = stored.iter_mut().find(|r| {
                r.kind == record.kind
                    && r.gene_id == record.gene_id
                    && r.sample_id == record.sample_id
                    && r.data_set_id == record.data_set_id
            });
            match existing {
                Some(slot) => {
                    *slot = record.clone();
                    updated += 1;
                },
                None => debug!(line = record.line, "No existing record to update"),
            }
        }
        Ok(updated)
    }

    fn bulk_load(&self, staged_file: &Path) -> Result<usize> {
        self.check_writable()?;

        let file = File::open(staged_file)
            .with_context(|| format!("Failed to open staging file {}", staged_file.display()))?;

        let mut loaded = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.context("Failed to read staging file")?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)
                .with_context(|| format!("Invalid staged record on line {}", index + 1))?;
            loaded.push(record);
        }

        let count = loaded.len();
        write(&self.records).extend(loaded);
        Ok(count)
    }

    fn record_job(&self, descriptor: &SourceDescriptor, outcome: &JobOutcome) -> Result<()> {
        write(&self.jobs).insert(
            descriptor.id,
            JobEntry {
                descriptor: descriptor.clone(),
                outcome: outcome.clone(),
            },
        );
        Ok(())
    }
}

// A panic while holding a lock leaves the data intact for these append-only
// collections, so poisoning is ignored.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, RecordKind};
    use std::io::Write;

    #[test]
    fn test_tiered_lookup() {
        let repo = InMemoryRepository::new();
        repo.add_gene(672, "672", "BRCA1", &["RNF53", "BRCC1"]);
        repo.add_gene(7157, "7157", "TP53", &["P53"]);
        repo.add_gene(9999, "9999", "BRCC1", &[]);

        assert_eq!(
            repo.find_best_guess(EntityKind::Gene, "7157").unwrap(),
            Some(EntityId(7157))
        );
        assert_eq!(repo.find_best_guess(EntityKind::Gene, "RNF53").unwrap(), Some(EntityId(672)));
        // symbol tier wins over the alias tier
        assert_eq!(repo.find_best_guess(EntityKind::Gene, "BRCC1").unwrap(), Some(EntityId(9999)));
        assert_eq!(repo.find_best_guess(EntityKind::Sample, "TP53").unwrap(), None);
    }

    #[test]
    fn test_insert_and_fail_writes() {
        let repo = InMemoryRepository::new();
        let records = vec![Record::new(RecordKind::Expression, 2)];
        assert_eq!(repo.insert(&records).unwrap(), 1);

        repo.fail_writes(true);
        assert!(repo.insert(&records).is_err());
        assert_eq!(repo.records().len(), 1);
        assert_eq!(repo.write_calls(), vec![1]);
    }

    #[test]
    fn test_update_replaces_matching_record() {
        let repo = InMemoryRepository::new();
        let mut record = Record::new(RecordKind::Expression, 2);
        record.gene_id = Some(EntityId(1));
        record.sample_id = Some(EntityId(2));
        record.set("value", FieldValue::Float(1.0));
        repo.insert(&[record.clone()]).unwrap();

        record.set("value", FieldValue::Float(5.0));
        assert_eq!(repo.update(&[record]).unwrap(), 1);
        assert_eq!(repo.records()[0].get("value"), Some(&FieldValue::Float(5.0)));
    }

    #[test]
    fn test_bulk_load_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged.jsonl");
        let mut file = File::create(&path).unwrap();
        for line in [2, 3] {
            let record = Record::new(RecordKind::Mutation, line);
            writeln!(file, "{}", serde_json::to_string(&record).unwrap()).unwrap();
        }
        writeln!(file).unwrap();
        drop(file);

        let repo = InMemoryRepository::new();
        assert_eq!(repo.bulk_load(&path).unwrap(), 2);
        assert_eq!(repo.records().len(), 2);
    }

    #[test]
    fn test_bulk_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("staged.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let repo = InMemoryRepository::new();
        let err = repo.bulk_load(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"));
        assert!(repo.records().is_empty());
    }
}

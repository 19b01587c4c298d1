//! Bulk import of staging files

use std::path::Path;
use tracing::{info, warn};

use crate::error::{IngestError, Result};
use crate::repository::Repository;

/// Loads a staging file into the store in one pass
pub trait Importer {
    /// Returns the number of records loaded
    fn import(&self, staged_file: &Path) -> Result<usize>;
}

/// Hands staging files to the repository's native bulk-load path
pub struct BulkImporter<'r> {
    repository: &'r dyn Repository,
    keep_staging_files: bool,
}

impl<'r> BulkImporter<'r> {
    pub fn new(repository: &'r dyn Repository, keep_staging_files: bool) -> Self {
        Self {
            repository,
            keep_staging_files,
        }
    }
}

impl Importer for BulkImporter<'_> {
    fn import(&self, staged_file: &Path) -> Result<usize> {
        let loaded = self
            .repository
            .bulk_load(staged_file)
            .map_err(|e| IngestError::Import {
                path: staged_file.to_path_buf(),
                source: e.into(),
            })?;

        info!(path = %staged_file.display(), loaded, "Bulk import complete");

        if !self.keep_staging_files {
            if let Err(e) = std::fs::remove_file(staged_file) {
                warn!(path = %staged_file.display(), error = %e, "Failed to remove staging file");
            }
        }

        Ok(loaded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::memory::InMemoryRepository;
    use crate::model::{Record, RecordKind};

    fn staged(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("job.jsonl");
        let line = serde_json::to_string(&Record::new(RecordKind::Expression, 3)).unwrap();
        std::fs::write(&path, format!("{}\n{}\n", line, line)).unwrap();
        path
    }

    #[test]
    fn test_import_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = staged(dir.path());
        let repo = InMemoryRepository::new();

        assert_eq!(BulkImporter::new(&repo, false).import(&path).unwrap(), 2);
        assert!(!path.exists());
        assert_eq!(repo.records().len(), 2);
    }

    #[test]
    fn test_import_keeps_staging_file_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let path = staged(dir.path());
        let repo = InMemoryRepository::new();

        BulkImporter::new(&repo, true).import(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_failed_import_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = staged(dir.path());
        let repo = InMemoryRepository::new();
        repo.fail_writes(true);

        let err = BulkImporter::new(&repo, false).import(&path).unwrap_err();
        assert!(matches!(err, IngestError::Import { .. }));
        assert!(path.exists());
    }
}

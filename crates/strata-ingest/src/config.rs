//! Import configuration
//!
//! One [`ImportOptions`] value is handed to the pipeline when a job is built.
//! Skip flags are read once per job; readers receive a [`SkipPolicy`] copy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{IngestError, Result};

/// How the direct writer persists batches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// New records are inserted
    #[default]
    Insert,
    /// Existing records are updated in place
    Update,
}

impl std::str::FromStr for WriteMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "insert" => Ok(WriteMode::Insert),
            "update" => Ok(WriteMode::Update),
            other => Err(IngestError::config(format!("Invalid write mode: {}", other))),
        }
    }
}

/// Options recognised by an import job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImportOptions {
    /// Skip records with unparseable values or validation violations
    pub skip_invalid_records: bool,
    /// Skip rows whose gene cannot be resolved
    pub skip_invalid_genes: bool,
    /// Skip columns/rows whose sample cannot be resolved
    pub skip_invalid_samples: bool,
    /// Records per repository write (1 = unbatched)
    pub batch_size: usize,
    /// Single-byte column delimiter; `\t` is accepted as an escape
    pub delimiter: String,
    /// Directory for staging files
    pub temp_directory: PathBuf,
    pub write_mode: WriteMode,
    /// Stage records to a JSON-lines file and load it with the bulk importer
    pub staged: bool,
    /// Keep staging files after a successful import
    pub keep_staging_files: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            skip_invalid_records: false,
            skip_invalid_genes: false,
            skip_invalid_samples: false,
            batch_size: 1,
            delimiter: "\t".to_string(),
            temp_directory: std::env::temp_dir(),
            write_mode: WriteMode::Insert,
            staged: false,
            keep_staging_files: false,
        }
    }
}

impl ImportOptions {
    /// Load options from `STRATA_*` environment variables, falling back to defaults
    ///
    /// - `STRATA_SKIP_INVALID_RECORDS`, `STRATA_SKIP_INVALID_GENES`,
    ///   `STRATA_SKIP_INVALID_SAMPLES`: true/false
    /// - `STRATA_BATCH_SIZE`: records per write
    /// - `STRATA_DELIMITER`: column delimiter
    /// - `STRATA_TEMP_DIR`: staging directory
    /// - `STRATA_WRITE_MODE`: insert/update
    /// - `STRATA_STAGED`, `STRATA_KEEP_STAGING`: true/false
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let options = Self {
            skip_invalid_records: env_flag("STRATA_SKIP_INVALID_RECORDS")?
                .unwrap_or(defaults.skip_invalid_records),
            skip_invalid_genes: env_flag("STRATA_SKIP_INVALID_GENES")?
                .unwrap_or(defaults.skip_invalid_genes),
            skip_invalid_samples: env_flag("STRATA_SKIP_INVALID_SAMPLES")?
                .unwrap_or(defaults.skip_invalid_samples),
            batch_size: match std::env::var("STRATA_BATCH_SIZE") {
                Ok(raw) => raw.trim().parse().map_err(|_| {
                    IngestError::config(format!("STRATA_BATCH_SIZE must be an integer: {}", raw))
                })?,
                Err(_) => defaults.batch_size,
            },
            delimiter: std::env::var("STRATA_DELIMITER").unwrap_or(defaults.delimiter),
            temp_directory: std::env::var("STRATA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_directory),
            write_mode: match std::env::var("STRATA_WRITE_MODE") {
                Ok(raw) => raw.parse()?,
                Err(_) => defaults.write_mode,
            },
            staged: env_flag("STRATA_STAGED")?.unwrap_or(defaults.staged),
            keep_staging_files: env_flag("STRATA_KEEP_STAGING")?
                .unwrap_or(defaults.keep_staging_files),
        };

        options.validate()?;
        Ok(options)
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::config("batch_size must be greater than 0"));
        }
        self.delimiter_byte()?;
        Ok(())
    }

    /// The delimiter as the single byte the line splitter expects
    pub fn delimiter_byte(&self) -> Result<u8> {
        match self.delimiter.as_str() {
            "\\t" | "\t" => Ok(b'\t'),
            d if d.len() == 1 && d.is_ascii() => Ok(d.as_bytes()[0]),
            d => Err(IngestError::config(format!(
                "delimiter must be a single ASCII character, got {:?}",
                d
            ))),
        }
    }

    pub fn skip_policy(&self) -> SkipPolicy {
        SkipPolicy {
            records: self.skip_invalid_records,
            genes: self.skip_invalid_genes,
            samples: self.skip_invalid_samples,
        }
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(IngestError::config(format!("{} must be true or false: {}", name, raw))),
        },
        Err(_) => Ok(None),
    }
}

/// Skip-or-fail decisions for per-record conditions, fixed for the whole job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkipPolicy {
    pub records: bool,
    pub genes: bool,
    pub samples: bool,
}

impl SkipPolicy {
    /// Whether `error` may be skipped under this policy
    pub fn allows(&self, error: &IngestError) -> bool {
        use strata_common::EntityKind;

        match error {
            IngestError::FieldConversion { .. } | IngestError::Validation { .. } => self.records,
            IngestError::UnresolvedEntity {
                kind: EntityKind::Gene,
                ..
            } => self.genes,
            IngestError::UnresolvedEntity {
                kind: EntityKind::Sample,
                ..
            } => self.samples,
            _ => false,
        }
    }
}

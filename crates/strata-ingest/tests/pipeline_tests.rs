//! End-to-end ingestion tests against the in-memory repository

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use strata_common::EntityId;
use strata_ingest::{
    fields::{EXPRESSION, SAMPLE_ATTRIBUTES},
    reader::{ColumnMappedReader, MatrixReader},
    EntityResolver, FieldValue, ImportOptions, InMemoryRepository, IngestError, JobStatus,
    Pipeline, PipelineState, ProcessorRegistry, ReaderOptions, Record, RecordSource,
    SkipPolicy, SourceDescriptor,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("strata_ingest=debug")
        .with_test_writer()
        .try_init();
}

fn fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn descriptor(data_type: &str, path: &Path) -> SourceDescriptor {
    SourceDescriptor::new(data_type, path.to_str().unwrap())
}

fn reference_repository() -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    repo.add_gene(672, "672", "BRCA1", &["RNF53", "BRCC1"]);
    repo.add_gene(7157, "7157", "TP53", &["P53", "LFS1"]);
    repo.add_gene(5728, "5728", "PTEN", &["MMAC1"]);
    repo.add_sample(1, "SampleA");
    repo.add_sample(2, "SampleB");
    repo.add_sample(3, "SampleC");
    repo.add_sample(10, "TCGA-A1-0001-01");
    repo.add_sample(11, "TCGA-A1-0002-01");
    repo
}

fn drain(reader: &mut dyn RecordSource) -> Vec<Record> {
    let mut records = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        records.push(record);
    }
    records
}

// ============================================================================
// Reader properties
// ============================================================================

#[test]
fn test_column_mapped_read_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "samples.tsv",
        "sample\tpatient\tage\tpurity\nSampleA\tP1\t51\t0.7\nSampleB\tP2\t64\t0.4\nSampleC\tP3\t\t\n",
    );
    let repo = reference_repository();
    let descriptor = descriptor("sample_attributes", &path);

    let mut reader = ColumnMappedReader::new(&SAMPLE_ATTRIBUTES, &repo, ReaderOptions::default());

    reader.open(&descriptor).unwrap();
    let first = drain(&mut reader);
    reader.close();

    reader.open(&descriptor).unwrap();
    let second = drain(&mut reader);
    reader.close();

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[test]
fn test_matrix_emits_rows_times_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "expression.gct",
        "#1.2\n3\t3\nName\tDescription\tSampleA\tSampleB\tSampleC\n\
         BRCA1\tbreast cancer 1\t1.5\t2.5\t3.5\n\
         TP53\ttumor protein p53\t-0.2\t0\t12\n\
         PTEN\tphosphatase\t7\t8\t9\n",
    );
    let repo = reference_repository();

    let mut reader = MatrixReader::new(&EXPRESSION, &repo, ReaderOptions::default());
    reader.open(&descriptor("gene_expression", &path)).unwrap();
    let records = drain(&mut reader);

    assert_eq!(records.len(), 3 * 3);
    assert!(records.iter().all(|r| r.gene_id.is_some() && r.sample_id.is_some()));
    assert!(reader.drain_warnings().is_empty());
}

#[test]
fn test_matrix_skips_unresolved_sample_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "expression.tsv",
        "Gene\tSampleA\tSampleUnknown\nBRCA1\t1.0\t2.0\n",
    );
    let repo = reference_repository();
    let options = ReaderOptions {
        skip: SkipPolicy {
            samples: true,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut reader = MatrixReader::new(&EXPRESSION, &repo, options);
    reader.open(&descriptor("gene_expression", &path)).unwrap();
    let records = drain(&mut reader);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sample_id, Some(EntityId(1)));
    assert_eq!(records[0].gene_id, Some(EntityId(672)));
    assert_eq!(records[0].get("value"), Some(&FieldValue::Float(1.0)));
}

#[test]
fn test_short_line_leaves_trailing_fields_unset() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "samples.tsv",
        "sample\tpatient\tsample_type\tage\nSampleA\tP1\n",
    );
    let repo = reference_repository();

    let mut reader = ColumnMappedReader::new(&SAMPLE_ATTRIBUTES, &repo, ReaderOptions::default());
    reader.open(&descriptor("sample_attributes", &path)).unwrap();
    let records = drain(&mut reader);

    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.sample_id, Some(EntityId(1)));
    assert_eq!(record.get("patient_id"), Some(&FieldValue::Text("P1".to_string())));
    assert_eq!(record.get("sample_type"), None);
    assert_eq!(record.get("age_at_diagnosis"), None);
}

#[test]
fn test_resolver_second_call_served_from_cache() {
    let repo = reference_repository();
    let mut resolver = EntityResolver::new(&repo, strata_common::EntityKind::Gene);

    let first = resolver.resolve("LFS1").unwrap();
    let second = resolver.resolve("LFS1").unwrap();

    assert_eq!(first, Some(EntityId(7157)));
    assert_eq!(first, second);
    assert_eq!(resolver.cache_hits(), 1);
}

// ============================================================================
// Pipeline runs
// ============================================================================

#[test]
fn test_expression_job_end_to_end() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "expression.gct",
        "#1.2\n2\t2\nName\tDescription\tSampleA\tSampleB\nBRCA1\tna\t1\t2\nTP53\tna\t3\tNA\n",
    );
    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();
    let options = ImportOptions {
        batch_size: 3,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(&repo, &registry, options).unwrap();
    let descriptor = descriptor("gene_expression", &path).with_data_set(EntityId(99));
    let result = pipeline.run_job(&descriptor).unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.records_read, 4);
    assert_eq!(result.records_written, 4);
    // three per batch, then the partial tail
    assert_eq!(repo.write_calls(), vec![3, 1]);

    let stored = repo.records();
    assert!(stored.iter().all(|r| r.data_set_id == Some(EntityId(99))));
    assert_eq!(stored[3].get("value"), None);

    let job = repo.job(descriptor.id).unwrap();
    assert_eq!(job.outcome.status, JobStatus::Completed);
    assert_eq!(job.outcome.records_written, 4);
    assert_eq!(pipeline.state(), PipelineState::Completed);
}

#[test]
fn test_mutation_job_discards_invalid_records() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "calls.maf",
        "#version 2.4\n\
         Hugo_Symbol\tEntrez_Gene_Id\tStart_Position\tEnd_Position\tTumor_Sample_Barcode\tFILTER\n\
         BRCA1\t672\t100\t101\tTCGA-A1-0001-01\tPASS\n\
         TP53\t7157\t500\t400\tTCGA-A1-0002-01\tPASS\n\
         MYSTERY\t0\t1\t1\tTCGA-A1-0001-01\tPASS\n\
         PTEN\t0\t9\t9\tTCGA-A1-0002-01\tlow_vaf\n",
    );
    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();
    let options = ImportOptions {
        skip_invalid_records: true,
        skip_invalid_genes: true,
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(&repo, &registry, options).unwrap();
    let result = pipeline.run_job(&descriptor("mutation", &path)).unwrap();

    assert!(result.is_success());
    // MYSTERY is skipped by the reader, TP53 by the validator (end < start)
    assert_eq!(result.records_read, 3);
    assert_eq!(result.records_discarded, 1);
    assert_eq!(result.records_written, 2);
    assert_eq!(result.warnings.len(), 2);

    let stored = repo.records();
    assert_eq!(stored[1].gene_id, Some(EntityId(5728)));
    assert_eq!(stored[1].attributes.get("FILTER").map(String::as_str), Some("low_vaf"));
}

#[test]
fn test_validation_failure_is_fatal_without_skip() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(
        dir.path(),
        "calls.maf",
        "Hugo_Symbol\tStart_Position\tEnd_Position\tTumor_Sample_Barcode\n\
         BRCA1\t100\t101\tTCGA-A1-0001-01\n\
         TP53\t500\t400\tTCGA-A1-0002-01\n",
    );
    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();

    let mut pipeline = Pipeline::new(&repo, &registry, ImportOptions::default()).unwrap();
    let descriptor = descriptor("mutation", &path);
    let result = pipeline.run_job(&descriptor).unwrap();

    let error = result.error.as_ref().unwrap();
    assert!(matches!(error.cause, IngestError::Validation { line: 3, .. }));
    assert_eq!(error.location, descriptor.location);
    assert_eq!(error.data_type, "mutation");
    // the first record was written before the failure and is reported
    assert_eq!(repo.records().len(), 1);
    assert_eq!(result.records_written, 1);
    assert_eq!(pipeline.state(), PipelineState::Failed);

    // a failed pipeline refuses to run until reset
    assert!(matches!(
        pipeline.run_job(&descriptor),
        Err(IngestError::InvalidState(_))
    ));
    let ledger = repo.job(descriptor.id).unwrap();
    assert_eq!(ledger.outcome.status, JobStatus::Failed);
    assert_eq!(ledger.outcome.records_written, 1);
}

#[test]
fn test_missing_source_fails_job() {
    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();
    let mut pipeline = Pipeline::new(&repo, &registry, ImportOptions::default()).unwrap();

    let result = pipeline
        .run_job(&SourceDescriptor::new("sample_attributes", "/no/such/file.tsv"))
        .unwrap();
    assert!(matches!(
        result.error.unwrap().cause,
        IngestError::SourceUnreadable { .. }
    ));
}

#[test]
fn test_write_failure_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture(dir.path(), "samples.tsv", "sample\nSampleA\n");
    let repo = reference_repository();
    repo.fail_writes(true);
    let registry = ProcessorRegistry::standard();

    let mut pipeline = Pipeline::new(&repo, &registry, ImportOptions::default()).unwrap();
    let result = pipeline.run_job(&descriptor("sample_attributes", &path)).unwrap();

    assert!(matches!(result.error.unwrap().cause, IngestError::Write { .. }));
}

#[test]
fn test_staged_job_bulk_loads_and_cleans_up() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    let path = fixture(
        dir.path(),
        "samples.tsv",
        "sample\tage\tmetastatic\nSampleA\t40\tno\nSampleB\t55\tyes\n",
    );
    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();
    let options = ImportOptions {
        staged: true,
        temp_directory: staging.clone(),
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(&repo, &registry, options).unwrap();
    let result = pipeline.run_job(&descriptor("sample_attributes", &path)).unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.records_written, 2);
    assert_eq!(repo.records()[1].get("is_metastatic"), Some(&FieldValue::Boolean(true)));
    // one bulk load, no row-at-a-time writes
    assert!(repo.write_calls().is_empty());

    let leftovers = std::fs::read_dir(&staging).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[test]
fn test_failed_staged_job_keeps_staging_file() {
    let dir = tempfile::tempdir().unwrap();
    let staging = dir.path().join("staging");
    let path = fixture(
        dir.path(),
        "samples.tsv",
        "sample\tage\nSampleA\t40\nSampleB\tforty\n",
    );
    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();
    let options = ImportOptions {
        staged: true,
        temp_directory: staging.clone(),
        ..Default::default()
    };

    let mut pipeline = Pipeline::new(&repo, &registry, options).unwrap();
    let result = pipeline.run_job(&descriptor("sample_attributes", &path)).unwrap();

    assert!(matches!(
        result.error.unwrap().cause,
        IngestError::FieldConversion { line: 3, .. }
    ));
    assert!(repo.records().is_empty());

    let staged = std::fs::read_dir(&staging).unwrap().next().unwrap().unwrap().path();
    assert_eq!(
        staged.file_name().unwrap().to_str().unwrap(),
        format!("{}.jsonl", result.job_id)
    );
    let content = std::fs::read_to_string(staged).unwrap();
    assert_eq!(content.lines().count(), 1);
}

#[test]
fn test_gzip_source() {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotation.tsv.gz");
    let mut encoder = GzEncoder::new(std::fs::File::create(&path).unwrap(), Compression::fast());
    encoder
        .write_all(b"Hugo_Symbol\tChromosome\tStart\tEnd\tStrand\nMMAC1\t10\t87863113\t87971930\t+\n")
        .unwrap();
    encoder.finish().unwrap();

    let repo = reference_repository();
    let registry = ProcessorRegistry::standard();
    let mut pipeline = Pipeline::new(&repo, &registry, ImportOptions::default()).unwrap();
    let uri = format!("file://{}", path.display());
    let result = pipeline
        .run_job(&SourceDescriptor::new("gene_annotation", uri))
        .unwrap();

    assert!(result.is_success(), "{:?}", result.error);
    let stored = repo.records();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].gene_id, Some(EntityId(5728)));
    assert_eq!(stored[0].get("strand"), Some(&FieldValue::Text("+".to_string())));
}

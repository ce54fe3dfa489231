// ⚙️ Batch Processor & Summarizer - dataset → dedup → resolve → summary
// Runs one sequential pass per uploaded dataset. The MappingIndex is
// injected read-only; the only shared mutable state is the job store, and
// only the task that owns a job id writes to it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::banks::{adapter_for, detect_bank, RecordFields};
use crate::ingest::Dataset;
use crate::normalize::normalize_status;
use crate::output::write_result_csv;
use crate::reference::MappingIndex;
use crate::resolver::{resolve, ResolutionQuery, ResolutionResult};

// ============================================================================
// PROCESSING JOB
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

/// Tracks one batch run. Created at upload time, mutated only by the owning
/// batch task, terminal once completed or failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: String,
    pub status: JobStatus,
    pub message: String,
    pub processed_records: usize,
    pub total_records: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_file: Option<PathBuf>,
}

impl ProcessingJob {
    pub fn new() -> Self {
        ProcessingJob {
            id: Uuid::new_v4().to_string(),
            status: JobStatus::Processing,
            message: String::new(),
            processed_records: 0,
            total_records: 0,
            created_at: Utc::now(),
            completed_at: None,
            result_file: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != JobStatus::Processing
    }
}

impl Default for ProcessingJob {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared job registry. Every mutation happens inside one critical section,
/// so a concurrent status poll never observes a torn counter pair.
#[derive(Debug, Clone, Default)]
pub struct JobStore {
    jobs: Arc<Mutex<HashMap<String, ProcessingJob>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new job in `processing` state and return a snapshot.
    pub fn create(&self) -> ProcessingJob {
        let job = ProcessingJob::new();
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .insert(job.id.clone(), job.clone());
        job
    }

    /// Snapshot of a job by id.
    pub fn get(&self, id: &str) -> Option<ProcessingJob> {
        self.jobs
            .lock()
            .expect("job store lock poisoned")
            .get(id)
            .cloned()
    }

    /// Apply a mutation to a job under the store lock.
    pub fn update(&self, id: &str, mutate: impl FnOnce(&mut ProcessingJob)) {
        let mut jobs = self.jobs.lock().expect("job store lock poisoned");
        if let Some(job) = jobs.get_mut(id) {
            mutate(job);
        }
    }
}

// ============================================================================
// REPORT SUMMARY
// ============================================================================

/// Per-bank aggregate for one processed dataset. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub bank_name: String,
    pub total_records: usize,
    pub duplicates_removed: usize,
    pub status_distribution: HashMap<String, usize>,
    pub mapped_records: usize,
    pub unmapped_records: usize,
}

// ============================================================================
// RESOLVED RECORDS & OUTCOMES
// ============================================================================

/// One surviving input record with its normalized status and resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub fields: RecordFields,
    /// Canonical status used in the status distribution
    pub status: String,
    pub resolution: ResolutionResult,
}

/// Outcome of processing one dataset.
#[derive(Debug)]
pub struct DatasetOutcome {
    pub summary: ReportSummary,
    pub records: Vec<ResolvedRecord>,
    /// Rows dropped for value-level issues, counted separately from unmapped
    pub rows_skipped: usize,
}

/// One uploaded file, owned; the buffer is dropped on every exit path.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Outcome of a whole batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    pub job_id: String,
    pub summaries: Vec<ReportSummary>,
    pub result_file: PathBuf,
    pub total_records: usize,
}

// ============================================================================
// BATCH PROCESSOR
// ============================================================================

/// Streams datasets through extraction, dedup, and resolution against an
/// injected read-only index.
pub struct BatchProcessor {
    index: Arc<MappingIndex>,
}

impl BatchProcessor {
    pub fn new(index: Arc<MappingIndex>) -> Self {
        BatchProcessor { index }
    }

    /// Process one dataset: detect the bank, extract, dedup, resolve, tally.
    ///
    /// Structural problems (unknown bank, missing required columns) error
    /// out; value-level row issues are counted in `rows_skipped`.
    pub fn process_dataset(&self, dataset: &Dataset) -> Result<DatasetOutcome> {
        let kind = detect_bank(dataset)?;
        let adapter = adapter_for(kind);
        let extraction = adapter.extract(dataset)?;

        info!(
            "{}: {} records extracted from '{}' ({} rows skipped)",
            kind.code(),
            extraction.records.len(),
            dataset.filename,
            extraction.rows_skipped
        );

        let total_records = extraction.records.len();
        let mut seen = HashSet::new();
        let mut duplicates_removed = 0usize;
        let mut mapped_records = 0usize;
        let mut unmapped_records = 0usize;
        let mut status_distribution: HashMap<String, usize> = HashMap::new();
        let mut records = Vec::with_capacity(total_records);

        for fields in extraction.records {
            if !seen.insert(identity_hash(&fields)) {
                duplicates_removed += 1;
                continue;
            }

            let status = normalize_status(&fields.status);
            let query = ResolutionQuery::new(
                &fields.bank,
                &fields.product_type,
                &fields.modality,
                &fields.table_name,
            );
            let resolution = resolve(&self.index, &query);
            if resolution.matched {
                mapped_records += 1;
            } else {
                unmapped_records += 1;
                warn!(
                    "⚠️ {} proposal {} unmapped: '{}'",
                    kind.code(),
                    fields.identity_key,
                    fields.table_name
                );
            }
            *status_distribution.entry(status.clone()).or_insert(0) += 1;

            records.push(ResolvedRecord {
                fields,
                status,
                resolution,
            });
        }

        Ok(DatasetOutcome {
            summary: ReportSummary {
                bank_name: kind.reference_name().to_string(),
                total_records,
                duplicates_removed,
                status_distribution,
                mapped_records,
                unmapped_records,
            },
            records,
            rows_skipped: extraction.rows_skipped,
        })
    }

    /// Run a whole batch under a job: every file is processed, the
    /// consolidated result CSV is written, and the job transitions to
    /// `completed`, or to `failed` on the first structural error, in which
    /// case partial results are discarded.
    pub fn process_files(
        &self,
        jobs: &JobStore,
        job_id: &str,
        files: Vec<UploadedFile>,
        output_dir: &Path,
    ) -> Result<BatchOutcome> {
        match self.run(jobs, job_id, files, output_dir) {
            Ok(outcome) => {
                jobs.update(job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(Utc::now());
                    job.message =
                        format!("Processing completed: {} records", outcome.total_records);
                    job.result_file = Some(outcome.result_file.clone());
                });
                Ok(outcome)
            }
            Err(error) => {
                jobs.update(job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.completed_at = Some(Utc::now());
                    job.message = format!("Processing failed: {error:#}");
                });
                Err(error)
            }
        }
    }

    fn run(
        &self,
        jobs: &JobStore,
        job_id: &str,
        files: Vec<UploadedFile>,
        output_dir: &Path,
    ) -> Result<BatchOutcome> {
        anyhow::ensure!(!files.is_empty(), "no dataset files were provided");

        let mut summaries = Vec::new();
        let mut all_records = Vec::new();
        let mut rows_skipped = 0usize;

        for file in files {
            let dataset = Dataset::from_bytes(&file.bytes, &file.filename)?;
            drop(file.bytes);

            let outcome = self
                .process_dataset(&dataset)
                .with_context(|| format!("failed to process '{}'", dataset.filename))?;

            // Both counters move inside one store lock; pollers only ever
            // see a consistent, monotonically increasing pair.
            jobs.update(job_id, |job| {
                job.total_records += outcome.summary.total_records;
                job.processed_records +=
                    outcome.summary.total_records - outcome.summary.duplicates_removed;
            });

            rows_skipped += outcome.rows_skipped;
            summaries.push(outcome.summary);
            all_records.extend(outcome.records);
        }

        anyhow::ensure!(
            !all_records.is_empty(),
            "no valid records survived processing"
        );

        let result_file = output_dir.join(format!(
            "resultado_consolidado_{}.csv",
            Utc::now().format("%Y%m%d_%H%M%S")
        ));
        write_result_csv(&all_records, &result_file)?;

        if rows_skipped > 0 {
            warn!("⚠️ {} rows skipped across the batch", rows_skipped);
        }
        info!(
            "✅ Batch {} completed: {} records, result at {}",
            job_id,
            all_records.len(),
            result_file.display()
        );

        Ok(BatchOutcome {
            job_id: job_id.to_string(),
            summaries,
            result_file,
            total_records: all_records.len(),
        })
    }
}

/// Dedup identity: hash of the bank plus its proposal/contract number.
/// Identity is bank-scoped so two banks can reuse a number without
/// colliding in the same batch.
fn identity_hash(fields: &RecordFields) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}", fields.bank, fields.identity_key));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

//! The job queue: a directory of job records and marker files.
//!
//! ```text
//! <root>/<queue>/<id>.json         - job record (pending while alone)
//! <root>/<queue>/<id>.json.proc    - processing (empty marker: worker claimed it)
//! <root>/<queue>/<id>.json.failed  - failed (failure time and error text)
//! <root>/<queue>/next_id           - next id to hand out
//! ```
//!
//! Completed jobs are removed. Each job is processed at most once: a job
//! still marked as processing when the spool is reopened was interrupted by a
//! crash or restart and is failed, never re-run.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use thiserror::Error;

use crate::types::JobId;

use super::fsync::{fsync_dir, write_atomic};
use super::job::{FailedJob, FailureRecord, JobData, JobRecord};

/// Failed records kept before a purge is triggered.
pub const FAILED_RETENTION_LIMIT: usize = 30;

/// Oldest failed records removed by one purge.
pub const FAILED_PURGE_BATCH: usize = 20;

/// Error recorded for jobs found mid-processing at startup.
pub const INTERRUPTED_ERROR: &str = "interrupted: the worker stopped while this job was processing";

const NEXT_ID_FILE: &str = "next_id";

/// Errors that can occur during spool operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Queue name unusable as a directory name.
    #[error("invalid queue name: {0:?}")]
    InvalidQueueName(String),

    /// Job record with a required field left empty.
    #[error("job is missing required field {field}")]
    InvalidJob { field: &'static str },
}

/// Result type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

/// Number of jobs in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpoolCounts {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
}

/// Which files exist for one job.
#[derive(Debug, Clone, Copy, Default)]
struct JobFiles {
    record: bool,
    proc: bool,
    failed: bool,
}

impl JobFiles {
    fn is_pending(&self) -> bool {
        self.record && !self.proc && !self.failed
    }

    fn is_processing(&self) -> bool {
        self.proc && !self.failed
    }
}

enum FileKind {
    Record,
    Proc,
    Failed,
}

/// Splits a spool file name into its job stem and kind.
fn file_kind(name: &str) -> Option<(&str, FileKind)> {
    if let Some(stem) = name.strip_suffix(".json.proc") {
        Some((stem, FileKind::Proc))
    } else if let Some(stem) = name.strip_suffix(".json.failed") {
        Some((stem, FileKind::Failed))
    } else {
        name.strip_suffix(".json").map(|stem| (stem, FileKind::Record))
    }
}

/// Validates that a queue name is safe to use as a directory name.
fn validate_queue_name(queue: &str) -> Result<()> {
    if queue.is_empty()
        || queue.starts_with('.')
        || queue.contains(['/', '\\', '\0'])
    {
        return Err(SpoolError::InvalidQueueName(queue.to_string()));
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A durable, file-backed job queue.
#[derive(Debug)]
pub struct JobSpool {
    dir: PathBuf,
    queue: String,
    next_id: Mutex<JobId>,
}

impl JobSpool {
    /// Opens (creating if needed) the queue `queue` under `root`.
    ///
    /// Must be called before any worker runs: jobs left in the processing
    /// state are failed as interrupted.
    pub fn open(root: &Path, queue: &str) -> Result<Self> {
        validate_queue_name(queue)?;
        let dir = root.join(queue);
        std::fs::create_dir_all(&dir)?;

        let spool = JobSpool {
            dir,
            queue: queue.to_string(),
            next_id: Mutex::new(JobId(1)),
        };

        let files = spool.scan()?;
        let after_existing = files.keys().next_back().map_or(JobId(1), |id| id.next());
        let stored = std::fs::read_to_string(spool.dir.join(NEXT_ID_FILE))
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map_or(JobId(1), JobId);
        *spool.lock_next_id() = after_existing.max(stored);

        let interrupted = spool.recover_interrupted()?;
        if !interrupted.is_empty() {
            tracing::warn!(
                queue,
                count = interrupted.len(),
                "failed jobs interrupted by a previous shutdown"
            );
        }

        Ok(spool)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_next_id(&self) -> std::sync::MutexGuard<'_, JobId> {
        self.next_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id.file_stem()))
    }

    fn proc_marker_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{}.json.proc", id.file_stem()))
    }

    fn failed_marker_path(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("{}.json.failed", id.file_stem()))
    }

    /// Lists the files of every job, in id order.
    fn scan(&self) -> Result<BTreeMap<JobId, JobFiles>> {
        let mut jobs: BTreeMap<JobId, JobFiles> = BTreeMap::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };

            // next_id and leftover temp files are skipped
            let Some((stem, kind)) = file_kind(name) else {
                continue;
            };
            let Some(id) = JobId::from_file_stem(stem) else {
                continue;
            };

            let files = jobs.entry(id).or_default();
            match kind {
                FileKind::Record => files.record = true,
                FileKind::Proc => files.proc = true,
                FileKind::Failed => files.failed = true,
            }
        }

        Ok(jobs)
    }

    /// Adds a job to the queue.
    pub fn enqueue(&self, data: JobData) -> Result<JobRecord> {
        if let Some(field) = data.missing_field() {
            return Err(SpoolError::InvalidJob { field });
        }

        let mut next_id = self.lock_next_id();
        let record = JobRecord {
            id: *next_id,
            created_at: Utc::now(),
            data,
        };

        write_atomic(
            &self.record_path(record.id),
            &serde_json::to_vec_pretty(&record)?,
        )?;
        *next_id = record.id.next();
        write_atomic(&self.dir.join(NEXT_ID_FILE), next_id.to_string().as_bytes())?;

        tracing::debug!(
            queue = %self.queue,
            job = %record.id,
            job_type = %record.data.job_type,
            "enqueued job"
        );
        Ok(record)
    }

    /// Claims the oldest pending job, marking it as processing.
    ///
    /// A record that can't be read is failed and skipped.
    pub fn claim_next(&self) -> Result<Option<JobRecord>> {
        for (id, files) in self.scan()? {
            if !files.is_pending() {
                continue;
            }

            self.create_marker(&self.proc_marker_path(id))?;

            let record = std::fs::read(self.record_path(id))
                .map_err(SpoolError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<JobRecord>(&bytes)?));
            match record {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    tracing::warn!(job = %id, error = %e, "unreadable job record");
                    self.fail(id, &format!("unreadable job record: {e}"))?;
                }
            }
        }

        Ok(None)
    }

    /// Creates an empty marker file and makes its directory entry durable.
    fn create_marker(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        fsync_dir(&self.dir)?;
        Ok(())
    }

    /// Removes a completed job.
    pub fn complete(&self, id: JobId) -> Result<()> {
        remove_if_exists(&self.record_path(id))?;
        remove_if_exists(&self.proc_marker_path(id))?;
        fsync_dir(&self.dir)?;
        Ok(())
    }

    /// Marks a job as failed with `error`, then applies failed-job retention.
    ///
    /// Returns the number of old failed jobs purged.
    pub fn fail(&self, id: JobId, error: &str) -> Result<usize> {
        let failure = FailureRecord {
            failed_at: Utc::now(),
            error: error.to_string(),
        };
        write_atomic(
            &self.failed_marker_path(id),
            &serde_json::to_vec_pretty(&failure)?,
        )?;
        remove_if_exists(&self.proc_marker_path(id))?;
        fsync_dir(&self.dir)?;

        self.purge_failed()
    }

    /// Keeps the failed-job count bounded: when more than
    /// [`FAILED_RETENTION_LIMIT`] failed jobs exist, the
    /// [`FAILED_PURGE_BATCH`] oldest are removed.
    fn purge_failed(&self) -> Result<usize> {
        let failed: Vec<JobId> = self
            .scan()?
            .into_iter()
            .filter(|(_, files)| files.failed)
            .map(|(id, _)| id)
            .collect();

        if failed.len() <= FAILED_RETENTION_LIMIT {
            return Ok(0);
        }

        let purged = &failed[..FAILED_PURGE_BATCH];
        for &id in purged {
            remove_if_exists(&self.record_path(id))?;
            remove_if_exists(&self.proc_marker_path(id))?;
            remove_if_exists(&self.failed_marker_path(id))?;
        }
        fsync_dir(&self.dir)?;

        tracing::info!(
            queue = %self.queue,
            purged = purged.len(),
            oldest = %purged[0],
            "purged old failed jobs"
        );
        Ok(purged.len())
    }

    /// Fails every job left in the processing state.
    fn recover_interrupted(&self) -> Result<Vec<JobId>> {
        let interrupted: Vec<JobId> = self
            .scan()?
            .into_iter()
            .filter(|(_, files)| files.is_processing())
            .map(|(id, _)| id)
            .collect();

        for &id in &interrupted {
            tracing::warn!(queue = %self.queue, job = %id, "job was interrupted");
            self.fail(id, INTERRUPTED_ERROR)?;
        }

        Ok(interrupted)
    }

    /// Failed jobs, oldest first.
    pub fn failed_jobs(&self) -> Result<Vec<FailedJob>> {
        let mut failed = Vec::new();
        for (id, files) in self.scan()? {
            if !files.failed {
                continue;
            }
            let bytes = std::fs::read(self.failed_marker_path(id))?;
            let record: FailureRecord = serde_json::from_slice(&bytes)?;
            failed.push(FailedJob {
                id,
                failed_at: record.failed_at,
                error: record.error,
            });
        }
        Ok(failed)
    }

    pub fn counts(&self) -> Result<SpoolCounts> {
        let mut counts = SpoolCounts::default();
        for files in self.scan()?.values() {
            if files.failed {
                counts.failed += 1;
            } else if files.proc {
                counts.processing += 1;
            } else if files.record {
                counts.pending += 1;
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn data(module: &str) -> JobData {
        JobData {
            manifest_repo_url: "git@x/puppetfile.git".to_string(),
            push_user: "alice".to_string(),
            module_name: module.to_string(),
            branch: "feat-1".to_string(),
            module_repo_url: format!("git@x/{module}.git"),
            job_type: "modifyEvent".to_string(),
        }
    }

    fn open(root: &TempDir) -> JobSpool {
        JobSpool::open(root.path(), "r10k").unwrap()
    }

    #[test]
    fn enqueue_writes_numbered_record() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);

        let first = spool.enqueue(data("a")).unwrap();
        let second = spool.enqueue(data("b")).unwrap();

        assert_eq!(first.id, JobId(1));
        assert_eq!(second.id, JobId(2));
        let path = root.path().join("r10k/00000000000000000001.json");
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["data"]["reponame"], "a");
        assert_eq!(json["data"]["type"], "modifyEvent");
        assert!(json["created_at"].is_string());
    }

    #[test]
    fn enqueue_rejects_incomplete_jobs() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);
        let mut job = data("a");
        job.module_repo_url.clear();

        let err = spool.enqueue(job).unwrap_err();

        assert!(matches!(err, SpoolError::InvalidJob { field: "repourl" }));
        assert_eq!(spool.counts().unwrap(), SpoolCounts::default());
    }

    #[test]
    fn claim_returns_oldest_pending_job() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);
        spool.enqueue(data("a")).unwrap();
        spool.enqueue(data("b")).unwrap();

        let first = spool.claim_next().unwrap().unwrap();
        let second = spool.claim_next().unwrap().unwrap();

        assert_eq!(first.data.module_name, "a");
        assert_eq!(second.data.module_name, "b");
        assert!(spool.claim_next().unwrap().is_none());
        assert_eq!(spool.counts().unwrap().processing, 2);
    }

    #[test]
    fn completed_jobs_are_removed() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);
        let job = spool.enqueue(data("a")).unwrap();
        spool.claim_next().unwrap();

        spool.complete(job.id).unwrap();

        assert_eq!(spool.counts().unwrap(), SpoolCounts::default());
        assert!(!spool.record_path(job.id).exists());
        assert!(!spool.proc_marker_path(job.id).exists());
    }

    #[test]
    fn failed_jobs_keep_record_and_error() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);
        let job = spool.enqueue(data("a")).unwrap();
        spool.claim_next().unwrap();

        let purged = spool.fail(job.id, "push rejected").unwrap();

        assert_eq!(purged, 0);
        assert!(spool.record_path(job.id).exists());
        let failed = spool.failed_jobs().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, job.id);
        assert_eq!(failed[0].error, "push rejected");
        assert_eq!(
            spool.counts().unwrap(),
            SpoolCounts {
                pending: 0,
                processing: 0,
                failed: 1
            }
        );
        assert!(spool.claim_next().unwrap().is_none());
    }

    #[test]
    fn retention_purges_twenty_oldest_beyond_thirty() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);
        let ids: Vec<JobId> = (0..31)
            .map(|i| spool.enqueue(data(&format!("m{i}"))).unwrap().id)
            .collect();

        for &id in &ids[..30] {
            assert_eq!(spool.fail(id, "boom").unwrap(), 0);
        }
        assert_eq!(spool.failed_jobs().unwrap().len(), 30);

        assert_eq!(spool.fail(ids[30], "boom").unwrap(), 20);

        let remaining: Vec<JobId> = spool.failed_jobs().unwrap().iter().map(|f| f.id).collect();
        assert_eq!(remaining, ids[20..].to_vec());
        for &id in &ids[..20] {
            assert!(!spool.record_path(id).exists());
        }
    }

    #[test]
    fn interrupted_jobs_are_failed_on_reopen() {
        let root = TempDir::new().unwrap();
        let job = {
            let spool = open(&root);
            let job = spool.enqueue(data("a")).unwrap();
            spool.enqueue(data("b")).unwrap();
            spool.claim_next().unwrap();
            job
        };

        let spool = open(&root);

        let failed = spool.failed_jobs().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, job.id);
        assert_eq!(failed[0].error, INTERRUPTED_ERROR);
        let next = spool.claim_next().unwrap().unwrap();
        assert_eq!(next.data.module_name, "b");
    }

    #[test]
    fn ids_keep_increasing_across_reopen() {
        let root = TempDir::new().unwrap();
        {
            let spool = open(&root);
            let job = spool.enqueue(data("a")).unwrap();
            spool.claim_next().unwrap();
            spool.complete(job.id).unwrap();
        }

        let spool = open(&root);
        let job = spool.enqueue(data("b")).unwrap();

        assert_eq!(job.id, JobId(2));
    }

    #[test]
    fn unreadable_record_is_failed_and_skipped() {
        let root = TempDir::new().unwrap();
        let spool = open(&root);
        let broken = spool.enqueue(data("a")).unwrap();
        spool.enqueue(data("b")).unwrap();
        std::fs::write(spool.record_path(broken.id), "{not json").unwrap();

        let claimed = spool.claim_next().unwrap().unwrap();

        assert_eq!(claimed.data.module_name, "b");
        let failed = spool.failed_jobs().unwrap();
        assert_eq!(failed[0].id, broken.id);
        assert!(failed[0].error.starts_with("unreadable job record"));
    }

    #[test]
    fn queues_are_namespaced() {
        let root = TempDir::new().unwrap();
        let a = JobSpool::open(root.path(), "r10k").unwrap();
        let b = JobSpool::open(root.path(), "r10k-staging").unwrap();
        a.enqueue(data("a")).unwrap();

        assert!(b.claim_next().unwrap().is_none());
        assert_eq!(b.enqueue(data("b")).unwrap().id, JobId(1));
        assert_eq!(a.queue_name(), "r10k");
    }

    #[test]
    fn invalid_queue_names_are_rejected() {
        let root = TempDir::new().unwrap();
        for bad in ["", ".hidden", "a/b", "..", "a\\b"] {
            assert!(
                matches!(
                    JobSpool::open(root.path(), bad),
                    Err(SpoolError::InvalidQueueName(_))
                ),
                "queue {bad:?}"
            );
        }
    }
}

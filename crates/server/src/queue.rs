//! The durable push queue.
//!
//! One JSON file under `queue_dir`, keyed by lineage name, shared between the
//! deploy-hook process and the daemon. Writers take an exclusive advisory
//! lock on a sibling lockfile and replace the file with a rename-over-temp;
//! readers take a shared lock. A crash mid-write can only ever leave behind a
//! stale temp file, never a torn queue.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

const QUEUE_FILE: &str = "queue";
const LOCK_FILE: &str = "queue.lock";

/// The intent to deliver one lineage to every client whose domains overlap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushJob {
    pub lineage_path: PathBuf,
    pub lineage_name: String,
    pub domains: Vec<String>,
}

impl PushJob {
    /// Build a job from a lineage path; the name is the path's basename.
    pub fn new(lineage_path: PathBuf, domains: Vec<String>) -> Result<Self> {
        let lineage_name = lineage_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ServerError::Other(format!(
                    "lineage path has no basename: {}",
                    lineage_path.display()
                ))
            })?;
        Ok(Self { lineage_path, lineage_name, domains })
    }
}

/// Handle to the on-disk queue. Cheap to construct; every operation locks,
/// reads, and releases, so hook and daemon processes can interleave freely.
#[derive(Debug, Clone)]
pub struct Queue {
    file: PathBuf,
    lock_file: PathBuf,
}

impl Queue {
    pub fn open(queue_dir: &Path) -> Self {
        Self { file: queue_dir.join(QUEUE_FILE), lock_file: queue_dir.join(LOCK_FILE) }
    }

    /// Add a job, collapsing any existing entry with the same lineage name
    /// (last write wins on path and domains). Insertion order is preserved.
    pub fn enqueue(&self, job: PushJob) -> Result<()> {
        let _guard = self.lock_exclusive()?;
        let mut jobs = self.read_jobs()?;
        match jobs.iter_mut().find(|j| j.lineage_name == job.lineage_name) {
            Some(existing) => *existing = job,
            None => jobs.push(job),
        }
        self.write_jobs(&jobs)
    }

    /// The full pending set, oldest first.
    pub fn snapshot(&self) -> Result<Vec<PushJob>> {
        let _guard = self.lock_shared()?;
        self.read_jobs()
    }

    /// Drop the entry for `lineage_name` once every targeted client has been
    /// fully attempted.
    pub fn remove(&self, lineage_name: &str) -> Result<()> {
        let _guard = self.lock_exclusive()?;
        let mut jobs = self.read_jobs()?;
        jobs.retain(|j| j.lineage_name != lineage_name);
        self.write_jobs(&jobs)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.snapshot()?.is_empty())
    }

    fn lock_exclusive(&self) -> Result<File> {
        let file = self.open_lock_file()?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn lock_shared(&self) -> Result<File> {
        let file = self.open_lock_file()?;
        file.lock_shared()?;
        Ok(file)
    }

    fn open_lock_file(&self) -> Result<File> {
        Ok(OpenOptions::new().create(true).truncate(false).write(true).open(&self.lock_file)?)
    }

    fn read_jobs(&self) -> Result<Vec<PushJob>> {
        if !self.file.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.file)?;
        serde_json::from_str(&text).map_err(|e| ServerError::QueueCorrupt(e.to_string()))
    }

    fn write_jobs(&self, jobs: &[PushJob]) -> Result<()> {
        let temp = self.temp_path();
        let data = serde_json::to_vec(jobs)
            .map_err(|e| ServerError::Other(format!("failed to serialize queue: {e}")))?;
        std::fs::write(&temp, data)?;
        if let Err(e) = std::fs::rename(&temp, &self.file) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    // Same directory as the queue file so the rename stays on one filesystem.
    fn temp_path(&self) -> PathBuf {
        let suffix: String =
            rand::thread_rng().sample_iter(&Alphanumeric).take(8).map(char::from).collect();
        self.file.with_extension(format!("{suffix}.tmp"))
    }
}

//! The deploy-hook entry point.
//!
//! The ACME client invokes this binary after each successful renewal with
//! `RENEWED_LINEAGE` and `RENEWED_DOMAINS` in the environment (surfaced here
//! as `--lineage` / `--domains`). All it does is turn that pair into a queued
//! push job.

use std::path::Path;

use crate::error::{Result, ServerError};
use crate::queue::{PushJob, Queue};

/// Build and enqueue one push job for a renewed lineage.
pub fn enqueue(queue: &Queue, lineage: &Path, domains: &str) -> Result<PushJob> {
    let domains: Vec<String> = domains.split_whitespace().map(str::to_string).collect();
    if domains.is_empty() {
        return Err(ServerError::Other(format!(
            "no domains given for lineage {}",
            lineage.display()
        )));
    }
    let job = PushJob::new(lineage.to_path_buf(), domains)?;
    queue.enqueue(job.clone())?;
    tracing::info!("Queued lineage {} for {} domain(s)", job.lineage_name, job.domains.len());
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueues_one_job() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::open(dir.path());

        let job = enqueue(
            &queue,
            Path::new("/etc/letsencrypt/live/example.com"),
            "example.com www.example.com",
        )
        .unwrap();
        assert_eq!(job.lineage_name, "example.com");
        assert_eq!(job.domains, vec!["example.com", "www.example.com"]);

        let jobs = queue.snapshot().unwrap();
        assert_eq!(jobs, vec![job]);
    }

    #[test]
    fn empty_domains_fail() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::open(dir.path());
        assert!(enqueue(&queue, Path::new("/etc/letsencrypt/live/example.com"), "  ").is_err());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn renewing_twice_supersedes() {
        let dir = tempfile::tempdir().unwrap();
        let queue = Queue::open(dir.path());

        enqueue(&queue, Path::new("/live/example.com"), "example.com").unwrap();
        enqueue(&queue, Path::new("/live/example.com"), "example.com www.example.com").unwrap();

        let jobs = queue.snapshot().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].domains.len(), 2);
    }
}

//! The push engine: drains the queue against the configured client fleet.
//!
//! Serial mode walks clients one at a time in declaration order; parallel
//! mode runs one worker per client, jobs sequential within a worker. Retry
//! budget and interval resolve once per (job, client) pair, client override
//! first.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use certdeploy_config::{ClientConnection, PushMode, ServerConfig};

use crate::error::{Result, ServerError, SyncError};
use crate::queue::{PushJob, Queue};
use crate::sftp::SftpUploader;

/// The transport seam: anything that can deliver one lineage to one client.
#[async_trait]
pub trait LineageSync: Send + Sync {
    async fn sync(&self, job: &PushJob, client: &ClientConnection) -> std::result::Result<(), SyncError>;
}

#[async_trait]
impl LineageSync for SftpUploader {
    async fn sync(&self, job: &PushJob, client: &ClientConnection) -> std::result::Result<(), SyncError> {
        SftpUploader::sync(self, job, client).await
    }
}

pub struct PushEngine<S: ?Sized> {
    config: Arc<ServerConfig>,
    queue: Queue,
    transport: Arc<S>,
}

impl PushEngine<SftpUploader> {
    pub fn new(config: Arc<ServerConfig>, queue: Queue) -> Self {
        let transport = Arc::new(SftpUploader::new(&config));
        Self { config, queue, transport }
    }
}

impl<S: LineageSync + ?Sized + 'static> PushEngine<S> {
    pub fn with_transport(config: Arc<ServerConfig>, queue: Queue, transport: Arc<S>) -> Self {
        Self { config, queue, transport }
    }

    /// Drain the current queue snapshot. Jobs are removed once every
    /// targeted client has succeeded or exhausted its retry budget; under
    /// `fail_fast` the first exhausted failure aborts the drain and leaves
    /// the queue as-is.
    pub async fn drain(&self) -> Result<()> {
        let jobs = self.queue.snapshot()?;
        if jobs.is_empty() {
            tracing::debug!("queue is empty, nothing to push");
            return Ok(());
        }

        match self.config.push_mode {
            PushMode::Serial => self.drain_serial(&jobs).await?,
            PushMode::Parallel => self.drain_parallel(&jobs).await?,
        }

        for job in &jobs {
            self.queue.remove(&job.lineage_name)?;
        }
        Ok(())
    }

    async fn drain_serial(&self, jobs: &[PushJob]) -> Result<()> {
        let mut first = true;
        for client in &self.config.clients {
            let client_jobs: Vec<&PushJob> =
                jobs.iter().filter(|j| client.wants_any(&j.domains)).collect();
            if client_jobs.is_empty() {
                continue;
            }
            if !first && !self.config.push_interval.is_zero() {
                tokio::time::sleep(self.config.push_interval).await;
            }
            first = false;
            for job in client_jobs {
                if let Err(e) = push_with_retries(&*self.transport, &self.config, job, client).await
                    && self.config.fail_fast
                {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    async fn drain_parallel(&self, jobs: &[PushJob]) -> Result<()> {
        let mut workers = Vec::new();
        let mut first = true;
        for client in &self.config.clients {
            let client_jobs: Vec<PushJob> =
                jobs.iter().filter(|j| client.wants_any(&j.domains)).cloned().collect();
            if client_jobs.is_empty() {
                continue;
            }
            if !first && !self.config.push_interval.is_zero() {
                tokio::time::sleep(self.config.push_interval).await;
            }
            first = false;

            let transport = Arc::clone(&self.transport);
            let config = Arc::clone(&self.config);
            let client = client.clone();
            workers.push(tokio::spawn(async move {
                for job in &client_jobs {
                    if let Err(e) = push_with_retries(&*transport, &config, job, &client).await
                        && config.fail_fast
                    {
                        return Err(e);
                    }
                }
                Ok(())
            }));
        }

        let mut failure: Option<SyncError> = None;
        for worker in workers {
            let joined = match self.config.join_timeout {
                Some(limit) => match tokio::time::timeout(limit, worker).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        return Err(ServerError::Other(format!(
                            "push worker did not finish within {limit:?}"
                        )));
                    }
                },
                None => worker.await,
            };
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => failure = failure.or(Some(e)),
                Err(e) => return Err(ServerError::Other(format!("push worker panicked: {e}"))),
            }
        }
        if let Some(e) = failure
            && self.config.fail_fast
        {
            return Err(e.into());
        }
        Ok(())
    }
}

/// Resolve the retry policy for this pair and attempt until success or
/// exhaustion. Only transient errors are retried; every failed attempt is
/// logged.
async fn push_with_retries<S: LineageSync + ?Sized>(
    transport: &S,
    config: &ServerConfig,
    job: &PushJob,
    client: &ClientConnection,
) -> std::result::Result<(), SyncError> {
    let retries = client.push_retries.unwrap_or(config.push_retries);
    let interval = client.push_retry_interval.unwrap_or(config.push_retry_interval);

    tracing::info!("Pushing {} to {client}", job.lineage_name);
    let mut attempt: u32 = 0;
    loop {
        match transport.sync(job, client).await {
            Ok(()) => {
                tracing::info!("Pushed {} to {client} in {} attempts", job.lineage_name, attempt + 1);
                return Ok(());
            }
            Err(e) => {
                tracing::error!("Error syncing with {}:{}: {e}", client.address, client.port);
                if !e.is_transient() {
                    return Err(e);
                }
                if attempt >= retries {
                    tracing::warn!(
                        "Attempt #{attempt} of {retries} retries failed. Not retrying sync of {} to {client}.",
                        job.lineage_name,
                    );
                    return Err(e);
                }
                attempt += 1;
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
}

/// Retry pacing resolved once per pair, exposed for the engine tests.
pub fn effective_retry_policy(
    config: &ServerConfig,
    client: &ClientConnection,
) -> (u32, Duration) {
    (
        client.push_retries.unwrap_or(config.push_retries),
        client.push_retry_interval.unwrap_or(config.push_retry_interval),
    )
}

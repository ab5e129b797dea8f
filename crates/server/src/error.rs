use certdeploy_config::ConfigError;

/// Errors from one push attempt to one client.
///
/// The category decides retry policy: `Transient` failures are retried up to
/// the pair's retry budget, everything else fails the pair immediately.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The presented host key does not match the pinned key. Never retried.
    #[error("HostKeyMismatch: host key presented by {address}:{port} does not match the pinned key")]
    HostKeyMismatch { address: String, port: u16 },

    /// DNS, connect, auth, or timeout failures — worth retrying.
    #[error("SFTPTransientError: {0}")]
    Transient(String),

    /// Missing lineage files, remote permission errors — retrying cannot help.
    #[error("CertDeployError: {0}")]
    Fatal(String),
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

/// Errors from the CertDeploy server runtime.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The queue file exists but does not parse. Requires operator
    /// intervention; the file is never silently truncated.
    #[error("QueueCorrupt: the queue file contains invalid data: {0}")]
    QueueCorrupt(String),

    /// The renewal executable failed or could not be run.
    #[error("RenewError: {0}")]
    Renew(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("CertDeployError: i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CertDeployError: {0}")]
    Other(String),
}

impl ServerError {
    /// Process exit code per error class: config errors are 2, the rest 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ServerError::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

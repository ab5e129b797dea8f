use certdeploy_config::ConfigError;

/// Errors from the CertDeploy client runtime.
///
/// The variant names double as the error-kind tags in log lines
/// (`ERROR:certdeploy-client:ContainerNotFound: ...`), so they are stable.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No container matched the configured name or filters.
    #[error("ContainerNotFound: no container matched filters {0}")]
    ContainerNotFound(String),

    /// No orchestrator service matched the configured name or filters.
    #[error("ServiceNotFound: {0}")]
    ServiceNotFound(String),

    /// An init or rc unit action failed.
    #[error("UnitError: {0}")]
    UnitError(String),

    /// An update script failed to run or exited non-zero.
    #[error("ScriptError: {0}")]
    ScriptError(String),

    /// A staged lineage could not be promoted. Staging is left intact.
    #[error("PromotionError: {0}")]
    Promotion(String),

    /// The embedded SFTP server could not start or died.
    #[error("CertDeployError: sftpd: {0}")]
    Sftpd(String),

    #[error("CertDeployError: i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CertDeployError: {0}")]
    Other(String),
}

impl ClientError {
    /// Process exit code per error class: config errors are 2, the rest 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

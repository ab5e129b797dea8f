use std::path::PathBuf;

use clap::Parser;

/// CertDeploy server — renew TLS certificates and push them to a fleet.
#[derive(Debug, Parser)]
#[command(name = "certdeploy-server", version, about)]
pub struct Cli {
    /// Path of the server config file.
    #[arg(
        long,
        default_value = "/etc/certdeploy/server.yml",
        env = "CERTDEPLOY_SERVER_CONFIG"
    )]
    pub config: PathBuf,

    /// Run the renewal scheduler and push queue until signalled.
    #[arg(long, env = "CERTDEPLOY_SERVER_DAEMON", conflicts_with_all = ["lineage", "domains"])]
    pub daemon: bool,

    /// Run the renewal executable once.
    #[arg(long, env = "CERTDEPLOY_SERVER_RENEW_ONLY")]
    pub renew: bool,

    /// Drain the push queue once and exit.
    #[arg(long, env = "CERTDEPLOY_SERVER_PUSH_ONLY")]
    pub push: bool,

    /// Lineage directory to enqueue (deploy-hook mode).
    #[arg(long, env = "RENEWED_LINEAGE")]
    pub lineage: Option<PathBuf>,

    /// Space-separated domains for the lineage (deploy-hook mode).
    #[arg(long, env = "RENEWED_DOMAINS")]
    pub domains: Option<String>,

    /// Override the application log file.
    #[arg(long, env = "CERTDEPLOY_SERVER_LOG_FILENAME")]
    pub log_filename: Option<PathBuf>,

    /// Override the application log level.
    #[arg(long, env = "CERTDEPLOY_SERVER_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the SFTP log file.
    #[arg(long, env = "CERTDEPLOY_SERVER_SFTP_LOG_FILENAME")]
    pub sftp_log_filename: Option<PathBuf>,

    /// Override the SFTP log level.
    #[arg(long, env = "CERTDEPLOY_SERVER_SFTP_LOG_LEVEL")]
    pub sftp_log_level: Option<String>,
}

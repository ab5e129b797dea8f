use std::path::PathBuf;

use clap::Parser;

/// CertDeploy client — receive pushed certificates and update the services
/// that consume them.
#[derive(Debug, Parser)]
#[command(name = "certdeploy-client", version, about)]
pub struct Cli {
    /// Path of the client config file.
    #[arg(
        long,
        default_value = "/etc/certdeploy/client.yml",
        env = "CERTDEPLOY_CLIENT_CONFIG"
    )]
    pub config: PathBuf,

    /// Run the SFTP server and update loop until signalled.
    #[arg(long, env = "CERTDEPLOY_CLIENT_DAEMON")]
    pub daemon: bool,

    /// Override the application log file.
    #[arg(long, env = "CERTDEPLOY_CLIENT_LOG_FILENAME")]
    pub log_filename: Option<PathBuf>,

    /// Override the application log level.
    #[arg(long, env = "CERTDEPLOY_CLIENT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the SFTP log file.
    #[arg(long, env = "CERTDEPLOY_CLIENT_SFTP_LOG_FILENAME")]
    pub sftp_log_filename: Option<PathBuf>,

    /// Override the SFTP log level.
    #[arg(long, env = "CERTDEPLOY_CLIENT_SFTP_LOG_LEVEL")]
    pub sftp_log_level: Option<String>,
}

use std::path::PathBuf;
use std::time::Duration;

use ssh_key::PrivateKey;

use crate::keys::PinnedKey;

use super::log::SinkConfig;
use super::service::ServiceKind;

/// Embedded SFTP server settings.
#[derive(Debug, Clone)]
pub struct SftpdConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub username: String,
    /// Host key presented to the pushing server.
    pub private_key: PrivateKey,
    /// The single server public key accepted for login.
    pub server_pubkey: PinnedKey,
}

/// Owner or group, by id or resolvable name.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerRef {
    Id(u32),
    Name(String),
}

/// Permissions applied to promoted lineage files. Absent fields leave the
/// attributes as received from the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilePermissions {
    pub mode: Option<u32>,
    pub directory_mode: Option<u32>,
    pub owner: Option<OwnerRef>,
    pub group: Option<OwnerRef>,
}

/// Fully validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SFTP landing directory.
    pub source: PathBuf,
    /// Directory lineages are promoted into.
    pub destination: PathBuf,
    pub update_services: Vec<ServiceKind>,
    /// Delay between a deploy and the service update run.
    pub update_delay: Duration,
    pub script_timeout: Option<Duration>,
    pub init_timeout: Option<Duration>,
    pub docker_timeout: Option<Duration>,
    pub systemd_exec: PathBuf,
    pub rc_service_exec: PathBuf,
    pub docker_url: String,
    pub file_permissions: Option<FilePermissions>,
    pub sftpd: SftpdConfig,
    pub fail_fast: bool,
    pub log: SinkConfig,
    pub sftp_log: SinkConfig,
}

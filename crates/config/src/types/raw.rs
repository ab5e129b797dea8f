use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Raw YAML-deserialized server config. Strings and bare numbers — not yet
/// validated. Unknown keys are rejected at this layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawServerConfig {
    pub privkey_filename: PathBuf,
    #[serde(default)]
    pub clients: Vec<RawClientConn>,
    /// Directory of one-descriptor YAML files, merged after `clients`.
    #[serde(default)]
    pub client_source_dir: Option<PathBuf>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub log_filename: Option<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub sftp_log_filename: Option<PathBuf>,
    #[serde(default)]
    pub sftp_log_level: Option<String>,
    #[serde(default = "default_renew_every")]
    pub renew_every: u32,
    #[serde(default = "default_renew_unit")]
    pub renew_unit: String,
    #[serde(default)]
    pub renew_at: Option<String>,
    #[serde(default)]
    pub renew_exec: Option<PathBuf>,
    #[serde(default = "default_renew_args")]
    pub renew_args: Vec<String>,
    /// Seconds; `null` waits indefinitely.
    #[serde(default)]
    pub renew_timeout: Option<f64>,
    #[serde(default)]
    pub push_mode: Option<String>,
    /// Seconds between successive pushes.
    #[serde(default)]
    pub push_interval: u64,
    #[serde(default = "default_push_retries")]
    pub push_retries: u32,
    /// Seconds between retries.
    #[serde(default = "default_push_retry_interval")]
    pub push_retry_interval: u64,
    /// Seconds; `null` waits indefinitely.
    #[serde(default)]
    pub join_timeout: Option<f64>,
    /// Seconds to wait for the SSH banner and auth exchange.
    #[serde(default = "default_sftp_banner_timeout")]
    pub sftp_banner_timeout: u64,
    #[serde(default = "default_queue_dir")]
    pub queue_dir: PathBuf,
}

/// Raw connection descriptor for one remote client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawClientConn {
    pub address: String,
    pub domains: Vec<String>,
    pub pubkey: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_remote_path")]
    pub remote_path: PathBuf,
    #[serde(default)]
    pub needs_chain: bool,
    #[serde(default = "default_true")]
    pub needs_fullchain: bool,
    #[serde(default = "default_true")]
    pub needs_privkey: bool,
    #[serde(default)]
    pub needs_cert: bool,
    #[serde(default)]
    pub push_retries: Option<u32>,
    #[serde(default)]
    pub push_retry_interval: Option<u64>,
}

/// Raw YAML-deserialized client config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawClientConfig {
    pub destination: PathBuf,
    #[serde(default = "default_remote_path")]
    pub source: PathBuf,
    #[serde(default)]
    pub sftpd: RawSftpdConfig,
    #[serde(default)]
    pub update_services: Vec<RawServiceDef>,
    /// Duration string such as `1h` or `1w2d`; `null` means no delay.
    #[serde(default = "default_update_delay")]
    pub update_delay: Option<String>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub log_filename: Option<PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub sftp_log_filename: Option<PathBuf>,
    #[serde(default)]
    pub sftp_log_level: Option<String>,
    #[serde(default = "default_systemd_exec")]
    pub systemd_exec: PathBuf,
    #[serde(default = "default_rc_service_exec")]
    pub rc_service_exec: PathBuf,
    #[serde(default = "default_docker_url")]
    pub docker_url: String,
    /// Per-category default timeouts, in seconds.
    #[serde(default)]
    pub script_timeout: Option<f64>,
    #[serde(default)]
    pub init_timeout: Option<f64>,
    #[serde(default = "default_docker_timeout")]
    pub docker_timeout: Option<f64>,
    #[serde(default)]
    pub file_permissions: Option<RawFilePermissions>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawSftpdConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_port")]
    pub listen_port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub privkey_filename: Option<PathBuf>,
    #[serde(default)]
    pub server_pubkey: Option<String>,
    #[serde(default)]
    pub server_pubkey_filename: Option<PathBuf>,
}

impl Default for RawSftpdConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_port(),
            username: default_username(),
            privkey_filename: None,
            server_pubkey: None,
            server_pubkey_filename: None,
        }
    }
}

/// Raw service-update descriptor, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawServiceDef {
    Container {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        filters: Option<HashMap<String, String>>,
        #[serde(default)]
        timeout: Option<f64>,
    },
    OrchestratorService {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        filters: Option<HashMap<String, String>>,
        #[serde(default)]
        timeout: Option<f64>,
    },
    InitUnit {
        name: String,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        timeout: Option<f64>,
    },
    RcUnit {
        name: String,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        timeout: Option<f64>,
    },
    Script {
        name: String,
        #[serde(default)]
        timeout: Option<f64>,
    },
}

/// Owner or group reference: numeric id or a name to resolve.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawOwnerRef {
    Id(u32),
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RawFilePermissions {
    #[serde(default)]
    pub mode: Option<u32>,
    #[serde(default)]
    pub directory_mode: Option<u32>,
    #[serde(default)]
    pub owner: Option<RawOwnerRef>,
    #[serde(default)]
    pub group: Option<RawOwnerRef>,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    22
}

fn default_username() -> String {
    "certdeploy".to_owned()
}

fn default_remote_path() -> PathBuf {
    PathBuf::from("/var/cache/certdeploy")
}

fn default_queue_dir() -> PathBuf {
    PathBuf::from("/var/run/certdeploy")
}

fn default_renew_every() -> u32 {
    1
}

fn default_renew_unit() -> String {
    "day".to_owned()
}

fn default_renew_args() -> Vec<String> {
    vec!["renew".to_owned()]
}

fn default_push_retries() -> u32 {
    1
}

fn default_push_retry_interval() -> u64 {
    30
}

fn default_sftp_banner_timeout() -> u64 {
    30
}

fn default_update_delay() -> Option<String> {
    Some("1h".to_owned())
}

fn default_systemd_exec() -> PathBuf {
    PathBuf::from("systemctl")
}

fn default_rc_service_exec() -> PathBuf {
    PathBuf::from("service")
}

fn default_docker_url() -> String {
    "unix:///var/run/docker.sock".to_owned()
}

fn default_docker_timeout() -> Option<f64> {
    Some(10.0)
}

fn default_listen_address() -> String {
    "0.0.0.0".to_owned()
}

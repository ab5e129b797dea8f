//! Test support: ready-made configs and key material.
//!
//! Only compiled with the `support` feature; the server and client crates
//! enable it from their dev-dependencies.

use std::path::Path;
use std::time::Duration;

use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, PrivateKey};

use crate::keys::PinnedKey;
use crate::types::*;

/// A fresh ed25519 keypair: the private key and the one-line OpenSSH public
/// key.
pub fn keypair() -> (PrivateKey, String) {
    #[allow(clippy::unwrap_used)]
    let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
    #[allow(clippy::unwrap_used)]
    let line = key.public_key().to_openssh().unwrap();
    (key, line)
}

/// A client connection with its own fresh pinned key and library defaults.
pub fn client_conn(address: &str, domains: &[&str]) -> ClientConnection {
    let (_, pubkey_line) = keypair();
    #[allow(clippy::unwrap_used)]
    let pubkey = PinnedKey::parse("pubkey", &pubkey_line).unwrap();
    ClientConnection {
        address: address.to_string(),
        port: 22,
        username: "certdeploy".to_string(),
        pubkey,
        domains: domains.iter().map(|d| d.to_string()).collect(),
        remote_path: "/var/cache/certdeploy".into(),
        needs_chain: false,
        needs_fullchain: true,
        needs_privkey: true,
        needs_cert: false,
        push_retries: None,
        push_retry_interval: None,
    }
}

/// A server config with library defaults, a fresh private key, and the given
/// clients. `queue_dir` points at the system temp dir; override per test.
pub fn server_config(clients: Vec<ClientConnection>) -> ServerConfig {
    let (private_key, _) = keypair();
    ServerConfig {
        private_key,
        clients,
        fail_fast: false,
        log: SinkConfig::default(),
        sftp_log: SinkConfig::default(),
        renew: RenewConfig {
            every: 1,
            unit: RenewUnit::Day,
            at: None,
            exec: "certbot".into(),
            args: vec!["renew".to_string()],
            timeout: None,
        },
        push_mode: PushMode::Serial,
        push_interval: Duration::ZERO,
        push_retries: 1,
        push_retry_interval: Duration::from_secs(30),
        join_timeout: None,
        sftp_banner_timeout: Duration::from_secs(30),
        queue_dir: std::env::temp_dir(),
    }
}

/// A client config with library defaults and a fresh sftpd keypair. The
/// pinned server key is returned alongside so tests can authenticate.
pub fn client_config(source: &Path, destination: &Path) -> (ClientConfig, PrivateKey) {
    let (host_key, _) = keypair();
    let (server_key, server_line) = keypair();
    #[allow(clippy::unwrap_used)]
    let server_pubkey = PinnedKey::parse("server_pubkey", &server_line).unwrap();
    let config = ClientConfig {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        update_services: Vec::new(),
        update_delay: Duration::ZERO,
        script_timeout: None,
        init_timeout: None,
        docker_timeout: Some(Duration::from_secs(10)),
        systemd_exec: "systemctl".into(),
        rc_service_exec: "service".into(),
        docker_url: "unix:///var/run/docker.sock".to_string(),
        file_permissions: None,
        sftpd: SftpdConfig {
            listen_address: "127.0.0.1".to_string(),
            listen_port: 0,
            username: "certdeploy".to_string(),
            private_key: host_key,
            server_pubkey,
        },
        fail_fast: false,
        log: SinkConfig::default(),
        sftp_log: SinkConfig::default(),
    };
    (config, server_key)
}

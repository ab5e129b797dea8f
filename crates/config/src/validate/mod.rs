mod parse;
mod service;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::keys::{self, PinnedKey};
use crate::types::*;

/// Resolve a raw server config into a fully validated `ServerConfig`.
pub fn resolve_server(raw: RawServerConfig) -> Result<ServerConfig> {
    let mut errors = Vec::new();

    // The private key gates everything else; fail immediately if unreadable.
    let private_key = keys::load_private_key("privkey_filename", &raw.privkey_filename)?;

    parse::check_dir("queue_dir", &raw.queue_dir, &mut errors);

    let mut clients = Vec::new();
    for (i, raw_conn) in raw.clients.iter().enumerate() {
        match resolve_client_conn(&format!("clients[{i}]"), raw_conn) {
            Ok(conn) => clients.push(conn),
            Err(ConfigError::Multiple(errs)) => errors.extend(errs),
            Err(e) => errors.push(e),
        }
    }
    if let Some(dir) = &raw.client_source_dir {
        match load_client_conn_dir(dir) {
            Ok(more) => clients.extend(more),
            Err(e) => errors.push(e),
        }
    }
    if clients.is_empty() {
        errors.push(ConfigError::invalid(
            "clients",
            "a non-empty list of client connections (inline or via `client_source_dir`)",
        ));
    }

    let push_mode = match &raw.push_mode {
        None => PushMode::default(),
        Some(text) => match text.parse() {
            Ok(mode) => mode,
            Err(e) => {
                errors.push(e);
                PushMode::default()
            }
        },
    };

    let renew = resolve_renew(&raw, &mut errors);
    let join_timeout = parse::parse_opt_secs("join_timeout", raw.join_timeout, &mut errors);

    let log = SinkConfig {
        filename: raw.log_filename.clone().unwrap_or_else(|| SinkConfig::default().filename),
        level: parse::parse_level("log_level", raw.log_level.as_deref(), &mut errors),
    };
    let sftp_log = SinkConfig {
        filename: raw.sftp_log_filename.clone().unwrap_or_else(|| SinkConfig::default().filename),
        level: parse::parse_level("sftp_log_level", raw.sftp_log_level.as_deref(), &mut errors),
    };

    if !errors.is_empty() {
        return Err(collapse(errors));
    }

    Ok(ServerConfig {
        private_key,
        clients,
        fail_fast: raw.fail_fast,
        log,
        sftp_log,
        renew,
        push_mode,
        push_interval: Duration::from_secs(raw.push_interval),
        push_retries: raw.push_retries,
        push_retry_interval: Duration::from_secs(raw.push_retry_interval),
        join_timeout,
        sftp_banner_timeout: Duration::from_secs(raw.sftp_banner_timeout),
        queue_dir: raw.queue_dir,
    })
}

fn resolve_renew(raw: &RawServerConfig, errors: &mut Vec<ConfigError>) -> RenewConfig {
    let unit = match raw.renew_unit.parse::<RenewUnit>() {
        Ok(unit) => unit,
        Err(e) => {
            errors.push(e);
            RenewUnit::Day
        }
    };
    if raw.renew_every < 1 {
        errors.push(ConfigError::invalid("renew_every", "an integer greater than 0"));
    }
    if unit.is_weekday() && raw.renew_every != 1 {
        errors.push(ConfigError::invalid(
            "renew_unit",
            "an interval unit when `renew_every` is not 1 (weekdays do not repeat)",
        ));
    }
    let at = match &raw.renew_at {
        None => None,
        Some(text) => match text.parse::<TimeOfDay>() {
            Ok(at) => {
                if matches!(unit, RenewUnit::Minute | RenewUnit::Hour) {
                    errors.push(ConfigError::invalid(
                        "renew_at",
                        "unset for minute and hour units",
                    ));
                }
                Some(at)
            }
            Err(e) => {
                errors.push(e);
                None
            }
        },
    };
    RenewConfig {
        every: raw.renew_every,
        unit,
        at,
        exec: raw.renew_exec.clone().unwrap_or_else(|| "certbot".into()),
        args: raw.renew_args.clone(),
        timeout: parse::parse_opt_secs("renew_timeout", raw.renew_timeout, errors),
    }
}

fn resolve_client_conn(path: &str, raw: &RawClientConn) -> Result<ClientConnection> {
    let mut errors = Vec::new();

    if raw.address.trim().is_empty() {
        errors.push(ConfigError::invalid(format!("{path}.address"), "a non-empty hostname"));
    }
    if raw.domains.is_empty() {
        errors.push(ConfigError::invalid(
            format!("{path}.domains"),
            "a non-empty list of domain names",
        ));
    }
    let pubkey = match PinnedKey::parse(&format!("{path}.pubkey"), &raw.pubkey) {
        Ok(key) => Some(key),
        Err(e) => {
            errors.push(e);
            None
        }
    };
    let push_retry_interval = raw.push_retry_interval.map(Duration::from_secs);

    match (pubkey, errors.is_empty()) {
        (Some(pubkey), true) => Ok(ClientConnection {
            address: raw.address.trim().to_string(),
            port: raw.port,
            username: raw.username.clone(),
            pubkey,
            domains: raw.domains.clone(),
            remote_path: raw.remote_path.clone(),
            needs_chain: raw.needs_chain,
            needs_fullchain: raw.needs_fullchain,
            needs_privkey: raw.needs_privkey,
            needs_cert: raw.needs_cert,
            push_retries: raw.push_retries,
            push_retry_interval,
        }),
        _ => Err(collapse(errors)),
    }
}

/// Load one-descriptor YAML files from a directory, sorted by filename.
fn load_client_conn_dir(dir: &Path) -> Result<Vec<ClientConnection>> {
    let entries = std::fs::read_dir(dir).map_err(|_| ConfigError::InvalidPath {
        field: "client_source_dir".to_string(),
        kind: "a readable directory",
        path: dir.display().to_string(),
    })?;
    let mut files: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    let mut clients = Vec::new();
    for file in files {
        let text = std::fs::read_to_string(&file).map_err(|e| {
            ConfigError::Parse(format!("{}: {e}", file.display()))
        })?;
        let raw: RawClientConn = serde_yaml::from_str(&text)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", file.display())))?;
        clients.push(resolve_client_conn(&file.display().to_string(), &raw)?);
    }
    Ok(clients)
}

/// Resolve a raw client config into a fully validated `ClientConfig`.
pub fn resolve_client(raw: RawClientConfig) -> Result<ClientConfig> {
    let mut errors = Vec::new();

    parse::check_dir("source", &raw.source, &mut errors);
    parse::check_dir("destination", &raw.destination, &mut errors);

    let mut update_services = Vec::new();
    for (i, raw_service) in raw.update_services.iter().enumerate() {
        match service::resolve_service(&format!("update_services[{i}]"), raw_service) {
            Ok(kind) => update_services.push(kind),
            Err(ConfigError::Multiple(errs)) => errors.extend(errs),
            Err(e) => errors.push(e),
        }
    }

    let update_delay = match &raw.update_delay {
        None => Duration::ZERO,
        Some(text) => parse::parse_duration_text("update_delay", text, &mut errors),
    };

    let script_timeout = parse::parse_opt_secs("script_timeout", raw.script_timeout, &mut errors);
    let init_timeout = parse::parse_opt_secs("init_timeout", raw.init_timeout, &mut errors);
    let docker_timeout = parse::parse_opt_secs("docker_timeout", raw.docker_timeout, &mut errors);

    let file_permissions = raw.file_permissions.as_ref().map(resolve_permissions);

    let log = SinkConfig {
        filename: raw.log_filename.clone().unwrap_or_else(|| SinkConfig::default().filename),
        level: parse::parse_level("log_level", raw.log_level.as_deref(), &mut errors),
    };
    let sftp_log = SinkConfig {
        filename: raw.sftp_log_filename.clone().unwrap_or_else(|| SinkConfig::default().filename),
        level: parse::parse_level("sftp_log_level", raw.sftp_log_level.as_deref(), &mut errors),
    };

    // The sftpd key material gates the listener; resolve it last so path and
    // service errors above still surface together with key problems.
    let sftpd = match resolve_sftpd(&raw.sftpd) {
        Ok(sftpd) => Some(sftpd),
        Err(ConfigError::Multiple(errs)) => {
            errors.extend(errs);
            None
        }
        Err(e) => {
            errors.push(e);
            None
        }
    };

    match (sftpd, errors.is_empty()) {
        (Some(sftpd), true) => Ok(ClientConfig {
            source: raw.source,
            destination: raw.destination,
            update_services,
            update_delay,
            script_timeout,
            init_timeout,
            docker_timeout,
            systemd_exec: raw.systemd_exec,
            rc_service_exec: raw.rc_service_exec,
            docker_url: raw.docker_url,
            file_permissions,
            sftpd,
            fail_fast: raw.fail_fast,
            log,
            sftp_log,
        }),
        _ => Err(collapse(errors)),
    }
}

fn resolve_sftpd(raw: &RawSftpdConfig) -> Result<SftpdConfig> {
    let privkey = raw.privkey_filename.as_ref().ok_or_else(|| {
        ConfigError::invalid("sftpd.privkey_filename", "the path of the client private key")
    })?;
    let private_key = keys::load_private_key("sftpd.privkey_filename", privkey)?;

    let server_pubkey = match (&raw.server_pubkey, &raw.server_pubkey_filename) {
        (Some(text), None) => PinnedKey::parse("sftpd.server_pubkey", text)?,
        (None, Some(path)) => PinnedKey::from_file("sftpd.server_pubkey_filename", path)?,
        _ => {
            return Err(ConfigError::invalid(
                "sftpd.server_pubkey",
                "set (or `server_pubkey_filename`, but not both)",
            ));
        }
    };

    Ok(SftpdConfig {
        listen_address: raw.listen_address.clone(),
        listen_port: raw.listen_port,
        username: raw.username.clone(),
        private_key,
        server_pubkey,
    })
}

fn resolve_permissions(raw: &RawFilePermissions) -> FilePermissions {
    fn owner(raw: &RawOwnerRef) -> OwnerRef {
        match raw {
            RawOwnerRef::Id(id) => OwnerRef::Id(*id),
            RawOwnerRef::Name(name) => OwnerRef::Name(name.clone()),
        }
    }
    FilePermissions {
        mode: raw.mode,
        directory_mode: raw.directory_mode,
        owner: raw.owner.as_ref().map(owner),
        group: raw.group.as_ref().map(owner),
    }
}

pub(crate) fn collapse(mut errors: Vec<ConfigError>) -> ConfigError {
    if errors.len() == 1 {
        errors.remove(0)
    } else {
        ConfigError::Multiple(errors)
    }
}

/// Normalize container-kind filters: a bare name becomes an exact-match
/// `name` filter.
pub fn name_filters(name: &str) -> HashMap<String, String> {
    HashMap::from([("name".to_string(), format!("^{name}$"))])
}

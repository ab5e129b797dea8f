use std::path::Path;
use std::time::Duration;

use certdeploy_config::{ConfigError, LogLevel, PushMode, RenewUnit, ServiceKind};
use ssh_key::rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};
use tempfile::TempDir;
use yare::parameterized;

struct Fixture {
    dir: TempDir,
    privkey_path: String,
    pubkey_line: String,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let privkey_path = dir.path().join("id_ed25519");
        std::fs::write(&privkey_path, key.to_openssh(LineEnding::LF).unwrap().as_bytes()).unwrap();
        let pubkey_line = key.public_key().to_openssh().unwrap();
        Self { dir, privkey_path: privkey_path.display().to_string(), pubkey_line }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn server_yaml(&self, extra: &str) -> String {
        format!(
            "privkey_filename: {}\nqueue_dir: {}\nclients:\n  - address: client.example.com\n    domains: [example.com]\n    pubkey: \"{}\"\n{extra}",
            self.privkey_path,
            self.path().display(),
            self.pubkey_line,
        )
    }

    fn client_yaml(&self, extra: &str) -> String {
        let source = self.path().join("source");
        let destination = self.path().join("destination");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&destination).unwrap();
        format!(
            "source: {}\ndestination: {}\nsftpd:\n  privkey_filename: {}\n  server_pubkey: \"{}\"\n{extra}",
            source.display(),
            destination.display(),
            self.privkey_path,
            self.pubkey_line,
        )
    }
}

// --- Server configs ---

#[test]
fn server_defaults() {
    let fx = Fixture::new();
    let config = certdeploy_config::parse_server(&fx.server_yaml("")).unwrap();

    assert_eq!(config.push_mode, PushMode::Serial);
    assert_eq!(config.push_interval, Duration::ZERO);
    assert_eq!(config.push_retries, 1);
    assert_eq!(config.push_retry_interval, Duration::from_secs(30));
    assert_eq!(config.join_timeout, None);
    assert!(!config.fail_fast);
    assert_eq!(config.renew.every, 1);
    assert_eq!(config.renew.unit, RenewUnit::Day);
    assert_eq!(config.renew.exec, Path::new("certbot"));
    assert_eq!(config.renew.args, vec!["renew".to_string()]);
    assert_eq!(config.log.level, LogLevel::Error);
    assert_eq!(config.log.filename, Path::new("/dev/stdout"));

    let client = &config.clients[0];
    assert_eq!(client.port, 22);
    assert_eq!(client.username, "certdeploy");
    assert_eq!(client.remote_path, Path::new("/var/cache/certdeploy"));
    assert!(!client.needs_chain);
    assert!(client.needs_fullchain);
    assert!(client.needs_privkey);
    assert!(!client.needs_cert);
    assert_eq!(client.push_retries, None);
}

#[test]
fn server_unknown_key_is_rejected() {
    let fx = Fixture::new();
    let err = certdeploy_config::parse_server(&fx.server_yaml("shove_mode: hard\n")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
}

#[test]
fn server_requires_at_least_one_client() {
    let fx = Fixture::new();
    let yaml = format!(
        "privkey_filename: {}\nqueue_dir: {}\n",
        fx.privkey_path,
        fx.path().display()
    );
    let err = certdeploy_config::parse_server(&yaml).unwrap_err();
    assert!(err.to_string().contains("clients"), "got {err}");
}

#[parameterized(
    serial = { "serial", PushMode::Serial },
    parallel = { "parallel", PushMode::Parallel },
    upper = { "PARALLEL", PushMode::Parallel },
)]
fn push_mode_parses(text: &str, expected: PushMode) {
    let fx = Fixture::new();
    let config =
        certdeploy_config::parse_server(&fx.server_yaml(&format!("push_mode: {text}\n"))).unwrap();
    assert_eq!(config.push_mode, expected);
}

#[test]
fn bad_push_mode_is_rejected() {
    let fx = Fixture::new();
    let err =
        certdeploy_config::parse_server(&fx.server_yaml("push_mode: sideways\n")).unwrap_err();
    assert!(err.to_string().contains("push_mode"), "got {err}");
}

#[parameterized(
    minute = { "minute", RenewUnit::Minute },
    hour = { "hour", RenewUnit::Hour },
    week = { "week", RenewUnit::Week },
    sunday = { "sunday", RenewUnit::Weekday(6) },
)]
fn renew_units_parse(text: &str, expected: RenewUnit) {
    let fx = Fixture::new();
    let config =
        certdeploy_config::parse_server(&fx.server_yaml(&format!("renew_unit: {text}\n"))).unwrap();
    assert_eq!(config.renew.unit, expected);
}

#[test]
fn unknown_renew_unit_is_config_error() {
    let fx = Fixture::new();
    let err =
        certdeploy_config::parse_server(&fx.server_yaml("renew_unit: fortnight\n")).unwrap_err();
    assert!(err.to_string().contains("renew_unit"), "got {err}");
}

#[test]
fn weekday_with_multiplier_is_rejected() {
    let fx = Fixture::new();
    let err = certdeploy_config::parse_server(
        &fx.server_yaml("renew_unit: monday\nrenew_every: 2\n"),
    )
    .unwrap_err();
    assert!(err.to_string().contains("renew_unit"), "got {err}");
}

#[test]
fn renew_at_parses() {
    let fx = Fixture::new();
    let config = certdeploy_config::parse_server(
        &fx.server_yaml("renew_unit: day\nrenew_at: \"03:30\"\n"),
    )
    .unwrap();
    let at = config.renew.at.unwrap();
    assert_eq!((at.hour, at.minute), (3, 30));
}

#[parameterized(
    not_a_time = { "soonish" },
    hour_out_of_range = { "\"25:00\"" },
    minute_out_of_range = { "\"10:71\"" },
)]
fn bad_renew_at_is_rejected(text: &str) {
    let fx = Fixture::new();
    let err = certdeploy_config::parse_server(&fx.server_yaml(&format!("renew_at: {text}\n")))
        .unwrap_err();
    assert!(err.to_string().contains("renew_at"), "got {err}");
}

#[test]
fn client_overrides_are_kept_optional() {
    let fx = Fixture::new();
    let yaml = fx.server_yaml("");
    let yaml = yaml.replace(
        "    pubkey:",
        "    push_retries: 0\n    push_retry_interval: 5\n    pubkey:",
    );
    let config = certdeploy_config::parse_server(&yaml).unwrap();
    let client = &config.clients[0];
    assert_eq!(client.push_retries, Some(0));
    assert_eq!(client.push_retry_interval, Some(Duration::from_secs(5)));
}

#[test]
fn client_source_dir_descriptors_are_merged_in_filename_order() {
    let fx = Fixture::new();
    let conn_dir = fx.path().join("clients.d");
    std::fs::create_dir_all(&conn_dir).unwrap();
    for (file, address) in [("10-b.yml", "b.example.com"), ("00-a.yml", "a.example.com")] {
        std::fs::write(
            conn_dir.join(file),
            format!(
                "address: {address}\ndomains: [example.org]\npubkey: \"{}\"\n",
                fx.pubkey_line
            ),
        )
        .unwrap();
    }
    let config = certdeploy_config::parse_server(
        &fx.server_yaml(&format!("client_source_dir: {}\n", conn_dir.display())),
    )
    .unwrap();

    // Inline client first, then directory entries sorted by filename.
    let addresses: Vec<&str> = config.clients.iter().map(|c| c.address.as_str()).collect();
    assert_eq!(addresses, vec!["client.example.com", "a.example.com", "b.example.com"]);
}

#[test]
fn duplicate_address_entries_are_distinct_targets() {
    let fx = Fixture::new();
    let conn_dir = fx.path().join("clients.d");
    std::fs::create_dir_all(&conn_dir).unwrap();
    std::fs::write(
        conn_dir.join("dup.yml"),
        format!(
            "address: client.example.com\ndomains: [example.com]\npubkey: \"{}\"\n",
            fx.pubkey_line
        ),
    )
    .unwrap();
    let config = certdeploy_config::parse_server(
        &fx.server_yaml(&format!("client_source_dir: {}\n", conn_dir.display())),
    )
    .unwrap();
    assert_eq!(config.clients.len(), 2);
}

#[test]
fn empty_domains_is_rejected() {
    let fx = Fixture::new();
    let yaml = fx.server_yaml("").replace("domains: [example.com]", "domains: []");
    let err = certdeploy_config::parse_server(&yaml).unwrap_err();
    assert!(err.to_string().contains("domains"), "got {err}");
}

// --- Client configs ---

#[test]
fn client_defaults() {
    let fx = Fixture::new();
    let config = certdeploy_config::parse_client(&fx.client_yaml("")).unwrap();

    assert!(config.update_services.is_empty());
    assert_eq!(config.update_delay, Duration::from_secs(3600));
    assert_eq!(config.docker_timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.script_timeout, None);
    assert_eq!(config.init_timeout, None);
    assert_eq!(config.systemd_exec, Path::new("systemctl"));
    assert_eq!(config.rc_service_exec, Path::new("service"));
    assert_eq!(config.docker_url, "unix:///var/run/docker.sock");
    assert_eq!(config.sftpd.listen_port, 22);
    assert_eq!(config.sftpd.listen_address, "0.0.0.0");
    assert_eq!(config.sftpd.username, "certdeploy");
    assert!(config.file_permissions.is_none());
}

#[test]
fn null_update_delay_means_no_delay() {
    let fx = Fixture::new();
    let config = certdeploy_config::parse_client(&fx.client_yaml("update_delay: null\n")).unwrap();
    assert_eq!(config.update_delay, Duration::ZERO);
}

#[test]
fn update_services_preserve_declaration_order() {
    let fx = Fixture::new();
    let script = fx.path().join("notify.sh");
    std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
    let config = certdeploy_config::parse_client(&fx.client_yaml(&format!(
        "update_services:\n  - type: init_unit\n    name: nginx.service\n  - type: container\n    name: proxy\n  - type: script\n    name: {}\n",
        script.display()
    )))
    .unwrap();

    assert_eq!(config.update_services.len(), 3);
    assert!(matches!(config.update_services[0], ServiceKind::InitUnit { .. }));
    assert!(matches!(config.update_services[1], ServiceKind::Container { .. }));
    assert!(matches!(config.update_services[2], ServiceKind::Script { .. }));
}

#[test]
fn unknown_service_type_is_rejected() {
    let fx = Fixture::new();
    let err = certdeploy_config::parse_client(
        &fx.client_yaml("update_services:\n  - type: carrier_pigeon\n    name: coop\n"),
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)), "got {err:?}");
}

#[test]
fn file_permissions_accept_ids_and_names() {
    let fx = Fixture::new();
    let config = certdeploy_config::parse_client(&fx.client_yaml(
        "file_permissions:\n  mode: 0o600\n  directory_mode: 0o700\n  owner: root\n  group: 0\n",
    ))
    .unwrap();
    let perms = config.file_permissions.unwrap();
    assert_eq!(perms.mode, Some(0o600));
    assert_eq!(perms.directory_mode, Some(0o700));
    assert_eq!(perms.owner, Some(certdeploy_config::OwnerRef::Name("root".to_string())));
    assert_eq!(perms.group, Some(certdeploy_config::OwnerRef::Id(0)));
}

#[test]
fn sftpd_requires_exactly_one_pubkey_source() {
    let fx = Fixture::new();
    let yaml = fx.client_yaml("");
    let yaml = yaml.replace(&format!("  server_pubkey: \"{}\"\n", fx.pubkey_line), "");
    let err = certdeploy_config::parse_client(&yaml).unwrap_err();
    assert!(err.to_string().contains("server_pubkey"), "got {err}");
}

#[test]
fn missing_source_dir_is_rejected() {
    let fx = Fixture::new();
    let yaml = fx.client_yaml("");
    let missing = fx.path().join("nope");
    let yaml = yaml.replace(
        &format!("source: {}", fx.path().join("source").display()),
        &format!("source: {}", missing.display()),
    );
    let err = certdeploy_config::parse_client(&yaml).unwrap_err();
    assert!(err.to_string().contains("source"), "got {err}");
}

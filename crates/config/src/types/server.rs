use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ssh_key::PrivateKey;

use crate::error::ConfigError;
use crate::keys::PinnedKey;

use super::log::SinkConfig;

/// How the push engine walks the client list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushMode {
    /// One client at a time, declaration order.
    #[default]
    Serial,
    /// One worker per client.
    Parallel,
}

impl FromStr for PushMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" => Ok(PushMode::Serial),
            "parallel" => Ok(PushMode::Parallel),
            _ => Err(ConfigError::invalid("push_mode", "either \"serial\" or \"parallel\"")),
        }
    }
}

/// Renewal interval unit. Weekday units require `renew_every == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewUnit {
    Minute,
    Hour,
    Day,
    Week,
    /// Day of week, 0 = Monday .. 6 = Sunday.
    Weekday(u8),
}

impl RenewUnit {
    pub fn is_weekday(self) -> bool {
        matches!(self, RenewUnit::Weekday(_))
    }
}

impl FromStr for RenewUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minute" => Ok(RenewUnit::Minute),
            "hour" => Ok(RenewUnit::Hour),
            "day" => Ok(RenewUnit::Day),
            "week" => Ok(RenewUnit::Week),
            "monday" => Ok(RenewUnit::Weekday(0)),
            "tuesday" => Ok(RenewUnit::Weekday(1)),
            "wednesday" => Ok(RenewUnit::Weekday(2)),
            "thursday" => Ok(RenewUnit::Weekday(3)),
            "friday" => Ok(RenewUnit::Weekday(4)),
            "saturday" => Ok(RenewUnit::Weekday(5)),
            "sunday" => Ok(RenewUnit::Weekday(6)),
            _ => Err(ConfigError::invalid(
                "renew_unit",
                "a day of the week or an interval unit (minute, hour, day, week)",
            )),
        }
    }
}

/// Wall-clock `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
}

impl FromStr for TimeOfDay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::invalid("renew_at", "a wall-clock time formatted HH:MM");
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(Self { hour, minute })
    }
}

/// Everything the renewal scheduler needs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenewConfig {
    pub every: u32,
    pub unit: RenewUnit,
    pub at: Option<TimeOfDay>,
    /// Renewal executable; resolved via PATH when relative.
    pub exec: PathBuf,
    pub args: Vec<String>,
    pub timeout: Option<Duration>,
}

/// Connection descriptor for one remote client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConnection {
    pub address: String,
    pub port: u16,
    pub username: String,
    pub pubkey: PinnedKey,
    pub domains: Vec<String>,
    pub remote_path: PathBuf,
    pub needs_chain: bool,
    pub needs_fullchain: bool,
    pub needs_privkey: bool,
    pub needs_cert: bool,
    /// Overrides the server-wide `push_retries` when set.
    pub push_retries: Option<u32>,
    /// Overrides the server-wide `push_retry_interval` when set.
    pub push_retry_interval: Option<Duration>,
}

impl ClientConnection {
    /// True when this client wants certs for any of `domains`.
    pub fn wants_any(&self, domains: &[String]) -> bool {
        domains.iter().any(|d| self.domains.contains(d))
    }
}

impl fmt::Display for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@[{}]:{}", self.username, self.address, self.port)
    }
}

/// Fully validated server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub private_key: PrivateKey,
    pub clients: Vec<ClientConnection>,
    pub fail_fast: bool,
    pub log: SinkConfig,
    pub sftp_log: SinkConfig,
    pub renew: RenewConfig,
    pub push_mode: PushMode,
    pub push_interval: Duration,
    pub push_retries: u32,
    pub push_retry_interval: Duration,
    pub join_timeout: Option<Duration>,
    pub sftp_banner_timeout: Duration,
    pub queue_dir: PathBuf,
}

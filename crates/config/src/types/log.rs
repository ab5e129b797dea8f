use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Log severity as exposed in configs and on the command line.
///
/// `CRITICAL` exists for config compatibility and filters the same as
/// `ERROR`; tracing has no level above error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    #[default]
    Error,
    Critical,
}

impl LogLevel {
    /// The most verbose tracing level this config level lets through.
    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error | LogLevel::Critical => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            _ => Err(ConfigError::invalid(
                "log_level",
                "one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
            )),
        }
    }
}

/// One log sink: a file path and a level.
///
/// `/dev/stdout` is the default destination; `/dev/null` discards.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    pub filename: PathBuf,
    pub level: LogLevel,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self { filename: PathBuf::from("/dev/stdout"), level: LogLevel::Error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("Debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
    }

    #[test]
    fn unknown_level_is_config_error() {
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn critical_filters_as_error() {
        assert_eq!(LogLevel::Critical.as_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn warning_renders_in_full() {
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
    }
}

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod error;
pub mod keys;
pub mod logging;
mod types;
mod validate;

#[cfg(feature = "support")]
pub mod support;

use std::path::Path;

pub use error::{ConfigError, Result};
pub use types::*;
pub use validate::name_filters;

/// Parse a YAML server config string into a fully validated `ServerConfig`.
pub fn parse_server(input: &str) -> Result<ServerConfig> {
    validate::resolve_server(parse_server_raw(input)?)
}

/// Parse a YAML server config string into raw (unvalidated) structs.
pub fn parse_server_raw(input: &str) -> Result<RawServerConfig> {
    serde_yaml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load and validate a server config file.
pub fn load_server(path: &Path) -> Result<ServerConfig> {
    parse_server(&read(path)?)
}

/// Parse a YAML client config string into a fully validated `ClientConfig`.
pub fn parse_client(input: &str) -> Result<ClientConfig> {
    validate::resolve_client(parse_client_raw(input)?)
}

/// Parse a YAML client config string into raw (unvalidated) structs.
pub fn parse_client_raw(input: &str) -> Result<RawClientConfig> {
    serde_yaml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Load and validate a client config file.
pub fn load_client(path: &Path) -> Result<ClientConfig> {
    parse_client(&read(path)?)
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Parse(format!("failed to read config {}: {e}", path.display()))
    })
}

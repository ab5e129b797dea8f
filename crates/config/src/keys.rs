//! ed25519 key material and peer pinning.
//!
//! Both sides authenticate by exact public-key equality against a key pinned
//! in the config. There is no known_hosts file and no trust-on-first-use.

use std::path::Path;

use ssh_key::{Algorithm, PrivateKey, PublicKey};

use crate::error::{ConfigError, Result};

/// Load a local ed25519 private key from an OpenSSH-format file.
///
/// Passphrase-protected keys are rejected; the daemons have no way to prompt.
pub fn load_private_key(field: &str, path: &Path) -> Result<PrivateKey> {
    let key = PrivateKey::read_openssh_file(path).map_err(|e| ConfigError::Invalid {
        field: field.to_string(),
        must_be: format!("a readable OpenSSH private key ({e})"),
    })?;
    if key.is_encrypted() {
        return Err(ConfigError::invalid(field, "an unencrypted private key"));
    }
    if key.algorithm() != Algorithm::Ed25519 {
        return Err(ConfigError::invalid(field, "an ed25519 private key"));
    }
    Ok(key)
}

/// A pinned remote public key.
///
/// Parsed from either a full `ssh-ed25519 AAAA... comment` line or the bare
/// base64 blob. The trailing comment is discarded; only the key data is
/// compared.
#[derive(Debug, Clone, PartialEq)]
pub struct PinnedKey {
    key: PublicKey,
}

impl PinnedKey {
    /// Parse a pinned key from config text.
    pub fn parse(field: &str, text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ConfigError::invalid(field, "a non-empty ed25519 public key"));
        }
        let openssh = if text.starts_with("ssh-") {
            text.to_string()
        } else {
            format!("ssh-ed25519 {text}")
        };
        let key = PublicKey::from_openssh(&openssh).map_err(|e| ConfigError::Invalid {
            field: field.to_string(),
            must_be: format!("an OpenSSH ed25519 public key ({e})"),
        })?;
        if key.algorithm() != Algorithm::Ed25519 {
            return Err(ConfigError::invalid(field, "an ed25519 public key"));
        }
        Ok(Self { key })
    }

    /// Parse a pinned key from a file on disk.
    pub fn from_file(field: &str, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|_| ConfigError::InvalidPath {
            field: field.to_string(),
            kind: "a readable public key file",
            path: path.display().to_string(),
        })?;
        Self::parse(field, &text)
    }

    /// Exact key-data equality against a presented peer key.
    pub fn matches(&self, presented: &PublicKey) -> bool {
        self.key.key_data() == presented.key_data()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// The key rendered as a one-line OpenSSH string, comment stripped.
    pub fn to_openssh(&self) -> String {
        let mut key = self.key.clone();
        key.set_comment("");
        key.to_openssh().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use ssh_key::rand_core::OsRng;

    use super::*;

    fn generate() -> PrivateKey {
        PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()
    }

    #[test]
    fn parse_full_line_and_bare_blob() {
        let key = generate();
        let mut public = key.public_key().clone();
        public.set_comment("someone@somewhere");
        let line = public.to_openssh().unwrap();

        let pinned = PinnedKey::parse("pubkey", &line).unwrap();
        assert!(pinned.matches(key.public_key()));

        // The bare base64 blob (second whitespace-separated field) also parses.
        let blob = line.split_whitespace().nth(1).unwrap();
        let pinned = PinnedKey::parse("pubkey", blob).unwrap();
        assert!(pinned.matches(key.public_key()));
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let ours = generate();
        let theirs = generate();
        let pinned = PinnedKey::parse("pubkey", &ours.public_key().to_openssh().unwrap()).unwrap();
        assert!(!pinned.matches(theirs.public_key()));
    }

    #[test]
    fn empty_and_garbage_are_config_errors() {
        assert!(PinnedKey::parse("pubkey", "").is_err());
        assert!(PinnedKey::parse("pubkey", "not a key").is_err());
    }

    #[test]
    fn non_ed25519_is_rejected() {
        let rsa = "ssh-rsa AAAAB3NzaC1yc2EAAAADAQABAAAAgQDTest not-a-real-key";
        assert!(PinnedKey::parse("pubkey", rsa).is_err());
    }

    #[test]
    fn private_key_round_trip_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519");
        let key = generate();
        std::fs::write(&path, key.to_openssh(ssh_key::LineEnding::LF).unwrap().as_bytes())
            .unwrap();

        let loaded = load_private_key("privkey_filename", &path).unwrap();
        assert_eq!(loaded.public_key().key_data(), key.public_key().key_data());
    }

    #[test]
    fn missing_private_key_is_config_error() {
        let err = load_private_key("privkey_filename", Path::new("/nonexistent/key")).unwrap_err();
        assert!(err.to_string().contains("privkey_filename"));
    }
}

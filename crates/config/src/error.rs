/// Errors that can occur when parsing or validating a CertDeploy config.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// YAML parse error, including unknown keys.
    #[error("ConfigError: {0}")]
    Parse(String),
    /// A field has an invalid value. The message follows the
    /// "`field` must be <type-phrase>" convention.
    #[error("ConfigError: `{field}` must be {must_be}")]
    Invalid { field: String, must_be: String },
    /// A required path is missing or of the wrong kind.
    #[error("ConfigError: `{field}` must be {kind}, got: {path}")]
    InvalidPath { field: String, kind: &'static str, path: String },
    /// Multiple errors collected during validation.
    #[error("{}", display_multiple(.0))]
    Multiple(Vec<ConfigError>),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, must_be: impl Into<String>) -> Self {
        Self::Invalid { field: field.into(), must_be: must_be.into() }
    }
}

fn display_multiple(errors: &[ConfigError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
}

pub type Result<T> = std::result::Result<T, ConfigError>;

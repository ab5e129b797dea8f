use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::LogLevel;

/// Parse an optional seconds value (int or float in YAML) into a `Duration`.
/// On failure, pushes an error and returns `None`.
pub fn parse_opt_secs(
    field: &str,
    value: Option<f64>,
    errors: &mut Vec<ConfigError>,
) -> Option<Duration> {
    match value {
        None => None,
        Some(secs) if secs >= 0.0 && secs.is_finite() => Some(Duration::from_secs_f64(secs)),
        Some(_) => {
            errors.push(ConfigError::invalid(field, "a number of seconds >= 0 or null"));
            None
        }
    }
}

/// Parse a duration string like "30s", "1h" or "1w2d".
/// On failure, pushes an error and returns a zero duration.
pub fn parse_duration_text(field: &str, value: &str, errors: &mut Vec<ConfigError>) -> Duration {
    match value.parse::<humantime::Duration>() {
        Ok(d) => d.into(),
        Err(_) => {
            errors.push(ConfigError::invalid(
                field,
                "a duration string such as \"30s\", \"1h\" or \"1w2d\"",
            ));
            Duration::ZERO
        }
    }
}

/// Parse an optional log level name. Absent → `ERROR`.
pub fn parse_level(field: &str, value: Option<&str>, errors: &mut Vec<ConfigError>) -> LogLevel {
    match value {
        None => LogLevel::default(),
        Some(text) => match text.parse() {
            Ok(level) => level,
            Err(_) => {
                errors.push(ConfigError::invalid(
                    field,
                    "one of DEBUG, INFO, WARNING, ERROR, CRITICAL",
                ));
                LogLevel::default()
            }
        },
    }
}

/// Require an existing directory.
pub fn check_dir(field: &str, path: &Path, errors: &mut Vec<ConfigError>) {
    if !path.is_dir() {
        errors.push(ConfigError::InvalidPath {
            field: field.to_string(),
            kind: "an existing directory",
            path: path.display().to_string(),
        });
    }
}

/// Resolve a script name the way a shell would: absolute path as-is, then
/// PATH lookup, then relative to the current directory.
pub fn resolve_script(name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    if let Some(found) = search_path(name) {
        return found;
    }
    std::env::current_dir().unwrap_or_default().join(candidate)
}

fn search_path(name: &str) -> Option<PathBuf> {
    // A name with a separator is never a PATH lookup.
    if name.contains('/') {
        return None;
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join(name)).find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opt_secs_accepts_fractions_and_null() {
        let mut errors = Vec::new();
        assert_eq!(parse_opt_secs("t", Some(1.5), &mut errors), Some(Duration::from_millis(1500)));
        assert_eq!(parse_opt_secs("t", None, &mut errors), None);
        assert!(errors.is_empty());
    }

    #[test]
    fn opt_secs_rejects_negative() {
        let mut errors = Vec::new();
        assert_eq!(parse_opt_secs("t", Some(-1.0), &mut errors), None);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn compound_duration_text() {
        let mut errors = Vec::new();
        let d = parse_duration_text("update_delay", "1m30s", &mut errors);
        assert!(errors.is_empty());
        assert_eq!(d, Duration::from_secs(90));
    }

    #[test]
    fn bad_duration_text_pushes_error() {
        let mut errors = Vec::new();
        parse_duration_text("update_delay", "soon", &mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn resolve_script_keeps_absolute() {
        assert_eq!(resolve_script("/usr/local/bin/reload"), PathBuf::from("/usr/local/bin/reload"));
    }

    #[test]
    fn resolve_script_falls_back_to_cwd() {
        let resolved = resolve_script("definitely-not-on-path.sh");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("definitely-not-on-path.sh"));
    }
}

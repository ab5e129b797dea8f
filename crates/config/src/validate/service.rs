use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::{RawServiceDef, ServiceKind, UnitAction};

use super::{collapse, name_filters, parse};

/// Resolve one raw service descriptor into a validated `ServiceKind`.
pub fn resolve_service(path: &str, raw: &RawServiceDef) -> Result<ServiceKind> {
    let mut errors = Vec::new();
    let kind = match raw {
        RawServiceDef::Container { name, filters, timeout } => ServiceKind::Container {
            name: name.clone(),
            filters: resolve_filters(path, name.as_deref(), filters.as_ref(), &mut errors),
            timeout: parse::parse_opt_secs(&format!("{path}.timeout"), *timeout, &mut errors),
        },
        RawServiceDef::OrchestratorService { name, filters, timeout } => {
            ServiceKind::OrchestratorService {
                name: name.clone(),
                filters: resolve_filters(path, name.as_deref(), filters.as_ref(), &mut errors),
                timeout: parse::parse_opt_secs(&format!("{path}.timeout"), *timeout, &mut errors),
            }
        }
        RawServiceDef::InitUnit { name, action, timeout } => ServiceKind::InitUnit {
            name: resolve_unit_name(path, name, &mut errors),
            action: resolve_action(path, action.as_deref(), &mut errors),
            timeout: parse::parse_opt_secs(&format!("{path}.timeout"), *timeout, &mut errors),
        },
        RawServiceDef::RcUnit { name, action, timeout } => ServiceKind::RcUnit {
            name: resolve_unit_name(path, name, &mut errors),
            action: resolve_action(path, action.as_deref(), &mut errors),
            timeout: parse::parse_opt_secs(&format!("{path}.timeout"), *timeout, &mut errors),
        },
        RawServiceDef::Script { name, timeout } => {
            let timeout =
                parse::parse_opt_secs(&format!("{path}.timeout"), *timeout, &mut errors);
            resolve_script(path, name, timeout, &mut errors)
        }
    };
    if errors.is_empty() { Ok(kind) } else { Err(collapse(errors)) }
}

/// Exactly one of `name`/`filters`; a bare name is normalized into an
/// exact-match `name` filter.
fn resolve_filters(
    path: &str,
    name: Option<&str>,
    filters: Option<&HashMap<String, String>>,
    errors: &mut Vec<ConfigError>,
) -> HashMap<String, String> {
    match (name, filters) {
        (Some(name), None) => {
            if name.trim().is_empty() {
                errors.push(ConfigError::invalid(
                    format!("{path}.name"),
                    "a non-empty container or service name",
                ));
                return HashMap::new();
            }
            name_filters(name.trim())
        }
        (None, Some(filters)) if !filters.is_empty() => filters.clone(),
        _ => {
            errors.push(ConfigError::invalid(
                path.to_string(),
                "given exactly one of `name` or `filters`",
            ));
            HashMap::new()
        }
    }
}

fn resolve_unit_name(path: &str, name: &str, errors: &mut Vec<ConfigError>) -> String {
    let name = name.trim();
    if name.is_empty() {
        errors.push(ConfigError::invalid(format!("{path}.name"), "a non-empty unit name"));
    }
    name.to_string()
}

fn resolve_action(path: &str, action: Option<&str>, errors: &mut Vec<ConfigError>) -> UnitAction {
    match action {
        None => UnitAction::default(),
        Some(text) => match text.trim().to_ascii_lowercase().as_str() {
            "restart" => UnitAction::Restart,
            "reload" => UnitAction::Reload,
            _ => {
                errors.push(ConfigError::invalid(
                    format!("{path}.action"),
                    "either \"restart\" or \"reload\"",
                ));
                UnitAction::default()
            }
        },
    }
}

fn resolve_script(
    path: &str,
    name: &str,
    timeout: Option<Duration>,
    errors: &mut Vec<ConfigError>,
) -> ServiceKind {
    if name.trim().is_empty() {
        errors.push(ConfigError::invalid(format!("{path}.name"), "a non-empty script path"));
        return ServiceKind::Script { path: Default::default(), timeout };
    }
    let resolved = parse::resolve_script(name.trim());
    if !resolved.is_file() {
        errors.push(ConfigError::InvalidPath {
            field: format!("{path}.name"),
            kind: "an existing script",
            path: resolved.display().to_string(),
        });
    }
    ServiceKind::Script { path: resolved, timeout }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_normalizes_to_exact_filter() {
        let raw = RawServiceDef::Container {
            name: Some("nginx".to_string()),
            filters: None,
            timeout: None,
        };
        let kind = resolve_service("update_services[0]", &raw).unwrap();
        match kind {
            ServiceKind::Container { filters, .. } => {
                assert_eq!(filters.get("name").map(String::as_str), Some("^nginx$"));
            }
            other => panic!("expected container, got {other:?}"),
        }
    }

    #[test]
    fn name_and_filters_together_is_an_error() {
        let raw = RawServiceDef::Container {
            name: Some("nginx".to_string()),
            filters: Some(HashMap::from([("label".to_string(), "a=b".to_string())])),
            timeout: None,
        };
        assert!(resolve_service("update_services[0]", &raw).is_err());
    }

    #[test]
    fn neither_name_nor_filters_is_an_error() {
        let raw = RawServiceDef::OrchestratorService { name: None, filters: None, timeout: None };
        assert!(resolve_service("update_services[0]", &raw).is_err());
    }

    #[test]
    fn unit_action_defaults_to_restart() {
        let raw = RawServiceDef::InitUnit {
            name: "nginx.service".to_string(),
            action: None,
            timeout: None,
        };
        match resolve_service("update_services[0]", &raw).unwrap() {
            ServiceKind::InitUnit { action, .. } => assert_eq!(action, UnitAction::Restart),
            other => panic!("expected init unit, got {other:?}"),
        }
    }

    #[test]
    fn unknown_unit_action_is_an_error() {
        let raw = RawServiceDef::RcUnit {
            name: "nginx".to_string(),
            action: Some("bounce".to_string()),
            timeout: None,
        };
        assert!(resolve_service("update_services[0]", &raw).is_err());
    }

    #[test]
    fn missing_script_is_an_error() {
        let raw = RawServiceDef::Script {
            name: "/nonexistent/update.sh".to_string(),
            timeout: None,
        };
        assert!(resolve_service("update_services[0]", &raw).is_err());
    }

    #[test]
    fn existing_script_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("update.sh");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        let raw = RawServiceDef::Script {
            name: script.display().to_string(),
            timeout: Some(5.0),
        };
        match resolve_service("update_services[0]", &raw).unwrap() {
            ServiceKind::Script { path, timeout } => {
                assert_eq!(path, script);
                assert_eq!(timeout, Some(Duration::from_secs(5)));
            }
            other => panic!("expected script, got {other:?}"),
        }
    }
}

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// What to do to an init-managed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitAction {
    #[default]
    Restart,
    Reload,
}

impl fmt::Display for UnitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitAction::Restart => f.write_str("restart"),
            UnitAction::Reload => f.write_str("reload"),
        }
    }
}

/// A validated service-update descriptor.
///
/// Container and orchestrator-service kinds always carry a filter map; a bare
/// `name` in the config is normalized into an exact-match `name` filter at
/// validation time.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceKind {
    Container {
        name: Option<String>,
        filters: HashMap<String, String>,
        timeout: Option<Duration>,
    },
    OrchestratorService {
        name: Option<String>,
        filters: HashMap<String, String>,
        timeout: Option<Duration>,
    },
    InitUnit {
        name: String,
        action: UnitAction,
        timeout: Option<Duration>,
    },
    RcUnit {
        name: String,
        action: UnitAction,
        timeout: Option<Duration>,
    },
    Script {
        /// Resolved absolute path of the script.
        path: PathBuf,
        timeout: Option<Duration>,
    },
}

impl ServiceKind {
    /// Short human label used in log lines.
    pub fn label(&self) -> String {
        match self {
            ServiceKind::Container { name, filters, .. } => match name {
                Some(n) => format!("container {n}"),
                None => format!("container filters={filters:?}"),
            },
            ServiceKind::OrchestratorService { name, filters, .. } => match name {
                Some(n) => format!("service {n}"),
                None => format!("service filters={filters:?}"),
            },
            ServiceKind::InitUnit { name, .. } => format!("unit {name}"),
            ServiceKind::RcUnit { name, .. } => format!("rc unit {name}"),
            ServiceKind::Script { path, .. } => format!("script {}", path.display()),
        }
    }
}

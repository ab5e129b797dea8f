//! Drivers that shell out: init units, rc units, and update scripts.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use certdeploy_config::UnitAction;

use crate::error::{ClientError, Result};

/// `systemctl <action> <name>`.
pub async fn run_init_unit(
    exec: &Path,
    name: &str,
    action: UnitAction,
    timeout: Option<Duration>,
) -> Result<()> {
    let argv = [action.to_string(), name.to_string()];
    let output = run_command(exec, &argv, timeout)
        .await
        .map_err(|reason| ClientError::UnitError(format!("failed to {action} unit {name}: {reason}")))?;
    if !output.success {
        return Err(ClientError::UnitError(format!(
            "failed to {action} unit {name}: exited {:?}, combined output:\n{}",
            output.code, output.combined,
        )));
    }
    tracing::info!("Unit {name} {action}ed.");
    Ok(())
}

/// `service <name> <action>`.
pub async fn run_rc_unit(
    exec: &Path,
    name: &str,
    action: UnitAction,
    timeout: Option<Duration>,
) -> Result<()> {
    let argv = [name.to_string(), action.to_string()];
    let output = run_command(exec, &argv, timeout)
        .await
        .map_err(|reason| ClientError::UnitError(format!("failed to {action} rc unit {name}: {reason}")))?;
    if !output.success {
        return Err(ClientError::UnitError(format!(
            "failed to {action} rc unit {name}: exited {:?}, combined output:\n{}",
            output.code, output.combined,
        )));
    }
    tracing::info!("Rc unit {name} {action}ed.");
    Ok(())
}

/// Spawn the update script and wait for a clean exit.
pub async fn run_script(path: &Path, timeout: Option<Duration>) -> Result<()> {
    let output = run_command(path, &[], timeout).await.map_err(|reason| {
        ClientError::ScriptError(format!("failed to run update script {}: {reason}", path.display()))
    })?;
    tracing::debug!(
        "Script {} returned {:?}, combined output:\n{}",
        path.display(),
        output.code,
        output.combined,
    );
    if !output.success {
        return Err(ClientError::ScriptError(format!(
            "update script {} exited {:?}, combined output:\n{}",
            path.display(),
            output.code,
            output.combined,
        )));
    }
    tracing::info!("Script {} returned {:?}", path.display(), output.code);
    Ok(())
}

struct CommandOutput {
    success: bool,
    /// None when the process died to a signal.
    code: Option<i32>,
    combined: String,
}

async fn run_command(
    exec: &Path,
    argv: &[String],
    timeout: Option<Duration>,
) -> std::result::Result<CommandOutput, String> {
    let mut command = tokio::process::Command::new(exec);
    command.args(argv).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
    command.kill_on_drop(true);

    let wait = command.output();
    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| format!("timed out after {limit:?}"))?,
        None => wait.await,
    }
    .map_err(|e| e.to_string())?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(CommandOutput {
        success: output.status.success(),
        code: output.status.code(),
        combined,
    })
}

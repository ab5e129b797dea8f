//! Invoking the external renewal executable.

use std::process::Stdio;

use certdeploy_config::ServerConfig;

use crate::error::{Result, ServerError};

/// Run `renew_exec renew_args...` and wait for it, bounded by
/// `renew_timeout`. The ACME client is expected to invoke the deploy hook
/// itself for every renewed lineage.
pub async fn renew_certs(config: &ServerConfig) -> Result<()> {
    let renew = &config.renew;
    let command_line = format!(
        "{} {}",
        renew.exec.display(),
        renew.args.join(" ")
    );
    tracing::debug!("Checking for renewable certificates. Using command: {command_line}");

    let mut command = tokio::process::Command::new(&renew.exec);
    command.args(&renew.args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

    let run = async {
        command
            .output()
            .await
            .map_err(|e| ServerError::Renew(format!("failed to run `{command_line}`: {e}")))
    };
    let output = match renew.timeout {
        Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
            ServerError::Renew(format!("`{command_line}` did not finish within {limit:?}"))
        })??,
        None => run.await?,
    };

    tracing::info!("Checked for renewable certificates.");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    tracing::debug!(
        "Ran `{command_line}`, returned {:?}, stdout:\n{stdout}\nstderr:\n{stderr}",
        output.status.code(),
    );

    if !output.status.success() {
        return Err(ServerError::Renew(format!(
            "`{command_line}` returned {:?}: {}",
            output.status.code(),
            stderr.trim(),
        )));
    }
    Ok(())
}

//! Service update drivers.
//!
//! One driver per descriptor kind, all with the same contract: run to
//! completion within the effective timeout or surface a typed failure. The
//! orchestrator walks `update_services` in declaration order and lets
//! `fail_fast` decide whether a failure aborts the set.

mod docker;
mod exec;

use std::time::Duration;

use certdeploy_config::{ClientConfig, ServiceKind};

use crate::error::Result;

/// Timeout precedence: descriptor → category default → indefinite.
fn effective_timeout(
    descriptor: Option<Duration>,
    category: Option<Duration>,
) -> Option<Duration> {
    descriptor.or(category)
}

/// Runs the configured update drivers against one client config.
pub struct Updater<'a> {
    config: &'a ClientConfig,
}

impl<'a> Updater<'a> {
    pub fn new(config: &'a ClientConfig) -> Self {
        Self { config }
    }

    /// Run every configured service update in declaration order.
    ///
    /// Without `fail_fast`, failures are logged and the remaining drivers
    /// still run; the first failure is returned at the end so the caller can
    /// report it.
    pub async fn run_all(&self) -> Result<()> {
        tracing::info!("Updating services");
        for service in &self.config.update_services {
            if let Err(e) = self.run(service).await {
                if self.config.fail_fast {
                    return Err(e);
                }
                tracing::error!("{e}");
            }
        }
        tracing::info!("Updated services");
        Ok(())
    }

    /// Run a single driver with its effective timeout.
    pub async fn run(&self, service: &ServiceKind) -> Result<()> {
        tracing::debug!("Updating {}", service.label());
        match service {
            ServiceKind::Container { filters, timeout, .. } => {
                let runtime = docker::DockerApi::connect(&self.config.docker_url)?;
                docker::restart_containers(
                    &runtime,
                    filters,
                    effective_timeout(*timeout, self.config.docker_timeout),
                )
                .await
            }
            ServiceKind::OrchestratorService { name, filters, timeout } => {
                let runtime = docker::DockerApi::connect(&self.config.docker_url)?;
                docker::update_orchestrator_service(
                    &runtime,
                    name.as_deref(),
                    filters,
                    effective_timeout(*timeout, self.config.docker_timeout),
                )
                .await
            }
            ServiceKind::InitUnit { name, action, timeout } => {
                exec::run_init_unit(
                    &self.config.systemd_exec,
                    name,
                    *action,
                    effective_timeout(*timeout, self.config.init_timeout),
                )
                .await
            }
            ServiceKind::RcUnit { name, action, timeout } => {
                exec::run_rc_unit(
                    &self.config.rc_service_exec,
                    name,
                    *action,
                    effective_timeout(*timeout, self.config.init_timeout),
                )
                .await
            }
            ServiceKind::Script { path, timeout } => {
                exec::run_script(path, effective_timeout(*timeout, self.config.script_timeout))
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_timeout_wins() {
        assert_eq!(
            effective_timeout(Some(Duration::from_secs(5)), Some(Duration::from_secs(10))),
            Some(Duration::from_secs(5)),
        );
    }

    #[test]
    fn category_default_fills_in() {
        assert_eq!(
            effective_timeout(None, Some(Duration::from_secs(10))),
            Some(Duration::from_secs(10)),
        );
    }

    #[test]
    fn both_absent_means_indefinite() {
        assert_eq!(effective_timeout(None, None), None);
    }
}

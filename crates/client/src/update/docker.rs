//! Container-runtime drivers over the Docker Engine API.
//!
//! The drivers talk to the engine through the `DockerRuntime` seam so the
//! match/bump logic is testable without a live daemon; `DockerApi` is the
//! production adapter. Orchestrator-service resolution by name deliberately
//! goes through the direct inspect endpoint instead of list filters: the
//! engine's regex matching on the `name` filter is unreliable for services,
//! so filters are only used for non-name keys.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{ListContainersOptions, RestartContainerOptions};
use bollard::models::ServiceSpec;
use bollard::service::{InspectServiceOptions, ListServicesOptions, UpdateServiceOptions};

use crate::error::{ClientError, Result};

/// One matched container.
#[derive(Debug, Clone)]
pub struct ContainerRef {
    pub id: String,
    pub names: Vec<String>,
}

/// A service's current spec at a known version index.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub version: i64,
    pub spec: ServiceSpec,
}

/// The runtime seam: the slice of the engine API the update drivers touch.
#[async_trait]
pub trait DockerRuntime: Send + Sync {
    async fn list_containers(&self, filters: &HashMap<String, String>)
    -> Result<Vec<ContainerRef>>;
    async fn restart_container(
        &self,
        container: &ContainerRef,
        stop_timeout: Option<isize>,
    ) -> Result<()>;
    async fn list_service_names(&self, filters: &HashMap<String, String>) -> Result<Vec<String>>;
    async fn inspect_service(&self, name: &str) -> Result<ServiceState>;
    async fn update_service(&self, name: &str, version: i64, spec: ServiceSpec) -> Result<()>;
}

/// Production adapter over the Docker Engine HTTP API.
pub struct DockerApi {
    docker: Docker,
}

impl DockerApi {
    pub fn connect(docker_url: &str) -> Result<Self> {
        let docker = if docker_url.starts_with("unix://") {
            Docker::connect_with_unix(docker_url, 120, bollard::API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(docker_url, 120, bollard::API_DEFAULT_VERSION)
        };
        docker
            .map(|docker| Self { docker })
            .map_err(|e| ClientError::Other(format!("docker connect to {docker_url} failed: {e}")))
    }
}

#[async_trait]
impl DockerRuntime for DockerApi {
    async fn list_containers(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<Vec<ContainerRef>> {
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters: api_filters(filters),
                ..Default::default()
            }))
            .await
            .map_err(|e| ClientError::Other(format!("container list failed: {e}")))?;
        Ok(summaries
            .into_iter()
            .filter_map(|c| {
                c.id.map(|id| ContainerRef { id, names: c.names.unwrap_or_default() })
            })
            .collect())
    }

    async fn restart_container(
        &self,
        container: &ContainerRef,
        stop_timeout: Option<isize>,
    ) -> Result<()> {
        self.docker
            .restart_container(&container.id, stop_timeout.map(|t| RestartContainerOptions { t }))
            .await
            .map_err(|e| {
                ClientError::Other(format!(
                    "restart of container {:?} failed: {e}",
                    container.names,
                ))
            })
    }

    async fn list_service_names(&self, filters: &HashMap<String, String>) -> Result<Vec<String>> {
        let services = self
            .docker
            .list_services(Some(ListServicesOptions {
                filters: api_filters(filters),
                ..Default::default()
            }))
            .await
            .map_err(|e| ClientError::Other(format!("service list failed: {e}")))?;
        Ok(services.into_iter().filter_map(|s| s.spec.and_then(|spec| spec.name)).collect())
    }

    async fn inspect_service(&self, name: &str) -> Result<ServiceState> {
        let service = self
            .docker
            .inspect_service(name, None::<InspectServiceOptions>)
            .await
            .map_err(|e| ClientError::ServiceNotFound(format!("{name}: {e}")))?;
        let version = service
            .version
            .and_then(|v| v.index)
            .map(|index| index as i64)
            .ok_or_else(|| ClientError::Other(format!("service {name} has no version index")))?;
        let spec = service
            .spec
            .ok_or_else(|| ClientError::Other(format!("service {name} has no spec")))?;
        Ok(ServiceState { version, spec })
    }

    async fn update_service(&self, name: &str, version: i64, spec: ServiceSpec) -> Result<()> {
        let response = self
            .docker
            .update_service(
                name,
                spec,
                UpdateServiceOptions { version: version as u64, ..Default::default() },
                None,
            )
            .await
            .map_err(|e| {
                ClientError::Other(format!("force update of service {name} failed: {e}"))
            })?;
        for warning in response.warnings.unwrap_or_default() {
            tracing::warn!("Docker API warning for service {name}: {warning}");
        }
        Ok(())
    }
}

fn api_filters(filters: &HashMap<String, String>) -> HashMap<String, Vec<String>> {
    filters.iter().map(|(k, v)| (k.clone(), vec![v.clone()])).collect()
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Other(format!("{what} timed out after {limit:?}")))?,
        None => fut.await,
    }
}

/// Restart every container matching `filters`. An empty match set is an
/// error: a typo'd name would otherwise pass silently.
pub async fn restart_containers(
    runtime: &dyn DockerRuntime,
    filters: &HashMap<String, String>,
    timeout: Option<Duration>,
) -> Result<()> {
    let filters_desc = format!("{filters:?}");
    let stop_timeout = timeout.map(|t| t.as_secs() as isize);

    with_timeout(timeout, "container restart", async {
        let matches = runtime.list_containers(filters).await?;
        if matches.is_empty() {
            return Err(ClientError::ContainerNotFound(filters_desc.clone()));
        }
        for container in &matches {
            runtime.restart_container(container, stop_timeout).await?;
            tracing::info!(
                "Container updated: names={:?}, filters={filters_desc}",
                container.names,
            );
        }
        Ok(())
    })
    .await
}

/// Force a rolling update of an orchestrator service: bump
/// `task_template.force_update` and post the spec back at the current
/// version, replacing tasks without an image change.
pub async fn update_orchestrator_service(
    runtime: &dyn DockerRuntime,
    name: Option<&str>,
    filters: &HashMap<String, String>,
    timeout: Option<Duration>,
) -> Result<()> {
    with_timeout(timeout, "service update", async {
        let names = match name {
            // Resolve by name through the direct endpoint.
            Some(name) => vec![name.to_string()],
            None => {
                let names = runtime.list_service_names(filters).await?;
                if names.is_empty() {
                    return Err(ClientError::ServiceNotFound(format!(
                        "no service matched filters {filters:?}"
                    )));
                }
                names
            }
        };
        for service_name in names {
            force_update(runtime, &service_name).await?;
        }
        Ok(())
    })
    .await
}

async fn force_update(runtime: &dyn DockerRuntime, name: &str) -> Result<()> {
    let mut state = runtime.inspect_service(name).await?;
    let mut task_template = state.spec.task_template.take().unwrap_or_default();
    task_template.force_update = Some(task_template.force_update.unwrap_or(0) + 1);
    state.spec.task_template = Some(task_template);
    runtime.update_service(name, state.version, state.spec).await?;
    tracing::info!("Service updated: name={name}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bollard::models::TaskSpec;

    use super::*;

    /// Scripted runtime double: fixed container and service sets, every
    /// call recorded.
    #[derive(Default)]
    struct ScriptedRuntime {
        containers: Vec<ContainerRef>,
        services: HashMap<String, ServiceState>,
        filter_services: Vec<String>,
        restarts: Mutex<Vec<(String, Option<isize>)>>,
        list_service_calls: Mutex<u32>,
        updates: Mutex<Vec<(String, i64, Option<i64>)>>,
    }

    #[async_trait]
    impl DockerRuntime for ScriptedRuntime {
        async fn list_containers(
            &self,
            _filters: &HashMap<String, String>,
        ) -> Result<Vec<ContainerRef>> {
            Ok(self.containers.clone())
        }

        async fn restart_container(
            &self,
            container: &ContainerRef,
            stop_timeout: Option<isize>,
        ) -> Result<()> {
            self.restarts.lock().unwrap().push((container.id.clone(), stop_timeout));
            Ok(())
        }

        async fn list_service_names(
            &self,
            _filters: &HashMap<String, String>,
        ) -> Result<Vec<String>> {
            *self.list_service_calls.lock().unwrap() += 1;
            Ok(self.filter_services.clone())
        }

        async fn inspect_service(&self, name: &str) -> Result<ServiceState> {
            self.services
                .get(name)
                .cloned()
                .ok_or_else(|| ClientError::ServiceNotFound(format!("{name}: no such service")))
        }

        async fn update_service(
            &self,
            name: &str,
            version: i64,
            spec: ServiceSpec,
        ) -> Result<()> {
            let force = spec.task_template.and_then(|t| t.force_update);
            self.updates.lock().unwrap().push((name.to_string(), version, force));
            Ok(())
        }
    }

    fn container(id: &str) -> ContainerRef {
        ContainerRef { id: id.to_string(), names: vec![format!("/{id}")] }
    }

    fn service(version: i64, force_update: Option<i64>) -> ServiceState {
        ServiceState {
            version,
            spec: ServiceSpec {
                task_template: Some(TaskSpec { force_update, ..Default::default() }),
                ..Default::default()
            },
        }
    }

    fn name_filter(name: &str) -> HashMap<String, String> {
        HashMap::from([("name".to_string(), format!("^{name}$"))])
    }

    #[test]
    fn api_filters_wrap_values() {
        let mapped = api_filters(&name_filter("nginx"));
        assert_eq!(mapped.get("name"), Some(&vec!["^nginx$".to_string()]));
    }

    #[tokio::test]
    async fn empty_container_match_is_container_not_found() {
        let runtime = ScriptedRuntime::default();
        let err = restart_containers(&runtime, &name_filter("no_such"), None).await.unwrap_err();
        assert!(err.to_string().starts_with("ContainerNotFound:"), "got {err}");
        assert!(runtime.restarts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_matched_container_restarts_with_the_driver_timeout() {
        let runtime = ScriptedRuntime {
            containers: vec![container("aaa"), container("bbb")],
            ..Default::default()
        };
        restart_containers(&runtime, &name_filter("proxy"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        let restarts = runtime.restarts.lock().unwrap();
        assert_eq!(*restarts, vec![("aaa".to_string(), Some(5)), ("bbb".to_string(), Some(5))]);
    }

    #[tokio::test]
    async fn name_resolution_bypasses_the_filter_api() {
        let runtime = ScriptedRuntime {
            services: HashMap::from([("web".to_string(), service(7, Some(3)))]),
            ..Default::default()
        };
        update_orchestrator_service(&runtime, Some("web"), &HashMap::new(), None)
            .await
            .unwrap();
        assert_eq!(*runtime.list_service_calls.lock().unwrap(), 0);
        assert_eq!(runtime.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_service_is_service_not_found() {
        let runtime = ScriptedRuntime::default();
        let err = update_orchestrator_service(&runtime, Some("ghost"), &HashMap::new(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("ServiceNotFound:"), "got {err}");
    }

    #[tokio::test]
    async fn empty_filter_match_is_service_not_found() {
        let runtime = ScriptedRuntime::default();
        let filters = HashMap::from([("label".to_string(), "tls=yes".to_string())]);
        let err =
            update_orchestrator_service(&runtime, None, &filters, None).await.unwrap_err();
        assert!(err.to_string().starts_with("ServiceNotFound:"), "got {err}");
        assert_eq!(*runtime.list_service_calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn force_update_bumps_at_the_inspected_version() {
        let runtime = ScriptedRuntime {
            services: HashMap::from([("web".to_string(), service(7, Some(3)))]),
            ..Default::default()
        };
        update_orchestrator_service(&runtime, Some("web"), &HashMap::new(), None)
            .await
            .unwrap();
        let updates = runtime.updates.lock().unwrap();
        assert_eq!(*updates, vec![("web".to_string(), 7, Some(4))]);
    }

    #[tokio::test]
    async fn missing_task_template_still_bumps_from_zero() {
        let runtime = ScriptedRuntime {
            services: HashMap::from([(
                "bare".to_string(),
                ServiceState { version: 1, spec: ServiceSpec::default() },
            )]),
            ..Default::default()
        };
        update_orchestrator_service(&runtime, Some("bare"), &HashMap::new(), None)
            .await
            .unwrap();
        let updates = runtime.updates.lock().unwrap();
        assert_eq!(*updates, vec![("bare".to_string(), 1, Some(1))]);
    }

    #[tokio::test]
    async fn filter_match_updates_every_service() {
        let runtime = ScriptedRuntime {
            services: HashMap::from([
                ("web".to_string(), service(2, None)),
                ("api".to_string(), service(5, Some(1))),
            ]),
            filter_services: vec!["web".to_string(), "api".to_string()],
            ..Default::default()
        };
        let filters = HashMap::from([("label".to_string(), "tls=yes".to_string())]);
        update_orchestrator_service(&runtime, None, &filters, None).await.unwrap();
        let updates = runtime.updates.lock().unwrap();
        assert_eq!(
            *updates,
            vec![("web".to_string(), 2, Some(1)), ("api".to_string(), 5, Some(2))]
        );
    }
}

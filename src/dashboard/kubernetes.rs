//! Read-only cluster views through the Kubernetes API.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Namespace, Pod, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::api::{ListParams, LogParams};
use kube::config::KubeConfigOptions;
use kube::{Api, Client, Config, Resource};
use serde::{Deserialize, Serialize};

use crate::errors::DashboardError;

pub const DEFAULT_LOG_LINES: i64 = 100;
const NOT_SET: &str = "N/A";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub restarts: i32,
    pub age: String,
    pub node: String,
    pub ip: String,
    pub image: String,
    pub cpu_request: String,
    pub mem_request: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentInfo {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub updated_replicas: i32,
    pub available_replicas: i32,
    pub age: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
    #[serde(rename = "type")]
    pub service_type: String,
    pub cluster_ip: String,
    pub ports: Vec<String>,
    pub age: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamespaceInfo {
    pub name: String,
    pub status: String,
    pub age: String,
}

/// Shared client for cluster reads. Cheap to clone.
#[derive(Clone)]
pub struct ClusterReader {
    client: Client,
}

impl ClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// In-cluster service account first, then the local kubeconfig.
    pub async fn connect() -> Result<Self> {
        let config = match Config::incluster() {
            Ok(config) => config,
            Err(in_cluster) => {
                tracing::debug!(error = %in_cluster, "not running in-cluster, trying kubeconfig");
                Config::from_kubeconfig(&KubeConfigOptions::default())
                    .await
                    .context("Failed to load kubeconfig")?
            }
        };
        let client = Client::try_from(config).context("Failed to build Kubernetes client")?;
        Ok(Self::new(client))
    }

    /// Empty or `all` means every namespace.
    fn scoped<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        let namespace = namespace.trim();
        if namespace.is_empty() || namespace == "all" {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }

    pub async fn list_pods(&self, namespace: &str) -> Result<Vec<PodInfo>, DashboardError> {
        let pods = self
            .scoped::<Pod>(namespace)
            .list(&ListParams::default())
            .await?;
        let now = Utc::now();
        Ok(pods.items.iter().map(|p| pod_info(p, now)).collect())
    }

    pub async fn list_deployments(&self, namespace: &str) -> Result<Vec<DeploymentInfo>, DashboardError> {
        let deployments = self
            .scoped::<Deployment>(namespace)
            .list(&ListParams::default())
            .await?;
        let now = Utc::now();
        Ok(deployments
            .items
            .iter()
            .map(|d| deployment_info(d, now))
            .collect())
    }

    pub async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>, DashboardError> {
        let services = self
            .scoped::<Service>(namespace)
            .list(&ListParams::default())
            .await?;
        let now = Utc::now();
        Ok(services.items.iter().map(|s| service_info(s, now)).collect())
    }

    pub async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, DashboardError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespaces = api.list(&ListParams::default()).await?;
        let now = Utc::now();
        Ok(namespaces
            .items
            .iter()
            .map(|n| namespace_info(n, now))
            .collect())
    }

    /// The last `lines` lines of a pod's log, in full.
    pub async fn pod_logs(&self, namespace: &str, pod: &str, lines: i64) -> Result<String, DashboardError> {
        if lines <= 0 {
            return Err(DashboardError::validation("lines must be a positive integer"));
        }
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            tail_lines: Some(lines),
            ..LogParams::default()
        };
        Ok(api.logs(pod, &params).await?)
    }
}

// ── Projections ──────────────────────────────────────────────────────

/// kubectl-style compact age: `45s`, `12m`, `3h`, `5d`.
pub fn format_age(created: Option<&Time>, now: DateTime<Utc>) -> String {
    let Some(Time(created)) = created else {
        return String::new();
    };
    let secs = (now - *created).num_seconds().max(0);
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3_600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3_600),
        s => format!("{}d", s / 86_400),
    }
}

fn name_and_namespace(meta: &ObjectMeta) -> (String, String) {
    (
        meta.name.clone().unwrap_or_default(),
        meta.namespace.clone().unwrap_or_default(),
    )
}

fn first_image(containers: &[Container]) -> String {
    containers
        .first()
        .and_then(|c| c.image.clone())
        .unwrap_or_default()
}

fn first_request(containers: &[Container], resource: &str) -> String {
    containers
        .first()
        .and_then(|c| c.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|req| req.get(resource))
        .map(|q| q.0.clone())
        .unwrap_or_else(|| NOT_SET.to_string())
}

pub fn pod_info(pod: &Pod, now: DateTime<Utc>) -> PodInfo {
    let (name, namespace) = name_and_namespace(&pod.metadata);
    let containers = pod
        .spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    let status = pod.status.as_ref();
    PodInfo {
        name,
        namespace,
        status: status.and_then(|s| s.phase.clone()).unwrap_or_default(),
        restarts: status
            .and_then(|s| s.container_statuses.as_ref())
            .and_then(|cs| cs.first())
            .map(|c| c.restart_count)
            .unwrap_or(0),
        age: format_age(pod.metadata.creation_timestamp.as_ref(), now),
        node: pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.clone())
            .unwrap_or_default(),
        ip: status.and_then(|s| s.pod_ip.clone()).unwrap_or_default(),
        image: first_image(containers),
        cpu_request: first_request(containers, "cpu"),
        mem_request: first_request(containers, "memory"),
    }
}

pub fn deployment_info(deployment: &Deployment, now: DateTime<Utc>) -> DeploymentInfo {
    let (name, namespace) = name_and_namespace(&deployment.metadata);
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();
    let containers = spec
        .and_then(|s| s.template.spec.as_ref())
        .map(|s| s.containers.as_slice())
        .unwrap_or_default();
    DeploymentInfo {
        name,
        namespace,
        replicas: spec.and_then(|s| s.replicas).unwrap_or(0),
        ready_replicas: status.and_then(|s| s.ready_replicas).unwrap_or(0),
        updated_replicas: status.and_then(|s| s.updated_replicas).unwrap_or(0),
        available_replicas: status.and_then(|s| s.available_replicas).unwrap_or(0),
        age: format_age(deployment.metadata.creation_timestamp.as_ref(), now),
        image: first_image(containers),
    }
}

pub fn service_info(service: &Service, now: DateTime<Utc>) -> ServiceInfo {
    let (name, namespace) = name_and_namespace(&service.metadata);
    let spec = service.spec.as_ref();
    let ports = spec
        .and_then(|s| s.ports.as_ref())
        .map(|ports| {
            ports
                .iter()
                .map(|p| {
                    format!(
                        "{}:{}/{}",
                        p.port,
                        p.node_port.unwrap_or(0),
                        p.protocol.as_deref().unwrap_or("TCP")
                    )
                })
                .collect()
        })
        .unwrap_or_default();
    ServiceInfo {
        name,
        namespace,
        service_type: spec.and_then(|s| s.type_.clone()).unwrap_or_default(),
        cluster_ip: spec.and_then(|s| s.cluster_ip.clone()).unwrap_or_default(),
        ports,
        age: format_age(service.metadata.creation_timestamp.as_ref(), now),
    }
}

pub fn namespace_info(namespace: &Namespace, now: DateTime<Utc>) -> NamespaceInfo {
    NamespaceInfo {
        name: namespace.metadata.name.clone().unwrap_or_default(),
        status: namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.clone())
            .unwrap_or_default(),
        age: format_age(namespace.metadata.creation_timestamp.as_ref(), now),
    }
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Duration;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use k8s_openapi::api::core::v1::{
        ContainerStatus, NamespaceStatus, PodSpec, PodStatus, PodTemplateSpec, ResourceRequirements,
        ServicePort, ServiceSpec,
    };
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    use super::*;

    fn meta(name: &str, created: DateTime<Utc>) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            creation_timestamp: Some(Time(created)),
            ..ObjectMeta::default()
        }
    }

    fn container(image: &str, requests: Option<BTreeMap<String, Quantity>>) -> Container {
        Container {
            name: "main".to_string(),
            image: Some(image.to_string()),
            resources: Some(ResourceRequirements {
                requests,
                ..ResourceRequirements::default()
            }),
            ..Container::default()
        }
    }

    #[test]
    fn test_format_age_units() {
        let now = Utc::now();
        let at = |d: Duration| Time(now - d);
        assert_eq!(format_age(Some(&at(Duration::seconds(45))), now), "45s");
        assert_eq!(format_age(Some(&at(Duration::minutes(12))), now), "12m");
        assert_eq!(format_age(Some(&at(Duration::hours(3))), now), "3h");
        assert_eq!(format_age(Some(&at(Duration::days(5))), now), "5d");
        assert_eq!(format_age(Some(&Time(now + Duration::seconds(30))), now), "0s");
        assert_eq!(format_age(None, now), "");
    }

    #[test]
    fn test_pod_projection_uses_first_container() {
        let now = Utc::now();
        let requests = BTreeMap::from([("cpu".to_string(), Quantity("250m".to_string()))]);
        let pod = Pod {
            metadata: meta("web-0", now - Duration::minutes(3)),
            spec: Some(PodSpec {
                node_name: Some("node-a".to_string()),
                containers: vec![container("nginx:1.27", Some(requests)), container("sidecar", None)],
                ..PodSpec::default()
            }),
            status: Some(PodStatus {
                phase: Some("Running".to_string()),
                pod_ip: Some("10.0.0.7".to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: "main".to_string(),
                    restart_count: 2,
                    ..ContainerStatus::default()
                }]),
                ..PodStatus::default()
            }),
        };
        let info = pod_info(&pod, now);
        assert_eq!(info.name, "web-0");
        assert_eq!(info.status, "Running");
        assert_eq!(info.restarts, 2);
        assert_eq!(info.age, "3m");
        assert_eq!(info.node, "node-a");
        assert_eq!(info.ip, "10.0.0.7");
        assert_eq!(info.image, "nginx:1.27");
        assert_eq!(info.cpu_request, "250m");
        assert_eq!(info.mem_request, "N/A");
    }

    #[test]
    fn test_pod_projection_tolerates_empty_pod() {
        let info = pod_info(&Pod::default(), Utc::now());
        assert_eq!(info.name, "");
        assert_eq!(info.restarts, 0);
        assert_eq!(info.cpu_request, "N/A");
        assert_eq!(info.age, "");
    }

    #[test]
    fn test_deployment_projection() {
        let now = Utc::now();
        let deployment = Deployment {
            metadata: meta("api", now - Duration::hours(2)),
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![container("api:v2", None)],
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(2),
                updated_replicas: Some(3),
                available_replicas: None,
                ..DeploymentStatus::default()
            }),
        };
        let info = deployment_info(&deployment, now);
        assert_eq!(info.replicas, 3);
        assert_eq!(info.ready_replicas, 2);
        assert_eq!(info.updated_replicas, 3);
        assert_eq!(info.available_replicas, 0);
        assert_eq!(info.age, "2h");
        assert_eq!(info.image, "api:v2");
    }

    #[test]
    fn test_service_projection_formats_ports() {
        let now = Utc::now();
        let service = Service {
            metadata: meta("frontend", now - Duration::days(9)),
            spec: Some(ServiceSpec {
                type_: Some("NodePort".to_string()),
                cluster_ip: Some("10.96.0.12".to_string()),
                ports: Some(vec![
                    ServicePort {
                        port: 80,
                        node_port: Some(30080),
                        protocol: Some("TCP".to_string()),
                        ..ServicePort::default()
                    },
                    ServicePort {
                        port: 53,
                        protocol: Some("UDP".to_string()),
                        ..ServicePort::default()
                    },
                ]),
                ..ServiceSpec::default()
            }),
            status: None,
        };
        let info = service_info(&service, now);
        assert_eq!(info.service_type, "NodePort");
        assert_eq!(info.ports, vec!["80:30080/TCP", "53:0/UDP"]);
        assert_eq!(info.age, "9d");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["type"], "NodePort");
        assert_eq!(json["cluster_ip"], "10.96.0.12");
    }

    #[test]
    fn test_namespace_projection() {
        let now = Utc::now();
        let ns = Namespace {
            metadata: meta("kube-system", now - Duration::seconds(5)),
            spec: None,
            status: Some(NamespaceStatus {
                phase: Some("Active".to_string()),
                ..NamespaceStatus::default()
            }),
        };
        let info = namespace_info(&ns, now);
        assert_eq!(info.name, "kube-system");
        assert_eq!(info.status, "Active");
        assert_eq!(info.age, "5s");
    }

    fn paths(requests: &fake::Requests) -> Vec<String> {
        requests
            .lock()
            .unwrap()
            .iter()
            .map(|uri| uri.split('?').next().unwrap_or_default().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_blank_or_all_namespace_lists_cluster_wide() {
        let (reader, requests) = fake::recording_reader(fake::EMPTY_LIST);
        assert!(reader.list_pods("").await.unwrap().is_empty());
        assert!(reader.list_pods("all").await.unwrap().is_empty());
        assert!(reader.list_services(" ").await.unwrap().is_empty());
        assert_eq!(
            paths(&requests),
            vec!["/api/v1/pods", "/api/v1/pods", "/api/v1/services"]
        );
    }

    #[tokio::test]
    async fn test_named_namespace_scopes_the_request() {
        let (reader, requests) = fake::recording_reader(fake::EMPTY_LIST);
        reader.list_pods("prod").await.unwrap();
        reader.list_deployments("prod").await.unwrap();
        reader.list_namespaces().await.unwrap();
        assert_eq!(
            paths(&requests),
            vec![
                "/api/v1/namespaces/prod/pods",
                "/apis/apps/v1/namespaces/prod/deployments",
                "/api/v1/namespaces",
            ]
        );
    }

    #[tokio::test]
    async fn test_pod_logs_requests_the_full_tail() {
        let (reader, requests) = fake::recording_reader("line one\nline two\n");
        let logs = reader.pod_logs("ns", "web-0", 50).await.unwrap();
        assert_eq!(logs, "line one\nline two\n");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("/api/v1/namespaces/ns/pods/web-0/log?"));
        assert!(requests[0].contains("tailLines=50"));
    }

    #[tokio::test]
    async fn test_pod_logs_rejects_non_positive_lines_without_a_request() {
        let (reader, requests) = fake::recording_reader("unused");
        for lines in [0, -5] {
            let err = reader.pod_logs("ns", "web-0", lines).await.unwrap_err();
            assert!(matches!(err, DashboardError::Validation(_)));
        }
        assert!(requests.lock().unwrap().is_empty());
    }
}

//! Desired-state bodies for the objects the runner creates.

use crate::config::{Labels, Settings};
use crate::error::Result;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, PersistentVolumeClaim, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use k8s_openapi::serde_json::{self, json};
use std::collections::BTreeMap;

pub const CONTAINER_NAME: &str = "testapp";
pub const HTML_ROOT: &str = "/usr/share/nginx/html";
pub const CLAIM_MOUNT: &str = "/usr/blank";

/// The parts of a deployment that change between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub replicas: i32,
    pub config_map: String,
    pub volume_claim: Option<String>,
    pub labels: Labels,
    pub template_labels: Labels,
}

impl WorkloadSpec {
    #[must_use]
    pub fn from_settings(settings: &Settings, volume_claim: Option<String>) -> Self {
        Self {
            replicas: settings.replicas,
            config_map: settings.index_name.clone(),
            volume_claim,
            labels: settings.labels.clone(),
            template_labels: settings.template_labels.clone(),
        }
    }
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

#[must_use]
pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: meta(name),
        ..Default::default()
    }
}

/// A config map carrying `index.html` for the web containers.
#[must_use]
pub fn config_map(name: &str, index_html: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta(name),
        data: Some(BTreeMap::from([(
            "index.html".to_string(),
            index_html.to_string(),
        )])),
        ..Default::default()
    }
}

/// A `ReadWriteOnce` claim for `storage`.
///
/// # Errors
///
/// Will return `Err` if the body does not deserialize into a claim
pub fn volume_claim(name: &str, storage: &str) -> Result<PersistentVolumeClaim> {
    Ok(serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": name },
        "spec": {
            "accessModes": ["ReadWriteOnce"],
            "resources": { "requests": { "storage": storage } }
        }
    }))?)
}

/// A service in front of the web pods.
#[must_use]
pub fn service(name: &str, settings: &Settings) -> Service {
    Service {
        metadata: meta(name),
        spec: Some(ServiceSpec {
            selector: Some(settings.template_labels.to_map()),
            ports: Some(vec![ServicePort {
                port: settings.service_port,
                target_port: Some(IntOrString::Int(settings.container_port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// An nginx deployment serving the config map, one pod per zone.
///
/// Rolling updates never surge so a config change replaces pods one at a time.
///
/// # Errors
///
/// Will return `Err` if the body does not deserialize into a deployment
pub fn deployment(name: &str, spec: &WorkloadSpec, settings: &Settings) -> Result<Deployment> {
    let mut volumes = vec![json!({
        "name": "data",
        "configMap": { "name": spec.config_map }
    })];
    let mut mounts = vec![json!({ "name": "data", "mountPath": HTML_ROOT })];

    if let Some(claim) = &spec.volume_claim {
        volumes.push(json!({
            "name": "test-volume",
            "persistentVolumeClaim": { "claimName": claim }
        }));
        mounts.push(json!({ "name": "test-volume", "mountPath": CLAIM_MOUNT }));
    }

    let template_labels = spec.template_labels.to_map();

    Ok(serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "labels": spec.labels.to_map() },
        "spec": {
            "replicas": spec.replicas,
            "selector": { "matchLabels": template_labels },
            "strategy": {
                "type": "RollingUpdate",
                "rollingUpdate": { "maxSurge": 0, "maxUnavailable": 1 }
            },
            "template": {
                "metadata": { "labels": template_labels },
                "spec": {
                    "affinity": {
                        "podAntiAffinity": {
                            "requiredDuringSchedulingIgnoredDuringExecution": [{
                                "topologyKey": settings.zone_label,
                                "labelSelector": { "matchLabels": template_labels }
                            }]
                        }
                    },
                    "volumes": volumes,
                    "containers": [{
                        "name": CONTAINER_NAME,
                        "image": settings.image,
                        "ports": [{ "containerPort": settings.container_port }],
                        "volumeMounts": mounts,
                        "resources": { "requests": { "cpu": "1m", "memory": "1Mi" } }
                    }]
                }
            }
        }
    }))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_body() {
        let settings = Settings::default();
        let spec = WorkloadSpec::from_settings(&settings, Some("claim".to_string()));
        let deployment = deployment("web", &spec, &settings).unwrap();

        let dspec = deployment.spec.unwrap();
        assert_eq!(dspec.replicas, Some(3));
        let strategy = dspec.strategy.unwrap().rolling_update.unwrap();
        assert_eq!(strategy.max_surge, Some(IntOrString::Int(0)));

        let pod = dspec.template.spec.unwrap();
        let volumes = pod.volumes.unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(
            volumes[1].persistent_volume_claim.as_ref().unwrap().claim_name,
            "claim"
        );
        let mounts = pod.containers[0].volume_mounts.clone().unwrap();
        assert_eq!(mounts[0].mount_path, HTML_ROOT);
        assert_eq!(mounts[1].mount_path, CLAIM_MOUNT);
    }

    #[test]
    fn test_deployment_without_claim() {
        let settings = Settings::default();
        let mut spec = WorkloadSpec::from_settings(&settings, None);
        spec.replicas = 0;
        let deployment = deployment("web", &spec, &settings).unwrap();
        let dspec = deployment.spec.unwrap();
        assert_eq!(dspec.replicas, Some(0));
        assert_eq!(dspec.template.spec.unwrap().volumes.unwrap().len(), 1);
    }

    #[test]
    fn test_service_targets_container_port() {
        let settings = Settings::default();
        let svc = service("kube-e2e", &settings);
        let port = &svc.spec.unwrap().ports.unwrap()[0];
        assert_eq!(port.target_port, Some(IntOrString::Int(settings.container_port)));
    }

    #[test]
    fn test_claim_body() {
        let claim = volume_claim("test-claim", "1Gi").unwrap();
        assert_eq!(claim.metadata.name.as_deref(), Some("test-claim"));
    }
}

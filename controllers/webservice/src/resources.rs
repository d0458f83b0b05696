//! Dependent-resource derivation.
//!
//! Pure functions that turn a `WebService` into the Deployment and Service the
//! controller manages, and that diff/patch a live Deployment against it. The
//! create and update paths both go through these functions so the two can
//! never disagree about shape.

use crate::error::ControllerError;
use cluster_client::ObjectKey;
use crds::{WebService, WebServiceSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Selector label key shared by the pod template and the Service.
pub const APP_LABEL: &str = "app";

/// Name of the container port and of the Service port targeting it.
pub const HTTP_PORT_NAME: &str = "http";

/// Port exposed by the container and by the Service.
pub const HTTP_PORT: i32 = 80;

/// Records which WebService a dependent was created for (`<namespace>/<name>`).
///
/// Informational: lookups and deletions always go by key, never by this value.
pub const OWNED_BY_ANNOTATION: &str = "apps.microscaler.io/owned-by";

const SERVICE_TYPE_CLUSTER_IP: &str = "ClusterIP";

/// `{app: <name>}`
pub fn selector_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

fn owner_key(ws: &WebService) -> Result<ObjectKey, ControllerError> {
    ObjectKey::from_resource(ws)
        .ok_or_else(|| ControllerError::Derivation("WebService missing metadata.name".to_string()))
}

/// Metadata shared by both dependents: same name, namespace and labels as the
/// owner, plus the ownership annotation.
fn dependent_metadata(ws: &WebService, key: &ObjectKey) -> ObjectMeta {
    ObjectMeta {
        name: Some(key.name.clone()),
        namespace: Some(key.namespace.clone()),
        labels: ws.metadata.labels.clone(),
        annotations: Some(BTreeMap::from([(
            OWNED_BY_ANNOTATION.to_string(),
            key.to_string(),
        )])),
        ..Default::default()
    }
}

fn desired_container(name: &str, image: &str) -> Container {
    Container {
        name: name.to_string(),
        image: Some(image.to_string()),
        ports: Some(vec![ContainerPort {
            name: Some(HTTP_PORT_NAME.to_string()),
            container_port: HTTP_PORT,
            ..Default::default()
        }]),
        ..Default::default()
    }
}

/// Builds the Deployment a WebService should have.
pub fn desired_deployment(ws: &WebService) -> Result<Deployment, ControllerError> {
    let key = owner_key(ws)?;
    let labels = selector_labels(&key.name);

    Ok(Deployment {
        metadata: dependent_metadata(ws, &key),
        spec: Some(DeploymentSpec {
            replicas: Some(ws.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![desired_container(&key.name, &ws.spec.image)],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Builds the Service a WebService should have.
///
/// The shape is fixed apart from name, namespace, labels and selector.
pub fn desired_service(ws: &WebService) -> Result<Service, ControllerError> {
    let key = owner_key(ws)?;

    Ok(Service {
        metadata: dependent_metadata(ws, &key),
        spec: Some(ServiceSpec {
            type_: Some(SERVICE_TYPE_CLUSTER_IP.to_string()),
            ports: Some(vec![ServicePort {
                name: Some(HTTP_PORT_NAME.to_string()),
                port: HTTP_PORT,
                target_port: Some(IntOrString::String(HTTP_PORT_NAME.to_string())),
                ..Default::default()
            }]),
            selector: Some(selector_labels(&key.name)),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Which enforced Deployment fields differ from the WebService.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkloadDrift {
    pub replicas: bool,
    pub image: bool,
}

impl WorkloadDrift {
    pub fn any(self) -> bool {
        self.replicas || self.image
    }
}

fn first_container(deployment: &Deployment) -> Option<&Container> {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
}

/// Diffs replica count and first-container image; nothing else is compared.
pub fn workload_drift(live: &Deployment, desired: &WebServiceSpec) -> WorkloadDrift {
    let live_replicas = live.spec.as_ref().and_then(|s| s.replicas);
    let live_image = first_container(live).and_then(|c| c.image.as_deref());

    WorkloadDrift {
        replicas: live_replicas != Some(desired.replicas),
        image: live_image != Some(desired.image.as_str()),
    }
}

/// Writes the desired replica count and image onto a live Deployment,
/// leaving every other field as it was.
pub fn apply_workload_spec(live: &mut Deployment, ws: &WebService) -> Result<(), ControllerError> {
    let key = owner_key(ws)?;
    let spec = live.spec.get_or_insert_with(DeploymentSpec::default);
    spec.replicas = Some(ws.spec.replicas);

    let pod_spec = spec.template.spec.get_or_insert_with(PodSpec::default);
    match pod_spec.containers.first_mut() {
        Some(container) => container.image = Some(ws.spec.image.clone()),
        None => pod_spec
            .containers
            .push(desired_container(&key.name, &ws.spec.image)),
    }
    Ok(())
}

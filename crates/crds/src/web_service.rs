//! WebService CRD
//!
//! Declares the desired state of a web workload: how many replicas to run,
//! which image to run, and the hostname it answers on. The controller derives
//! a Deployment and a Service from it and never writes back to it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group shared by the CRD and the annotations the controller stamps on
/// the resources it manages.
pub const API_GROUP: &str = "apps.microscaler.io";

#[derive(CustomResource, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apps.microscaler.io",
    version = "v1",
    kind = "WebService",
    namespaced,
    status = "WebServiceStatus",
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.host"}"#,
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WebServiceSpec {
    /// Number of desired replicas
    #[schemars(range(min = 0))]
    pub replicas: i32,

    /// Hostname of the application
    ///
    /// Part of the desired-state contract; not used when building the
    /// Deployment or Service.
    pub host: String,

    /// Container image to run in the pods
    pub image: String,
}

/// Observed state of a WebService.
///
/// Defined so the status subresource exists; the controller leaves it empty.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct WebServiceStatus {}

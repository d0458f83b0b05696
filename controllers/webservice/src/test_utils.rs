//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test data and setting up test scenarios.

use crate::reconciler::Reconciler;
use cluster_client::{MockClusterClient, ObjectKey};
use crds::{WebService, WebServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;

/// Helper to create test WebService CRD
pub fn create_test_web_service(name: &str, namespace: &str, replicas: i32, image: &str) -> WebService {
    WebService {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: WebServiceSpec {
            replicas,
            host: format!("{}.example.com", name),
            image: image.to_string(),
        },
        status: None,
    }
}

/// Helper to create a reconciler over a fresh mock cluster
pub fn create_test_reconciler() -> (Reconciler<MockClusterClient>, MockClusterClient) {
    let mock = MockClusterClient::new();
    let reconciler = Reconciler::new(Arc::new(mock.clone()));
    (reconciler, mock)
}

/// Key of the default fixture used across reconciler tests
pub fn svc_a_key() -> ObjectKey {
    ObjectKey::new("default", "svc-a")
}

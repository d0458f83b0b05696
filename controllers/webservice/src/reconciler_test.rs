//! Unit tests for the WebService reconciler
//!
//! All tests run against `MockClusterClient`, asserting on the exact sequence
//! of mutating calls each pass makes.

use crate::error::ControllerError;
use crate::reconciler::{Branch, Mutation};
use crate::resources::{desired_deployment, desired_service, selector_labels};
use crate::test_utils::*;
use cluster_client::{Call, ClusterError, ObjectKey, Operation, ResourceKind};
use tokio_util::sync::CancellationToken;

fn create(kind: ResourceKind, key: &ObjectKey) -> Call {
    Call::new(Operation::Create, kind, key.clone())
}

fn update(kind: ResourceKind, key: &ObjectKey) -> Call {
    Call::new(Operation::Update, kind, key.clone())
}

fn delete(kind: ResourceKind, key: &ObjectKey) -> Call {
    Call::new(Operation::Delete, kind, key.clone())
}

fn live_replicas(mock: &cluster_client::MockClusterClient, key: &ObjectKey) -> Option<i32> {
    mock.deployment(key).and_then(|d| d.spec).and_then(|s| s.replicas)
}

fn live_image(mock: &cluster_client::MockClusterClient, key: &ObjectKey) -> Option<String> {
    mock.deployment(key)
        .and_then(|d| d.spec)
        .and_then(|s| s.template.spec)
        .and_then(|p| p.containers.into_iter().next())
        .and_then(|c| c.image)
}

#[tokio::test]
async fn test_converges_from_empty_then_is_noop() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    let cancel = CancellationToken::new();

    let report = reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(report.branch, Branch::Converge);
    assert_eq!(
        report.mutations,
        vec![Mutation::CreatedDeployment, Mutation::CreatedService]
    );
    assert_eq!(
        mock.mutations(),
        vec![
            create(ResourceKind::Deployment, &key),
            create(ResourceKind::Service, &key),
        ]
    );
    assert_eq!(live_replicas(&mock, &key), Some(3));
    assert_eq!(live_image(&mock, &key).as_deref(), Some("app:v1"));
    assert!(mock.service(&key).is_some());

    mock.clear_calls();
    let report = reconciler.reconcile(&key, &cancel).await.unwrap();
    assert!(report.is_noop());
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_converged_state_only_reads() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let ws = create_test_web_service("svc-a", "default", 3, "app:v1");
    mock.add_deployment(desired_deployment(&ws).unwrap());
    mock.add_service(desired_service(&ws).unwrap());
    mock.add_web_service(ws);

    let report = reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(
        mock.calls(),
        vec![
            Call::new(Operation::Get, ResourceKind::WebService, key.clone()),
            Call::new(Operation::Get, ResourceKind::Deployment, key.clone()),
            Call::new(Operation::Get, ResourceKind::Service, key.clone()),
        ]
    );
}

#[tokio::test]
async fn test_replica_drift_is_corrected_with_one_update() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    mock.edit_deployment(&key, |d| {
        d.spec.as_mut().unwrap().replicas = Some(5);
    });
    mock.clear_calls();

    let report = reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(report.mutations, vec![Mutation::UpdatedDeployment]);
    assert_eq!(mock.mutations(), vec![update(ResourceKind::Deployment, &key)]);
    assert_eq!(live_replicas(&mock, &key), Some(3));
    assert_eq!(live_image(&mock, &key).as_deref(), Some("app:v1"));
}

#[tokio::test]
async fn test_image_change_is_rolled_out() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v2"));
    mock.clear_calls();

    reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(mock.mutations(), vec![update(ResourceKind::Deployment, &key)]);
    assert_eq!(live_image(&mock, &key).as_deref(), Some("app:v2"));
    assert_eq!(live_replicas(&mock, &key), Some(3));
}

#[tokio::test]
async fn test_scale_to_zero_is_applied() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    mock.add_web_service(create_test_web_service("svc-a", "default", 0, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    assert_eq!(live_replicas(&mock, &key), Some(0));
}

#[tokio::test]
async fn test_selector_relabel_does_not_trigger_update() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    mock.edit_deployment(&key, |d| {
        d.spec.as_mut().unwrap().selector.match_labels = Some(selector_labels("someone-else"));
    });
    mock.clear_calls();

    let report = reconciler.reconcile(&key, &cancel).await.unwrap();
    assert!(report.is_noop());
    assert!(mock.mutations().is_empty());
    assert_eq!(
        mock.deployment(&key)
            .and_then(|d| d.spec)
            .and_then(|s| s.selector.match_labels),
        Some(selector_labels("someone-else"))
    );
}

#[tokio::test]
async fn test_service_is_never_updated_after_creation() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let ws = create_test_web_service("svc-a", "default", 3, "app:v1");
    let mut drifted = desired_service(&ws).unwrap();
    drifted.spec.as_mut().unwrap().type_ = Some("NodePort".to_string());
    mock.add_deployment(desired_deployment(&ws).unwrap());
    mock.add_service(drifted);
    mock.add_web_service(ws);

    let report = reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.is_noop());
    assert_eq!(
        mock.service(&key)
            .and_then(|s| s.spec)
            .and_then(|s| s.type_)
            .as_deref(),
        Some("NodePort")
    );
}

#[tokio::test]
async fn test_teardown_deletes_service_before_deployment() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    mock.remove_web_service(&key);
    mock.clear_calls();

    let report = reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(report.branch, Branch::Teardown);
    assert_eq!(
        report.mutations,
        vec![Mutation::DeletedService, Mutation::DeletedDeployment]
    );
    assert_eq!(
        mock.mutations(),
        vec![
            delete(ResourceKind::Service, &key),
            delete(ResourceKind::Deployment, &key),
        ]
    );
    assert!(mock.deployment(&key).is_none());
    assert!(mock.service(&key).is_none());
}

#[tokio::test]
async fn test_teardown_with_only_deployment_left() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let ws = create_test_web_service("svc-a", "default", 3, "app:v1");
    mock.add_deployment(desired_deployment(&ws).unwrap());

    let report = reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.mutations, vec![Mutation::DeletedDeployment]);
    assert_eq!(mock.mutations(), vec![delete(ResourceKind::Deployment, &key)]);
}

#[tokio::test]
async fn test_teardown_with_only_service_left() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let ws = create_test_web_service("svc-a", "default", 3, "app:v1");
    mock.add_service(desired_service(&ws).unwrap());

    reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.mutations(), vec![delete(ResourceKind::Service, &key)]);
}

#[tokio::test]
async fn test_nothing_anywhere_is_converged_without_writes() {
    let (reconciler, mock) = create_test_reconciler();

    let report = reconciler
        .reconcile(&svc_a_key(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.branch, Branch::Teardown);
    assert!(report.is_noop());
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_missing_service_is_created_alongside_drifted_deployment() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    mock.add_deployment(
        desired_deployment(&create_test_web_service("svc-a", "default", 1, "app:v0")).unwrap(),
    );
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));

    reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        mock.mutations(),
        vec![
            update(ResourceKind::Deployment, &key),
            create(ResourceKind::Service, &key),
        ]
    );
    assert_eq!(live_replicas(&mock, &key), Some(3));
    assert_eq!(live_image(&mock, &key).as_deref(), Some("app:v1"));
}

#[tokio::test]
async fn test_missing_deployment_is_created_when_service_exists() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let ws = create_test_web_service("svc-a", "default", 3, "app:v1");
    mock.add_service(desired_service(&ws).unwrap());
    mock.add_web_service(ws);

    reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(mock.mutations(), vec![create(ResourceKind::Deployment, &key)]);
}

#[tokio::test]
async fn test_keys_are_isolated_by_namespace() {
    let (reconciler, mock) = create_test_reconciler();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "team-a", 2, "app:v1"));
    mock.add_web_service(create_test_web_service("svc-a", "team-b", 4, "app:v9"));

    reconciler
        .reconcile(&ObjectKey::new("team-a", "svc-a"), &cancel)
        .await
        .unwrap();

    assert!(mock.deployment(&ObjectKey::new("team-a", "svc-a")).is_some());
    assert!(mock.deployment(&ObjectKey::new("team-b", "svc-a")).is_none());
}

#[tokio::test]
async fn test_owner_lookup_error_is_propagated() {
    let (reconciler, mock) = create_test_reconciler();
    mock.fail_next(Operation::Get, ResourceKind::WebService, "apiserver unavailable");

    let err = reconciler
        .reconcile(&svc_a_key(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ControllerError::Cluster(ClusterError::Api(_))));
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_dependent_lookup_error_is_not_treated_as_absence() {
    let (reconciler, mock) = create_test_reconciler();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    mock.fail_next(Operation::Get, ResourceKind::Deployment, "timeout");

    let result = reconciler
        .reconcile(&svc_a_key(), &CancellationToken::new())
        .await;

    assert!(result.is_err());
    assert!(mock.mutations().is_empty());
}

#[tokio::test]
async fn test_create_failure_stops_pass_and_retry_completes_it() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    mock.fail_next(Operation::Create, ResourceKind::Service, "quota exceeded");

    assert!(reconciler.reconcile(&key, &cancel).await.is_err());
    assert!(mock.deployment(&key).is_some());
    assert!(mock.service(&key).is_none());

    mock.clear_calls();
    reconciler.reconcile(&key, &cancel).await.unwrap();
    assert_eq!(mock.mutations(), vec![create(ResourceKind::Service, &key)]);
}

#[tokio::test]
async fn test_update_failure_is_propagated() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let cancel = CancellationToken::new();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    reconciler.reconcile(&key, &cancel).await.unwrap();

    mock.edit_deployment(&key, |d| {
        d.spec.as_mut().unwrap().replicas = Some(5);
    });
    mock.fail_next(Operation::Update, ResourceKind::Deployment, "conflict");

    assert!(reconciler.reconcile(&key, &cancel).await.is_err());
    assert_eq!(live_replicas(&mock, &key), Some(5));
}

#[tokio::test]
async fn test_teardown_delete_failure_keeps_deployment() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    let ws = create_test_web_service("svc-a", "default", 3, "app:v1");
    mock.add_deployment(desired_deployment(&ws).unwrap());
    mock.add_service(desired_service(&ws).unwrap());
    mock.fail_next(Operation::Delete, ResourceKind::Service, "forbidden");

    assert!(
        reconciler
            .reconcile(&key, &CancellationToken::new())
            .await
            .is_err()
    );
    assert!(mock.service(&key).is_some());
    assert!(mock.deployment(&key).is_some());
}

#[tokio::test]
async fn test_cancelled_pass_makes_no_calls() {
    let (reconciler, mock) = create_test_reconciler();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = reconciler.reconcile(&svc_a_key(), &cancel).await.unwrap_err();

    assert!(matches!(err, ControllerError::Cancelled));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_between_calls_keeps_partial_progress() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    let cancel = CancellationToken::new();

    // Calls: get WebService, get Deployment, create Deployment. Cancel lands
    // while the create is being served, so the create still succeeds.
    let token = cancel.clone();
    mock.on_call(3, move || token.cancel());

    let err = reconciler.reconcile(&key, &cancel).await.unwrap_err();

    assert!(matches!(err, ControllerError::Cancelled));
    assert_eq!(mock.mutations(), vec![create(ResourceKind::Deployment, &key)]);
    assert!(mock.deployment(&key).is_some());
    assert!(mock.service(&key).is_none());

    // A fresh pass picks up where the cancelled one stopped
    mock.clear_calls();
    let report = reconciler
        .reconcile(&key, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.mutations, vec![Mutation::CreatedService]);
    assert_eq!(mock.mutations(), vec![create(ResourceKind::Service, &key)]);
}

#[tokio::test]
async fn test_mutations_before_a_failure_are_counted() {
    let (reconciler, mock) = create_test_reconciler();
    let key = svc_a_key();
    mock.add_web_service(create_test_web_service("svc-a", "default", 3, "app:v1"));
    mock.fail_next(Operation::Create, ResourceKind::Service, "admission webhook down");
    let before = crate::metrics::mutation_count(Mutation::CreatedDeployment);

    assert!(
        reconciler
            .reconcile(&key, &CancellationToken::new())
            .await
            .is_err()
    );

    assert!(mock.deployment(&key).is_some());
    assert!(crate::metrics::mutation_count(Mutation::CreatedDeployment) >= before + 1);
}

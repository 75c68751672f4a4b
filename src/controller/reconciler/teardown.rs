//! # Teardown
//!
//! Cleanup run while a Kubeturbo resource is being deleted.
//!
//! Namespaced objects carry an owner reference and are garbage collected with
//! the resource. Cluster roles and bindings cannot, so they are found by label
//! and deleted here. The service account only needs the operator finalizer
//! released; garbage collection removes it afterwards.

use super::context::{Context, PodWaitPolicy};
use super::error::ReconcilerError;
use crate::constants::FINALIZER;
use crate::controller::builders::service_account::release_service_account;
use crate::controller::instance::Instance;
use crate::controller::store::{ClusterObject, ObjectStore};
use crate::crd::Kubeturbo;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Finalize a terminating resource
///
/// Stops kubeturbo first when it cleans up its SCC impersonation resources on
/// exit, then tears down the cluster-scoped objects, and only then releases
/// the resource. A failure at any point keeps the finalizer in place.
pub async fn finalize<S: ObjectStore>(
    kt: &Kubeturbo,
    ctx: &Context<S>,
) -> Result<(), ReconcilerError> {
    let instance = Instance::from_resource(kt)?;
    info!("🧹 Kubeturbo {} is being deleted, cleaning up", instance.name);

    if kt.spec.args.cleanup_scc_impersonation_resources.unwrap_or(true) {
        stop_workload(&ctx.store, &instance, ctx.pod_wait).await?;
    }

    teardown(&ctx.store, &instance, &kt.spec.service_account_name).await?;

    ctx.store
        .patch_finalizers::<Kubeturbo>(Some(&instance.namespace), &instance.name, &[])
        .await?;
    info!("Removed finalizer {} from Kubeturbo {}", FINALIZER, instance.name);
    Ok(())
}

/// Delete the deployment and give its pods a bounded time to exit
///
/// Timing out is logged and otherwise ignored.
pub async fn stop_workload<S: ObjectStore>(
    store: &S,
    instance: &Instance,
    policy: PodWaitPolicy,
) -> Result<(), ReconcilerError> {
    let namespace = Some(instance.namespace.as_str());
    store
        .delete::<Deployment>(namespace, instance.deployment_name())
        .await?;

    let selector = instance.pod_labels();
    let wait = async {
        loop {
            let pods = store.list::<Pod>(namespace, &selector).await?;
            if pods.is_empty() {
                return Ok::<_, ReconcilerError>(());
            }
            debug!("Waiting for {} kubeturbo pod(s) to exit", pods.len());
            tokio::time::sleep(policy.interval).await;
        }
    };

    match tokio::time::timeout(policy.timeout, wait).await {
        Ok(result) => {
            result?;
            info!("All kubeturbo pods of {} have exited", instance.name);
        }
        Err(_) => warn!(
            "Timed out after {:?} waiting for kubeturbo pods of {} to exit, continuing",
            policy.timeout, instance.name
        ),
    }
    Ok(())
}

/// Release the service account and delete labelled cluster-scoped objects
///
/// Objects that are already gone are skipped.
pub async fn teardown<S: ObjectStore>(
    store: &S,
    instance: &Instance,
    service_account_name: &str,
) -> Result<(), ReconcilerError> {
    release_identity(store, instance, service_account_name).await?;

    let labels = instance.labels();
    delete_labelled::<S, ClusterRole>(store, &labels).await?;
    delete_labelled::<S, ClusterRoleBinding>(store, &labels).await?;
    Ok(())
}

async fn release_identity<S: ObjectStore>(
    store: &S,
    instance: &Instance,
    name: &str,
) -> Result<(), ReconcilerError> {
    if name.is_empty() {
        return Ok(());
    }
    let namespace = Some(instance.namespace.as_str());
    let Some(mut sa) = store.get::<ServiceAccount>(namespace, name).await? else {
        debug!("Service account {} already gone", name);
        return Ok(());
    };

    if release_service_account(&mut sa) {
        store
            .patch_finalizers::<ServiceAccount>(namespace, name, sa.finalizers())
            .await?;
        info!("Removed finalizer from service account {}", name);
    }
    Ok(())
}

async fn delete_labelled<S: ObjectStore, K: ClusterObject>(
    store: &S,
    labels: &BTreeMap<String, String>,
) -> Result<(), ReconcilerError> {
    for obj in store.list::<K>(None, labels).await? {
        let name = obj.name_any();
        if store.delete::<K>(None, &name).await? {
            info!("Deleted {} {}", K::kind_name(), name);
        }
    }
    Ok(())
}

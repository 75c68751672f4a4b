//! # Pre-flight Check
//!
//! Verifies once at startup that the installed Kubeturbo CRD was generated for
//! this operator generation. Reconcile passes wait on [`PreflightGate`] until
//! the check has passed; a failed check stops the process.

use crate::config::OperatorConfig;
use crate::constants::{
    CRD_REMEDIATION_MESSAGE, CRD_SCHEMA_MARKER_ANNOTATION, KUBETURBO_CRD_NAME,
};
use crate::controller::events::{EventSink, REASON_CRD_ISSUE};
use crate::controller::store::{ObjectStore, StoreError};
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("failed to read CRD {name}: {source}")]
    CrdUnavailable {
        name: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("CRD {0} is not installed: {hint}", hint = CRD_REMEDIATION_MESSAGE)]
    CrdMissing(&'static str),

    #[error("CRD {0} is outdated: {hint}", hint = CRD_REMEDIATION_MESSAGE)]
    CrdOutdated(&'static str),
}

/// One-shot gate opened when the pre-flight check has passed
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct PreflightGate {
    state: Arc<watch::Sender<bool>>,
}

impl Default for PreflightGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PreflightGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// A gate that is already open
    pub fn opened() -> Self {
        let gate = Self::new();
        gate.open();
        gate
    }

    pub fn open(&self) {
        self.state.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once the gate is open
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns once open
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// Run the check and open `gate` on success
///
/// On failure a `CRDIssue` warning is published against the operator's own
/// Deployment when it can be found.
pub async fn run_preflight<S: ObjectStore>(
    store: &S,
    events: &dyn EventSink,
    config: &OperatorConfig,
    gate: &PreflightGate,
) -> Result<(), PreflightError> {
    match check_crd(store).await {
        Ok(()) => {
            info!("✅ CRD {} is up to date, starting reconciliation", KUBETURBO_CRD_NAME);
            gate.open();
            Ok(())
        }
        Err(e) => {
            error!("❌ Pre-flight check failed: {}", e);
            match locate_operator_deployment(store, config).await {
                Some(deployment) => {
                    events
                        .warning(
                            &deployment.object_ref(&()),
                            REASON_CRD_ISSUE,
                            "PreflightCheck",
                            e.to_string(),
                        )
                        .await;
                }
                None => warn!("Operator deployment not found, CRD warning event not published"),
            }
            Err(e)
        }
    }
}

async fn check_crd<S: ObjectStore>(store: &S) -> Result<(), PreflightError> {
    let crd = store
        .get::<CustomResourceDefinition>(None, KUBETURBO_CRD_NAME)
        .await
        .map_err(|source| PreflightError::CrdUnavailable {
            name: KUBETURBO_CRD_NAME,
            source,
        })?
        .ok_or(PreflightError::CrdMissing(KUBETURBO_CRD_NAME))?;

    match crd.annotations().get(CRD_SCHEMA_MARKER_ANNOTATION) {
        Some(version) => {
            debug!("CRD {} generated by controller-gen {}", KUBETURBO_CRD_NAME, version);
            Ok(())
        }
        None => Err(PreflightError::CrdOutdated(KUBETURBO_CRD_NAME)),
    }
}

fn owner_of_kind<'a>(owners: &'a [OwnerReference], kind: &str) -> Option<&'a OwnerReference> {
    owners.iter().find(|o| o.kind == kind)
}

/// Follow Pod → ReplicaSet → Deployment from `POD_NAME`
///
/// Returns `None` outside a cluster or when any link is missing.
pub async fn locate_operator_deployment<S: ObjectStore>(
    store: &S,
    config: &OperatorConfig,
) -> Option<Deployment> {
    let (Some(namespace), Some(pod_name)) = (&config.watch_namespace, &config.pod_name) else {
        debug!("POD_NAME or WATCH_NAMESPACE not set, not running in a pod");
        return None;
    };

    match follow_owner_chain(store, namespace, pod_name).await {
        Ok(found) => found,
        Err(e) => {
            warn!("Failed to locate operator deployment: {}", e);
            None
        }
    }
}

async fn follow_owner_chain<S: ObjectStore>(
    store: &S,
    namespace: &str,
    pod_name: &str,
) -> Result<Option<Deployment>, StoreError> {
    let ns = Some(namespace);

    let pod = store.get::<Pod>(ns, pod_name).await?;
    let Some(rs_ref) = pod
        .as_ref()
        .and_then(|p| owner_of_kind(p.owner_references(), "ReplicaSet"))
    else {
        return Ok(None);
    };

    let rs = store.get::<ReplicaSet>(ns, &rs_ref.name).await?;
    let Some(dep_ref) = rs
        .as_ref()
        .and_then(|r| owner_of_kind(r.owner_references(), "Deployment"))
    else {
        return Ok(None);
    };

    store.get::<Deployment>(ns, &dep_ref.name).await
}

//! # Reconcile Steps
//!
//! The ordered create-or-update sequence of an active pass.
//!
//! Order matters: the service account must exist before the deployment
//! references it, and the cluster role before its binding. The sequence stops
//! at the first step that does not return [`StepOutcome::Continue`].

use super::context::Context;
use super::error::{ReconcilerError, RetryReason};
use crate::controller::builders::cluster_role::mutate_cluster_role;
use crate::controller::builders::cluster_role_binding::mutate_cluster_role_binding;
use crate::controller::builders::config_bundle::mutate_config_map;
use crate::controller::builders::deployment::mutate_deployment;
use crate::controller::builders::service_account::mutate_service_account;
use crate::controller::builders::{set_controller_reference, DesiredState, Mutation};
use crate::controller::hash::HashGate;
use crate::controller::instance::is_managed_role;
use crate::controller::store::{ClusterObject, ObjectStore};
use crate::crd::{Kubeturbo, KubeturboStatus};
use crate::observability;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::Resource;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ConfigBundle,
    Identity,
    AccessRole,
    AccessRoleBinding,
    Workload,
    Status,
}

impl Step {
    pub const ORDER: [Step; 6] = [
        Step::ConfigBundle,
        Step::Identity,
        Step::AccessRole,
        Step::AccessRoleBinding,
        Step::Workload,
        Step::Status,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::ConfigBundle => "config-bundle",
            Step::Identity => "service-account",
            Step::AccessRole => "cluster-role",
            Step::AccessRoleBinding => "cluster-role-binding",
            Step::Workload => "deployment",
            Step::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Stop the pass and requeue after the short fixed delay
    Retry(RetryReason),
}

/// One active pass over a single Kubeturbo resource
pub struct Pass<'a, S: ObjectStore> {
    ctx: &'a Context<S>,
    kt: &'a Kubeturbo,
    desired: DesiredState<'a>,
}

impl<'a, S: ObjectStore> Pass<'a, S> {
    pub fn new(ctx: &'a Context<S>, kt: &'a Kubeturbo, desired: DesiredState<'a>) -> Self {
        Self { ctx, kt, desired }
    }

    fn namespace(&self) -> Option<&str> {
        Some(self.desired.instance.namespace.as_str())
    }

    /// Run every step in order
    pub async fn run_all(&self) -> Result<StepOutcome, ReconcilerError> {
        for step in Step::ORDER {
            debug!(step = step.name(), "Running reconcile step");
            match self.run(step).await? {
                StepOutcome::Continue => {}
                retry @ StepOutcome::Retry(_) => return Ok(retry),
            }
        }
        Ok(StepOutcome::Continue)
    }

    pub async fn run(&self, step: Step) -> Result<StepOutcome, ReconcilerError> {
        let instance = self.desired.instance;
        match step {
            Step::ConfigBundle => {
                self.create_or_update::<ConfigMap, _>(
                    self.namespace(),
                    &instance.config_map_name(),
                    mutate_config_map,
                )
                .await
            }
            Step::Identity => {
                self.create_or_update::<ServiceAccount, _>(
                    self.namespace(),
                    &self.desired.spec.service_account_name,
                    mutate_service_account,
                )
                .await
            }
            Step::AccessRole => self.access_role().await,
            Step::AccessRoleBinding => {
                self.create_or_update::<ClusterRoleBinding, _>(
                    None,
                    &self.desired.cluster_role_binding_name(),
                    mutate_cluster_role_binding,
                )
                .await
            }
            Step::Workload => self.workload().await,
            Step::Status => self.status().await,
        }
    }

    async fn access_role(&self) -> Result<StepOutcome, ReconcilerError> {
        let role_name = &self.desired.spec.role_name;
        if !is_managed_role(role_name) {
            debug!("Cluster role {} is managed outside the operator", role_name);
            return Ok(StepOutcome::Continue);
        }
        self.create_or_update::<ClusterRole, _>(
            None,
            &self.desired.cluster_role_name(),
            mutate_cluster_role,
        )
        .await
    }

    /// Apply the deployment, or restart it when the primary config changed
    ///
    /// On restart the new hash is persisted before the deployment is deleted,
    /// so a failed delete is retried without looping on the hash comparison.
    async fn workload(&self) -> Result<StepOutcome, ReconcilerError> {
        let name = self.desired.instance.deployment_name();
        match HashGate::evaluate(self.recorded_hash(), &self.desired.config.primary_hash) {
            HashGate::Apply => {
                self.create_or_update::<Deployment, _>(self.namespace(), name, mutate_deployment)
                    .await
            }
            HashGate::Restart { previous, current } => {
                info!(
                    "🔄 Primary configuration changed (hash {} -> {}), restarting kubeturbo",
                    previous, current
                );
                self.patch_status(&current).await?;
                if self
                    .ctx
                    .store
                    .delete::<Deployment>(self.namespace(), name)
                    .await?
                {
                    info!("Deleted deployment {} to pick up the new configuration", name);
                }
                observability::metrics::increment_workload_restarts();
                Ok(StepOutcome::Retry(RetryReason::DeletionInProgress))
            }
        }
    }

    async fn status(&self) -> Result<StepOutcome, ReconcilerError> {
        let current = &self.desired.config.primary_hash;
        if self.recorded_hash() == current {
            debug!("Status unchanged, skipping update");
        } else {
            self.patch_status(current).await?;
        }
        Ok(StepOutcome::Continue)
    }

    fn recorded_hash(&self) -> &str {
        self.kt
            .status
            .as_ref()
            .map(KubeturboStatus::recorded_hash)
            .unwrap_or_default()
    }

    async fn patch_status(&self, hash: &str) -> Result<(), ReconcilerError> {
        let status = KubeturboStatus::applied(hash);
        self.ctx
            .store
            .patch_status::<Kubeturbo, _>(self.namespace(), &self.desired.instance.name, &status)
            .await?;
        info!("Recorded configuration hash {} in status", hash);
        Ok(())
    }

    /// Fetch or start from an empty shell, shape the object, then submit it
    /// only if it changed
    ///
    /// Namespaced objects are owned by the Kubeturbo resource. A builder asking
    /// for recreation gets the object deleted and the pass retried.
    async fn create_or_update<K, F>(
        &self,
        namespace: Option<&str>,
        name: &str,
        mutate: F,
    ) -> Result<StepOutcome, ReconcilerError>
    where
        K: ClusterObject + Default,
        F: FnOnce(&DesiredState<'a>, &mut K) -> Mutation + Send,
    {
        let store = &self.ctx.store;
        let kind = K::kind_name();
        let existing = store.get::<K>(namespace, name).await?;

        let mut obj = existing.clone().unwrap_or_else(|| {
            let mut shell = K::default();
            shell.meta_mut().name = Some(name.to_string());
            shell.meta_mut().namespace = namespace.map(str::to_string);
            shell
        });
        if namespace.is_some() {
            set_controller_reference(obj.meta_mut(), self.desired.instance.owner_reference());
        }

        if let Mutation::Recreate { reason } = mutate(&self.desired, &mut obj) {
            info!("{} {} must be recreated: {}", kind, name, reason);
            store.delete::<K>(namespace, name).await?;
            return Ok(StepOutcome::Retry(RetryReason::DeletionInProgress));
        }

        match existing {
            None => {
                store.create(namespace, &obj).await?;
                info!("✅ Created {} {}", kind, name);
            }
            Some(current) if current != obj => {
                store.replace(namespace, &obj).await?;
                info!("Updated {} {}", kind, name);
            }
            Some(_) => debug!("{} {} is up to date", kind, name),
        }
        Ok(StepOutcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order() {
        let names: Vec<&str> = Step::ORDER.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "config-bundle",
                "service-account",
                "cluster-role",
                "cluster-role-binding",
                "deployment",
                "status"
            ]
        );
    }
}

//! # Cluster Role Binding
//!
//! Binds the kubeturbo service account to its cluster role.

use super::{DesiredState, Mutation};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleRef, Subject};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Shape the binding
///
/// `roleRef` is immutable, so a binding that points at a different role is
/// reported for recreation.
pub fn mutate_cluster_role_binding(
    desired: &DesiredState<'_>,
    binding: &mut ClusterRoleBinding,
) -> Mutation {
    let role_name = desired.cluster_role_name();
    let current = &binding.role_ref.name;
    if !current.is_empty() && *current != role_name {
        return Mutation::Recreate {
            reason: format!("role reference changed from {current} to {role_name}"),
        };
    }

    binding.metadata.labels = Some(desired.labels.clone());
    binding.subjects = Some(vec![Subject {
        kind: "ServiceAccount".to_string(),
        name: desired.spec.service_account_name.clone(),
        namespace: Some(desired.instance.namespace.clone()),
        ..Subject::default()
    }]);
    binding.role_ref = RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: "ClusterRole".to_string(),
        name: role_name,
    };
    Mutation::Applied
}

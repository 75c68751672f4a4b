//! # Cluster Role
//!
//! Rule tables for the two operator managed roles. `turbo-cluster-reader` can
//! only observe the cluster; `turbo-cluster-admin` can also execute actions.
//! Any other role name is expected to exist already and is left alone.

use super::{DesiredState, Mutation};
use crate::constants::{ROLE_TURBO_ADMIN, ROLE_TURBO_READER};
use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};

const READ: &[&str] = &["get", "list", "watch"];
const UPDATE: &[&str] = &["get", "list", "patch", "update", "watch"];

fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let owned = |items: &[&str]| Some(items.iter().map(|s| (*s).to_string()).collect());
    PolicyRule {
        api_groups: owned(api_groups),
        resources: owned(resources),
        verbs: verbs.iter().map(|s| (*s).to_string()).collect(),
        ..PolicyRule::default()
    }
}

fn reader_rules() -> Vec<PolicyRule> {
    vec![
        rule(
            &[
                "",
                "apps",
                "app.k8s.io",
                "apps.openshift.io",
                "batch",
                "extensions",
                "turbonomic.com",
                "devops.turbonomic.io",
                "config.openshift.io",
            ],
            &[
                // core
                "endpoints",
                "limitranges",
                "namespaces",
                "nodes",
                "persistentvolumeclaims",
                "persistentvolumes",
                "pods",
                "replicationcontrollers",
                "resourcequotas",
                "services",
                // apps
                "daemonsets",
                "deployments",
                "replicasets",
                "statefulsets",
                // app.k8s.io
                "applications",
                // apps.openshift.io
                "deploymentconfigs",
                // batch
                "jobs",
                "cronjobs",
                // turbonomic.com
                "operatorresourcemappings",
                "clusterversions",
            ],
            READ,
        ),
        rule(&["machine.openshift.io"], &["machines", "machinesets"], &["get", "list"]),
        rule(
            &[""],
            &["nodes/spec", "nodes/stats", "nodes/metrics", "nodes/proxy"],
            &["get"],
        ),
        rule(
            &["policy.turbonomic.io"],
            &["slohorizontalscales", "containerverticalscales", "policybindings"],
            READ,
        ),
    ]
}

fn admin_rules() -> Vec<PolicyRule> {
    vec![
        rule(&["", "batch"], &["pods", "jobs"], &["*"]),
        rule(
            &[
                "",
                "apps",
                "apps.openshift.io",
                "extensions",
                "turbonomic.com",
                "devops.turbonomic.io",
                "redis.redis.opstreelabs.in",
                "charts.helm.k8s.io",
            ],
            &[
                "deployments",
                "replicasets",
                "replicationcontrollers",
                "statefulsets",
                "daemonsets",
                "deploymentconfigs",
                "resourcequotas",
                "operatorresourcemappings",
                "operatorresourcemappings/status",
                "redis",
                "xls",
            ],
            UPDATE,
        ),
        rule(
            &[
                "",
                "apps",
                "batch",
                "extensions",
                "policy",
                "app.k8s.io",
                "argoproj.io",
                "apiextensions.k8s.io",
                "config.openshift.io",
            ],
            &[
                "nodes",
                "services",
                "endpoints",
                "namespaces",
                "limitranges",
                "persistentvolumes",
                "persistentvolumeclaims",
                "poddisruptionbudget",
                "cronjobs",
                "applications",
                "customresourcedefinitions",
                "clusterversions",
            ],
            READ,
        ),
        rule(
            &["machine.openshift.io"],
            &["machines", "machinesets"],
            &["get", "list", "update"],
        ),
        rule(
            &[""],
            &[
                "nodes/spec",
                "nodes/stats",
                "nodes/metrics",
                "nodes/proxy",
                "pods/log",
            ],
            &["get"],
        ),
        rule(
            &["policy.turbonomic.io"],
            &["slohorizontalscales", "containerverticalscales", "policybindings"],
            READ,
        ),
        rule(
            &["security.openshift.io"],
            &["securitycontextconstraints"],
            &["list", "use"],
        ),
        rule(
            &[""],
            &["serviceaccounts"],
            &["get", "create", "delete", "impersonate"],
        ),
        rule(
            &["rbac.authorization.k8s.io"],
            &["roles", "rolebindings", "clusterroles", "clusterrolebindings"],
            &["get", "create", "delete", "update"],
        ),
    ]
}

/// Shape a managed cluster role
///
/// Operator-controlled workloads declared under `ormOwners` get an extra
/// update rule when both the API groups and the resources are listed.
pub fn mutate_cluster_role(desired: &DesiredState<'_>, role: &mut ClusterRole) -> Mutation {
    let spec = desired.spec;
    role.metadata.labels = Some(desired.labels.clone());

    let mut rules = match spec.role_name.as_str() {
        ROLE_TURBO_READER => reader_rules(),
        ROLE_TURBO_ADMIN => admin_rules(),
        _ => Vec::new(),
    };

    if let (Some(api_groups), Some(resources)) =
        (&spec.orm_owners.api_group, &spec.orm_owners.resources)
    {
        rules.push(PolicyRule {
            api_groups: Some(api_groups.clone()),
            resources: Some(resources.clone()),
            verbs: UPDATE.iter().map(|s| (*s).to_string()).collect(),
            ..PolicyRule::default()
        });
    }

    role.rules = Some(rules);
    Mutation::Applied
}

//! # Workload Deployment
//!
//! Shapes the single-replica kubeturbo Deployment.

use super::{DesiredState, Mutation};
use crate::constants;
use crate::crd::KubeturboSpec;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMapVolumeSource, Container, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    LocalObjectReference, ObjectFieldSelector, PodSecurityContext, PodSpec, SecretVolumeSource,
    SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;

const CONFIG_VOLUME: &str = "turbo-volume";
const CREDENTIALS_VOLUME: &str = "turbonomic-credentials-volume";
const LOG_VOLUME: &str = "varlog";

/// Shape the kubeturbo Deployment
///
/// A Deployment whose selector differs from the current label set (for
/// example one created by the former Helm based operator) cannot be updated
/// because the selector is immutable, so it is reported for recreation.
///
/// Only the fields the operator owns are written. Values the API server fills
/// in on admission (revision history, DNS policy, termination message path
/// and the like) are left as fetched so a converged Deployment compares equal.
pub fn mutate_deployment(desired: &DesiredState<'_>, dep: &mut Deployment) -> Mutation {
    if let Some(existing) = &dep.spec {
        if existing.selector.match_labels.as_ref() != Some(&desired.labels) {
            return Mutation::Recreate {
                reason: "deployment selector does not match the current labels".to_string(),
            };
        }
    }

    let spec = desired.spec;
    dep.metadata.labels = Some(desired.labels.clone());

    let dep_spec = dep.spec.get_or_insert_with(DeploymentSpec::default);
    // The API server defaults an unset count to one
    dep_spec.replicas = Some(spec.replica_count.unwrap_or(1));
    dep_spec.strategy = Some(DeploymentStrategy {
        type_: Some("Recreate".to_string()),
        rolling_update: None,
    });
    dep_spec.selector = LabelSelector {
        match_labels: Some(desired.labels.clone()),
        match_expressions: None,
    };

    let template = &mut dep_spec.template;
    let metadata = template.metadata.get_or_insert_with(ObjectMeta::default);
    metadata.labels = Some(desired.labels.clone());
    metadata.annotations = non_empty(spec.annotations.clone());
    apply_pod_spec(desired, template.spec.get_or_insert_with(PodSpec::default));

    Mutation::Applied
}

/// `None` for an empty map, matching how the API server prunes it
fn non_empty(map: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!map.is_empty()).then_some(map)
}

fn apply_pod_spec(desired: &DesiredState<'_>, pod: &mut PodSpec) {
    let spec = desired.spec;
    let scheduling = &spec.kubeturbo_pod_scheduling;

    pod.service_account_name = Some(spec.service_account_name.clone());
    pod.image_pull_secrets = spec
        .image
        .image_pull_secret
        .as_ref()
        .map(|name| vec![LocalObjectReference { name: name.clone() }]);
    pod.restart_policy = Some("Always".to_string());
    pod.node_selector = scheduling.node_selector.clone();
    pod.affinity = scheduling.affinity.clone();
    pod.tolerations = scheduling.tolerations.clone();
    pod.security_context
        .get_or_insert_with(PodSecurityContext::default)
        .run_as_non_root = Some(true);

    let mut container = take_named(&mut pod.containers, constants::CONTAINER_NAME);
    apply_container(spec, &mut container);
    pod.containers = vec![container];

    let mut volumes = pod.volumes.take().unwrap_or_default();
    let mut config = take_named(&mut volumes, CONFIG_VOLUME);
    config
        .config_map
        .get_or_insert_with(ConfigMapVolumeSource::default)
        .name = desired.instance.config_map_name();

    let mut credentials = take_named(&mut volumes, CREDENTIALS_VOLUME);
    let secret = credentials
        .secret
        .get_or_insert_with(SecretVolumeSource::default);
    secret.secret_name = Some(
        spec.rest_api_config
            .turbonomic_credentials_secret_name
            .clone(),
    );
    secret.optional = Some(true);
    secret.default_mode = Some(constants::CREDENTIALS_FILE_MODE);

    let mut logs = take_named(&mut volumes, LOG_VOLUME);
    logs.empty_dir.get_or_insert_with(EmptyDirVolumeSource::default);

    pod.volumes = Some(vec![config, credentials, logs]);
}

/// Items the pod spec lists by name
trait Named: Default {
    fn name_mut(&mut self) -> &mut String;
}

impl Named for Container {
    fn name_mut(&mut self) -> &mut String {
        &mut self.name
    }
}

impl Named for Volume {
    fn name_mut(&mut self) -> &mut String {
        &mut self.name
    }
}

/// Remove the item called `name` from `items`, or start a fresh one
fn take_named<T: Named>(items: &mut Vec<T>, name: &str) -> T {
    match items.iter_mut().position(|item| item.name_mut().as_str() == name) {
        Some(index) => items.remove(index),
        None => {
            let mut item = T::default();
            *item.name_mut() = name.to_string();
            item
        }
    }
}

fn apply_container(spec: &KubeturboSpec, container: &mut Container) {
    container.image = Some(format!(
        "{}:{}",
        spec.image.repository,
        spec.image.tag.as_deref().unwrap_or_default()
    ));
    container.image_pull_policy = Some(
        spec.image
            .pull_policy
            .clone()
            .unwrap_or_else(|| constants::DEFAULT_PULL_POLICY.to_string()),
    );
    container.args = Some(container_args(spec));
    container.env = Some(vec![EnvVar {
        name: "KUBETURBO_NAMESPACE".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: "metadata.namespace".to_string(),
            }),
            ..EnvVarSource::default()
        }),
        ..EnvVar::default()
    }]);
    container.security_context = Some(SecurityContext {
        privileged: Some(false),
        allow_privilege_escalation: Some(false),
        read_only_root_filesystem: Some(true),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            add: None,
        }),
        ..SecurityContext::default()
    });
    // Stored as an empty object when unset
    container.resources = Some(spec.resources.clone().unwrap_or_default());
    container.volume_mounts = Some(vec![
        VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: constants::CONFIG_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        },
        VolumeMount {
            name: CREDENTIALS_VOLUME.to_string(),
            mount_path: constants::CREDENTIALS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..VolumeMount::default()
        },
        VolumeMount {
            name: LOG_VOLUME.to_string(),
            mount_path: constants::LOG_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        },
    ]);
}

/// Container arguments: the config path followed by one flag per set toggle
pub fn container_args(spec: &KubeturboSpec) -> Vec<String> {
    let args = &spec.args;
    let image = &spec.image;
    let mut out = vec![format!(
        "--turboconfig={}/{}",
        constants::CONFIG_MOUNT_PATH,
        constants::PRIMARY_CONFIG_KEY
    )];

    let mut push = |flag: &str, value: Option<String>| {
        if let Some(value) = value {
            out.push(format!("--{flag}={value}"));
        }
    };

    push("v", args.logging_level.map(|v| v.to_string()));
    push("kubelet-https", args.kubelet_https.map(|v| v.to_string()));
    push("kubelet-port", args.kubelet_port.map(|v| v.to_string()));
    push("scc-support", args.scc_support.clone());
    push(
        "readiness-retry-threshold",
        args.readiness_retry_threshold.map(|v| v.to_string()),
    );
    push(
        "fail-volume-pod-moves",
        args.fail_volume_pod_moves.map(|v| v.to_string()),
    );
    push("busybox-image", image.busybox_repository.clone());
    push("busybox-image-pull-secret", image.image_pull_secret.clone());
    push(
        "cpufreqgetter-image-pull-secret",
        image.image_pull_secret.clone(),
    );
    push("cpufreqgetter-image", image.cpufreqgetter_repository.clone());
    push(
        "cpufreq-job-exclude-node-labels",
        args.busybox_exclude_node_labels.clone(),
    );
    push("stitch-uuid", args.stitch_uuid.map(|v| v.to_string()));
    push(
        "k8sVersion",
        args.pre16_k8s_version
            .filter(|pre16| *pre16)
            .map(|_| "1.5".to_string()),
    );
    push(
        "cleanup-scc-impersonation-resources",
        args.cleanup_scc_impersonation_resources
            .map(|v| v.to_string()),
    );
    push(
        "skip-creating-scc-impersonation-resources",
        args.skip_creating_scc_impersonation_resources
            .map(|v| v.to_string()),
    );
    push("git-email", args.git_email.clone());
    push("git-username", args.git_username.clone());
    push("git-secret-name", args.git_secret_name.clone());
    push("git-secret-namespace", args.git_secret_namespace.clone());
    push("git-commit-mode", args.git_commit_mode.clone());
    push(
        "satellite-location-provider",
        args.satellite_location_provider.clone(),
    );
    push(
        "discovery-interval-sec",
        args.discovery_interval_sec.map(|v| v.to_string()),
    );
    push(
        "discovery-sample-interval",
        args.discovery_sample_interval_sec.map(|v| v.to_string()),
    );
    push(
        "discovery-samples",
        args.discovery_samples.map(|v| v.to_string()),
    );
    push(
        "discovery-timeout-sec",
        args.discovery_timeout_sec.map(|v| v.to_string()),
    );
    push(
        "garbage-collection-interval",
        args.garbage_collection_interval_min.map(|v| v.to_string()),
    );
    push(
        "discovery-workers",
        args.discovery_workers.map(|v| v.to_string()),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::instance::tests::kubeturbo;
    use crate::controller::instance::Instance;
    use crate::crd::{apply_defaults, DefaultVersion};
    use serde_json::json;

    fn defaulted(value: serde_json::Value) -> KubeturboSpec {
        let mut spec: KubeturboSpec = serde_json::from_value(value).unwrap();
        apply_defaults(&mut spec, &DefaultVersion::with_value("8.14.6")).unwrap();
        spec
    }

    fn instance() -> Instance {
        Instance::from_resource(&kubeturbo("kt", "turbo", "uid-1")).unwrap()
    }

    #[test]
    fn test_default_container_args() {
        let args = container_args(&defaulted(json!({})));
        assert_eq!(
            args,
            vec![
                "--turboconfig=/etc/kubeturbo/primary",
                "--v=2",
                "--kubelet-https=true",
                "--kubelet-port=10250",
                "--stitch-uuid=true",
                "--cleanup-scc-impersonation-resources=true",
                "--skip-creating-scc-impersonation-resources=false",
                "--discovery-interval-sec=600",
                "--discovery-sample-interval=60",
                "--discovery-samples=10",
                "--discovery-timeout-sec=180",
                "--garbage-collection-interval=10",
                "--discovery-workers=10",
            ]
        );
    }

    #[test]
    fn test_pull_secret_feeds_both_helper_images() {
        let args = container_args(&defaulted(json!({
            "image": { "imagePullSecret": "regcred" },
            "args": { "pre16k8sVersion": true }
        })));
        assert!(args.contains(&"--busybox-image-pull-secret=regcred".to_string()));
        assert!(args.contains(&"--cpufreqgetter-image-pull-secret=regcred".to_string()));
        assert!(args.contains(&"--k8sVersion=1.5".to_string()));
    }

    #[test]
    fn test_deployment_shape() {
        let spec = defaulted(json!({ "replicaCount": 1 }));
        let instance = instance();
        let desired = DesiredState::new(&spec, &instance).unwrap();
        let mut dep = Deployment::default();

        assert_eq!(mutate_deployment(&desired, &mut dep), Mutation::Applied);

        let dep_spec = dep.spec.unwrap();
        assert_eq!(dep_spec.replicas, Some(1));
        assert_eq!(
            dep_spec.strategy.and_then(|s| s.type_).as_deref(),
            Some("Recreate")
        );
        assert_eq!(dep_spec.selector.match_labels, Some(instance.labels()));

        let pod = dep_spec.template.spec.unwrap();
        assert_eq!(pod.service_account_name.as_deref(), Some("turbo-user"));
        let container = &pod.containers[0];
        assert_eq!(
            container.image.as_deref(),
            Some("icr.io/cpopen/turbonomic/kubeturbo:8.14.6")
        );
        let volumes = pod.volumes.unwrap();
        assert_eq!(
            volumes[0].config_map.as_ref().map(|c| c.name.as_str()),
            Some("turbo-config-kt")
        );
        assert_eq!(
            volumes[1].secret.as_ref().and_then(|s| s.default_mode),
            Some(0o644)
        );
    }

    #[test]
    fn test_mismatched_selector_requests_recreate() {
        let spec = defaulted(json!({}));
        let instance = instance();
        let desired = DesiredState::new(&spec, &instance).unwrap();

        let mut legacy = Deployment::default();
        legacy.spec = Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(
                    [("app".to_string(), "kubeturbo".to_string())]
                        .into_iter()
                        .collect(),
                ),
                match_expressions: None,
            },
            ..DeploymentSpec::default()
        });
        let before = legacy.clone();

        assert!(matches!(
            mutate_deployment(&desired, &mut legacy),
            Mutation::Recreate { .. }
        ));
        assert_eq!(legacy, before);
    }

    /// Fill in what the API server adds on admission
    fn server_normalized(mut dep: Deployment) -> Deployment {
        let dep_spec = dep.spec.as_mut().unwrap();
        dep_spec.progress_deadline_seconds = Some(600);
        dep_spec.revision_history_limit = Some(10);
        let pod = dep_spec.template.spec.as_mut().unwrap();
        pod.dns_policy = Some("ClusterFirst".to_string());
        pod.scheduler_name = Some("default-scheduler".to_string());
        pod.termination_grace_period_seconds = Some(30);
        pod.service_account = pod.service_account_name.clone();
        let container = &mut pod.containers[0];
        container.termination_message_path = Some("/dev/termination-log".to_string());
        container.termination_message_policy = Some("File".to_string());
        let volumes = pod.volumes.as_mut().unwrap();
        volumes[0].config_map.as_mut().unwrap().default_mode = Some(0o644);
        dep
    }

    #[test]
    fn test_server_defaults_survive_mutation() {
        let spec = defaulted(json!({}));
        let instance = instance();
        let desired = DesiredState::new(&spec, &instance).unwrap();

        let mut dep = Deployment::default();
        mutate_deployment(&desired, &mut dep);
        let pod = dep.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        assert_eq!(pod.image_pull_secrets, None);

        let mut stored = server_normalized(dep);
        let before = stored.clone();
        assert_eq!(mutate_deployment(&desired, &mut stored), Mutation::Applied);
        assert_eq!(stored, before);
    }

    #[test]
    fn test_pull_secret_is_referenced_by_pod() {
        let spec = defaulted(json!({ "image": { "imagePullSecret": "regcred" } }));
        let instance = instance();
        let desired = DesiredState::new(&spec, &instance).unwrap();

        let mut dep = Deployment::default();
        mutate_deployment(&desired, &mut dep);
        let pod = dep.spec.unwrap().template.spec.unwrap();
        assert_eq!(
            pod.image_pull_secrets,
            Some(vec![LocalObjectReference {
                name: "regcred".to_string()
            }])
        );
    }

    #[test]
    fn test_rebuilding_converged_deployment_is_noop() {
        let spec = defaulted(json!({}));
        let instance = instance();
        let desired = DesiredState::new(&spec, &instance).unwrap();

        let mut dep = Deployment::default();
        mutate_deployment(&desired, &mut dep);
        let converged = dep.clone();
        assert_eq!(mutate_deployment(&desired, &mut dep), Mutation::Applied);
        assert_eq!(dep, converged);
    }
}

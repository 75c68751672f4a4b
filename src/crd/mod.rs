//! # Custom Resource Definitions
//!
//! CRD types for the Kubeturbo operator.
//!
//! The `Kubeturbo` resource declares how a single kubeturbo agent should be
//! deployed into its namespace. Every block of `.spec` is optional on the wire;
//! missing blocks deserialize to the same defaults the CRD schema advertises, so
//! a resource created with `spec: {}` is complete apart from the version fields
//! filled in by [`defaults::apply_defaults`].

pub mod defaults;
pub mod status;

pub use defaults::*;
pub use status::*;

use crate::constants;
use k8s_openapi::api::core::v1::{Affinity, ResourceRequirements, Toleration};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{CustomResource, CustomResourceExt};
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kubeturbo Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: charts.helm.k8s.io/v1
/// kind: Kubeturbo
/// metadata:
///   name: kubeturbo-release
///   namespace: turbo
/// spec:
///   serverMeta:
///     turboServer: https://turbo.example.com
///   targetConfig:
///     targetName: prod-cluster
///   roleName: turbo-cluster-reader
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    kind = "Kubeturbo",
    group = "charts.helm.k8s.io",
    version = "v1",
    plural = "kubeturbos",
    shortname = "kt",
    namespaced,
    status = "KubeturboStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Config Hash", "type":"string", "jsonPath":".status.configHash"}, {"name":"Last Updated", "type":"string", "jsonPath":".status.lastUpdatedTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KubeturboSpec {
    /// Patterns used by kubeturbo to recognise daemon pods
    #[serde(default)]
    pub daemon_pod_detectors: DaemonPodDetectors,
    /// Annotation keys kubeturbo is allowed to read from workloads
    #[serde(default)]
    pub annotation_whitelist: AnnotationWhitelist,
    /// Annotations added to the kubeturbo pod template
    #[serde(default = "default_annotations")]
    pub annotations: BTreeMap<String, String>,
    /// Cluster role granted to the kubeturbo service account.
    /// `turbo-cluster-admin` and `turbo-cluster-reader` are created and owned by
    /// the operator; any other name must already exist in the cluster.
    #[serde(default = "default_role_name")]
    pub role_name: String,
    /// Prefix of the cluster role binding name
    #[serde(default = "default_role_binding")]
    pub role_binding: String,
    /// Service account the kubeturbo pod runs as
    #[serde(default = "default_service_account_name")]
    pub service_account_name: String,
    #[serde(default)]
    pub replica_count: Option<i32>,
    #[serde(default)]
    pub image: KubeturboImage,
    #[serde(default)]
    pub server_meta: ServerMeta,
    #[serde(default, rename = "restAPIConfig")]
    pub rest_api_config: RestApiConfig,
    #[serde(default)]
    pub sdk_protocol_config: SdkProtocolConfig,
    /// Feature gates forwarded verbatim to kubeturbo
    #[serde(default)]
    pub feature_gates: BTreeMap<String, bool>,
    #[serde(default, rename = "HANodeConfig")]
    pub ha_node_config: HaNodeConfig,
    #[serde(default)]
    pub target_config: TargetConfig,
    /// Command line toggles passed to the kubeturbo container
    #[serde(default)]
    pub args: KubeturboArgs,
    /// Compute resources for the kubeturbo container
    #[serde(default)]
    #[schemars(schema_with = "preserve_unknown_object")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub node_pool_size: NodePoolSize,
    /// Extra API groups and resources the cluster role must be able to update
    #[serde(default)]
    pub orm_owners: OrmOwners,
    #[serde(default)]
    pub system_workload_detectors: SystemWorkloadDetectors,
    #[serde(default)]
    pub exclusion_detectors: ExclusionDetectors,
    #[serde(default)]
    pub wiremock: Wiremock,
    #[serde(default)]
    pub discovery: Discovery,
    /// Scheduling constraints for the kubeturbo pod
    #[serde(default)]
    pub kubeturbo_pod_scheduling: PodScheduling,
}

/// Kubeturbo container image settings
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct KubeturboImage {
    pub repository: String,
    /// Image tag; `VERSION` or unset means the operator's default version
    pub tag: Option<String>,
    pub busybox_repository: Option<String>,
    pub cpufreqgetter_repository: Option<String>,
    pub pull_policy: Option<String>,
    pub image_pull_secret: Option<String>,
}

impl Default for KubeturboImage {
    fn default() -> Self {
        Self {
            repository: constants::DEFAULT_IMAGE_REPOSITORY.to_string(),
            tag: None,
            busybox_repository: None,
            cpufreqgetter_repository: None,
            pull_policy: Some(constants::DEFAULT_PULL_POLICY.to_string()),
            image_pull_secret: None,
        }
    }
}

/// Turbonomic server connection metadata
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerMeta {
    /// Turbonomic server version; `VERSION` or unset means the operator's default version
    pub version: Option<String>,
    pub turbo_server: String,
    pub proxy: Option<String>,
}

impl Default for ServerMeta {
    fn default() -> Self {
        Self {
            version: None,
            turbo_server: constants::DEFAULT_TURBO_SERVER.to_string(),
            proxy: None,
        }
    }
}

/// Credentials used by kubeturbo to call the Turbonomic REST API
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RestApiConfig {
    pub turbonomic_credentials_secret_name: String,
    pub ops_manager_user_name: Option<String>,
    pub ops_manager_password: Option<String>,
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            turbonomic_credentials_secret_name: constants::DEFAULT_CREDENTIALS_SECRET_NAME
                .to_string(),
            ops_manager_user_name: None,
            ops_manager_password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SdkProtocolConfig {
    pub registration_timeout_sec: Option<i64>,
    pub restart_on_registration_timeout: Option<bool>,
}

impl Default for SdkProtocolConfig {
    fn default() -> Self {
        Self {
            registration_timeout_sec: Some(300),
            restart_on_registration_timeout: Some(true),
        }
    }
}

/// Node roles that host the HA control plane, as a comma separated list
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HaNodeConfig {
    pub node_roles: String,
}

impl Default for HaNodeConfig {
    fn default() -> Self {
        Self {
            node_roles: constants::DEFAULT_NODE_ROLES.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TargetConfig {
    pub target_name: Option<String>,
}

/// Command line toggles for the kubeturbo container
///
/// Unset values are omitted from the container arguments entirely.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct KubeturboArgs {
    #[serde(rename = "logginglevel")]
    pub logging_level: Option<i64>,
    #[serde(rename = "kubelethttps")]
    pub kubelet_https: Option<bool>,
    #[serde(rename = "kubeletport")]
    pub kubelet_port: Option<i64>,
    #[serde(rename = "sccsupport")]
    pub scc_support: Option<String>,
    pub readiness_retry_threshold: Option<i32>,
    pub fail_volume_pod_moves: Option<bool>,
    /// Comma separated `key=value` node labels excluded from cpufreq jobs
    pub busybox_exclude_node_labels: Option<String>,
    #[serde(rename = "stitchuuid")]
    pub stitch_uuid: Option<bool>,
    #[serde(rename = "pre16k8sVersion")]
    pub pre16_k8s_version: Option<bool>,
    /// Also makes the operator wait for kubeturbo pods to exit on deletion
    pub cleanup_scc_impersonation_resources: Option<bool>,
    pub skip_creating_scc_impersonation_resources: Option<bool>,
    pub git_email: Option<String>,
    pub git_username: Option<String>,
    pub git_secret_name: Option<String>,
    pub git_secret_namespace: Option<String>,
    pub git_commit_mode: Option<String>,
    pub satellite_location_provider: Option<String>,
    pub discovery_interval_sec: Option<i64>,
    pub discovery_sample_interval_sec: Option<i64>,
    pub discovery_samples: Option<i64>,
    pub discovery_timeout_sec: Option<i64>,
    pub garbage_collection_interval_min: Option<i64>,
    pub discovery_workers: Option<i64>,
}

impl Default for KubeturboArgs {
    fn default() -> Self {
        Self {
            logging_level: Some(2),
            kubelet_https: Some(true),
            kubelet_port: Some(10250),
            scc_support: None,
            readiness_retry_threshold: None,
            fail_volume_pod_moves: None,
            busybox_exclude_node_labels: None,
            stitch_uuid: Some(true),
            pre16_k8s_version: Some(false),
            cleanup_scc_impersonation_resources: Some(true),
            skip_creating_scc_impersonation_resources: Some(false),
            git_email: None,
            git_username: None,
            git_secret_name: None,
            git_secret_namespace: None,
            git_commit_mode: None,
            satellite_location_provider: None,
            discovery_interval_sec: Some(600),
            discovery_sample_interval_sec: Some(60),
            discovery_samples: Some(10),
            discovery_timeout_sec: Some(180),
            garbage_collection_interval_min: Some(10),
            discovery_workers: Some(10),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DaemonPodDetectors {
    pub pod_name_patterns: Option<Vec<String>>,
    pub namespace_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnotationWhitelist {
    pub container_spec: Option<String>,
    pub namespace: Option<String>,
    pub workload_controller: Option<String>,
}

/// Runtime log level of kubeturbo (hot reloaded)
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Logging {
    pub level: Option<i64>,
}

impl Default for Logging {
    fn default() -> Self {
        Self { level: Some(2) }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct NodePoolSize {
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Default for NodePoolSize {
    fn default() -> Self {
        Self {
            min: Some(1),
            max: Some(1000),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct OrmOwners {
    pub api_group: Option<Vec<String>>,
    pub resources: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemWorkloadDetectors {
    pub namespace_patterns: Option<Vec<String>>,
}

impl Default for SystemWorkloadDetectors {
    fn default() -> Self {
        Self {
            namespace_patterns: Some(default_system_namespace_patterns()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ExclusionDetectors {
    pub operator_controlled_workloads_patterns: Option<Vec<String>>,
    pub operator_controlled_namespace_patterns: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Wiremock {
    pub enabled: Option<bool>,
    pub url: Option<String>,
}

impl Default for Wiremock {
    fn default() -> Self {
        Self {
            enabled: Some(false),
            url: Some("wiremock:8080".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Discovery {
    pub chunk_send_delay_millis: Option<i32>,
    pub num_objects_per_chunk: Option<i32>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self {
            chunk_send_delay_millis: Some(0),
            num_objects_per_chunk: Some(5000),
        }
    }
}

/// Pod scheduling constraints, passed through to the pod spec unchanged
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PodScheduling {
    pub node_selector: Option<BTreeMap<String, String>>,
    #[schemars(schema_with = "preserve_unknown_object")]
    pub affinity: Option<Affinity>,
    #[schemars(schema_with = "preserve_unknown_array")]
    pub tolerations: Option<Vec<Toleration>>,
}

/// Native Kubernetes types are validated by the API server where they are used,
/// so the CRD only needs to keep them intact.
fn preserve_unknown_object(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "object",
        "nullable": true,
        "x-kubernetes-preserve-unknown-fields": true
    })
}

fn preserve_unknown_array(_gen: &mut SchemaGenerator) -> Schema {
    schemars::json_schema!({
        "type": "array",
        "nullable": true,
        "items": {
            "type": "object",
            "x-kubernetes-preserve-unknown-fields": true
        }
    })
}

fn default_annotations() -> BTreeMap<String, String> {
    BTreeMap::from([(
        constants::DEFAULT_ANNOTATION_KEY.to_string(),
        constants::DEFAULT_ANNOTATION_VALUE.to_string(),
    )])
}

fn default_role_name() -> String {
    constants::ROLE_CLUSTER_ADMIN.to_string()
}

fn default_role_binding() -> String {
    constants::DEFAULT_ROLE_BINDING.to_string()
}

fn default_service_account_name() -> String {
    constants::DEFAULT_SERVICE_ACCOUNT_NAME.to_string()
}

pub(crate) fn default_system_namespace_patterns() -> Vec<String> {
    constants::DEFAULT_SYSTEM_NAMESPACE_PATTERNS
        .iter()
        .map(|p| (*p).to_string())
        .collect()
}

/// Build the Kubeturbo CRD manifest
///
/// The generated definition carries the schema generator annotation that the
/// operator's pre-flight check requires before it starts reconciling.
pub fn kubeturbo_crd() -> CustomResourceDefinition {
    let mut crd = Kubeturbo::crd();
    crd.metadata
        .annotations
        .get_or_insert_with(BTreeMap::new)
        .insert(
            constants::CRD_SCHEMA_MARKER_ANNOTATION.to_string(),
            constants::CRD_SCHEMA_MARKER_VERSION.to_string(),
        );
    crd
}

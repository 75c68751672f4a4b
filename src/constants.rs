//! # Constants
//!
//! Shared names, defaults and timings used across the operator.

use std::time::Duration;

// Finalizers

/// Finalizer owned by this operator, placed on the Kubeturbo resource and on
/// the kubeturbo service account
pub const FINALIZER: &str = "helm.k8s.io/finalizer";

/// Field manager used for status and finalizer patches
pub const FIELD_MANAGER: &str = "kubeturbo-operator";

// Custom resource definition

pub const KUBETURBO_CRD_NAME: &str = "kubeturbos.charts.helm.k8s.io";
pub const CRD_SCHEMA_MARKER_ANNOTATION: &str = "controller-gen.kubebuilder.io/version";
pub const CRD_SCHEMA_MARKER_VERSION: &str = "v0.16.1";
pub const CRD_REMEDIATION_MESSAGE: &str = "since 8.14.3, kubeturbo operator has moved from helm operator to go based operator. Please refer to https://ibm.biz/KubeturboCRD to install and upgrade to the latest CRD";

// Spec defaults

pub const DEFAULT_VERSION_ENV_VAR: &str = "DEFAULT_KUBETURBO_VERSION";
pub const VERSION_PLACEHOLDER: &str = "VERSION";
pub const DEFAULT_ANNOTATION_KEY: &str = "kubeturbo.io/controllable";
pub const DEFAULT_ANNOTATION_VALUE: &str = "false";
pub const DEFAULT_SYSTEM_NAMESPACE_PATTERNS: &[&str] = &["kube-.*", "openshift-.*", "cattle.*"];
pub const DEFAULT_IMAGE_REPOSITORY: &str = "icr.io/cpopen/turbonomic/kubeturbo";
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";
pub const DEFAULT_TURBO_SERVER: &str = "https://Turbo_server_URL";
pub const DEFAULT_CREDENTIALS_SECRET_NAME: &str = "turbonomic-credentials";
pub const DEFAULT_NODE_ROLES: &str = "\"master\"";
pub const DEFAULT_ROLE_BINDING: &str = "turbo-all-binding";
pub const DEFAULT_SERVICE_ACCOUNT_NAME: &str = "turbo-user";

// Cluster roles

pub const ROLE_CLUSTER_ADMIN: &str = "cluster-admin";
pub const ROLE_TURBO_ADMIN: &str = "turbo-cluster-admin";
pub const ROLE_TURBO_READER: &str = "turbo-cluster-reader";

// Labels

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_PART_OF: &str = "app.kubernetes.io/part-of";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_CREATED_BY: &str = "app.kubernetes.io/created-by";
pub const OPERATOR_NAME: &str = "kubeturbo-operator";
pub const COMPONENT_KUBETURBO: &str = "kubeturbo";

/// Kubernetes label values are limited to 63 characters
pub const MAX_LABEL_VALUE_LEN: usize = 63;

// Managed workload

pub const CONTAINER_NAME: &str = "kubeturbo";
pub const CONFIG_MAP_PREFIX: &str = "turbo-config";
pub const PRIMARY_CONFIG_KEY: &str = "primary";
pub const SECONDARY_CONFIG_KEY: &str = "secondary";
pub const CONFIG_MOUNT_PATH: &str = "/etc/kubeturbo";
pub const CREDENTIALS_MOUNT_PATH: &str = "/etc/turbonomic-credentials";
pub const LOG_MOUNT_PATH: &str = "/var/log";
pub const CREDENTIALS_FILE_MODE: i32 = 0o644;

// Timings

/// Delay before retrying after a conflict or a deliberate deletion
pub const REQUEUE_DELAY: Duration = Duration::from_secs(1);

/// Poll interval while waiting for kubeturbo pods to exit
pub const POD_WAIT_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on the wait for kubeturbo pods to exit
pub const POD_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Error backoff bounds (seconds)
pub const ERROR_BACKOFF_MIN_SECS: u64 = 1;
pub const ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Fallback requeue when backoff state cannot be read
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 5;

// Server

pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

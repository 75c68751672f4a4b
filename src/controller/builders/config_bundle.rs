//! # Configuration Bundle
//!
//! Renders the two kubeturbo configuration payloads and stores them in the
//! instance's ConfigMap.
//!
//! - `primary` is read by kubeturbo at startup; changing it requires a restart
//! - `secondary` is watched and reloaded by the running process

use super::{DesiredState, Mutation};
use crate::constants::{PRIMARY_CONFIG_KEY, SECONDARY_CONFIG_KEY};
use crate::controller::hash::config_hash;
use crate::crd::KubeturboSpec;
use k8s_openapi::api::core::v1::ConfigMap;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Rendered payloads plus the fingerprint of the primary one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub primary: String,
    pub secondary: String,
    pub primary_hash: String,
}

impl RenderedConfig {
    pub fn render(spec: &KubeturboSpec) -> Result<Self, serde_json::Error> {
        let primary = serde_json::to_string_pretty(&primary_config(spec))?;
        let secondary = serde_json::to_string_pretty(&secondary_config(spec))?;
        let primary_hash = config_hash(primary.as_bytes());
        Ok(Self {
            primary,
            secondary,
            primary_hash,
        })
    }
}

/// Split the comma separated node roles, dropping the quotes around each role
fn node_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|role| {
            role.strip_prefix('"')
                .and_then(|r| r.strip_suffix('"'))
                .unwrap_or(role)
                .to_string()
        })
        .collect()
}

/// Startup configuration (`primary` key)
pub fn primary_config(spec: &KubeturboSpec) -> Value {
    let mut server_meta = Map::new();
    server_meta.insert(
        "version".to_string(),
        json!(spec.server_meta.version.as_deref().unwrap_or_default()),
    );
    if !spec.server_meta.turbo_server.is_empty() {
        server_meta.insert("turboServer".to_string(), json!(spec.server_meta.turbo_server));
    }
    if let Some(proxy) = &spec.server_meta.proxy {
        server_meta.insert("proxy".to_string(), json!(proxy));
    }

    let mut communication = Map::new();
    communication.insert("serverMeta".to_string(), Value::Object(server_meta));

    let rest = &spec.rest_api_config;
    if let (Some(user), Some(password)) = (&rest.ops_manager_user_name, &rest.ops_manager_password) {
        communication.insert(
            "restAPIConfig".to_string(),
            json!({ "opsManagerUserName": user, "opsManagerPassword": password }),
        );
    }

    let sdk = &spec.sdk_protocol_config;
    if sdk.registration_timeout_sec.is_some() || sdk.restart_on_registration_timeout.is_some() {
        let mut block = Map::new();
        if let Some(timeout) = sdk.registration_timeout_sec {
            block.insert("registrationTimeoutSec".to_string(), json!(timeout));
        }
        if let Some(restart) = sdk.restart_on_registration_timeout {
            block.insert("restartOnRegistrationTimeout".to_string(), json!(restart));
        }
        communication.insert("sdkProtocolConfig".to_string(), Value::Object(block));
    }

    let mut config = Map::new();
    config.insert("communicationConfig".to_string(), Value::Object(communication));
    config.insert(
        "HANodeConfig".to_string(),
        json!({ "roles": node_roles(&spec.ha_node_config.node_roles) }),
    );

    if !spec.feature_gates.is_empty() {
        config.insert("featureGates".to_string(), json!(spec.feature_gates));
    }

    if let Some(target_name) = &spec.target_config.target_name {
        config.insert("targetConfig".to_string(), json!({ "targetName": target_name }));
    }

    let whitelist = &spec.annotation_whitelist;
    let mut annotation_white_list = Map::new();
    for (key, value) in [
        ("containerSpec", &whitelist.container_spec),
        ("namespace", &whitelist.namespace),
        ("workloadController", &whitelist.workload_controller),
    ] {
        if let Some(value) = value {
            annotation_white_list.insert(key.to_string(), json!(value));
        }
    }
    if !annotation_white_list.is_empty() {
        config.insert(
            "annotationWhiteList".to_string(),
            Value::Object(annotation_white_list),
        );
    }

    Value::Object(config)
}

/// Insert `block` under `key` when at least one of its fields is set
fn insert_block(config: &mut Map<String, Value>, key: &str, fields: Vec<(&str, Option<Value>)>) {
    let block: Map<String, Value> = fields
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect();
    if !block.is_empty() {
        config.insert(key.to_string(), Value::Object(block));
    }
}

/// Hot reloadable configuration (`secondary` key)
pub fn secondary_config(spec: &KubeturboSpec) -> Value {
    let mut config = Map::new();

    if let Some(level) = spec.logging.level {
        config.insert("logging".to_string(), json!(level));
    }

    insert_block(
        &mut config,
        "nodePoolSize",
        vec![
            ("min", spec.node_pool_size.min.map(|v| json!(v))),
            ("max", spec.node_pool_size.max.map(|v| json!(v))),
        ],
    );

    insert_block(
        &mut config,
        "systemWorkloadDetectors",
        vec![(
            "namespacePatterns",
            spec.system_workload_detectors
                .namespace_patterns
                .as_ref()
                .map(|v| json!(v)),
        )],
    );

    let exclusion = &spec.exclusion_detectors;
    insert_block(
        &mut config,
        "exclusionDetectors",
        vec![
            (
                "operatorControlledWorkloadsPatterns",
                exclusion
                    .operator_controlled_workloads_patterns
                    .as_ref()
                    .map(|v| json!(v)),
            ),
            (
                "operatorControlledNamespacePatterns",
                exclusion
                    .operator_controlled_namespace_patterns
                    .as_ref()
                    .map(|v| json!(v)),
            ),
        ],
    );

    let daemon = &spec.daemon_pod_detectors;
    insert_block(
        &mut config,
        "daemonPodDetectors",
        vec![
            (
                "podNamePatterns",
                daemon.pod_name_patterns.as_ref().map(|v| json!(v)),
            ),
            (
                "namespacePatterns",
                daemon.namespace_patterns.as_ref().map(|v| json!(v)),
            ),
        ],
    );

    insert_block(
        &mut config,
        "discovery",
        vec![
            (
                "chunkSendDelayMillis",
                spec.discovery.chunk_send_delay_millis.map(|v| json!(v)),
            ),
            (
                "numObjectsPerChunk",
                spec.discovery.num_objects_per_chunk.map(|v| json!(v)),
            ),
        ],
    );

    if let (Some(true), Some(url)) = (spec.wiremock.enabled, &spec.wiremock.url) {
        config.insert("wiremock".to_string(), json!({ "enabled": true, "url": url }));
    }

    Value::Object(config)
}

/// Shape the ConfigMap holding both payloads
pub fn mutate_config_map(desired: &DesiredState<'_>, cm: &mut ConfigMap) -> Mutation {
    cm.metadata.labels = Some(desired.labels.clone());
    cm.data = Some(BTreeMap::from([
        (PRIMARY_CONFIG_KEY.to_string(), desired.config.primary.clone()),
        (SECONDARY_CONFIG_KEY.to_string(), desired.config.secondary.clone()),
    ]));
    Mutation::Applied
}

//! # Kubeturbo Status
//!
//! Status sub-resource recording what the operator last applied.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of the Kubeturbo resource
///
/// Only two fields are persisted. `config_hash` must always describe the
/// primary configuration that was last written into the cluster.
#[derive(Debug, Clone, Deserialize, Serialize, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeturboStatus {
    /// Time of the last configuration change (RFC3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_timestamp: Option<String>,
    /// Decimal 64-bit fingerprint of the primary configuration payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

impl KubeturboStatus {
    /// Status recording `config_hash` as applied now
    pub fn applied(config_hash: impl Into<String>) -> Self {
        Self {
            last_updated_timestamp: Some(
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ),
            config_hash: Some(config_hash.into()),
        }
    }

    /// Last applied hash, empty when nothing was recorded yet
    pub fn recorded_hash(&self) -> &str {
        self.config_hash.as_deref().unwrap_or_default()
    }
}

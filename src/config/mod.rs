//! # Configuration
//!
//! Process settings loaded from environment variables.
//!
//! Everything here has a default except the Kubeturbo default version, whose
//! absence is reported by the defaulter on every pass instead of at startup.

use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::time::Duration;

/// Operator configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Name of the pod running the operator, used to locate its Deployment
    pub pod_name: Option<String>,
    /// HTTP server port for metrics and health probes
    pub metrics_port: u16,
    /// How long to wait for the HTTP server to bind (seconds)
    pub startup_timeout_secs: u64,
    /// How often to check whether the HTTP server is ready (milliseconds)
    pub poll_interval_ms: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            pod_name: None,
            metrics_port: DEFAULT_METRICS_PORT,
            startup_timeout_secs: DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_SERVER_POLL_INTERVAL_MS,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            watch_namespace: non_empty_env("WATCH_NAMESPACE"),
            pod_name: non_empty_env("POD_NAME"),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            startup_timeout_secs: env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            poll_interval_ms: env_var_or_default(
                "SERVER_POLL_INTERVAL_MS",
                DEFAULT_SERVER_POLL_INTERVAL_MS,
            ),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or_default_falls_back_on_unparsable_value() {
        std::env::set_var("KUBETURBO_OPERATOR_TEST_PORT", "not-a-port");
        let port: u16 = env_var_or_default("KUBETURBO_OPERATOR_TEST_PORT", 8080);
        assert_eq!(port, 8080);
        std::env::remove_var("KUBETURBO_OPERATOR_TEST_PORT");
    }

    #[test]
    fn test_env_var_or_default_parses_value() {
        std::env::set_var("KUBETURBO_OPERATOR_TEST_TIMEOUT", "42");
        let timeout: u64 = env_var_or_default("KUBETURBO_OPERATOR_TEST_TIMEOUT", 10);
        assert_eq!(timeout, 42);
        std::env::remove_var("KUBETURBO_OPERATOR_TEST_TIMEOUT");
    }

    #[test]
    fn test_blank_namespace_means_all_namespaces() {
        std::env::set_var("KUBETURBO_OPERATOR_TEST_NS", "  ");
        assert_eq!(non_empty_env("KUBETURBO_OPERATOR_TEST_NS"), None);
        std::env::remove_var("KUBETURBO_OPERATOR_TEST_NS");
    }
}

//! # Reconciler Context
//!
//! Process-wide state shared by every reconcile pass.

use crate::constants::{POD_WAIT_INTERVAL, POD_WAIT_TIMEOUT};
use crate::controller::backoff::BackoffState;
use crate::controller::events::EventSink;
use crate::controller::preflight::PreflightGate;
use crate::controller::store::ObjectStore;
use crate::crd::DefaultVersion;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

/// Bounded poll used while waiting for kubeturbo pods to exit on deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PodWaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PodWaitPolicy {
    fn default() -> Self {
        Self {
            interval: POD_WAIT_INTERVAL,
            timeout: POD_WAIT_TIMEOUT,
        }
    }
}

pub struct Context<S: ObjectStore> {
    pub store: S,
    pub events: Arc<dyn EventSink>,
    /// Set at most once at startup, read by every pass
    pub default_version: Arc<DefaultVersion>,
    pub preflight: PreflightGate,
    /// Error backoff per `namespace/name`, owned by the error policy
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
    pub pod_wait: PodWaitPolicy,
}

impl<S: ObjectStore> std::fmt::Debug for Context<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("default_version", &self.default_version)
            .field("preflight_open", &self.preflight.is_open())
            .field("pod_wait", &self.pod_wait)
            .finish_non_exhaustive()
    }
}

impl<S: ObjectStore> Context<S> {
    pub fn new(
        store: S,
        events: Arc<dyn EventSink>,
        default_version: Arc<DefaultVersion>,
        preflight: PreflightGate,
    ) -> Self {
        Self {
            store,
            events,
            default_version,
            preflight,
            backoff_states: Mutex::new(HashMap::new()),
            pod_wait: PodWaitPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_pod_wait(mut self, pod_wait: PodWaitPolicy) -> Self {
        self.pod_wait = pod_wait;
        self
    }

    /// Forget the error history of a resource after a successful pass
    pub fn reset_backoff(&self, resource_key: &str) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                states.remove(resource_key);
            }
            Err(e) => warn!("Failed to lock backoff_states: {}", e),
        }
    }
}

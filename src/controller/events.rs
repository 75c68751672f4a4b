//! # Events
//!
//! Human visible warnings published as Kubernetes events.

use crate::constants::OPERATOR_NAME;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

pub const REASON_CRD_ISSUE: &str = "CRDIssue";
pub const REASON_MISSING_FIELDS: &str = "MissingFields";

/// Sink for warnings meant for cluster users
///
/// Publishing is best effort; a failed publish is logged and otherwise ignored.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn warning(&self, reference: &ObjectReference, reason: &str, action: &str, note: String);
}

/// [`EventSink`] publishing through the Kubernetes events API
pub struct KubeEventSink {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventSink").finish_non_exhaustive()
    }
}

impl KubeEventSink {
    pub fn new(client: Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn warning(&self, reference: &ObjectReference, reason: &str, action: &str, note: String) {
        let event = Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, reference).await {
            warn!(
                reason = reason,
                object = reference.name.as_deref().unwrap_or("unknown"),
                "Failed to publish event: {}",
                e
            );
        }
    }
}

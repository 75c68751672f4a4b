//! # Lifecycle
//!
//! Decides whether a pass reconciles or tears down, and which finalizers the
//! Kubeturbo resource must carry.
//!
//! ```text
//! Active ──deletionTimestamp──▶ TerminatingWithFinalizer ──teardown──▶ TerminatingClean
//! ```
//!
//! Deletion is terminal; there is no way back to `Active`.

use crate::constants::FINALIZER;
use crate::crd::Kubeturbo;
use kube::ResourceExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No deletion timestamp; converge the managed objects
    Active,
    /// Being deleted and still guarded by the operator finalizer
    TerminatingWithFinalizer,
    /// Being deleted and already released; nothing left to do
    TerminatingClean,
}

impl Phase {
    pub fn of(kt: &Kubeturbo) -> Self {
        if kt.metadata.deletion_timestamp.is_none() {
            Self::Active
        } else if kt.finalizers().iter().any(|f| f == FINALIZER) {
            Self::TerminatingWithFinalizer
        } else {
            Self::TerminatingClean
        }
    }
}

/// Finalizer list to persist on an active resource, or `None` when it
/// already carries exactly the operator finalizer
///
/// Foreign finalizers are dropped.
pub fn active_finalizers(current: &[String]) -> Option<Vec<String>> {
    match current {
        [only] if only == FINALIZER => None,
        _ => Some(vec![FINALIZER.to_string()]),
    }
}

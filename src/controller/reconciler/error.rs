//! # Reconciler Errors

use crate::controller::store::StoreError;
use thiserror::Error;

/// Why a pass ended early with a short, fixed requeue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Optimistic concurrency conflict on a write
    Conflict,
    /// The pass deleted an object on purpose and the next pass recreates it
    DeletionInProgress,
}

impl RetryReason {
    /// Label used for the requeue metric
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Conflict => "conflict",
            Self::DeletionInProgress => "deletion-in-progress",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to render kubeturbo configuration: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Kubeturbo resource has no {0}")]
    MissingObjectKey(&'static str),
}

impl ReconcilerError {
    /// Write conflicts are answered with a fixed short requeue instead of the
    /// error backoff
    pub fn retry_reason(&self) -> Option<RetryReason> {
        match self {
            Self::Store(e) if e.is_conflict() => Some(RetryReason::Conflict),
            _ => None,
        }
    }
}

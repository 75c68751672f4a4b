//! # Error Policy
//!
//! Requeue policy for passes that failed with a hard error.
//!
//! Each resource keeps its own Fibonacci backoff so one failing resource does
//! not slow down the others. The state is cleared by the next successful pass.

use crate::constants::{
    DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, ERROR_BACKOFF_MAX_SECS, ERROR_BACKOFF_MIN_SECS,
};
use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::{Context, ReconcilerError};
use crate::controller::store::ObjectStore;
use crate::crd::Kubeturbo;
use crate::observability;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle a reconciliation error with per-resource Fibonacci backoff
pub fn handle_reconciliation_error<S: ObjectStore>(
    kt: Arc<Kubeturbo>,
    error: &ReconcilerError,
    ctx: Arc<Context<S>>,
) -> Action {
    let name = kt.name_any();
    let namespace = kt.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconcile.error",
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {:?}", name, error);
    observability::metrics::increment_reconciliation_errors();

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key)
                .or_insert_with(|| BackoffState::new(ERROR_BACKOFF_MIN_SECS, ERROR_BACKOFF_MAX_SECS));
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    let delay = Duration::from_secs(backoff_seconds);
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    info!("📅 Next retry scheduled: {}", next_trigger_time.to_rfc3339());

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

//! # Reconciler
//!
//! Converges the cluster towards one Kubeturbo resource.
//!
//! A pass re-reads the resource, decides from its [`Phase`] whether to
//! reconcile or tear down, and maps the result to a controller [`Action`]:
//!
//! | Result                                   | Action                      |
//! |------------------------------------------|-----------------------------|
//! | done, resource gone, validation pause    | `await_change()`            |
//! | conflict or deliberate deletion          | `requeue(1s)`               |
//! | any other error                          | error policy with backoff   |

pub mod context;
pub mod error;
pub mod lifecycle;
pub mod steps;
pub mod teardown;

pub use context::{Context, PodWaitPolicy};
pub use error::{ReconcilerError, RetryReason};
pub use lifecycle::Phase;
pub use steps::{Pass, Step, StepOutcome};

use crate::constants::REQUEUE_DELAY;
use crate::controller::builders::DesiredState;
use crate::controller::events::REASON_MISSING_FIELDS;
use crate::controller::instance::Instance;
use crate::controller::store::ObjectStore;
use crate::crd::{apply_defaults, Kubeturbo};
use crate::observability;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Reconcile one Kubeturbo resource
///
/// An active resource is left untouched until the pre-flight gate opens and
/// its spec passes defaulting. Teardown does not wait for either.
pub async fn reconcile<S: ObjectStore>(
    kt: Arc<Kubeturbo>,
    ctx: Arc<Context<S>>,
) -> Result<Action, ReconcilerError> {
    let name = kt.name_any();
    let namespace = kt.namespace().unwrap_or_default();
    let span = tracing::info_span!(
        "controller.reconcile",
        resource.name = %name,
        resource.namespace = %namespace
    );

    async move {
        let start = Instant::now();
        observability::metrics::increment_reconciliations();

        let result = reconcile_current(&name, &namespace, &ctx).await;
        observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        let action = match result {
            Ok(action) => action,
            Err(e) => match e.retry_reason() {
                Some(reason) => retry(reason),
                None => return Err(e),
            },
        };
        ctx.reset_backoff(&format!("{namespace}/{name}"));
        Ok(action)
    }
    .instrument(span)
    .await
}

fn retry(reason: RetryReason) -> Action {
    info!(
        "Requeueing in {}s ({})",
        REQUEUE_DELAY.as_secs(),
        reason.as_str()
    );
    observability::metrics::increment_requeues_total(reason.as_str());
    Action::requeue(REQUEUE_DELAY)
}

async fn reconcile_current<S: ObjectStore>(
    name: &str,
    namespace: &str,
    ctx: &Context<S>,
) -> Result<Action, ReconcilerError> {
    // The triggering object may be stale; status and finalizers must be current
    let Some(kt) = ctx.store.get::<Kubeturbo>(Some(namespace), name).await? else {
        debug!("Kubeturbo {} no longer exists", name);
        return Ok(Action::await_change());
    };

    match Phase::of(&kt) {
        Phase::Active => reconcile_active(&kt, ctx).await,
        Phase::TerminatingWithFinalizer => {
            teardown::finalize(&kt, ctx).await?;
            Ok(Action::await_change())
        }
        Phase::TerminatingClean => {
            debug!("Kubeturbo {} is terminating and already released", name);
            Ok(Action::await_change())
        }
    }
}

async fn reconcile_active<S: ObjectStore>(
    kt: &Kubeturbo,
    ctx: &Context<S>,
) -> Result<Action, ReconcilerError> {
    let instance = Instance::from_resource(kt)?;

    if !ctx.preflight.is_open() {
        info!("Waiting for the pre-flight check before reconciling");
    }
    ctx.preflight.wait().await;

    let mut spec = kt.spec.clone();
    if let Err(e) = apply_defaults(&mut spec, &ctx.default_version) {
        warn!("⏸️  Reconciliation paused: {}", e);
        ctx.events
            .warning(&kt.object_ref(&()), REASON_MISSING_FIELDS, "Validate", e.to_string())
            .await;
        return Ok(Action::await_change());
    }

    if let Some(finalizers) = lifecycle::active_finalizers(kt.finalizers()) {
        ctx.store
            .patch_finalizers::<Kubeturbo>(Some(&instance.namespace), &instance.name, &finalizers)
            .await?;
        info!("Set finalizers of Kubeturbo {} to {:?}", instance.name, finalizers);
        return Ok(Action::await_change());
    }

    let desired = DesiredState::new(&spec, &instance)?;
    match Pass::new(ctx, kt, desired).run_all().await? {
        StepOutcome::Continue => {
            info!("✅ Kubeturbo {} reconciled", instance.name);
            Ok(Action::await_change())
        }
        StepOutcome::Retry(reason) => Ok(retry(reason)),
    }
}

//! # Watch Loop
//!
//! Runs the pre-flight check and the Kubeturbo controller side by side. The
//! controller starts watching immediately but every pass waits for the
//! pre-flight gate; a failed check ends the process.

use super::error_policy::handle_reconciliation_error;
use super::initialization::InitializationResult;
use crate::controller::preflight::run_preflight;
use crate::controller::reconciler::reconcile;
use crate::controller::store::{ClusterObject, KubeStore};
use crate::crd::Kubeturbo;
use anyhow::{Context as _, Result};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, ServiceAccount};
use kube_runtime::controller::Controller;
use kube_runtime::watcher;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub async fn run_watch_loop(init: InitializationResult) -> Result<()> {
    let InitializationResult {
        client,
        config,
        context,
        server_state: _server_state,
    } = init;
    let namespace = config.watch_namespace.as_deref();

    let watch = Controller::new(
        Kubeturbo::api(client.clone(), namespace),
        watcher::Config::default(),
    )
    .owns(
        Deployment::api(client.clone(), namespace),
        watcher::Config::default(),
    )
    .owns(
        ConfigMap::api(client.clone(), namespace),
        watcher::Config::default(),
    )
    .owns(
        ServiceAccount::api(client, namespace),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(
        reconcile::<KubeStore>,
        handle_reconciliation_error::<KubeStore>,
        Arc::clone(&context),
    )
    .for_each(|result| async move {
        match result {
            Ok((obj, action)) => debug!("Reconciled {}: {:?}", obj.name, action),
            Err(e) => warn!("Controller stream error: {}", e),
        }
    });

    let preflight = async {
        run_preflight(
            &context.store,
            context.events.as_ref(),
            &config,
            &context.preflight,
        )
        .await
        .context("Pre-flight check failed")
    };
    let controller = async {
        watch.await;
        info!("Controller stopped");
        Ok::<(), anyhow::Error>(())
    };

    tokio::try_join!(preflight, controller)?;
    Ok(())
}

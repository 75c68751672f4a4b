//! # Service Account
//!
//! The kubeturbo service account carries the operator finalizer while the
//! instance is alive so it cannot disappear from under the running pod.

use super::{DesiredState, Mutation};
use crate::constants::FINALIZER;
use k8s_openapi::api::core::v1::ServiceAccount;

pub fn mutate_service_account(desired: &DesiredState<'_>, sa: &mut ServiceAccount) -> Mutation {
    sa.metadata.labels = Some(desired.labels.clone());
    let finalizers = sa.metadata.finalizers.get_or_insert_with(Vec::new);
    if !finalizers.iter().any(|f| f == FINALIZER) {
        finalizers.push(FINALIZER.to_string());
    }
    Mutation::Applied
}

/// Drop the operator finalizer, leaving finalizers of other controllers in place
///
/// Returns whether anything was removed.
pub fn release_service_account(sa: &mut ServiceAccount) -> bool {
    let Some(finalizers) = sa.metadata.finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    finalizers.len() != before
}

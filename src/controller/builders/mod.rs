//! # Desired-State Builders
//!
//! Pure functions shaping each managed object from a `Kubeturbo` resource.
//!
//! A builder receives the object as fetched from the cluster (or an empty shell
//! when it does not exist yet) and rewrites the fields the operator owns. It
//! never talks to the cluster. When an immutable field would have to change,
//! it returns [`Mutation::Recreate`] and leaves the object untouched; the
//! reconciler then deletes the object and retries.

pub mod cluster_role;
pub mod cluster_role_binding;
pub mod config_bundle;
pub mod deployment;
pub mod service_account;

pub use config_bundle::RenderedConfig;

use crate::controller::instance::Instance;
use crate::crd::KubeturboSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use std::collections::BTreeMap;

/// Result of running a builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// The object now holds the desired state
    Applied,
    /// The object cannot be updated in place and must be deleted first
    Recreate { reason: String },
}

/// Everything the builders need for one reconcile pass
#[derive(Debug)]
pub struct DesiredState<'a> {
    pub spec: &'a KubeturboSpec,
    pub instance: &'a Instance,
    pub labels: BTreeMap<String, String>,
    pub config: RenderedConfig,
}

impl<'a> DesiredState<'a> {
    /// Render the configuration bundle and label set for `spec`
    pub fn new(spec: &'a KubeturboSpec, instance: &'a Instance) -> Result<Self, serde_json::Error> {
        Ok(Self {
            spec,
            instance,
            labels: instance.labels(),
            config: RenderedConfig::render(spec)?,
        })
    }

    pub fn cluster_role_name(&self) -> String {
        self.instance.cluster_role_name(&self.spec.role_name)
    }

    pub fn cluster_role_binding_name(&self) -> String {
        self.instance.cluster_role_binding_name(&self.spec.role_binding)
    }
}

/// Make `owner` the controller of the object, replacing any stale reference
/// to the same owner
pub fn set_controller_reference(meta: &mut ObjectMeta, owner: &OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    match refs.iter_mut().find(|r| r.uid == owner.uid) {
        Some(existing) => *existing = owner.clone(),
        None => refs.push(owner.clone()),
    }
}

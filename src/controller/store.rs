//! # Object Store
//!
//! The small set of cluster operations the reconciler depends on.
//!
//! [`ObjectStore`] is implemented by [`KubeStore`] against the Kubernetes API.
//! Tests drive the same reconciler against an in-memory implementation.
//! Objects are addressed by optional namespace plus name; `None` means a
//! cluster-scoped object (or, for `list`, all namespaces).

use crate::constants::FIELD_MANAGER;
use crate::controller::instance::label_selector;
use crate::crd::Kubeturbo;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use thiserror::Error;

/// Errors returned by cluster operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency violation; retrying with fresh state resolves it
    #[error("conflict while trying to {operation} {kind} {name}: {message}")]
    Conflict {
        operation: &'static str,
        kind: String,
        name: String,
        message: String,
    },

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("failed to {operation} {kind} {name}: {source}")]
    Kube {
        operation: &'static str,
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to serialize {kind} {name}: {source}")]
    Serialization {
        kind: String,
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Classify a kube client error by HTTP status
    pub fn from_kube(operation: &'static str, kind: &str, name: &str, error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref api_err) if api_err.code == 409 => Self::Conflict {
                operation,
                kind: kind.to_string(),
                name: name.to_string(),
                message: error.to_string(),
            },
            kube::Error::Api(ref api_err) if api_err.code == 404 => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            source => Self::Kube {
                operation,
                kind: kind.to_string(),
                name: name.to_string(),
                source,
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// A Kubernetes object type the store can manage
///
/// Namespaced and cluster-scoped resources are built into an [`Api`]
/// differently, so each type states how.
pub trait ClusterObject:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn api(client: Client, namespace: Option<&str>) -> Api<Self>;

    /// Kind name used in logs and errors
    fn kind_name() -> String {
        Self::kind(&()).into_owned()
    }
}

macro_rules! namespaced_objects {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ClusterObject for $ty {
                fn api(client: Client, namespace: Option<&str>) -> Api<Self> {
                    match namespace {
                        Some(ns) => Api::namespaced(client, ns),
                        None => Api::all(client),
                    }
                }
            }
        )*
    };
}

macro_rules! cluster_objects {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ClusterObject for $ty {
                fn api(client: Client, _namespace: Option<&str>) -> Api<Self> {
                    Api::all(client)
                }
            }
        )*
    };
}

namespaced_objects!(Kubeturbo, Deployment, ReplicaSet, ConfigMap, ServiceAccount, Pod);
cluster_objects!(ClusterRole, ClusterRoleBinding, CustomResourceDefinition);

/// Cluster operations used by the reconciler
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    async fn get<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError>;

    async fn create<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        obj: &K,
    ) -> Result<K, StoreError>;

    /// Replace an existing object; its `resourceVersion` guards against lost updates
    async fn replace<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        obj: &K,
    ) -> Result<K, StoreError>;

    /// Delete an object. Returns `false` when it was already gone.
    async fn delete<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, StoreError>;

    /// List objects carrying all of `labels`
    async fn list<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError>;

    /// Merge `status` into the status sub-resource
    async fn patch_status<K: ClusterObject, S: Serialize + Send + Sync>(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &S,
    ) -> Result<(), StoreError>;

    /// Replace the finalizer list of an object
    async fn patch_finalizers<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        finalizers: &[String],
    ) -> Result<(), StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn post_params() -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(FIELD_MANAGER.to_string()),
        }
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        K::api(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| StoreError::from_kube("get", &K::kind_name(), name, e))
    }

    async fn create<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        obj: &K,
    ) -> Result<K, StoreError> {
        K::api(self.client.clone(), namespace)
            .create(&Self::post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube("create", &K::kind_name(), &obj.name_any(), e))
    }

    async fn replace<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        obj: &K,
    ) -> Result<K, StoreError> {
        let name = obj.name_any();
        K::api(self.client.clone(), namespace)
            .replace(&name, &Self::post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube("update", &K::kind_name(), &name, e))
    }

    async fn delete<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, StoreError> {
        match K::api(self.client.clone(), namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => match StoreError::from_kube("delete", &K::kind_name(), name, e) {
                StoreError::NotFound { .. } => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn list<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        let selector = label_selector(labels);
        K::api(self.client.clone(), namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map(|list| list.items)
            .map_err(|e| StoreError::from_kube("list", &K::kind_name(), &selector, e))
    }

    async fn patch_status<K: ClusterObject, S: Serialize + Send + Sync>(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &S,
    ) -> Result<(), StoreError> {
        let status = serde_json::to_value(status).map_err(|source| StoreError::Serialization {
            kind: K::kind_name(),
            name: name.to_string(),
            source,
        })?;
        let patch = serde_json::json!({ "status": status });
        K::api(self.client.clone(), namespace)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube("update status of", &K::kind_name(), name, e))
    }

    async fn patch_finalizers<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        finalizers: &[String],
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
        K::api(self.client.clone(), namespace)
            .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube("update finalizers of", &K::kind_name(), name, e))
    }
}

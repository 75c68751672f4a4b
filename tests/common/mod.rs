//! Shared test fixtures
//!
//! - `FakeStore` - in-memory `ObjectStore` recording every write
//! - `FakeEvents` - `EventSink` collecting warnings
//! - `Harness` - a reconciler context wired to both

#![allow(dead_code, reason = "Not every test binary uses every helper")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kubeturbo_operator::controller::events::EventSink;
use kubeturbo_operator::controller::preflight::PreflightGate;
use kubeturbo_operator::controller::reconciler::{reconcile, Context, PodWaitPolicy, ReconcilerError};
use kubeturbo_operator::controller::store::{ClusterObject, ObjectStore, StoreError};
use kubeturbo_operator::crd::{DefaultVersion, Kubeturbo, KubeturboSpec};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAME: &str = "kt";
pub const NAMESPACE: &str = "turbo";
pub const UID: &str = "6f1c1a52-9a43-4a0e-8d4f-3f1e2b7c9d10";
pub const VERSION: &str = "8.14.6";

/// A write performed against the fake store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub op: &'static str,
    pub kind: String,
    pub name: String,
}

type Key = (String, String, String);

fn key(kind: &str, namespace: Option<&str>, name: &str) -> Key {
    (
        kind.to_string(),
        namespace.unwrap_or_default().to_string(),
        name.to_string(),
    )
}

/// In-memory object store
///
/// Objects with finalizers are only marked for deletion, the way the API
/// server does it, and vanish once their finalizer list is emptied.
#[derive(Debug, Default)]
pub struct FakeStore {
    objects: Mutex<BTreeMap<Key, Value>>,
    writes: Mutex<Vec<Write>>,
    failures: Mutex<Vec<(&'static str, String, StoreFailure)>>,
    resource_version: Mutex<u64>,
}

#[derive(Debug, Clone, Copy)]
pub enum StoreFailure {
    Conflict,
    NotFound,
}

impl FakeStore {
    /// Seed an object without recording a write
    pub fn insert<K: ClusterObject>(&self, namespace: Option<&str>, obj: &K) {
        let value = serde_json::to_value(obj).unwrap();
        self.objects
            .lock()
            .unwrap()
            .insert(key(&K::kind_name(), namespace, &obj.name_any()), value);
    }

    pub fn fetch<K: ClusterObject>(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&key(&K::kind_name(), namespace, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn count<K: ClusterObject>(&self) -> usize {
        let kind = K::kind_name();
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    /// Make the next `op` on `K` fail
    pub fn fail_next<K: ClusterObject>(&self, op: &'static str, failure: StoreFailure) {
        self.failures
            .lock()
            .unwrap()
            .push((op, K::kind_name(), failure));
    }

    pub fn writes(&self) -> Vec<Write> {
        self.writes.lock().unwrap().clone()
    }

    pub fn clear_writes(&self) {
        self.writes.lock().unwrap().clear();
    }

    /// Writes of one operation on one kind
    pub fn writes_of(&self, op: &str, kind: &str) -> Vec<Write> {
        self.writes()
            .into_iter()
            .filter(|w| w.op == op && w.kind == kind)
            .collect()
    }

    /// Position of the first matching write
    pub fn position(&self, op: &str, kind: &str) -> Option<usize> {
        self.writes()
            .iter()
            .position(|w| w.op == op && w.kind == kind)
    }

    fn record(&self, op: &'static str, kind: &str, name: &str) {
        self.writes.lock().unwrap().push(Write {
            op,
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }

    fn injected(&self, op: &'static str, kind: &str, name: &str) -> Result<(), StoreError> {
        let mut failures = self.failures.lock().unwrap();
        let Some(index) = failures.iter().position(|(o, k, _)| *o == op && k == kind) else {
            return Ok(());
        };
        let (_, _, failure) = failures.remove(index);
        Err(match failure {
            StoreFailure::Conflict => StoreError::Conflict {
                operation: op,
                kind: kind.to_string(),
                name: name.to_string(),
                message: "the object has been modified".to_string(),
            },
            StoreFailure::NotFound => StoreError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
        })
    }

    fn next_resource_version(&self) -> String {
        let mut rv = self.resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    fn not_found(kind: &str, name: &str) -> StoreError {
        StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    /// Store `value`, dropping it when it is marked for deletion and no
    /// finalizer is left
    fn settle(&self, key: Key, mut value: Value) {
        let finalizers_empty = value["metadata"]["finalizers"]
            .as_array()
            .is_none_or(Vec::is_empty);
        let mut objects = self.objects.lock().unwrap();
        if value["metadata"].get("deletionTimestamp").is_some() && finalizers_empty {
            objects.remove(&key);
        } else {
            value["metadata"]["resourceVersion"] = json!(self.next_resource_version());
            objects.insert(key, value);
        }
    }

    /// Mark the Kubeturbo resource deleted
    pub fn mark_deleted(&self, namespace: &str, name: &str) {
        let mut kt: Kubeturbo = self.fetch(Some(namespace), name).unwrap();
        kt.metadata.deletion_timestamp = Some(deleted_at());
        self.insert(Some(namespace), &kt);
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn get<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<K>, StoreError> {
        let kind = K::kind_name();
        self.injected("get", &kind, name)?;
        Ok(self.fetch(namespace, name))
    }

    async fn create<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        obj: &K,
    ) -> Result<K, StoreError> {
        let kind = K::kind_name();
        let name = obj.name_any();
        self.injected("create", &kind, &name)?;
        let key = key(&kind, namespace, &name);
        if self.objects.lock().unwrap().contains_key(&key) {
            return Err(StoreError::Conflict {
                operation: "create",
                kind,
                name,
                message: "already exists".to_string(),
            });
        }
        self.record("create", &kind, &name);
        self.settle(key, serde_json::to_value(obj).unwrap());
        Ok(self.fetch(namespace, &name).unwrap())
    }

    async fn replace<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        obj: &K,
    ) -> Result<K, StoreError> {
        let kind = K::kind_name();
        let name = obj.name_any();
        self.injected("replace", &kind, &name)?;
        let key = key(&kind, namespace, &name);
        let stored_version = self
            .objects
            .lock()
            .unwrap()
            .get(&key)
            .map(|v| v["metadata"]["resourceVersion"].as_str().map(str::to_string))
            .ok_or_else(|| Self::not_found(&kind, &name))?;
        if obj.resource_version() != stored_version {
            return Err(StoreError::Conflict {
                operation: "update",
                kind,
                name,
                message: "resourceVersion mismatch".to_string(),
            });
        }
        self.record("replace", &kind, &name);
        self.settle(key, serde_json::to_value(obj).unwrap());
        Ok(self.fetch(namespace, &name).unwrap())
    }

    async fn delete<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<bool, StoreError> {
        let kind = K::kind_name();
        self.injected("delete", &kind, name)?;
        let key = key(&kind, namespace, name);
        let Some(mut value) = self.objects.lock().unwrap().get(&key).cloned() else {
            return Ok(false);
        };
        self.record("delete", &kind, name);
        value["metadata"]["deletionTimestamp"] = json!(chrono::Utc::now().to_rfc3339());
        self.settle(key, value);
        Ok(true)
    }

    async fn list<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>, StoreError> {
        let kind = K::kind_name();
        self.injected("list", &kind, "")?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && namespace.is_none_or(|want| want == ns))
            .filter(|(_, v)| {
                labels
                    .iter()
                    .all(|(lk, lv)| v["metadata"]["labels"][lk].as_str() == Some(lv.as_str()))
            })
            .map(|(_, v)| serde_json::from_value(v.clone()).unwrap())
            .collect())
    }

    async fn patch_status<K: ClusterObject, S: Serialize + Send + Sync>(
        &self,
        namespace: Option<&str>,
        name: &str,
        status: &S,
    ) -> Result<(), StoreError> {
        let kind = K::kind_name();
        self.injected("patch_status", &kind, name)?;
        let key = key(&kind, namespace, name);
        let mut value = self
            .objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(&kind, name))?;
        let patch = serde_json::to_value(status).unwrap();
        if !value["status"].is_object() {
            value["status"] = json!({});
        }
        for (field, field_value) in patch.as_object().unwrap() {
            value["status"][field] = field_value.clone();
        }
        self.record("patch_status", &kind, name);
        self.settle(key, value);
        Ok(())
    }

    async fn patch_finalizers<K: ClusterObject>(
        &self,
        namespace: Option<&str>,
        name: &str,
        finalizers: &[String],
    ) -> Result<(), StoreError> {
        let kind = K::kind_name();
        self.injected("patch_finalizers", &kind, name)?;
        let key = key(&kind, namespace, name);
        let mut value = self
            .objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Self::not_found(&kind, name))?;
        value["metadata"]["finalizers"] = json!(finalizers);
        self.record("patch_finalizers", &kind, name);
        self.settle(key, value);
        Ok(())
    }
}

/// Collected warning events
#[derive(Debug, Default)]
pub struct FakeEvents {
    pub warnings: Mutex<Vec<(String, String, String)>>,
}

impl FakeEvents {
    /// (object name, reason, note) of every warning
    pub fn all(&self) -> Vec<(String, String, String)> {
        self.warnings.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for FakeEvents {
    async fn warning(&self, reference: &ObjectReference, reason: &str, _action: &str, note: String) {
        self.warnings.lock().unwrap().push((
            reference.name.clone().unwrap_or_default(),
            reason.to_string(),
            note,
        ));
    }
}

/// Deletion timestamp for terminating objects
pub fn deleted_at() -> Time {
    serde_json::from_value(json!("2026-01-01T00:00:00Z")).unwrap()
}

pub fn kubeturbo(spec: Value) -> Kubeturbo {
    let spec: KubeturboSpec = serde_json::from_value(spec).unwrap();
    let mut kt = Kubeturbo::new(NAME, spec);
    kt.metadata.namespace = Some(NAMESPACE.to_string());
    kt.metadata.uid = Some(UID.to_string());
    kt
}

/// Reconciler context over a fake cluster
pub struct Harness {
    pub ctx: Arc<Context<FakeStore>>,
    pub events: Arc<FakeEvents>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(DefaultVersion::with_value(VERSION), PreflightGate::opened())
    }

    pub fn with(default_version: DefaultVersion, gate: PreflightGate) -> Self {
        let events = Arc::new(FakeEvents::default());
        let ctx = Context::new(
            FakeStore::default(),
            Arc::clone(&events) as Arc<dyn EventSink>,
            Arc::new(default_version),
            gate,
        )
        .with_pod_wait(PodWaitPolicy {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        });
        Self {
            ctx: Arc::new(ctx),
            events,
        }
    }

    pub fn store(&self) -> &FakeStore {
        &self.ctx.store
    }

    /// Seed a Kubeturbo resource built from `spec`
    pub fn create(&self, spec: Value) {
        self.store().insert(Some(NAMESPACE), &kubeturbo(spec));
    }

    pub fn current(&self) -> Option<Kubeturbo> {
        self.store().fetch(Some(NAMESPACE), NAME)
    }

    /// Edit the stored resource's spec
    pub fn update_spec(&self, edit: impl FnOnce(&mut KubeturboSpec)) {
        let mut kt = self.current().unwrap();
        edit(&mut kt.spec);
        self.store().insert(Some(NAMESPACE), &kt);
    }

    /// Run one pass as the controller would, with the last known object
    pub async fn reconcile(&self) -> Result<Action, ReconcilerError> {
        let kt = self.current().unwrap_or_else(|| kubeturbo(json!({})));
        reconcile(Arc::new(kt), Arc::clone(&self.ctx)).await
    }

    /// Reconcile until a pass ends without a requeue
    pub async fn converge(&self) {
        for _ in 0..10 {
            if self.reconcile().await.unwrap() == Action::await_change() {
                return;
            }
        }
        panic!("reconciliation did not converge");
    }

    /// Finalizer pass followed by a full converge
    pub async fn converge_from_scratch(&self, spec: Value) {
        self.create(spec);
        assert_eq!(self.reconcile().await.unwrap(), Action::await_change());
        self.converge().await;
    }
}

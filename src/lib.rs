//! # Kubeturbo Operator
//!
//! Kubernetes operator that turns a `Kubeturbo` custom resource into a running
//! kubeturbo agent: a configuration ConfigMap, a service account, optional
//! cluster role, a cluster role binding and a single replica Deployment.
//!
//! ## Reconciliation
//!
//! Every pass recomputes the full desired state from the resource spec and
//! applies it in a fixed order. Changes to the primary (startup) configuration
//! restart kubeturbo by deleting and recreating its Deployment; changes to the
//! secondary configuration are picked up by the running process.
//!
//! On deletion the operator removes the cluster-scoped objects it created
//! before releasing the resource's finalizer.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;

pub use crd::{Kubeturbo, KubeturboSpec, KubeturboStatus};

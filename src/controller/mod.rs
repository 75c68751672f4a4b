//! # Controller
//!
//! Reconciliation engine for Kubeturbo resources.
//!
//! - `builders` - pure desired-state shaping of each managed object
//! - `reconciler` - lifecycle, ordered steps and teardown
//! - `store` - cluster access behind the [`store::ObjectStore`] trait
//! - `preflight` - one-time CRD compatibility check gating reconciliation
//! - `server` - metrics and probe endpoints

pub mod backoff;
pub mod builders;
pub mod events;
pub mod hash;
pub mod instance;
pub mod preflight;
pub mod reconciler;
pub mod server;
pub mod store;

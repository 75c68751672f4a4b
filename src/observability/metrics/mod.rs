//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator.
//!
//! - `registry` - registry setup and registration
//! - `controller_metrics` - reconciliations, errors, requeues and workload restarts

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;

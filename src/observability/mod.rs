//! # Observability
//!
//! Prometheus metrics exposed on the operator's HTTP server.

pub mod metrics;

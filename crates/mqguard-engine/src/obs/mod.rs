//! Lightweight in-process metrics.
//!
//! Decision counters are stored as atomics and rendered on demand in
//! Prometheus text format; wiring an HTTP endpoint is left to the host.

pub mod metrics;

pub use metrics::PolicyMetrics;
